use std::io::{BufRead, BufReader};
use std::net::TcpListener;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

fn daemon(args: &[&str], vars: &[(&str, &str)]) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_env-sensor"));
    command
        .args(args)
        .env_clear()
        .envs(vars.iter().copied())
        .current_dir(env!("CARGO_TARGET_TMPDIR"))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    command
}

fn wait_with_timeout(child: &mut Child, limit: Duration) -> Option<i32> {
    let start = Instant::now();
    while start.elapsed() < limit {
        if let Some(status) = child.try_wait().unwrap() {
            return status.code();
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    child.kill().unwrap();
    panic!("daemon did not exit within {limit:?}");
}

#[test]
fn missing_topic_exits_with_one() {
    let output = daemon(&["--test-mode"], &[]).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("You must specify the TOPIC environment variable"),
        "{stdout}"
    );
}

#[test]
fn missing_influx_database_exits_with_one() {
    let output = daemon(&["--test-mode", "--sink", "influx"], &[("ROOM", "kitchen")])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn unreachable_broker_exits_with_two() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port().to_string()
    };
    let output = daemon(
        &["--test-mode"],
        &[
            ("TOPIC", "home/livingroom"),
            ("MQTT_HOST", "127.0.0.1"),
            ("MQTT_PORT", &port),
        ],
    )
    .output()
    .unwrap();
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn sigterm_stops_the_loop_cleanly() {
    let mut child = daemon(
        &["--test-mode", "--disable-mqtt", "-v"],
        &[("TOPIC", "home/livingroom")],
    )
    .spawn()
    .unwrap();

    let stdout = child.stdout.take().unwrap();
    let mut lines = BufReader::new(stdout).lines();
    loop {
        let line = lines
            .next()
            .expect("daemon exited before starting the loop")
            .unwrap();
        if line.contains("Starting main loop") {
            break;
        }
    }

    let status = Command::new("sh")
        .arg("-c")
        .arg(format!("kill -TERM {}", child.id()))
        .status()
        .unwrap();
    assert!(status.success());

    assert_eq!(wait_with_timeout(&mut child, Duration::from_secs(10)), Some(0));
    let rest: Vec<String> = lines.map_while(Result::ok).collect();
    assert!(
        rest.iter().any(|line| line.contains("Shutdown complete")),
        "{rest:?}"
    );
}
