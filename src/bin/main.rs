use std::process::ExitCode;

use clap::Parser;
use env_sensor::cli::Cli;
use env_sensor::config::Config;
use env_sensor::error::DaemonError;
use env_sensor::logging;
use env_sensor::sample_loop::SampleLoop;
use env_sensor::sensor::Sensor;
use env_sensor::shutdown::ShutdownSignal;
use env_sensor::sink::{Sink, TelemetrySink};
use tracing::{error, info};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let _guard = logging::init(cli.verbose, cli.log_format);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            e.exit_code()
        }
    }
}

async fn run(cli: Cli) -> Result<(), DaemonError> {
    let config = Config::from_env(&cli)?;

    let shutdown = ShutdownSignal::new();
    shutdown.listen()?;

    let sensor = Sensor::from_config(&config.sensor)?;
    let mut sink = Sink::from_config(&config.sink)?;
    if sink.is_enabled() {
        sink.connect().await?;
    }

    let report = SampleLoop::new(sensor, sink, shutdown).run().await;
    info!(
        "Shutdown complete: {} iterations, {} published, {} read failures, {} publish failures, {} reconnects",
        report.iterations,
        report.published,
        report.read_failures,
        report.publish_failures,
        report.reconnect_attempts
    );
    Ok(())
}
