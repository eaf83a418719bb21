use std::process::ExitCode;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("You must specify the {0} environment variable")]
    Missing(&'static str),
    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, thiserror::Error)]
pub enum SensorReadError {
    #[error("Bus error: {0}")]
    Bus(String),
    #[error("Sensor did not answer in time")]
    Timeout,
    #[error("Checksum mismatch")]
    Checksum,
    #[error("Failed to read sensor after {0} attempts")]
    Exhausted(u32),
    #[error("Malformed sensor data: {0}")]
    Malformed(String),
    #[error("Sensor I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Sensor task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("Sensor driver is unavailable")]
    Unavailable,
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("Error communicating with the server: {0}")]
    Network(#[from] std::io::Error),
    #[error("Error encoding packet: {0}")]
    Mqtt(#[from] mqttrs::Error),
    #[error("Connection refused by broker: {0}")]
    Refused(String),
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Connection timeout")]
    Timeout,
    #[error("TLS setup failed: {0}")]
    Tls(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Server answered with status {0}")]
    Status(u16),
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Sink is not connected")]
    NotConnected,
    #[error("Error communicating with the server: {0}")]
    Network(#[from] std::io::Error),
    #[error("Error encoding packet: {0}")]
    Mqtt(#[from] mqttrs::Error),
    #[error("Failed to serialize reading: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Write rejected with status {0}")]
    Rejected(u16),
}

/// Fatal startup failures. Everything after the loop starts is recoverable.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Failed to initialize sensor: {0}")]
    Sensor(#[from] SensorReadError),
    #[error("Failed to connect to sink: {0}")]
    Connect(#[from] ConnectError),
    #[error("Failed to install signal handlers: {0}")]
    Signal(#[from] std::io::Error),
}

impl DaemonError {
    pub fn status(&self) -> u8 {
        match self {
            DaemonError::Config(_) | DaemonError::Sensor(_) | DaemonError::Signal(_) => 1,
            DaemonError::Connect(_) => 2,
        }
    }

    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_configuration_exits_with_one() {
        let err = DaemonError::from(ConfigError::Missing("INFLUX_DB"));
        assert_eq!(err.status(), 1);
        assert_eq!(
            err.to_string(),
            "You must specify the INFLUX_DB environment variable"
        );
    }

    #[test]
    fn startup_connection_failure_exits_with_two() {
        let err = DaemonError::from(ConnectError::Timeout);
        assert_eq!(err.status(), 2);
    }
}
