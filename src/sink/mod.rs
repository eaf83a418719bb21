use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::Reading;
use crate::config::SinkConfig;
use crate::error::{ConnectError, PublishError};

pub mod influx;
pub mod mqtt;

use influx::InfluxSink;
use mqtt::MqttSink;

/// Connected/disconnected flag shared between a sink and the background
/// task watching its connection.
#[derive(Debug, Clone, Default)]
pub struct ConnectionHealth {
    connected: Arc<AtomicBool>,
}

impl ConnectionHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn mark_connected(&self) {
        self.connected.store(true, Ordering::Release);
    }

    /// Returns whether the flag was set before.
    pub fn mark_disconnected(&self) -> bool {
        self.connected.swap(false, Ordering::AcqRel)
    }
}

/// Destination for readings.
///
/// Publishing is fire-and-forget: failures are reported to the caller and
/// never retried by the sink itself.
#[allow(async_fn_in_trait)]
pub trait TelemetrySink {
    /// `false` for a sink that was switched off in the configuration.
    fn is_enabled(&self) -> bool {
        true
    }

    fn is_connected(&self) -> bool;

    async fn connect(&mut self) -> Result<(), ConnectError>;

    /// Re-establishes a lost connection, keeping the session identity where
    /// the transport has one.
    async fn reconnect(&mut self) -> Result<(), ConnectError> {
        self.connect().await
    }

    async fn publish(&mut self, reading: &Reading) -> Result<(), PublishError>;

    /// Best effort; disconnecting a disconnected sink is a no-op.
    async fn disconnect(&mut self) -> Result<(), ConnectError>;
}

/// Accepts everything and sends nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl TelemetrySink for NullSink {
    fn is_enabled(&self) -> bool {
        false
    }

    fn is_connected(&self) -> bool {
        true
    }

    async fn connect(&mut self) -> Result<(), ConnectError> {
        Ok(())
    }

    async fn publish(&mut self, _reading: &Reading) -> Result<(), PublishError> {
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), ConnectError> {
        Ok(())
    }
}

/// Every sink the daemon can be configured with.
pub enum Sink {
    Null(NullSink),
    Mqtt(MqttSink),
    Influx(InfluxSink),
}

impl Sink {
    pub fn from_config(config: &SinkConfig) -> Result<Self, ConnectError> {
        Ok(match config {
            SinkConfig::Disabled => Sink::Null(NullSink),
            SinkConfig::Mqtt(config) => Sink::Mqtt(MqttSink::new(config.clone())?),
            SinkConfig::Influx(config) => Sink::Influx(InfluxSink::new(config.clone())?),
        })
    }
}

impl TelemetrySink for Sink {
    fn is_enabled(&self) -> bool {
        match self {
            Sink::Null(sink) => sink.is_enabled(),
            Sink::Mqtt(sink) => sink.is_enabled(),
            Sink::Influx(sink) => sink.is_enabled(),
        }
    }

    fn is_connected(&self) -> bool {
        match self {
            Sink::Null(sink) => sink.is_connected(),
            Sink::Mqtt(sink) => sink.is_connected(),
            Sink::Influx(sink) => sink.is_connected(),
        }
    }

    async fn connect(&mut self) -> Result<(), ConnectError> {
        match self {
            Sink::Null(sink) => sink.connect().await,
            Sink::Mqtt(sink) => sink.connect().await,
            Sink::Influx(sink) => sink.connect().await,
        }
    }

    async fn reconnect(&mut self) -> Result<(), ConnectError> {
        match self {
            Sink::Null(sink) => sink.reconnect().await,
            Sink::Mqtt(sink) => sink.reconnect().await,
            Sink::Influx(sink) => sink.reconnect().await,
        }
    }

    async fn publish(&mut self, reading: &Reading) -> Result<(), PublishError> {
        match self {
            Sink::Null(sink) => sink.publish(reading).await,
            Sink::Mqtt(sink) => sink.publish(reading).await,
            Sink::Influx(sink) => sink.publish(reading).await,
        }
    }

    async fn disconnect(&mut self) -> Result<(), ConnectError> {
        match self {
            Sink::Null(sink) => sink.disconnect().await,
            Sink::Mqtt(sink) => sink.disconnect().await,
            Sink::Influx(sink) => sink.disconnect().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_starts_disconnected() {
        let health = ConnectionHealth::new();
        assert!(!health.is_connected());
        health.mark_connected();
        assert!(health.is_connected());
        assert!(health.mark_disconnected());
        assert!(!health.mark_disconnected());
    }

    #[test]
    fn health_is_shared_between_clones() {
        let health = ConnectionHealth::new();
        let watcher = health.clone();
        health.mark_connected();
        assert!(watcher.is_connected());
        watcher.mark_disconnected();
        assert!(!health.is_connected());
    }

    #[tokio::test]
    async fn null_sink_is_disabled_and_idempotent() {
        let mut sink = Sink::from_config(&SinkConfig::Disabled).unwrap();
        assert!(!sink.is_enabled());
        sink.publish(&Reading::new().with_temperature(1.0))
            .await
            .unwrap();
        sink.disconnect().await.unwrap();
        sink.disconnect().await.unwrap();
    }
}
