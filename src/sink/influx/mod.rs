use std::time::Duration;

use tracing::{debug, info};

use crate::Reading;
use crate::config::InfluxConfig;
use crate::error::{ConnectError, PublishError};
use crate::sink::{ConnectionHealth, TelemetrySink};

pub mod point;

use point::Point;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Writes readings to an InfluxDB 1.x database over its HTTP API.
///
/// HTTP is stateless, so "connected" means the last ping or write reached
/// the server.
pub struct InfluxSink {
    config: InfluxConfig,
    client: reqwest::Client,
    base_url: String,
    health: ConnectionHealth,
}

impl InfluxSink {
    pub fn new(config: InfluxConfig) -> Result<Self, ConnectError> {
        let client = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        let base_url = format!("http://{}:{}", config.host, config.port);
        Ok(Self {
            config,
            client,
            base_url,
            health: ConnectionHealth::new(),
        })
    }

    pub fn points(&self, reading: &Reading) -> Vec<Point> {
        point::points(reading, &self.config.room, self.config.sensor.as_deref())
    }
}

impl TelemetrySink for InfluxSink {
    fn is_connected(&self) -> bool {
        self.health.is_connected()
    }

    async fn connect(&mut self) -> Result<(), ConnectError> {
        debug!("Connect to InfluxDB at {}", self.base_url);
        let response = self
            .client
            .get(format!("{}/ping", self.base_url))
            .send()
            .await
            .inspect_err(|_| {
                self.health.mark_disconnected();
            })?;

        let status = response.status();
        if !status.is_success() {
            self.health.mark_disconnected();
            return Err(ConnectError::Status(status.as_u16()));
        }

        self.health.mark_connected();
        info!("Connected to InfluxDB at {}", self.base_url);
        Ok(())
    }

    async fn reconnect(&mut self) -> Result<(), ConnectError> {
        info!("Reconnecting to InfluxDB");
        self.connect().await
    }

    async fn publish(&mut self, reading: &Reading) -> Result<(), PublishError> {
        if !self.health.is_connected() {
            return Err(PublishError::NotConnected);
        }

        let points = self.points(reading);
        debug!("Writing points: {}", serde_json::to_string(&points)?);
        let body = points
            .iter()
            .map(Point::to_line)
            .collect::<Vec<_>>()
            .join("\n");

        let response = self
            .client
            .post(format!("{}/write", self.base_url))
            .query(&[
                ("db", self.config.database.as_str()),
                ("precision", "ms"),
            ])
            .basic_auth(&self.config.user, Some(&self.config.password))
            .body(body)
            .send()
            .await
            .inspect_err(|_| {
                self.health.mark_disconnected();
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PublishError::Rejected(status.as_u16()));
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), ConnectError> {
        if self.health.mark_disconnected() {
            debug!("Disconnecting from InfluxDB");
        }
        Ok(())
    }
}
