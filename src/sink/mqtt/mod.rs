use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt, WriteHalf};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tracing::{debug, info};

use crate::Reading;
use crate::cli::MqttLayout;
use crate::config::MqttConfig;
use crate::error::{ConnectError, PublishError};
use crate::sink::{ConnectionHealth, TelemetrySink};

use transport::BoxedStream;

pub mod keep_alive;
pub mod packets;
pub mod read_loop;
pub mod transport;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const CONNACK_TIMEOUT: Duration = Duration::from_secs(5);

/// A single broker publish.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Shapes a reading into the publishes for the configured layout.
pub fn messages(
    layout: MqttLayout,
    topic: &str,
    reading: &Reading,
) -> Result<Vec<Message>, serde_json::Error> {
    Ok(match layout {
        MqttLayout::Json => vec![Message {
            topic: topic.to_string(),
            payload: reading.to_json()?.into_bytes(),
        }],
        MqttLayout::Split => reading
            .quantities()
            .map(|(quantity, value)| Message {
                topic: format!("{topic}/{quantity}"),
                // Same rendering as the JSON payload, so 24.0 stays "24.0".
                payload: format!("{value:?}").into_bytes(),
            })
            .collect(),
    })
}

/// Publishes readings to an MQTT 3.1.1 broker at QoS 0.
///
/// The broker side of the socket is drained by a background task which
/// flips the shared [`ConnectionHealth`] once the broker goes away. A second
/// task pings the broker at half the announced keep-alive.
pub struct MqttSink {
    config: MqttConfig,
    tls: Option<TlsConnector>,
    health: ConnectionHealth,
    keep_alive_secs: u16,
    writer: Option<Arc<Mutex<WriteHalf<BoxedStream>>>>,
    read_task: Option<JoinHandle<()>>,
    ping_task: Option<JoinHandle<()>>,
}

impl MqttSink {
    pub fn new(config: MqttConfig) -> Result<Self, ConnectError> {
        let tls = match &config.ca_file {
            Some(ca_file) => Some(transport::tls_connector(ca_file)?),
            None => None,
        };
        Ok(Self {
            config,
            tls,
            health: ConnectionHealth::new(),
            keep_alive_secs: packets::KEEP_ALIVE_SECS,
            writer: None,
            read_task: None,
            ping_task: None,
        })
    }

    /// Overrides the keep-alive announced to the broker. Zero turns pings off.
    pub fn with_keep_alive(mut self, secs: u16) -> Self {
        self.keep_alive_secs = secs;
        self
    }

    fn abort_tasks(&mut self) {
        for task in [self.read_task.take(), self.ping_task.take()]
            .into_iter()
            .flatten()
        {
            task.abort();
        }
    }

    fn teardown(&mut self) {
        self.abort_tasks();
        self.writer = None;
        self.health.mark_disconnected();
    }

    async fn open_session(&self) -> Result<BoxedStream, ConnectError> {
        let mut stream = timeout(
            CONNECT_TIMEOUT,
            transport::open(&self.config.host, self.config.port, self.tls.as_ref()),
        )
        .await
        .map_err(|_| ConnectError::Timeout)??;

        let connect_packet = packets::build_connect_packet(
            &self.config.client_id,
            &self.config.user,
            &self.config.password,
            self.keep_alive_secs,
        )?;
        stream.write_all(&connect_packet).await?;
        debug!("Connect sent - awaiting ack");

        // CONNACK is 2-byte fixed header + 2-byte variable header
        let mut connack = [0u8; 4];
        timeout(CONNACK_TIMEOUT, stream.read_exact(&mut connack))
            .await
            .map_err(|_| ConnectError::Timeout)??;
        packets::parse_connack(&connack)?;
        Ok(stream)
    }
}

impl TelemetrySink for MqttSink {
    fn is_connected(&self) -> bool {
        self.health.is_connected()
    }

    async fn connect(&mut self) -> Result<(), ConnectError> {
        self.teardown();
        debug!(
            "Connect to MQTT server {}:{} as {}",
            self.config.host, self.config.port, self.config.client_id
        );

        let stream = self.open_session().await?;
        let (reader, writer) = tokio::io::split(stream);
        let writer = Arc::new(Mutex::new(writer));
        self.health.mark_connected();
        self.read_task = Some(tokio::spawn(read_loop::watch(
            reader,
            self.health.clone(),
        )));
        if self.keep_alive_secs > 0 {
            let period = Duration::from_secs(u64::from(self.keep_alive_secs)) / 2;
            self.ping_task = Some(tokio::spawn(keep_alive::pinger(
                writer.clone(),
                self.health.clone(),
                period,
            )));
        }
        self.writer = Some(writer);

        info!(
            "Connected to MQTT server {}:{}",
            self.config.host, self.config.port
        );
        Ok(())
    }

    async fn reconnect(&mut self) -> Result<(), ConnectError> {
        info!("Reconnecting to MQTT server");
        self.connect().await
    }

    async fn publish(&mut self, reading: &Reading) -> Result<(), PublishError> {
        let writer = match &self.writer {
            Some(writer) if self.health.is_connected() => writer.clone(),
            _ => return Err(PublishError::NotConnected),
        };
        let mut writer = writer.lock().await;

        for message in messages(self.config.layout, &self.config.topic, reading)? {
            let packet = packets::build_publish_packet(&message.topic, &message.payload)?;
            if let Err(e) = writer.write_all(&packet).await {
                self.health.mark_disconnected();
                return Err(e.into());
            }
            debug!(
                "Published {} bytes to {}",
                message.payload.len(),
                message.topic
            );
        }
        if let Err(e) = writer.flush().await {
            self.health.mark_disconnected();
            return Err(e.into());
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), ConnectError> {
        let was_connected = self.health.is_connected();
        let writer = self.writer.take();
        self.teardown();

        let Some(writer) = writer else {
            return Ok(());
        };
        if !was_connected {
            return Ok(());
        }

        debug!("Disconnecting from MQTT");
        let mut writer = writer.lock().await;
        writer
            .write_all(&packets::build_disconnect_packet()?)
            .await?;
        writer.shutdown().await?;
        Ok(())
    }
}

impl Drop for MqttSink {
    fn drop(&mut self) {
        self.abort_tasks();
    }
}
