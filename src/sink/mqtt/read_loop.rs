use mqttrs::{Packet, decode_slice};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, trace, warn};

use crate::sink::ConnectionHealth;

#[derive(Debug, PartialEq, Eq)]
pub enum ReadLoopResult {
    Pong,
    Disconnect,
    Skipped,
    Unknown,
}

/// Classifies whatever the broker sent us. A publishing-only client only
/// cares about the broker ending the session.
pub fn handle_packet(packet: &[u8]) -> ReadLoopResult {
    match packet.first() {
        Some(&first_byte) if is_mqtt_packet(first_byte) => match decode_slice(packet) {
            Ok(Some(Packet::Pingresp)) => ReadLoopResult::Pong,
            Ok(Some(Packet::Disconnect)) => ReadLoopResult::Disconnect,
            Ok(Some(other)) => {
                debug!("Ignoring packet from broker: {other:?}");
                ReadLoopResult::Skipped
            }
            Ok(None) => ReadLoopResult::Skipped,
            Err(e) => {
                debug!("Undecodable packet from broker: {e}");
                ReadLoopResult::Unknown
            }
        },
        _ => ReadLoopResult::Unknown,
    }
}

fn is_mqtt_packet(first_byte: u8) -> bool {
    let packet_type = first_byte >> 4;
    (1..=14).contains(&packet_type)
}

/// Drains the broker side of the connection until it goes away, then flags
/// the sink as disconnected.
pub async fn watch<R>(mut reader: R, health: ConnectionHealth)
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; 1024];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                warn!("EOF from MQTT broker");
                break;
            }
            Ok(n) => {
                let result = handle_packet(&buf[..n]);
                trace!("Broker packet: {result:?}");
                if result == ReadLoopResult::Disconnect {
                    warn!("MQTT broker closed the session");
                    break;
                }
            }
            Err(e) => {
                warn!("Lost connection to MQTT broker: {e}");
                break;
            }
        }
    }
    health.mark_disconnected();
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncWriteExt;

    use super::*;

    #[test]
    fn recognises_broker_packets() {
        assert_eq!(handle_packet(&[0xD0, 0x00]), ReadLoopResult::Pong);
        assert_eq!(handle_packet(&[0xE0, 0x00]), ReadLoopResult::Disconnect);
        assert_eq!(
            handle_packet(&[0x20, 0x02, 0x00, 0x00]),
            ReadLoopResult::Skipped
        );
        assert_eq!(handle_packet(&[0x00, 0x00]), ReadLoopResult::Unknown);
        assert_eq!(handle_packet(&[]), ReadLoopResult::Unknown);
    }

    #[tokio::test]
    async fn eof_marks_sink_disconnected() {
        let (client, mut broker) = tokio::io::duplex(64);
        let health = ConnectionHealth::new();
        health.mark_connected();

        let task = tokio::spawn(watch(client, health.clone()));
        broker.write_all(&[0xD0, 0x00]).await.unwrap();
        tokio::task::yield_now().await;
        assert!(health.is_connected());

        drop(broker);
        task.await.unwrap();
        assert!(!health.is_connected());
    }

    #[tokio::test]
    async fn broker_disconnect_marks_sink_disconnected() {
        let (client, mut broker) = tokio::io::duplex(64);
        let health = ConnectionHealth::new();
        health.mark_connected();

        let task = tokio::spawn(watch(client, health.clone()));
        broker.write_all(&[0xE0, 0x00]).await.unwrap();
        task.await.unwrap();
        assert!(!health.is_connected());
    }
}
