use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::time::{Instant, interval_at};
use tracing::{trace, warn};

use crate::sink::ConnectionHealth;
use crate::sink::mqtt::packets;

/// Sends PINGREQ every `period` until a write fails or the sink is marked
/// disconnected. `period` must stay below the keep-alive sent in CONNECT.
pub async fn pinger<W>(writer: Arc<Mutex<W>>, health: ConnectionHealth, period: Duration)
where
    W: AsyncWrite + Unpin,
{
    let pingreq = match packets::build_pingreq_packet() {
        Ok(packet) => packet,
        Err(e) => {
            warn!("Cannot encode PINGREQ: {e}");
            return;
        }
    };

    let mut ticks = interval_at(Instant::now() + period, period);
    loop {
        ticks.tick().await;
        if !health.is_connected() {
            break;
        }

        let mut writer = writer.lock().await;
        let sent = match writer.write_all(&pingreq).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = sent {
            warn!("Keep-alive ping to MQTT broker failed: {e}");
            health.mark_disconnected();
            break;
        }
        trace!("PINGREQ sent");
    }
}
