use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::signal::unix::{SignalKind, signal};
use tokio::task::JoinHandle;
use tracing::debug;

/// Cooperative stop request shared between the signal handler and the loop.
///
/// Starts out running; once triggered it stays stopping for the rest of the
/// process lifetime.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    stopping: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a stop. Returns `true` only for the call that performed the
    /// transition.
    pub fn trigger(&self) -> bool {
        !self.stopping.swap(true, Ordering::AcqRel)
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }

    /// Triggers the signal on the first SIGINT or SIGTERM.
    pub fn listen(&self) -> std::io::Result<JoinHandle<()>> {
        let mut interrupt = signal(SignalKind::interrupt())?;
        let mut terminate = signal(SignalKind::terminate())?;
        let this = self.clone();

        Ok(tokio::spawn(async move {
            tokio::select! {
                _ = interrupt.recv() => debug!("SIGINT received"),
                _ = terminate.recv() => debug!("SIGTERM received"),
            }
            if this.trigger() {
                debug!("Shutdown");
            }
        }))
    }
}
