use std::time::Duration;

use tracing::{debug, error, info};

use crate::sensor::SensorSource;
use crate::shutdown::ShutdownSignal;
use crate::sink::TelemetrySink;

/// Fixed pause between iterations.
pub const TICK: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    Draining,
    Stopped,
}

/// What happened during one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Published,
    /// No sink is configured; the reading was only logged.
    SensorOnly,
    ReadFailed,
    ReconnectFailed,
    PublishFailed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopReport {
    pub iterations: u64,
    pub published: u64,
    pub read_failures: u64,
    pub reconnect_attempts: u64,
    pub reconnect_failures: u64,
    pub publish_failures: u64,
}

/// Periodic read → publish loop over one sensor and one sink.
///
/// Cancellation is cooperative: the shutdown signal is only checked at the
/// top of each iteration, so a stop request waits for the current read,
/// publish and sleep to finish.
pub struct SampleLoop<S, K> {
    sensor: S,
    sink: K,
    shutdown: ShutdownSignal,
    tick: Duration,
    state: LoopState,
    report: LoopReport,
}

impl<S, K> SampleLoop<S, K>
where
    S: SensorSource,
    K: TelemetrySink,
{
    pub fn new(sensor: S, sink: K, shutdown: ShutdownSignal) -> Self {
        Self {
            sensor,
            sink,
            shutdown,
            tick: TICK,
            state: LoopState::Idle,
            report: LoopReport::default(),
        }
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn report(&self) -> LoopReport {
        self.report
    }

    pub fn sensor(&self) -> &S {
        &self.sensor
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// Runs until the shutdown signal is observed, then disconnects the sink.
    pub async fn run(&mut self) -> LoopReport {
        info!("Starting main loop");
        self.state = LoopState::Running;

        while self.state == LoopState::Running {
            if self.shutdown.is_stopping() {
                self.state = LoopState::Draining;
                break;
            }
            self.iterate().await;
            debug!("---");
            tokio::time::sleep(self.tick).await;
        }

        self.drain().await;
        self.report
    }

    /// One read and publish attempt, without the trailing sleep.
    pub async fn iterate(&mut self) -> TickOutcome {
        self.report.iterations += 1;

        debug!("Reading sensor");
        let reading = match self.sensor.read().await {
            Ok(reading) => reading,
            Err(e) => {
                error!("Reading sensor failed: {e}");
                self.report.read_failures += 1;
                return TickOutcome::ReadFailed;
            }
        };
        debug!("{reading}");

        if !self.sink.is_enabled() {
            return TickOutcome::SensorOnly;
        }

        if !self.sink.is_connected() {
            self.report.reconnect_attempts += 1;
            if let Err(e) = self.sink.reconnect().await {
                error!("Reconnecting failed: {e}");
                self.report.reconnect_failures += 1;
                return TickOutcome::ReconnectFailed;
            }
        }

        match self.sink.publish(&reading).await {
            Ok(()) => {
                self.report.published += 1;
                TickOutcome::Published
            }
            Err(e) => {
                error!("Publishing failed: {e}");
                self.report.publish_failures += 1;
                TickOutcome::PublishFailed
            }
        }
    }

    async fn drain(&mut self) {
        self.state = LoopState::Draining;
        if self.sink.is_enabled() {
            debug!("Disconnecting sink");
            if let Err(e) = self.sink.disconnect().await {
                error!("Disconnecting failed: {e}");
            }
        }
        self.state = LoopState::Stopped;
        info!("Main loop stopped after {} iterations", self.report.iterations);
    }
}
