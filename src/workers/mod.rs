//! The three periodic workers and the runtime that wires them together.
//!
//! Every worker runs on its own tokio task and only talks to the others
//! through [`RigContext`]:
//!
//! - [`AcquisitionWorker`]: owns the transport link, drains the command queue
//!   and polls sensors every `acquisition_period_ms`
//! - [`PresentationWorker`]: republishes the newest samples every
//!   `presentation_period_ms`
//! - [`ControlWorker`]: waits for a device list, then runs the learner loop
//!   every `cycle_time`
//!
//! Shutdown is a `watch<bool>` flipped once by [`RigRuntime::shutdown`]; each
//! worker observes it at its next tick boundary.

pub mod acquisition;
pub mod control;
pub mod presentation;

pub use acquisition::{AcquisitionWorker, ConnectionRequest, ConnectionState, TickReport};
pub use control::{normalize, ControlLoop, ControlWorker, StepReport, ADC_FULL_SCALE};
pub use presentation::PresentationWorker;

use crate::config::RigConfig;
use crate::context::RigContext;
use crate::device::DeviceKey;
use crate::display::{DisplaySink, RigStatus};
use crate::error::AppResult;
use crate::learner::LearnerFactory;
use crate::transport::DeviceTransport;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{info, info_span, Instrument};

/// Fixed-rate ticker that also watches the shutdown flag.
///
/// The first tick fires one period after creation. Missed ticks are delayed
/// rather than bursted, so a slow transport call stretches the cadence
/// instead of queuing catch-up iterations.
pub(crate) struct Pacer {
    ticker: Interval,
    shutdown: watch::Receiver<bool>,
}

impl Pacer {
    pub(crate) fn new(period: Duration, shutdown: watch::Receiver<bool>) -> Self {
        let period = period.max(Duration::from_millis(1));
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { ticker, shutdown }
    }

    /// Wait for the next tick. `false` once shutdown was requested or the
    /// runtime handle is gone.
    pub(crate) async fn next(&mut self) -> bool {
        if *self.shutdown.borrow() {
            return false;
        }
        tokio::select! {
            _ = self.ticker.tick() => !*self.shutdown.borrow(),
            changed = self.shutdown.changed() => match changed {
                Ok(()) => !*self.shutdown.borrow(),
                Err(_) => false,
            },
        }
    }
}

/// Running rig: shared context, operator controls and worker handles.
pub struct RigRuntime {
    ctx: Arc<RigContext>,
    sink: Arc<dyn DisplaySink>,
    requests: watch::Sender<Option<ConnectionRequest>>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl RigRuntime {
    /// Start the three workers on the current tokio runtime.
    ///
    /// Nothing connects until [`connect`](Self::connect) is called.
    pub fn spawn(
        config: &RigConfig,
        transport: Arc<dyn DeviceTransport>,
        factory: LearnerFactory,
        sink: Arc<dyn DisplaySink>,
    ) -> Self {
        let ctx = RigContext::shared();
        let (requests, requests_rx) = watch::channel(None);
        let (shutdown, shutdown_rx) = watch::channel(false);

        let acquisition = AcquisitionWorker::new(
            ctx.clone(),
            transport,
            config.connection.clone(),
            sink.clone(),
        );
        let presentation = PresentationWorker::new(ctx.clone(), sink.clone());
        let control = ControlWorker::new(
            ctx.clone(),
            sink.clone(),
            factory,
            config.learner.clone(),
            config.plots.enabled.clone(),
            config.timing.registry_poll(),
        );

        let timing = &config.timing;
        let tasks = vec![
            (
                "acquisition",
                tokio::spawn(
                    acquisition
                        .run(timing.acquisition_period(), requests_rx, shutdown_rx.clone())
                        .instrument(info_span!("acquisition")),
                ),
            ),
            (
                "presentation",
                tokio::spawn(
                    presentation
                        .run(timing.presentation_period(), shutdown_rx.clone())
                        .instrument(info_span!("presentation")),
                ),
            ),
            (
                "control",
                tokio::spawn(
                    control
                        .run(shutdown_rx)
                        .instrument(info_span!("control")),
                ),
            ),
        ];

        sink.publish_status(RigStatus::Ready);
        info!(port = %config.connection.com_port, "Rig runtime started");

        Self {
            ctx,
            sink,
            requests,
            shutdown,
            tasks,
        }
    }

    /// Shared state, for inspection and operator overrides.
    pub fn context(&self) -> &Arc<RigContext> {
        &self.ctx
    }

    /// Ask the acquisition worker to open (or reopen) the link.
    pub fn connect(&self) {
        self.requests.send_replace(Some(ConnectionRequest::Connect));
    }

    /// Ask the acquisition worker to close the link.
    pub fn disconnect(&self) {
        self.requests.send_replace(Some(ConnectionRequest::Disconnect));
    }

    /// Exclude an actuator from (or return it to) command dispatch. Takes
    /// effect on the next control iteration.
    pub fn set_inactive(&self, key: DeviceKey, inactive: bool) {
        self.ctx.inactive.set(key, inactive);
        info!(key = %key, inactive, "Actuator override");
    }

    /// Signal every worker and wait for them to finish.
    ///
    /// Returns the first task failure, after all tasks were joined.
    pub async fn shutdown(self) -> AppResult<()> {
        info!("Shutting down rig runtime");
        self.shutdown.send_replace(true);

        let mut first_error = None;
        for (name, task) in self.tasks {
            if let Err(e) = task.await {
                tracing::error!(worker = name, error = %e, "Worker task failed");
                first_error.get_or_insert(e);
            }
        }
        self.sink.publish_status(RigStatus::Ready);

        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn pacer_ticks_until_shutdown() {
        let (tx, rx) = watch::channel(false);
        let mut pacer = Pacer::new(Duration::from_millis(10), rx);
        assert!(pacer.next().await);
        assert!(pacer.next().await);
        tx.send_replace(true);
        assert!(!pacer.next().await);
    }

    #[tokio::test(start_paused = true)]
    async fn pacer_stops_when_sender_dropped() {
        let (tx, rx) = watch::channel(false);
        let mut pacer = Pacer::new(Duration::from_secs(3600), rx);
        drop(tx);
        assert!(!pacer.next().await);
    }
}
