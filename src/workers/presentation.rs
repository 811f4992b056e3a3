//! Presentation worker: republishes the newest reading of every sensor.

use super::Pacer;
use crate::context::RigContext;
use crate::display::DisplaySink;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, trace};

/// Peeks at the reading buffers and forwards the newest samples to the sink.
pub struct PresentationWorker {
    ctx: Arc<RigContext>,
    sink: Arc<dyn DisplaySink>,
}

impl PresentationWorker {
    #[allow(missing_docs)]
    pub fn new(ctx: Arc<RigContext>, sink: Arc<dyn DisplaySink>) -> Self {
        Self { ctx, sink }
    }

    /// Publish the newest sample of every sampled sensor. Returns how many
    /// were published. Sensors without samples are skipped.
    pub fn tick(&self) -> usize {
        let latest = self.ctx.readings.latest_all();
        for sample in &latest {
            self.sink.publish_sample(sample.key, sample.value);
        }
        trace!(published = latest.len(), "presentation tick");
        latest.len()
    }

    #[allow(missing_docs)]
    pub async fn run(self, period: Duration, shutdown: watch::Receiver<bool>) {
        info!(period_ms = period.as_millis() as u64, "Presentation worker started");
        let mut pacer = Pacer::new(period, shutdown);
        while pacer.next().await {
            self.tick();
        }
        info!("Presentation worker stopped");
    }
}
