//! Publish interface between the workers and whatever renders the rig.
//!
//! Workers only see [`DisplaySink`]. Two sinks ship with the crate:
//! - [`ChannelSink`]: bounded `mpsc` of [`DisplayEvent`]s with non-blocking
//!   `try_send` and drop-on-full, for a UI thread to drain at its own pace
//! - [`TracingSink`]: renders every event as a tracing event (headless runs)

use crate::device::{DeviceKey, PortLayout};
use crate::series::PlotKind;
use chrono::Local;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Timestamp format used on operator log lines.
pub const TIME_FORMAT: &str = "%Y-%m-%d-%H:%M:%S";

/// Default capacity of a [`ChannelSink`].
pub const DISPLAY_CHANNEL_CAPACITY: usize = 1024;

/// Current local time in [`TIME_FORMAT`].
pub fn timestamp() -> String {
    Local::now().format(TIME_FORMAT).to_string()
}

/// Prefix `message` with the current local time.
pub fn timestamped(message: &str) -> String {
    format!("{} {}", timestamp(), message)
}

/// Status-bar states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RigStatus {
    /// Idle, nothing running
    Ready,
    /// Control loop running
    Running,
    /// Control loop stopped
    Finished,
    /// Transport link open
    Connected,
    /// Transport link closed or failed to open
    Disconnected,
}

impl fmt::Display for RigStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RigStatus::Ready => "Ready",
            RigStatus::Running => "Running",
            RigStatus::Finished => "Finished",
            RigStatus::Connected => "Connected",
            RigStatus::Disconnected => "Disconnected",
        };
        f.write_str(text)
    }
}

/// Everything a renderer can receive.
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum DisplayEvent {
    Sample { key: DeviceKey, value: i32 },
    ActuatorTarget { key: DeviceKey, value: i32 },
    Series { kind: PlotKind, values: Vec<f64> },
    Status(RigStatus),
    LogLine(String),
    Devices(Vec<PortLayout>),
}

/// Narrow publish interface consumed by the workers.
pub trait DisplaySink: Send + Sync {
    /// Newest reading of a sensor.
    fn publish_sample(&self, key: DeviceKey, value: i32);

    /// Value about to be written to an actuator.
    fn publish_actuator_target(&self, key: DeviceKey, value: i32);

    /// Full contents of a plot series, oldest first.
    fn publish_series(&self, kind: PlotKind, values: &[f64]);

    #[allow(missing_docs)]
    fn publish_status(&self, status: RigStatus);

    /// Human-readable, already timestamped line for the log panel.
    fn publish_log_line(&self, line: &str);

    /// Device layout after a discovery.
    fn publish_devices(&self, _layout: &[PortLayout]) {}
}

/// Sink backed by a bounded channel.
#[derive(Debug)]
pub struct ChannelSink {
    tx: mpsc::Sender<DisplayEvent>,
    dropped: AtomicU64,
}

impl ChannelSink {
    /// Create a sink and the receiving end for the renderer.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<DisplayEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                dropped: AtomicU64::new(0),
            },
            rx,
        )
    }

    /// Events discarded because the channel was full or closed.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn send(&self, event: DisplayEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(e)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(event = ?e, "Display channel full, dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

impl DisplaySink for ChannelSink {
    fn publish_sample(&self, key: DeviceKey, value: i32) {
        self.send(DisplayEvent::Sample { key, value });
    }

    fn publish_actuator_target(&self, key: DeviceKey, value: i32) {
        self.send(DisplayEvent::ActuatorTarget { key, value });
    }

    fn publish_series(&self, kind: PlotKind, values: &[f64]) {
        self.send(DisplayEvent::Series {
            kind,
            values: values.to_vec(),
        });
    }

    fn publish_status(&self, status: RigStatus) {
        self.send(DisplayEvent::Status(status));
    }

    fn publish_log_line(&self, line: &str) {
        self.send(DisplayEvent::LogLine(line.to_string()));
    }

    fn publish_devices(&self, layout: &[PortLayout]) {
        self.send(DisplayEvent::Devices(layout.to_vec()));
    }
}

/// Drain every event currently buffered in `rx` (non-blocking).
pub fn drain_events(rx: &mut mpsc::Receiver<DisplayEvent>) -> Vec<DisplayEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Sink that logs instead of rendering.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DisplaySink for TracingSink {
    fn publish_sample(&self, key: DeviceKey, value: i32) {
        debug!(key = %key, value, "sensor");
    }

    fn publish_actuator_target(&self, key: DeviceKey, value: i32) {
        debug!(key = %key, value, "actuator target");
    }

    fn publish_series(&self, kind: PlotKind, values: &[f64]) {
        if let Some(newest) = values.last() {
            info!(plot = %kind, newest, "series updated");
        }
    }

    fn publish_status(&self, status: RigStatus) {
        info!(status = %status, "status");
    }

    fn publish_log_line(&self, line: &str) {
        info!("{}", line);
    }

    fn publish_devices(&self, layout: &[PortLayout]) {
        for port in layout {
            info!(
                node = port.node,
                port = port.port,
                sensors = port.sensors.len(),
                actuators = port.actuators.len(),
                "device layout"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_sink_drops_when_full() {
        let (sink, mut rx) = ChannelSink::new(2);
        sink.publish_status(RigStatus::Connected);
        sink.publish_sample(DeviceKey::new(1, 0, 1), 5);
        sink.publish_log_line("overflow");

        assert_eq!(sink.dropped(), 1);
        let events = drain_events(&mut rx);
        assert_eq!(
            events,
            vec![
                DisplayEvent::Status(RigStatus::Connected),
                DisplayEvent::Sample {
                    key: DeviceKey::new(1, 0, 1),
                    value: 5
                },
            ]
        );
    }

    #[test]
    fn status_strings() {
        assert_eq!(RigStatus::Disconnected.to_string(), "Disconnected");
        assert_eq!(RigStatus::Running.to_string(), "Running");
    }

    #[test]
    fn timestamp_prefix() {
        let line = timestamped("Connected to port COM7");
        assert!(line.ends_with(" Connected to port COM7"));
        // 2024-01-31-12:00:00
        assert_eq!(line.find(' '), Some(19));
    }
}
