//! Acquisition worker: owns the transport link and the polling loop.
//!
//! State machine: `Disconnected -> Connecting -> Connected -> Disconnected`,
//! driven by operator requests. A failed open leaves the worker
//! `Disconnected` with no automatic retry. A disconnect closes the link but
//! keeps it, so the next connect request reopens the same handle.
//!
//! Each tick, in order:
//! 1. drain the command queue and write every command (at most once; failed
//!    writes are logged and lost)
//! 2. read every sensor and append successful readings to its buffer (failed
//!    reads are skipped; the previous value stays visible downstream)

use super::Pacer;
use crate::config::ConnectionConfig;
use crate::context::RigContext;
use crate::device::Device;
use crate::display::{timestamp, timestamped, DisplaySink, RigStatus};
use crate::error::{AppResult, RigError};
use crate::transport::{DeviceTransport, TransportLink};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};

/// Flag passed on every transport call.
const TRANSPORT_FLAG: u8 = 0;

fn into_discovery(err: RigError) -> RigError {
    match err {
        RigError::Discovery(_) => err,
        other => RigError::Discovery(other.to_string()),
    }
}

/// Link state as seen by the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No open link
    Disconnected,
    /// Open in progress
    Connecting,
    /// Link open
    Connected,
}

/// Operator request, published through a `watch` channel and picked up on the
/// next tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionRequest {
    #[allow(missing_docs)]
    Connect,
    #[allow(missing_docs)]
    Disconnect,
}

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Commands written successfully
    pub written: usize,
    /// Commands whose write failed
    pub failed_writes: usize,
    /// Commands discarded because no link was open
    pub discarded: usize,
    /// Sensor readings appended
    pub sampled: usize,
    /// Sensor reads that failed
    pub failed_reads: usize,
}

/// Sole writer of the reading buffers and sole consumer of the command queue.
pub struct AcquisitionWorker {
    ctx: Arc<RigContext>,
    transport: Arc<dyn DeviceTransport>,
    connection: ConnectionConfig,
    sink: Arc<dyn DisplaySink>,
    link: Option<Box<dyn TransportLink>>,
    state: ConnectionState,
}

impl AcquisitionWorker {
    #[allow(missing_docs)]
    pub fn new(
        ctx: Arc<RigContext>,
        transport: Arc<dyn DeviceTransport>,
        connection: ConnectionConfig,
        sink: Arc<dyn DisplaySink>,
    ) -> Self {
        Self {
            ctx,
            transport,
            connection,
            sink,
            link: None,
            state: ConnectionState::Disconnected,
        }
    }

    #[allow(missing_docs)]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether a link handle exists (open or closed).
    pub fn has_link(&self) -> bool {
        self.link.is_some()
    }

    fn link_open(&self) -> bool {
        self.link.as_ref().is_some_and(|link| link.is_open())
    }

    fn report(&self, status: RigStatus, message: &str) {
        self.sink.publish_status(status);
        self.sink.publish_log_line(&timestamped(message));
    }

    fn report_open_failure(&mut self, err: &RigError) {
        self.state = ConnectionState::Disconnected;
        let reason = match err {
            RigError::Connection { reason, .. } => reason.clone(),
            other => other.to_string(),
        };
        warn!(port = %self.connection.com_port, error = %err, "Failed to open port");
        let stamp = timestamp();
        let line = format!(
            "{stamp} Failed to open port {}\n{} {reason}",
            self.connection.com_port,
            " ".repeat(stamp.len())
        );
        self.sink.publish_status(RigStatus::Disconnected);
        self.sink.publish_log_line(&line);
    }

    /// Apply an operator request.
    pub async fn handle_request(&mut self, request: ConnectionRequest) {
        match request {
            ConnectionRequest::Connect => self.connect().await,
            ConnectionRequest::Disconnect => self.disconnect().await,
        }
    }

    /// Open (or reopen) the link, then discover devices.
    pub async fn connect(&mut self) {
        let port = self.connection.com_port.clone();
        info!(port = %port, "Connecting");

        let opened = match self.link.as_mut() {
            None => {
                self.state = ConnectionState::Connecting;
                match self.transport.open(&port).await {
                    Ok(link) => {
                        self.link = Some(link);
                        Ok(format!("Connected to port {port}"))
                    }
                    Err(e) => Err(e),
                }
            }
            Some(link) if !link.is_open() => {
                self.state = ConnectionState::Connecting;
                link.reopen().await.map(|()| format!("Reopened port {port}"))
            }
            Some(_) => {
                debug!(port = %port, "Link already open");
                return;
            }
        };

        match opened {
            Ok(message) => {
                self.state = ConnectionState::Connected;
                info!(port = %port, "{}", message);
                self.report(RigStatus::Connected, &message);
                self.discover().await;
            }
            Err(e) => self.report_open_failure(&e),
        }
    }

    /// Close the link if open. The handle is kept for a later reopen.
    pub async fn disconnect(&mut self) {
        let Some(link) = self.link.as_mut() else {
            return;
        };
        if !link.is_open() {
            return;
        }
        link.close().await;
        self.state = ConnectionState::Disconnected;
        let message = format!("Disconnected from port {}", self.connection.com_port);
        info!("{}", message);
        self.report(RigStatus::Disconnected, &message);
    }

    async fn query_devices(&mut self) -> AppResult<Vec<Device>> {
        let (dst, src) = (self.connection.serial_number, self.connection.com_serial);
        let link = self.link.as_mut().ok_or(RigError::LinkClosed)?;
        let count = link
            .query_device_count(dst, src)
            .await
            .map_err(into_discovery)?;
        let devices = link
            .query_device_ids(dst, src)
            .await
            .map_err(into_discovery)?;
        if count != devices.len() {
            warn!(
                reported = count,
                listed = devices.len(),
                "Device count disagrees with id list"
            );
        }
        Ok(devices)
    }

    /// Enumerate peripherals and install them in the registry.
    ///
    /// On failure the link is closed; the operator has to reconnect.
    async fn discover(&mut self) {
        match self.query_devices().await {
            Ok(devices) => {
                let list = self.ctx.install_devices(devices);
                let layout = self.ctx.registry.layout();
                info!(
                    sensors = list.sensors().len(),
                    actuators = list.actuators().len(),
                    "Devices discovered"
                );
                self.sink.publish_devices(&layout);
            }
            Err(e) => {
                error!(error = %e, "Device discovery failed, closing link");
                self.sink.publish_log_line(&timestamped(&e.to_string()));
                if let Some(link) = self.link.as_mut() {
                    link.close().await;
                }
                self.state = ConnectionState::Disconnected;
                self.sink.publish_status(RigStatus::Disconnected);
            }
        }
    }

    /// One acquisition tick: drain commands, then poll sensors.
    pub async fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();
        if self.state == ConnectionState::Connected && !self.link_open() {
            warn!("Link closed underneath the worker");
            self.state = ConnectionState::Disconnected;
            self.sink.publish_status(RigStatus::Disconnected);
        }

        self.dispatch_commands(&mut report).await;
        self.poll_sensors(&mut report).await;

        trace!(?report, "acquisition tick");
        report
    }

    async fn dispatch_commands(&mut self, report: &mut TickReport) {
        let commands = self.ctx.commands.drain();
        if commands.is_empty() {
            return;
        }
        let (dst, src) = (self.connection.serial_number, self.connection.com_serial);
        let link = match self.link.as_mut() {
            Some(link) if link.is_open() => link,
            _ => {
                debug!(count = commands.len(), "No open link, discarding commands");
                report.discarded = commands.len();
                return;
            }
        };

        for command in commands {
            match link
                .write(dst, src, command.key, command.value, TRANSPORT_FLAG)
                .await
            {
                Ok(()) => {
                    trace!(key = %command.key, value = command.value, "fade");
                    report.written += 1;
                }
                Err(e) if e.is_recoverable() => {
                    warn!(key = %command.key, value = command.value, error = %e, "Actuator write failed, command dropped");
                    report.failed_writes += 1;
                }
                Err(e) => {
                    error!(key = %command.key, error = %e, "Actuator write failed, link unusable");
                    report.failed_writes += 1;
                }
            }
        }
    }

    async fn poll_sensors(&mut self, report: &mut TickReport) {
        let Some(devices) = self.ctx.registry.snapshot() else {
            return;
        };
        let (dst, src) = (self.connection.serial_number, self.connection.com_serial);
        let link = match self.link.as_mut() {
            Some(link) if link.is_open() => link,
            _ => return,
        };

        for sensor in devices.sensors() {
            match link.read(dst, src, sensor.key(), TRANSPORT_FLAG).await {
                Ok(value) => match self.ctx.readings.append(sensor, value) {
                    Ok(sample) => {
                        trace!(key = %sensor.key(), value, arrival = sample.arrival, "sample");
                        report.sampled += 1;
                    }
                    Err(e) => warn!(error = %e, "Reading rejected"),
                },
                Err(e) if e.is_recoverable() => {
                    debug!(key = %sensor.key(), error = %e, "Sensor read failed, skipping");
                    report.failed_reads += 1;
                }
                Err(e) => {
                    warn!(key = %sensor.key(), error = %e, "Sensor read failed");
                    report.failed_reads += 1;
                }
            }
        }
    }

    /// Poll loop. Requests are level-triggered: the newest request is applied
    /// at the start of the next tick. Closes the link on shutdown.
    pub async fn run(
        mut self,
        period: Duration,
        mut requests: watch::Receiver<Option<ConnectionRequest>>,
        shutdown: watch::Receiver<bool>,
    ) {
        info!(period_ms = period.as_millis() as u64, "Acquisition worker started");
        let mut pacer = Pacer::new(period, shutdown);

        while pacer.next().await {
            if requests.has_changed().unwrap_or(false) {
                let request = *requests.borrow_and_update();
                if let Some(request) = request {
                    self.handle_request(request).await;
                }
            }
            self.tick().await;
        }

        self.disconnect().await;
        info!("Acquisition worker stopped");
    }
}
