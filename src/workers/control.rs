//! Control worker: the decision loop around the external learner.
//!
//! Waits for a device list, builds the learner, then every `cycle_time`:
//! 1. (from the second iteration on) queues the previously selected action
//!    for every active actuator and publishes it as the actuator target
//! 2. reads the newest sample of every sensor; a sensor without new data
//!    keeps its previous value
//! 3. normalizes sensor values against the 10-bit ADC full scale
//! 4. `learn`, then `select_action`
//! 5. appends expert count, error and max action value to their plot series
//!    and publishes the enabled ones
//!
//! The cadence never waits on sensor data: missing readings only make the
//! learner see stale values.
//!
//! When a rediscovery installs a different device list, the worker rebuilds
//! the loop and its learner, since the learner's tuples are positional.
//! Until then, commands for keys no longer in the registry are dropped.

use super::Pacer;
use crate::config::LearnerConfig;
use crate::context::RigContext;
use crate::device::Device;
use crate::display::{DisplaySink, RigStatus};
use crate::learner::{Learner, LearnerFactory};
use crate::registry::DeviceList;
use crate::series::{MetricSeries, PlotKind};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Full-scale value of the sensor ADC. Uniform across device types for now.
pub const ADC_FULL_SCALE: f64 = 1023.0;

/// Scale a raw reading to `[0, 1]`.
pub fn normalize(raw: i32) -> f64 {
    f64::from(raw) / ADC_FULL_SCALE
}

/// What one control iteration did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepReport {
    /// Iteration number this report belongs to (0-based)
    pub iteration: u64,
    /// Commands queued this iteration
    pub commands: usize,
    /// Sensors that had a sample this iteration
    pub fresh_sensors: usize,
    /// Action selected for the next iteration
    pub action: Vec<f64>,
}

/// State of the decision loop once devices are known.
pub struct ControlLoop {
    devices: Arc<DeviceList>,
    sensors: Vec<Device>,
    actuators: Vec<Device>,
    raw_sensors: Vec<i32>,
    actuator_values: Vec<f64>,
    learner: Box<dyn Learner>,
    iteration: u64,
    expert_series: MetricSeries,
    error_series: MetricSeries,
    action_series: MetricSeries,
    plots: Vec<PlotKind>,
    dimension_warned: bool,
}

impl ControlLoop {
    /// Build the learner with zero-initialized dimension tuples.
    pub fn new(
        devices: &Arc<DeviceList>,
        factory: &LearnerFactory,
        config: &LearnerConfig,
        plots: &[PlotKind],
    ) -> Self {
        let sensors = devices.sensors().to_vec();
        let actuators = devices.actuators().to_vec();
        let sensor_dims = vec![0; sensors.len()];
        let actuator_dims = vec![0; actuators.len()];
        let learner = factory(&sensor_dims, &actuator_dims, config);

        Self {
            devices: devices.clone(),
            raw_sensors: sensor_dims,
            actuator_values: vec![0.0; actuators.len()],
            sensors,
            actuators,
            learner,
            iteration: 0,
            expert_series: MetricSeries::for_plot(PlotKind::ExpertNumber),
            error_series: MetricSeries::for_plot(PlotKind::PredictionError),
            action_series: MetricSeries::for_plot(PlotKind::MaxActionValue),
            plots: plots.to_vec(),
            dimension_warned: false,
        }
    }

    /// Whether this loop was built for `current`.
    pub fn built_for(&self, current: &Arc<DeviceList>) -> bool {
        Arc::ptr_eq(&self.devices, current) || self.devices.all() == current.all()
    }

    /// Iterations completed so far.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// Current sensor vector as fed to the learner.
    pub fn normalized_sensors(&self) -> Vec<f64> {
        self.raw_sensors.iter().copied().map(normalize).collect()
    }

    /// Action selected by the last iteration.
    pub fn actuator_values(&self) -> &[f64] {
        &self.actuator_values
    }

    #[allow(missing_docs)]
    pub fn series(&self, kind: PlotKind) -> &MetricSeries {
        match kind {
            PlotKind::ExpertNumber => &self.expert_series,
            PlotKind::PredictionError => &self.error_series,
            PlotKind::MaxActionValue => &self.action_series,
        }
    }

    /// Run one iteration against the shared context.
    pub fn step(&mut self, ctx: &RigContext, sink: &dyn DisplaySink) -> StepReport {
        let mut report = StepReport {
            iteration: self.iteration,
            ..Default::default()
        };

        if self.iteration > 0 {
            report.commands = self.emit_commands(ctx, sink);
        }

        for (sensor, raw) in self.sensors.iter().zip(self.raw_sensors.iter_mut()) {
            if let Some(sample) = ctx.readings.latest(sensor.key()) {
                *raw = sample.value;
                report.fresh_sensors += 1;
            }
        }

        let normalized = self.normalized_sensors();
        self.learner.learn(&normalized, &self.actuator_values);
        self.actuator_values = self.learner.select_action();
        if self.actuator_values.len() != self.actuators.len() && !self.dimension_warned {
            self.dimension_warned = true;
            warn!(
                expected = self.actuators.len(),
                got = self.actuator_values.len(),
                "Learner action has the wrong dimension"
            );
        }
        report.action = self.actuator_values.clone();

        self.record_metrics(sink);

        debug!(
            iteration = self.iteration,
            commands = report.commands,
            fresh = report.fresh_sensors,
            "control step"
        );
        self.iteration += 1;
        report
    }

    fn emit_commands(&self, ctx: &RigContext, sink: &dyn DisplaySink) -> usize {
        let mut queued = 0;
        for (i, actuator) in self.actuators.iter().enumerate() {
            let key = actuator.key();
            if ctx.inactive.contains(key) {
                continue;
            }
            if !ctx.registry.contains(key) {
                debug!(key = %key, "Actuator no longer registered, skipping");
                continue;
            }
            let value = self.actuator_values.get(i).copied().unwrap_or(0.0) as i32;
            sink.publish_actuator_target(key, value);
            match ctx.commands.enqueue(actuator, value) {
                Ok(()) => {
                    debug!(actuator = i, key = %key, value, "Command actuator");
                    queued += 1;
                }
                Err(e) => warn!(error = %e, "Command rejected"),
            }
        }
        queued
    }

    fn record_metrics(&mut self, sink: &dyn DisplaySink) {
        self.expert_series.push(self.learner.num_experts() as f64);
        if let Some(error) = self.learner.rewards_history() {
            self.error_series.push(error);
        }
        if let Some(value) = self.learner.max_action_value() {
            self.action_series.push(value);
        }

        for kind in &self.plots {
            sink.publish_series(*kind, self.series(*kind).values());
        }
    }
}

/// Runs the decision loop on its own task.
pub struct ControlWorker {
    ctx: Arc<RigContext>,
    sink: Arc<dyn DisplaySink>,
    factory: LearnerFactory,
    config: LearnerConfig,
    plots: Vec<PlotKind>,
    registry_poll: Duration,
}

impl ControlWorker {
    #[allow(missing_docs)]
    pub fn new(
        ctx: Arc<RigContext>,
        sink: Arc<dyn DisplaySink>,
        factory: LearnerFactory,
        config: LearnerConfig,
        plots: Vec<PlotKind>,
        registry_poll: Duration,
    ) -> Self {
        Self {
            ctx,
            sink,
            factory,
            config,
            plots,
            registry_poll,
        }
    }

    /// Block until the registry holds a device list. `None` on shutdown.
    async fn wait_for_devices(&self, shutdown: &watch::Receiver<bool>) -> Option<Arc<DeviceList>> {
        let mut pacer = Pacer::new(self.registry_poll, shutdown.clone());
        loop {
            if let Some(devices) = self.ctx.registry.snapshot() {
                return Some(devices);
            }
            if !pacer.next().await {
                return None;
            }
        }
    }

    #[allow(missing_docs)]
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        let Some(devices) = self.wait_for_devices(&shutdown).await else {
            return;
        };
        let mut control = ControlLoop::new(&devices, &self.factory, &self.config, &self.plots);
        info!(
            sensors = devices.sensors().len(),
            actuators = devices.actuators().len(),
            cycle_ms = self.config.cycle_time,
            "Control loop started"
        );
        self.sink.publish_status(RigStatus::Running);

        let mut pacer = Pacer::new(self.config.cycle(), shutdown);
        while pacer.next().await {
            if let Some(current) = self.ctx.registry.snapshot() {
                if !control.built_for(&current) {
                    info!(
                        sensors = current.sensors().len(),
                        actuators = current.actuators().len(),
                        "Device list changed, rebuilding learner"
                    );
                    control = ControlLoop::new(&current, &self.factory, &self.config, &self.plots);
                }
            }
            control.step(&self.ctx, self.sink.as_ref());
        }

        info!(iterations = control.iteration(), "Control loop stopped");
        self.sink.publish_status(RigStatus::Finished);
    }
}
