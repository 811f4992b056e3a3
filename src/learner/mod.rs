//! Learner seam.
//!
//! The adaptive controller (expert splitting, knowledge-gradient bookkeeping)
//! is an external component. The control worker only relies on this trait:
//! feed it the normalized sensor vector together with the action that
//! produced it, then ask for the next action.

use crate::config::LearnerConfig;

pub mod explorer;

pub use explorer::RandomExplorer;

/// Adaptive controller driven by the control worker.
pub trait Learner: Send {
    /// Record the sensor state observed after applying `actuators`.
    fn learn(&mut self, sensors: &[f64], actuators: &[f64]);

    /// Next action, one value per actuator in discovery order.
    fn select_action(&mut self) -> Vec<f64>;

    /// Number of experts currently in the model.
    fn num_experts(&self) -> usize;

    /// Smoothed prediction error, once the learner has one.
    fn rewards_history(&self) -> Option<f64>;

    /// Largest action value known to the learner, if it tracks one.
    fn max_action_value(&self) -> Option<f64> {
        None
    }
}

/// Builds a learner from initial sensor/actuator tuples and the learner config.
pub type LearnerFactory =
    Box<dyn Fn(&[i32], &[i32], &LearnerConfig) -> Box<dyn Learner> + Send + Sync>;

/// Factory for the bundled [`RandomExplorer`].
pub fn explorer_factory() -> LearnerFactory {
    Box::new(|sensors, actuators, config| {
        Box::new(RandomExplorer::new(sensors.len(), actuators.len(), config))
    })
}
