//! Minimal stand-in learner for headless runs.
//!
//! Explores uniformly with probability `exploring_rate`, otherwise replays the
//! action that produced the largest sensor response so far. Its error signal
//! is an exponentially smoothed absolute change of the sensor vector. It
//! never splits, so it always reports a single expert.

use super::Learner;
use crate::config::LearnerConfig;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Upper bound of an actuator fade value.
pub const ACTION_MAX: f64 = 255.0;

/// Epsilon-greedy explorer.
#[derive(Debug)]
pub struct RandomExplorer {
    actuators: usize,
    exploring_rate: f64,
    learning_rate: f64,
    last_sensors: Option<Vec<f64>>,
    error: Option<f64>,
    best: Option<(Vec<f64>, f64)>,
    rng: StdRng,
}

impl RandomExplorer {
    #[allow(missing_docs)]
    pub fn new(_sensors: usize, actuators: usize, config: &LearnerConfig) -> Self {
        Self::with_rng(actuators, config, StdRng::from_entropy())
    }

    /// Deterministic explorer for tests.
    pub fn seeded(actuators: usize, config: &LearnerConfig, seed: u64) -> Self {
        Self::with_rng(actuators, config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(actuators: usize, config: &LearnerConfig, rng: StdRng) -> Self {
        Self {
            actuators,
            exploring_rate: config.exploring_rate,
            learning_rate: config.learning_rate,
            last_sensors: None,
            error: None,
            best: None,
            rng,
        }
    }

    fn random_action(&mut self) -> Vec<f64> {
        (0..self.actuators)
            .map(|_| self.rng.gen_range(0.0..=ACTION_MAX))
            .collect()
    }
}

impl Learner for RandomExplorer {
    fn learn(&mut self, sensors: &[f64], actuators: &[f64]) {
        let response: f64 = sensors.iter().sum();
        if let Some(prev) = &self.last_sensors {
            let change: f64 = prev
                .iter()
                .zip(sensors)
                .map(|(a, b)| (a - b).abs())
                .sum::<f64>()
                / sensors.len().max(1) as f64;
            let smoothed = match self.error {
                Some(e) => e + self.learning_rate * (change - e),
                None => change,
            };
            self.error = Some(smoothed);
        }
        self.last_sensors = Some(sensors.to_vec());

        if self.best.as_ref().map_or(true, |(_, r)| response > *r) {
            self.best = Some((actuators.to_vec(), response));
        }
    }

    fn select_action(&mut self) -> Vec<f64> {
        let explore = self.rng.gen_bool(self.exploring_rate.clamp(0.0, 1.0));
        match &self.best {
            Some((action, _)) if !explore && action.len() == self.actuators => action.clone(),
            _ => self.random_action(),
        }
    }

    fn num_experts(&self) -> usize {
        1
    }

    fn rewards_history(&self) -> Option<f64> {
        self.error
    }

    fn max_action_value(&self) -> Option<f64> {
        self.best.as_ref().map(|(_, response)| *response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_have_one_value_per_actuator() {
        let mut learner = RandomExplorer::seeded(3, &LearnerConfig::default(), 7);
        for _ in 0..20 {
            let action = learner.select_action();
            assert_eq!(action.len(), 3);
            assert!(action.iter().all(|v| (0.0..=ACTION_MAX).contains(v)));
        }
    }

    #[test]
    fn error_appears_after_second_observation() {
        let mut learner = RandomExplorer::seeded(1, &LearnerConfig::default(), 1);
        learner.learn(&[0.5, 0.5], &[0.0]);
        assert!(learner.rewards_history().is_none());
        learner.learn(&[0.7, 0.3], &[10.0]);
        let error = learner.rewards_history().unwrap();
        assert!((error - 0.2).abs() < 1e-9);
        assert_eq!(learner.num_experts(), 1);
    }

    #[test]
    fn exploits_best_action_without_exploration() {
        let config = LearnerConfig {
            exploring_rate: 0.0,
            ..Default::default()
        };
        let mut learner = RandomExplorer::seeded(2, &config, 3);
        learner.learn(&[0.1], &[1.0, 2.0]);
        learner.learn(&[0.9], &[40.0, 50.0]);
        learner.learn(&[0.2], &[3.0, 4.0]);
        assert_eq!(learner.select_action(), vec![40.0, 50.0]);
        assert_eq!(learner.max_action_value(), Some(0.9));
    }
}
