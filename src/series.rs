//! Fixed-length sliding windows for the learner plots.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of points kept per plot series.
pub const METRIC_SERIES_LEN: usize = 50;

/// Plots the control worker can feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlotKind {
    /// Number of experts reported by the learner
    ExpertNumber,
    /// Smoothed prediction error (`rewards_history`)
    PredictionError,
    /// Largest action value known to the learner
    MaxActionValue,
}

impl PlotKind {
    /// Value the series holds before anything has been appended.
    pub fn initial_fill(&self) -> f64 {
        match self {
            PlotKind::ExpertNumber => 1.0,
            PlotKind::PredictionError | PlotKind::MaxActionValue => 0.0,
        }
    }

    #[allow(missing_docs)]
    pub fn name(&self) -> &'static str {
        match self {
            PlotKind::ExpertNumber => "plot_expert_number",
            PlotKind::PredictionError => "plot_prediction_error",
            PlotKind::MaxActionValue => "plot_max_action_value",
        }
    }
}

impl fmt::Display for PlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Sliding window of exactly [`METRIC_SERIES_LEN`] values.
///
/// `push` shifts every value one slot left and writes the newest value into
/// the last slot; the oldest value falls off the front.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSeries {
    values: Vec<f64>,
}

impl MetricSeries {
    /// Series pre-filled with `fill`.
    pub fn new(fill: f64) -> Self {
        Self {
            values: vec![fill; METRIC_SERIES_LEN],
        }
    }

    /// Series pre-filled with the plot's initial value.
    pub fn for_plot(kind: PlotKind) -> Self {
        Self::new(kind.initial_fill())
    }

    #[allow(missing_docs)]
    pub fn push(&mut self, value: f64) {
        self.values.rotate_left(1);
        if let Some(last) = self.values.last_mut() {
            *last = value;
        }
    }

    /// Values, oldest first.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    #[allow(missing_docs)]
    pub fn newest(&self) -> f64 {
        self.values[METRIC_SERIES_LEN - 1]
    }

    #[allow(missing_docs)]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Always false; kept for symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_slides_left() {
        let mut series = MetricSeries::new(0.0);
        for i in 1..=120 {
            series.push(i as f64);
            assert_eq!(series.len(), METRIC_SERIES_LEN);
            assert_eq!(series.newest(), i as f64);
        }
        assert_eq!(series.values()[0], 71.0);
        assert_eq!(series.values()[49], 120.0);
    }

    #[test]
    fn keeps_fill_until_fifty_appends() {
        let mut series = MetricSeries::for_plot(PlotKind::ExpertNumber);
        for i in 0..49 {
            series.push(2.0 + i as f64);
        }
        assert_eq!(series.values()[0], 1.0);
        series.push(99.0);
        assert_eq!(series.values()[0], 2.0);
        assert_eq!(series.values()[49], 99.0);
    }
}
