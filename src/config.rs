//! Configuration System using Figment
//!
//! Configuration is loaded from:
//! 1. a TOML file (base configuration, every field optional)
//! 2. Environment variables prefixed with `CBLA_`, nested keys split on `__`
//!
//! The loaded value is a snapshot: workers copy what they need at start and
//! never observe later edits.
//!
//! # Example
//! ```no_run
//! use cbla_daq::config::RigConfig;
//!
//! let config = RigConfig::load_from("config/cbla.toml")?;
//! config.validate()?;
//! println!("Cycle time: {} ms", config.learner.cycle_time);
//! # Ok::<(), cbla_daq::error::RigError>(())
//! ```

use crate::error::{AppResult, RigError};
use crate::series::PlotKind;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level rig configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RigConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Teensy connection parameters
    pub connection: ConnectionConfig,
    /// Worker tick periods
    pub timing: TimingConfig,
    /// Learner tunables, passed through to the learner constructor
    pub learner: LearnerConfig,
    /// Plot selection
    pub plots: PlotConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    pub log_format: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "CBLA Visualization".to_string(),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

/// Serial link to the Teensy node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Port name handed to the transport
    pub com_port: String,
    /// Serial number of the Teensy (destination address)
    pub serial_number: u32,
    /// Serial number of this host (source address)
    pub com_serial: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            com_port: "COM7".to_string(),
            serial_number: 141960,
            com_serial: 22222,
        }
    }
}

/// Worker pacing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Acquisition tick in milliseconds
    pub acquisition_period_ms: u64,
    /// Presentation tick in milliseconds
    pub presentation_period_ms: u64,
    /// How often the control worker checks for a device list, in milliseconds
    pub registry_poll_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            acquisition_period_ms: 50,
            presentation_period_ms: 100,
            registry_poll_ms: 500,
        }
    }
}

impl TimingConfig {
    #[allow(missing_docs)]
    pub fn acquisition_period(&self) -> Duration {
        Duration::from_millis(self.acquisition_period_ms)
    }

    #[allow(missing_docs)]
    pub fn presentation_period(&self) -> Duration {
        Duration::from_millis(self.presentation_period_ms)
    }

    #[allow(missing_docs)]
    pub fn registry_poll(&self) -> Duration {
        Duration::from_millis(self.registry_poll_ms)
    }
}

/// Learner tunables. Opaque to the core except for `cycle_time`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[allow(missing_docs)]
pub struct LearnerConfig {
    pub exploring_rate: f64,
    /// (start, end) of the adaptive exploring rate
    pub exploring_rate_range: (f64, f64),
    /// (low, high) reward band used when adapting the exploring rate
    pub exploring_reward_range: (f64, f64),
    pub adapt_exploring_rate: bool,
    pub reward_smoothing: u32,
    pub split_threshold: u32,
    pub split_threshold_growth_rate: f64,
    pub split_lock_count_threshold: u32,
    pub split_quality_threshold: f64,
    pub split_quality_decay: f64,
    pub mean_error_threshold: f64,
    pub mean_error: f64,
    pub action_value: f64,
    pub learning_rate: f64,
    pub kga_delta: u32,
    pub kga_tau: u32,
    pub max_training_data_num: u32,
    /// Control loop period in milliseconds
    pub cycle_time: u64,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            exploring_rate: 0.1,
            exploring_rate_range: (0.4, 0.01),
            exploring_reward_range: (-0.03, 0.004),
            adapt_exploring_rate: false,
            reward_smoothing: 1,
            split_threshold: 40,
            split_threshold_growth_rate: 1.0,
            split_lock_count_threshold: 1,
            split_quality_threshold: 0.0,
            split_quality_decay: 1.0,
            mean_error_threshold: 0.0,
            mean_error: 1.0,
            action_value: 0.0,
            learning_rate: 0.25,
            kga_delta: 10,
            kga_tau: 30,
            max_training_data_num: 500,
            cycle_time: 100,
        }
    }
}

impl LearnerConfig {
    /// Control loop period.
    pub fn cycle(&self) -> Duration {
        Duration::from_millis(self.cycle_time)
    }
}

/// Which plots the control worker feeds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotConfig {
    /// Enabled plot series
    pub enabled: Vec<PlotKind>,
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            enabled: vec![PlotKind::ExpertNumber, PlotKind::PredictionError],
        }
    }
}

const VALID_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const VALID_FORMATS: [&str; 3] = ["pretty", "compact", "json"];

impl RigConfig {
    /// Load configuration from `path` merged with `CBLA_` environment variables.
    ///
    /// Example override: `CBLA_LEARNER__CYCLE_TIME=200`
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        Self::figment(path).extract().map_err(RigError::from)
    }

    /// The provider stack used by [`RigConfig::load_from`].
    pub fn figment<P: AsRef<Path>>(path: P) -> Figment {
        Figment::from(Serialized::defaults(RigConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("CBLA_").split("__"))
    }

    /// Parse configuration from a TOML string (no environment overrides).
    pub fn from_toml_str(toml: &str) -> AppResult<Self> {
        Figment::from(Serialized::defaults(RigConfig::default()))
            .merge(Toml::string(toml))
            .extract()
            .map_err(RigError::from)
    }

    /// Render the effective configuration.
    pub fn to_toml_string(&self) -> AppResult<String> {
        toml::to_string_pretty(self).map_err(|e| RigError::Configuration(e.to_string()))
    }

    /// Reject values the workers and the learner cannot run with.
    pub fn validate(&self) -> AppResult<()> {
        let invalid = |msg: String| Err(RigError::Configuration(msg));

        if !VALID_LEVELS.contains(&self.application.log_level.as_str()) {
            return invalid(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                VALID_LEVELS.join(", ")
            ));
        }
        if !VALID_FORMATS.contains(&self.application.log_format.as_str()) {
            return invalid(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                VALID_FORMATS.join(", ")
            ));
        }
        if self.connection.com_port.trim().is_empty() {
            return invalid("com_port must not be empty".to_string());
        }

        let periods = [
            ("acquisition_period_ms", self.timing.acquisition_period_ms),
            ("presentation_period_ms", self.timing.presentation_period_ms),
            ("registry_poll_ms", self.timing.registry_poll_ms),
            ("cycle_time", self.learner.cycle_time),
        ];
        for (name, value) in periods {
            if value == 0 {
                return invalid(format!("{name} must be greater than zero"));
            }
        }

        let learner = &self.learner;
        let unit_rates = [
            ("exploring_rate", learner.exploring_rate),
            ("learning_rate", learner.learning_rate),
            ("exploring_rate_range.0", learner.exploring_rate_range.0),
            ("exploring_rate_range.1", learner.exploring_rate_range.1),
        ];
        for (name, value) in unit_rates {
            if !(0.0..=1.0).contains(&value) {
                return invalid(format!("{name} must be within [0, 1], got {value}"));
            }
        }
        if learner.exploring_rate_range.0 < learner.exploring_rate_range.1 {
            return invalid(format!(
                "exploring_rate_range must decay from start to end, got {:?}",
                learner.exploring_rate_range
            ));
        }
        if learner.exploring_reward_range.0 > learner.exploring_reward_range.1 {
            return invalid(format!(
                "exploring_reward_range must be (low, high), got {:?}",
                learner.exploring_reward_range
            ));
        }
        let counts = [
            ("split_threshold", learner.split_threshold),
            ("kga_delta", learner.kga_delta),
            ("kga_tau", learner.kga_tau),
            ("max_training_data_num", learner.max_training_data_num),
        ];
        for (name, value) in counts {
            if value == 0 {
                return invalid(format!("{name} must be greater than zero"));
            }
        }

        Ok(())
    }
}
