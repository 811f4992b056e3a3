//! # CBLA DAQ Core Library
//!
//! Concurrent acquisition and control core for a Teensy-based sensor/actuator
//! rig driven by an adaptive (CBLA) learner. Three periodic workers share one
//! [`context::RigContext`]: acquisition talks to the transport, presentation
//! feeds a display, and control runs the learner loop.
//!
//! ## Crate Structure
//!
//! - **`error`**: `RigError` and the `AppResult` alias used across the crate.
//! - **`config`**: `RigConfig`, loaded through `figment` from TOML and
//!   `CBLA_`-prefixed environment variables.
//! - **`logging`**: `tracing-subscriber` setup (pretty, compact or JSON).
//! - **`device`**: device identity, sensor/actuator roles and port layout.
//! - **`registry`**: the discovered device list.
//! - **`buffer`**: bounded per-sensor reading windows.
//! - **`commands`**: pending actuator writes.
//! - **`series`**: fixed-length plot series.
//! - **`context`**: shared state plus the operator's inactive-actuator set.
//! - **`display`**: the `DisplaySink` publish interface and its two sinks.
//! - **`transport`**: the transport seam and a simulated rig.
//! - **`learner`**: the learner seam and a bundled random explorer.
//! - **`workers`**: the three workers and `RigRuntime`.

pub mod buffer;
pub mod commands;
pub mod config;
pub mod context;
pub mod device;
pub mod display;
pub mod error;
pub mod learner;
pub mod logging;
pub mod registry;
pub mod series;
pub mod transport;
pub mod workers;

pub use config::RigConfig;
pub use error::{AppResult, RigError};
pub use workers::RigRuntime;
