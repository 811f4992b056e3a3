//! Custom error types for the rig core.
//!
//! This module defines the primary error type, `RigError`, shared by every
//! component of the acquisition/control subsystem. Using the `thiserror` crate,
//! it gives a single vocabulary for the failures the workers have to absorb or
//! report.
//!
//! ## Error Hierarchy
//!
//! - **`Connection`**: opening or reopening the transport failed. Reported to the
//!   operator through the display sink; the operator has to request a new connect.
//! - **`Discovery`**: device enumeration failed. The acquisition worker closes the
//!   link, so a reconnect is required to retry.
//! - **`TransportIo`**: a single read or write failed. Logged and skipped, never
//!   retried and never propagated into the control loop.
//! - **`Config`** / **`Configuration`**: parse errors from `figment` and semantic
//!   validation errors. These are rejected before any worker starts.
//! - **`RoleMismatch`**: a sensor was used where an actuator is required or the
//!   other way around.
//! - **`Worker`**: a worker task panicked or was cancelled during shutdown.
//!
//! By using `#[from]`, `RigError` can be created from the underlying error
//! types, so `?` works across the crate.

use crate::device::{DeviceKey, DeviceRole};
use thiserror::Error;

/// Convenience alias for results using the rig error type.
pub type AppResult<T> = std::result::Result<T, RigError>;

#[derive(Error, Debug)]
#[allow(missing_docs)]
pub enum RigError {
    #[error("Failed to open port {port}: {reason}")]
    Connection { port: String, reason: String },

    #[error("Device discovery failed: {0}")]
    Discovery(String),

    #[error("Transport I/O error on device {key}: {reason}")]
    TransportIo { key: DeviceKey, reason: String },

    #[error("Transport link is not open")]
    LinkClosed,

    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("Device {key} is not a {expected}")]
    RoleMismatch { key: DeviceKey, expected: DeviceRole },

    #[error("Worker task failed: {0}")]
    Worker(String),
}

impl From<tokio::task::JoinError> for RigError {
    fn from(err: tokio::task::JoinError) -> Self {
        RigError::Worker(err.to_string())
    }
}

impl From<figment::Error> for RigError {
    fn from(err: figment::Error) -> Self {
        RigError::Config(Box::new(err))
    }
}

impl RigError {
    /// Whether the worker that hit this error can carry on without operator action.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, RigError::TransportIo { .. } | RigError::LinkClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_io_is_recoverable() {
        let err = RigError::TransportIo {
            key: DeviceKey::new(1, 2, 3),
            reason: "timeout".into(),
        };
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("010203"));
    }

    #[test]
    fn connection_failure_needs_operator() {
        let err = RigError::Connection {
            port: "COM7".into(),
            reason: "access denied".into(),
        };
        assert!(!err.is_recoverable());
        assert_eq!(err.to_string(), "Failed to open port COM7: access denied");
    }

    #[test]
    fn role_mismatch_names_the_expected_role() {
        let err = RigError::RoleMismatch {
            key: DeviceKey::new(4, 1, 0),
            expected: DeviceRole::Sensor,
        };
        assert_eq!(err.to_string(), "Device 040100 is not a sensor");
    }
}
