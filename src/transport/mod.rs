//! Device transport seam.
//!
//! The byte-level Teensy protocol lives behind these traits. The acquisition
//! worker is the only caller and owns the link exclusively, so link methods
//! take `&mut self`. Every call may block on physical I/O; implementations
//! backed by a blocking serial port should hop onto
//! `tokio::task::spawn_blocking` rather than stall the runtime.
//!
//! # Contract
//! - `dst` is the Teensy serial number, `src` the host serial number
//! - `flag` is passed through untouched (the rig always sends 0)
//! - `read` returns the raw 10-bit ADC value of a sensor
//! - a closed link fails every query with
//!   [`RigError::LinkClosed`](crate::error::RigError::LinkClosed)

use crate::device::{Device, DeviceKey};
use crate::error::AppResult;
use async_trait::async_trait;

pub mod sim;

pub use sim::{Fault, SensorScript, SimHandle, SimulatedTransport};

/// Opens links to a Teensy node.
#[async_trait]
pub trait DeviceTransport: Send + Sync {
    /// Open a link on `port`.
    async fn open(&self, port: &str) -> AppResult<Box<dyn TransportLink>>;
}

/// An opened (or previously opened) connection.
#[async_trait]
pub trait TransportLink: Send {
    /// Whether the underlying port is currently open.
    fn is_open(&self) -> bool;

    /// Reopen a link that was closed.
    async fn reopen(&mut self) -> AppResult<()>;

    /// Close the port. The link object stays usable for `reopen`.
    async fn close(&mut self);

    /// Number of peripherals the node reports.
    async fn query_device_count(&mut self, dst: u32, src: u32) -> AppResult<usize>;

    /// Identity of every peripheral the node reports.
    async fn query_device_ids(&mut self, dst: u32, src: u32) -> AppResult<Vec<Device>>;

    /// Read the current value of a peripheral.
    async fn read(&mut self, dst: u32, src: u32, key: DeviceKey, flag: u8) -> AppResult<i32>;

    /// Fade a peripheral to `value`.
    async fn write(
        &mut self,
        dst: u32,
        src: u32,
        key: DeviceKey,
        value: i32,
        flag: u8,
    ) -> AppResult<()>;
}
