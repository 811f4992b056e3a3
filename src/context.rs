//! Shared state handed to every worker.
//!
//! One `RigContext` is built per runtime and shared through an `Arc`. Each
//! collection carries its own lock; no lock is ever held across an `.await`
//! or a transport call.

use crate::buffer::ReadingBuffer;
use crate::commands::CommandQueue;
use crate::device::{Device, DeviceKey};
use crate::registry::{DeviceList, DeviceRegistry};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;

/// Actuators the operator has excluded from command dispatch.
#[derive(Debug, Default)]
pub struct InactiveSet {
    keys: RwLock<HashSet<DeviceKey>>,
}

impl InactiveSet {
    /// Mark `key` inactive (`true`) or active again (`false`).
    pub fn set(&self, key: DeviceKey, inactive: bool) {
        let mut keys = self.keys.write();
        if inactive {
            keys.insert(key);
        } else {
            keys.remove(&key);
        }
    }

    #[allow(missing_docs)]
    pub fn contains(&self, key: DeviceKey) -> bool {
        self.keys.read().contains(&key)
    }

    #[allow(missing_docs)]
    pub fn keys(&self) -> Vec<DeviceKey> {
        let mut keys: Vec<DeviceKey> = self.keys.read().iter().copied().collect();
        keys.sort();
        keys
    }
}

/// Registry, reading buffers, command queue and operator overrides.
#[derive(Debug, Default)]
pub struct RigContext {
    /// Discovered devices
    pub registry: DeviceRegistry,
    /// Per-sensor reading windows
    pub readings: ReadingBuffer,
    /// Actuator writes waiting for the next acquisition tick
    pub commands: CommandQueue,
    /// Operator-disabled actuators
    pub inactive: InactiveSet,
}

impl RigContext {
    #[allow(missing_docs)]
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(missing_docs)]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Replace the device list.
    ///
    /// Buffers and pending commands belong to the previous list, so they are
    /// dropped when the list actually changes.
    pub fn install_devices(&self, devices: Vec<Device>) -> Arc<DeviceList> {
        let previous = self.registry.replace(devices);
        let current = self
            .registry
            .snapshot()
            .unwrap_or_else(|| Arc::new(DeviceList::new(Vec::new())));
        let changed = previous.map_or(true, |prev| prev.all() != current.all());
        if changed {
            self.readings.clear();
            self.commands.clear();
        }
        current
    }
}
