//! Discovered device list.
//!
//! Empty until the acquisition worker completes a discovery; replaced
//! wholesale on every successful discovery. Readers get cheap `Arc` snapshots.

use crate::device::{self, Device, DeviceKey, PortLayout};
use parking_lot::RwLock;
use std::sync::Arc;

/// Devices from one discovery, partitioned by role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceList {
    all: Vec<Device>,
    sensors: Vec<Device>,
    actuators: Vec<Device>,
}

impl DeviceList {
    #[allow(missing_docs)]
    pub fn new(devices: Vec<Device>) -> Self {
        let (sensors, actuators) = device::partition(&devices);
        Self {
            all: devices,
            sensors,
            actuators,
        }
    }

    /// Every device in discovery order.
    pub fn all(&self) -> &[Device] {
        &self.all
    }

    /// Sensors in discovery order.
    pub fn sensors(&self) -> &[Device] {
        &self.sensors
    }

    /// Actuators in discovery order.
    pub fn actuators(&self) -> &[Device] {
        &self.actuators
    }

    #[allow(missing_docs)]
    pub fn get(&self, key: DeviceKey) -> Option<&Device> {
        self.all.iter().find(|d| d.key() == key)
    }

    #[allow(missing_docs)]
    pub fn layout(&self) -> Vec<PortLayout> {
        device::layout(&self.all)
    }
}

/// Shared registry of the current device list.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: RwLock<Option<Arc<DeviceList>>>,
}

impl DeviceRegistry {
    #[allow(missing_docs)]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a new device list, returning the previous one.
    pub fn replace(&self, devices: Vec<Device>) -> Option<Arc<DeviceList>> {
        self.devices.write().replace(Arc::new(DeviceList::new(devices)))
    }

    /// Current device list, if discovery has completed.
    pub fn snapshot(&self) -> Option<Arc<DeviceList>> {
        self.devices.read().clone()
    }

    #[allow(missing_docs)]
    pub fn is_populated(&self) -> bool {
        self.devices.read().is_some()
    }

    /// Per-port grouping of the current list; empty before discovery.
    pub fn layout(&self) -> Vec<PortLayout> {
        self.devices
            .read()
            .as_ref()
            .map(|list| list.layout())
            .unwrap_or_default()
    }

    #[allow(missing_docs)]
    pub fn contains(&self, key: DeviceKey) -> bool {
        self.devices
            .read()
            .as_ref()
            .is_some_and(|list| list.get(key).is_some())
    }
}
