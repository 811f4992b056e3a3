//! Device identity and role classification.
//!
//! A Teensy node reports its peripherals as `(node, port, address, type)`
//! tuples. The parity of `type` decides the role: even types are sensors,
//! odd types are actuators. Every peripheral is addressed on the wire by a
//! 3-byte key `(address, type, port)`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Role of a peripheral, derived from the parity of its type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceRole {
    /// Even type code; polled by the acquisition worker.
    Sensor,
    /// Odd type code; driven through the command queue.
    Actuator,
}

impl DeviceRole {
    /// Classify a raw type code.
    pub fn from_type(device_type: u8) -> Self {
        if device_type % 2 == 0 {
            DeviceRole::Sensor
        } else {
            DeviceRole::Actuator
        }
    }
}

impl fmt::Display for DeviceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceRole::Sensor => write!(f, "sensor"),
            DeviceRole::Actuator => write!(f, "actuator"),
        }
    }
}

/// 3-byte big-endian identity `(address, type, port)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceKey([u8; 3]);

impl DeviceKey {
    /// Build a key from its components.
    pub const fn new(address: u8, device_type: u8, port: u8) -> Self {
        Self([address, device_type, port])
    }

    /// Wire representation.
    pub fn as_bytes(&self) -> [u8; 3] {
        self.0
    }

    #[allow(missing_docs)]
    pub fn address(&self) -> u8 {
        self.0[0]
    }

    #[allow(missing_docs)]
    pub fn device_type(&self) -> u8 {
        self.0[1]
    }

    #[allow(missing_docs)]
    pub fn port(&self) -> u8 {
        self.0[2]
    }

    /// Role implied by the type byte.
    pub fn role(&self) -> DeviceRole {
        DeviceRole::from_type(self.device_type())
    }
}

impl From<[u8; 3]> for DeviceKey {
    fn from(bytes: [u8; 3]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}{:02x}{:02x}", self.0[0], self.0[1], self.0[2])
    }
}

/// A discovered peripheral. Immutable once discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Device {
    /// Teensy node index
    pub node: u8,
    /// Physical port on the node
    pub port: u8,
    /// Bus address on the port
    pub address: u8,
    /// Type code; parity selects the role
    pub device_type: u8,
}

impl Device {
    #[allow(missing_docs)]
    pub const fn new(node: u8, port: u8, address: u8, device_type: u8) -> Self {
        Self {
            node,
            port,
            address,
            device_type,
        }
    }

    /// Identity used on the wire and as buffer/queue key.
    pub fn key(&self) -> DeviceKey {
        DeviceKey::new(self.address, self.device_type, self.port)
    }

    #[allow(missing_docs)]
    pub fn role(&self) -> DeviceRole {
        DeviceRole::from_type(self.device_type)
    }

    #[allow(missing_docs)]
    pub fn is_sensor(&self) -> bool {
        self.role() == DeviceRole::Sensor
    }

    #[allow(missing_docs)]
    pub fn is_actuator(&self) -> bool {
        self.role() == DeviceRole::Actuator
    }
}

/// Split a discovery result into `(sensors, actuators)`, preserving discovery order.
///
/// The order is significant: the control worker maps sensor and actuator
/// positions onto the learner's input and output vectors.
pub fn partition(devices: &[Device]) -> (Vec<Device>, Vec<Device>) {
    devices.iter().partition(|dev| dev.is_sensor())
}

/// Per-port grouping of peripherals, as shown on the sensor/actuator panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortLayout {
    /// Node the port belongs to
    pub node: u8,
    /// Port number
    pub port: u8,
    /// Actuators on this port in discovery order
    pub actuators: Vec<Device>,
    /// Sensors on this port in discovery order
    pub sensors: Vec<Device>,
}

impl PortLayout {
    /// Integer ratio used to size sensor cells under the actuator row.
    pub fn actuators_per_sensor(&self) -> usize {
        if self.sensors.is_empty() {
            0
        } else {
            self.actuators.len() / self.sensors.len()
        }
    }
}

/// Group devices by `(node, port)`; ports appear in order of first discovery.
pub fn layout(devices: &[Device]) -> Vec<PortLayout> {
    let mut ports: Vec<PortLayout> = Vec::new();
    for dev in devices {
        let idx = match ports
            .iter()
            .position(|p| p.node == dev.node && p.port == dev.port)
        {
            Some(idx) => idx,
            None => {
                ports.push(PortLayout {
                    node: dev.node,
                    port: dev.port,
                    actuators: Vec::new(),
                    sensors: Vec::new(),
                });
                ports.len() - 1
            }
        };
        match dev.role() {
            DeviceRole::Sensor => ports[idx].sensors.push(*dev),
            DeviceRole::Actuator => ports[idx].actuators.push(*dev),
        }
    }
    ports
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_by_type_parity() {
        let devices: Vec<Device> = (0..6).map(|t| Device::new(0, 1, 10 + t, t)).collect();
        let (sensors, actuators) = partition(&devices);

        let sensor_types: Vec<u8> = sensors.iter().map(|d| d.device_type).collect();
        let actuator_types: Vec<u8> = actuators.iter().map(|d| d.device_type).collect();
        assert_eq!(sensor_types, vec![0, 2, 4]);
        assert_eq!(actuator_types, vec![1, 3, 5]);
    }

    #[test]
    fn key_orders_address_type_port() {
        let dev = Device::new(0, 3, 7, 2);
        let key = dev.key();
        assert_eq!(key.as_bytes(), [7, 2, 3]);
        assert_eq!(key.address(), 7);
        assert_eq!(key.device_type(), 2);
        assert_eq!(key.port(), 3);
        assert_eq!(key.role(), DeviceRole::Sensor);
        assert_eq!(key.to_string(), "070203");
    }

    #[test]
    fn layout_groups_by_port() {
        let devices = vec![
            Device::new(0, 1, 1, 1),
            Device::new(0, 1, 2, 0),
            Device::new(0, 2, 1, 3),
            Device::new(0, 1, 3, 1),
            Device::new(0, 2, 2, 5),
        ];
        let ports = layout(&devices);
        assert_eq!(ports.len(), 2);

        assert_eq!(ports[0].port, 1);
        assert_eq!(ports[0].actuators.len(), 2);
        assert_eq!(ports[0].sensors.len(), 1);
        assert_eq!(ports[0].actuators_per_sensor(), 2);

        assert_eq!(ports[1].port, 2);
        assert!(ports[1].sensors.is_empty());
        assert_eq!(ports[1].actuators_per_sensor(), 0);
    }
}
