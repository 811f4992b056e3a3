//! In-memory Teensy rig.
//!
//! Simulates a node with a fixed peripheral list. Sensor values come from
//! per-key scripts; actuators read back the last value written to them.
//! Failures are injected through [`Fault`] scenarios so the workers'
//! degradation paths can be exercised without hardware.
//!
//! # Example
//!
//! ```rust,ignore
//! let transport = SimulatedTransport::new(devices)
//!     .with_script(sensor.key(), SensorScript::Sequence((1..=150).collect()))
//!     .with_fault(Fault::ReadFailsOn { key: other.key(), nth: 10 });
//! let sim = transport.handle();
//! // ... run the acquisition worker ...
//! assert_eq!(sim.writes().len(), 4);
//! ```

use super::{DeviceTransport, TransportLink};
use crate::device::{Device, DeviceKey};
use crate::error::{AppResult, RigError};
use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;

/// Largest value a 10-bit ADC can report.
const ADC_MAX: i32 = 1023;

/// Where a simulated sensor's readings come from.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorScript {
    /// Same value on every read
    Constant(i32),
    /// Values in order; the last one repeats once exhausted
    Sequence(Vec<i32>),
    /// Sine over the read count with uniform noise, clamped to the ADC range
    Wave {
        /// Mid-scale value
        offset: f64,
        /// Peak deviation from `offset`
        amplitude: f64,
        /// Reads per full period
        period: u32,
        /// Half-width of the uniform noise band
        noise: f64,
    },
}

impl SensorScript {
    fn value(&self, read_number: u64) -> i32 {
        match self {
            SensorScript::Constant(v) => *v,
            SensorScript::Sequence(values) => {
                let idx = (read_number.saturating_sub(1) as usize).min(values.len().saturating_sub(1));
                values.get(idx).copied().unwrap_or(0)
            }
            SensorScript::Wave {
                offset,
                amplitude,
                period,
                noise,
            } => {
                let phase = read_number as f64 / f64::from((*period).max(1));
                let jitter = if *noise > 0.0 {
                    rand::thread_rng().gen_range(-*noise..=*noise)
                } else {
                    0.0
                };
                let value = offset + amplitude * (phase * std::f64::consts::TAU).sin() + jitter;
                (value.round() as i32).clamp(0, ADC_MAX)
            }
        }
    }
}

/// Injected failure scenario.
#[derive(Debug, Clone, PartialEq)]
pub enum Fault {
    /// `open` and `reopen` fail with this reason
    OpenFails(String),
    /// Device queries fail
    DiscoveryFails(String),
    /// Only the `nth` read (1-based) of `key` fails
    ReadFailsOn {
        #[allow(missing_docs)]
        key: DeviceKey,
        #[allow(missing_docs)]
        nth: u64,
    },
    /// Every read of `key` fails
    ReadFailsAlways(DeviceKey),
    /// Every write to `key` fails
    WriteFails(DeviceKey),
}

#[derive(Debug, Default)]
struct SimState {
    devices: Vec<Device>,
    scripts: HashMap<DeviceKey, SensorScript>,
    actuator_values: HashMap<DeviceKey, i32>,
    read_counts: HashMap<DeviceKey, u64>,
    writes: Vec<(DeviceKey, i32)>,
    faults: Vec<Fault>,
    open: bool,
    opens: u32,
    closes: u32,
}

impl SimState {
    fn open_fault(&self) -> Option<String> {
        self.faults.iter().find_map(|f| match f {
            Fault::OpenFails(reason) => Some(reason.clone()),
            _ => None,
        })
    }

    fn discovery_fault(&self) -> Option<String> {
        self.faults.iter().find_map(|f| match f {
            Fault::DiscoveryFails(reason) => Some(reason.clone()),
            _ => None,
        })
    }

    fn read_fails(&self, key: DeviceKey, nth: u64) -> bool {
        self.faults.iter().any(|f| match f {
            Fault::ReadFailsOn { key: k, nth: n } => *k == key && *n == nth,
            Fault::ReadFailsAlways(k) => *k == key,
            _ => false,
        })
    }

    fn write_fails(&self, key: DeviceKey) -> bool {
        self.faults
            .iter()
            .any(|f| matches!(f, Fault::WriteFails(k) if *k == key))
    }

    fn try_open(&mut self, port: &str) -> AppResult<()> {
        if let Some(reason) = self.open_fault() {
            return Err(RigError::Connection {
                port: port.to_string(),
                reason,
            });
        }
        self.open = true;
        self.opens += 1;
        Ok(())
    }

    fn ensure_open(&self) -> AppResult<()> {
        if self.open {
            Ok(())
        } else {
            Err(RigError::LinkClosed)
        }
    }
}

/// Transport over a simulated node.
#[derive(Debug, Clone)]
pub struct SimulatedTransport {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedTransport {
    /// Node reporting `devices`; unscripted sensors read 0.
    pub fn new(devices: Vec<Device>) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                devices,
                ..Default::default()
            })),
        }
    }

    /// Two ports, each with two sensors and two actuators, fed by noisy waves.
    pub fn demo_rig() -> Self {
        let mut devices = Vec::new();
        for port in 1..=2u8 {
            devices.push(Device::new(0, port, 1, 1));
            devices.push(Device::new(0, port, 2, 3));
            devices.push(Device::new(0, port, 3, 0));
            devices.push(Device::new(0, port, 4, 2));
        }
        let mut transport = Self::new(devices.clone());
        for (i, dev) in devices.iter().filter(|d| d.is_sensor()).enumerate() {
            transport = transport.with_script(
                dev.key(),
                SensorScript::Wave {
                    offset: 512.0,
                    amplitude: 300.0,
                    period: 40 + 13 * i as u32,
                    noise: 8.0,
                },
            );
        }
        transport
    }

    /// Script the readings of `key`.
    pub fn with_script(self, key: DeviceKey, script: SensorScript) -> Self {
        self.state.lock().scripts.insert(key, script);
        self
    }

    /// Add a failure scenario.
    pub fn with_fault(self, fault: Fault) -> Self {
        self.state.lock().faults.push(fault);
        self
    }

    /// Inspection/control handle that stays valid after links move into workers.
    pub fn handle(&self) -> SimHandle {
        SimHandle {
            state: self.state.clone(),
        }
    }
}

#[async_trait]
impl DeviceTransport for SimulatedTransport {
    async fn open(&self, port: &str) -> AppResult<Box<dyn TransportLink>> {
        self.state.lock().try_open(port)?;
        Ok(Box::new(SimLink {
            port: port.to_string(),
            state: self.state.clone(),
        }))
    }
}

/// Link to the simulated node.
#[derive(Debug)]
pub struct SimLink {
    port: String,
    state: Arc<Mutex<SimState>>,
}

#[async_trait]
impl TransportLink for SimLink {
    fn is_open(&self) -> bool {
        self.state.lock().open
    }

    async fn reopen(&mut self) -> AppResult<()> {
        self.state.lock().try_open(&self.port)
    }

    async fn close(&mut self) {
        let mut state = self.state.lock();
        if state.open {
            state.open = false;
            state.closes += 1;
        }
    }

    async fn query_device_count(&mut self, _dst: u32, _src: u32) -> AppResult<usize> {
        let state = self.state.lock();
        state.ensure_open()?;
        if let Some(reason) = state.discovery_fault() {
            return Err(RigError::Discovery(reason));
        }
        Ok(state.devices.len())
    }

    async fn query_device_ids(&mut self, _dst: u32, _src: u32) -> AppResult<Vec<Device>> {
        let state = self.state.lock();
        state.ensure_open()?;
        if let Some(reason) = state.discovery_fault() {
            return Err(RigError::Discovery(reason));
        }
        Ok(state.devices.clone())
    }

    async fn read(&mut self, _dst: u32, _src: u32, key: DeviceKey, _flag: u8) -> AppResult<i32> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        let count = state.read_counts.entry(key).or_insert(0);
        *count += 1;
        let nth = *count;
        if state.read_fails(key, nth) {
            return Err(RigError::TransportIo {
                key,
                reason: format!("injected read failure on read {nth}"),
            });
        }
        if let Some(value) = state.actuator_values.get(&key) {
            return Ok(*value);
        }
        Ok(state
            .scripts
            .get(&key)
            .map(|script| script.value(nth))
            .unwrap_or(0))
    }

    async fn write(
        &mut self,
        _dst: u32,
        _src: u32,
        key: DeviceKey,
        value: i32,
        _flag: u8,
    ) -> AppResult<()> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        if state.write_fails(key) {
            return Err(RigError::TransportIo {
                key,
                reason: "injected write failure".to_string(),
            });
        }
        state.writes.push((key, value));
        state.actuator_values.insert(key, value);
        Ok(())
    }
}

/// Shared view of the simulated node.
#[derive(Debug, Clone)]
pub struct SimHandle {
    state: Arc<Mutex<SimState>>,
}

impl SimHandle {
    /// Successful writes, in order.
    pub fn writes(&self) -> Vec<(DeviceKey, i32)> {
        self.state.lock().writes.clone()
    }

    /// Number of reads attempted on `key`.
    pub fn read_count(&self, key: DeviceKey) -> u64 {
        self.state.lock().read_counts.get(&key).copied().unwrap_or(0)
    }

    #[allow(missing_docs)]
    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }

    /// Successful opens and reopens.
    pub fn opens(&self) -> u32 {
        self.state.lock().opens
    }

    #[allow(missing_docs)]
    pub fn closes(&self) -> u32 {
        self.state.lock().closes
    }

    #[allow(missing_docs)]
    pub fn inject(&self, fault: Fault) {
        self.state.lock().faults.push(fault);
    }

    #[allow(missing_docs)]
    pub fn clear_faults(&self) {
        self.state.lock().faults.clear();
    }

    /// Replace the reported peripheral list (takes effect on next discovery).
    pub fn set_devices(&self, devices: Vec<Device>) {
        self.state.lock().devices = devices;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn devices() -> Vec<Device> {
        vec![Device::new(0, 1, 1, 0), Device::new(0, 1, 2, 1)]
    }

    #[tokio::test]
    async fn sequence_script_then_hold() {
        let sensor = devices()[0];
        let transport = SimulatedTransport::new(devices())
            .with_script(sensor.key(), SensorScript::Sequence(vec![4, 5]));
        let mut link = transport.open("SIM").await.unwrap();

        let mut values = Vec::new();
        for _ in 0..3 {
            values.push(link.read(0, 0, sensor.key(), 0).await.unwrap());
        }
        assert_eq!(values, vec![4, 5, 5]);
    }

    #[tokio::test]
    async fn nth_read_fault_only_hits_once() {
        let sensor = devices()[0];
        let transport = SimulatedTransport::new(devices())
            .with_script(sensor.key(), SensorScript::Constant(7))
            .with_fault(Fault::ReadFailsOn {
                key: sensor.key(),
                nth: 2,
            });
        let mut link = transport.open("SIM").await.unwrap();

        assert!(link.read(0, 0, sensor.key(), 0).await.is_ok());
        assert!(link.read(0, 0, sensor.key(), 0).await.is_err());
        assert!(link.read(0, 0, sensor.key(), 0).await.is_ok());
        assert_eq!(transport.handle().read_count(sensor.key()), 3);
    }

    #[tokio::test]
    async fn closed_link_rejects_io_and_reopens() {
        let transport = SimulatedTransport::new(devices());
        let sim = transport.handle();
        let mut link = transport.open("SIM").await.unwrap();

        link.close().await;
        assert!(!link.is_open());
        assert!(matches!(
            link.query_device_ids(0, 0).await,
            Err(RigError::LinkClosed)
        ));

        link.reopen().await.unwrap();
        assert_eq!(link.query_device_count(0, 0).await.unwrap(), 2);
        assert_eq!(sim.opens(), 2);
        assert_eq!(sim.closes(), 1);
    }

    #[tokio::test]
    async fn open_fault_is_a_connection_error() {
        let transport = SimulatedTransport::new(devices()).with_fault(Fault::OpenFails("busy".into()));
        match transport.open("COM9").await {
            Err(RigError::Connection { port, reason }) => {
                assert_eq!(port, "COM9");
                assert_eq!(reason, "busy");
            }
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn actuators_read_back_last_write() {
        let actuator = devices()[1];
        let transport = SimulatedTransport::new(devices());
        let mut link = transport.open("SIM").await.unwrap();
        link.write(0, 0, actuator.key(), 200, 0).await.unwrap();
        assert_eq!(link.read(0, 0, actuator.key(), 0).await.unwrap(), 200);
        assert_eq!(transport.handle().writes(), vec![(actuator.key(), 200)]);
    }

    #[test]
    fn wave_stays_in_adc_range() {
        let script = SensorScript::Wave {
            offset: 1000.0,
            amplitude: 500.0,
            period: 10,
            noise: 20.0,
        };
        for n in 1..100 {
            let v = script.value(n);
            assert!((0..=ADC_MAX).contains(&v));
        }
    }
}
