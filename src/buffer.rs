//! Bounded per-sensor reading buffers.
//!
//! Each sensor gets its own FIFO of the most recent [`READING_BUFFER_CAPACITY`]
//! samples, guarded by its own lock. The outer map is only write-locked when a
//! sensor is seen for the first time or when the device list is reset, so the
//! acquisition worker and the readers never contend on a global lock during
//! steady-state polling.
//!
//! Readers peek at the newest sample; nothing is ever dequeued by a reader.

use crate::device::{Device, DeviceKey, DeviceRole};
use crate::error::{AppResult, RigError};
use chrono::{DateTime, Local};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Maximum number of samples retained per sensor.
pub const READING_BUFFER_CAPACITY: usize = 100;

/// One reading captured from a sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Sensor the value came from
    pub key: DeviceKey,
    /// Raw ADC value
    pub value: i32,
    /// Monotonic per-sensor sequence number, starting at 1
    pub arrival: u64,
    /// Local capture time
    pub captured_at: DateTime<Local>,
}

#[derive(Debug, Default)]
struct SensorQueue {
    samples: VecDeque<Sample>,
    next_arrival: u64,
}

type SharedQueue = Arc<Mutex<SensorQueue>>;

/// Mapping from sensor key to its bounded sample queue.
#[derive(Debug)]
pub struct ReadingBuffer {
    queues: RwLock<HashMap<DeviceKey, SharedQueue>>,
    capacity: usize,
}

impl Default for ReadingBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadingBuffer {
    #[allow(missing_docs)]
    pub fn new() -> Self {
        Self::with_capacity(READING_BUFFER_CAPACITY)
    }

    /// Buffer with a non-default per-sensor capacity (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            queues: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    fn queue(&self, key: DeviceKey) -> Option<SharedQueue> {
        self.queues.read().get(&key).cloned()
    }

    fn queue_or_insert(&self, key: DeviceKey) -> SharedQueue {
        if let Some(queue) = self.queue(key) {
            return queue;
        }
        self.queues
            .write()
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(SensorQueue::default())))
            .clone()
    }

    /// Append a reading for `sensor`, evicting the oldest sample when full.
    ///
    /// The queue is created lazily on the first sample. Actuators are rejected.
    pub fn append(&self, sensor: &Device, value: i32) -> AppResult<Sample> {
        if !sensor.is_sensor() {
            return Err(RigError::RoleMismatch {
                key: sensor.key(),
                expected: DeviceRole::Sensor,
            });
        }
        let key = sensor.key();
        let queue = self.queue_or_insert(key);
        let mut queue = queue.lock();

        queue.next_arrival += 1;
        let sample = Sample {
            key,
            value,
            arrival: queue.next_arrival,
            captured_at: Local::now(),
        };
        while queue.samples.len() >= self.capacity {
            queue.samples.pop_front();
        }
        queue.samples.push_back(sample.clone());
        Ok(sample)
    }

    /// Newest sample for `key`, if the sensor has been sampled.
    pub fn latest(&self, key: DeviceKey) -> Option<Sample> {
        let queue = self.queue(key)?;
        let queue = queue.lock();
        queue.samples.back().cloned()
    }

    /// Newest sample of every sampled sensor, ordered by key.
    pub fn latest_all(&self) -> Vec<Sample> {
        let queues: Vec<SharedQueue> = self.queues.read().values().cloned().collect();
        let mut latest: Vec<Sample> = queues
            .iter()
            .filter_map(|q| q.lock().samples.back().cloned())
            .collect();
        latest.sort_by_key(|s| s.key);
        latest
    }

    /// Copy of the buffered samples for `key`, oldest first.
    pub fn snapshot(&self, key: DeviceKey) -> Vec<Sample> {
        self.queue(key)
            .map(|q| q.lock().samples.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of samples held for `key`.
    pub fn len(&self, key: DeviceKey) -> usize {
        self.queue(key).map(|q| q.lock().samples.len()).unwrap_or(0)
    }

    /// Keys that currently own a queue.
    pub fn keys(&self) -> Vec<DeviceKey> {
        let mut keys: Vec<DeviceKey> = self.queues.read().keys().copied().collect();
        keys.sort();
        keys
    }

    /// Whether no sensor has been sampled yet.
    pub fn is_empty(&self) -> bool {
        self.queues.read().is_empty()
    }

    /// Drop every queue. Only used when the device list is replaced.
    pub fn clear(&self) {
        self.queues.write().clear();
    }
}
