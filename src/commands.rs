//! Pending actuator writes.
//!
//! The control worker enqueues, the acquisition worker drains the whole queue
//! once per tick. Delivery is at most once: a drained command is gone whether
//! or not the transport write succeeds.

use crate::device::{Device, DeviceKey, DeviceRole};
use crate::error::{AppResult, RigError};
use parking_lot::Mutex;

/// A queued actuator write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingCommand {
    /// Target actuator
    pub key: DeviceKey,
    /// Value to write
    pub value: i32,
}

/// Unbounded FIFO of pending actuator writes.
#[derive(Debug, Default)]
pub struct CommandQueue {
    pending: Mutex<Vec<PendingCommand>>,
}

impl CommandQueue {
    #[allow(missing_docs)]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a write for `actuator`. Sensors are rejected.
    pub fn enqueue(&self, actuator: &Device, value: i32) -> AppResult<()> {
        if !actuator.is_actuator() {
            return Err(RigError::RoleMismatch {
                key: actuator.key(),
                expected: DeviceRole::Actuator,
            });
        }
        self.pending.lock().push(PendingCommand {
            key: actuator.key(),
            value,
        });
        Ok(())
    }

    /// Take every pending command in enqueue order, leaving the queue empty.
    pub fn drain(&self) -> Vec<PendingCommand> {
        std::mem::take(&mut *self.pending.lock())
    }

    #[allow(missing_docs)]
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    #[allow(missing_docs)]
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Copy of the queue without draining it.
    pub fn snapshot(&self) -> Vec<PendingCommand> {
        self.pending.lock().clone()
    }

    #[allow(missing_docs)]
    pub fn clear(&self) {
        self.pending.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_preserves_order_and_empties() {
        let queue = CommandQueue::new();
        let a = Device::new(0, 1, 1, 1);
        let b = Device::new(0, 1, 2, 3);
        queue.enqueue(&a, 10).unwrap();
        queue.enqueue(&b, 20).unwrap();
        queue.enqueue(&a, 30).unwrap();

        let drained = queue.drain();
        let values: Vec<i32> = drained.iter().map(|c| c.value).collect();
        assert_eq!(values, vec![10, 20, 30]);
        assert_eq!(drained[1].key, b.key());
        assert!(queue.is_empty());
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn sensors_are_never_targets() {
        let queue = CommandQueue::new();
        let sensor = Device::new(0, 1, 1, 2);
        assert!(queue.enqueue(&sensor, 5).is_err());
        assert_eq!(queue.len(), 0);
    }
}
