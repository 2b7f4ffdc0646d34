use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::error::BridgeError;
use crate::processing::ring_buffer::CircularAudioBuffer;

/// Fan-out of the encoded stream into one private buffer per client.
///
/// The encode pump publishes each encoded chunk once; every subscriber gets
/// its own copy and its own read cursor. A slow subscriber only loses its own
/// oldest bytes, it never holds back the publisher or other subscribers.
#[derive(Debug)]
pub struct StreamTee {
    slot_capacity: usize,
    slots: Mutex<HashMap<String, Arc<CircularAudioBuffer>>>,
}

impl StreamTee {
    pub fn new(slot_capacity: usize) -> Result<Self, BridgeError> {
        if slot_capacity == 0 {
            return Err(BridgeError::InvalidConfiguration(
                "tee slot capacity must be positive".into(),
            ));
        }
        Ok(Self {
            slot_capacity,
            slots: Mutex::new(HashMap::new()),
        })
    }

    /// Register a subscriber; it sees only data published from now on.
    pub fn subscribe(&self, id: &str) -> Result<Arc<CircularAudioBuffer>, BridgeError> {
        let slot = Arc::new(CircularAudioBuffer::new(self.slot_capacity)?);
        slot.initialize();
        self.slots.lock().insert(id.to_string(), Arc::clone(&slot));
        Ok(slot)
    }

    /// Remove a subscriber. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: &str) -> bool {
        self.slots.lock().remove(id).is_some()
    }

    /// Copy `data` into every subscriber's buffer.
    pub fn publish(&self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        for slot in self.slots.lock().values() {
            slot.write(data);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.slots.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_subscriber_reads_independently() {
        let tee = StreamTee::new(64).unwrap();
        let a = tee.subscribe("a").unwrap();
        let b = tee.subscribe("b").unwrap();

        tee.publish(&[1, 2, 3, 4]);

        assert_eq!(a.read(2), vec![1, 2]);
        assert_eq!(b.read(10), vec![1, 2, 3, 4]);
        assert_eq!(a.read(10), vec![3, 4]);
    }

    #[test]
    fn late_subscriber_misses_earlier_data() {
        let tee = StreamTee::new(64).unwrap();
        tee.publish(&[1, 2]);
        let late = tee.subscribe("late").unwrap();
        tee.publish(&[3]);

        assert_eq!(late.read(10), vec![3]);
    }

    #[test]
    fn slow_subscriber_drops_its_own_oldest_bytes() {
        let tee = StreamTee::new(4).unwrap();
        let slow = tee.subscribe("slow").unwrap();
        let fast = tee.subscribe("fast").unwrap();

        tee.publish(&[1, 2, 3]);
        assert_eq!(fast.read(3), vec![1, 2, 3]);
        tee.publish(&[4, 5, 6]);

        assert_eq!(fast.read(10), vec![4, 5, 6]);
        assert_eq!(slow.read(10), vec![3, 4, 5, 6]);
        assert_eq!(slow.stats().overflow_bytes, 2);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let tee = StreamTee::new(8).unwrap();
        tee.subscribe("x").unwrap();
        assert!(tee.unsubscribe("x"));
        assert!(!tee.unsubscribe("x"));
        assert_eq!(tee.subscriber_count(), 0);
    }
}
