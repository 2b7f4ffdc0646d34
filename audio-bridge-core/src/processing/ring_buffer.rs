use parking_lot::Mutex;

use crate::models::error::BridgeError;
use crate::models::status::BufferStatus;

/// Circular byte buffer for raw PCM.
///
/// Not synchronized; [`CircularAudioBuffer`] wraps it behind a single lock for
/// cross-thread access.
///
/// Overflow behavior: drops the oldest bytes so the newest data is always kept.
#[derive(Debug)]
pub struct RingBuffer {
    buffer: Vec<u8>,
    write_index: usize,
    read_index: usize,
    available: usize,
    capacity: usize,
    total_written: u64,
    total_read: u64,
    overflow_bytes: u64,
    underruns: u64,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Result<Self, BridgeError> {
        if capacity == 0 {
            return Err(BridgeError::InvalidConfiguration(
                "ring buffer capacity must be positive".into(),
            ));
        }
        Ok(Self {
            buffer: vec![0; capacity],
            write_index: 0,
            read_index: 0,
            available: 0,
            capacity,
            total_written: 0,
            total_read: 0,
            overflow_bytes: 0,
            underruns: 0,
        })
    }

    /// Write bytes into the ring buffer, returning how many were stored.
    ///
    /// If the buffer overflows, exactly the overflow amount of the oldest
    /// resident bytes is dropped first. If `data` is larger than capacity, only
    /// the last `capacity` bytes are kept and the truncated prefix counts as dropped.
    pub fn write(&mut self, data: &[u8]) -> usize {
        if data.is_empty() {
            return 0;
        }

        let data = if data.len() > self.capacity {
            let truncated = data.len() - self.capacity;
            self.overflow_bytes += truncated as u64;
            &data[truncated..]
        } else {
            data
        };

        let free = self.capacity - self.available;
        if data.len() > free {
            self.advance_read_index(data.len() - free);
        }

        // At most two copies: up to the end of storage, then from offset 0.
        let first = data.len().min(self.capacity - self.write_index);
        self.buffer[self.write_index..self.write_index + first].copy_from_slice(&data[..first]);
        let rest = data.len() - first;
        if rest > 0 {
            self.buffer[..rest].copy_from_slice(&data[first..]);
        }

        self.write_index = (self.write_index + data.len()) % self.capacity;
        self.available += data.len();
        self.total_written += data.len() as u64;
        data.len()
    }

    /// Read and remove up to `max` bytes. An empty result is an underrun.
    pub fn read(&mut self, max: usize) -> Vec<u8> {
        if max == 0 {
            return Vec::new();
        }
        let to_read = max.min(self.available);
        if to_read == 0 {
            self.underruns += 1;
            return Vec::new();
        }

        let mut result = Vec::with_capacity(to_read);
        let first = to_read.min(self.capacity - self.read_index);
        result.extend_from_slice(&self.buffer[self.read_index..self.read_index + first]);
        let rest = to_read - first;
        if rest > 0 {
            result.extend_from_slice(&self.buffer[..rest]);
        }

        self.read_index = (self.read_index + to_read) % self.capacity;
        self.available -= to_read;
        self.total_read += to_read as u64;
        result
    }

    /// Drop up to `count` of the oldest bytes; never more than are buffered.
    fn advance_read_index(&mut self, count: usize) {
        let dropped = count.min(self.available);
        self.read_index = (self.read_index + dropped) % self.capacity;
        self.available -= dropped;
        self.overflow_bytes += dropped as u64;
        log::debug!("[BUFFER] Overflow, dropped {} oldest bytes", dropped);
    }

    /// Number of bytes currently available for reading.
    pub fn used(&self) -> usize {
        self.available
    }

    pub fn free(&self) -> usize {
        self.capacity - self.available
    }

    pub fn is_empty(&self) -> bool {
        self.available == 0
    }

    pub fn is_full(&self) -> bool {
        self.available == self.capacity
    }

    /// Reset cursors and statistics to the empty state.
    pub fn reset(&mut self) {
        self.write_index = 0;
        self.read_index = 0;
        self.available = 0;
        self.total_written = 0;
        self.total_read = 0;
        self.overflow_bytes = 0;
        self.underruns = 0;
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn status(&self) -> BufferStatus {
        BufferStatus {
            capacity: self.capacity,
            used: self.available,
            free: self.free(),
            level_percent: self.available as f64 / self.capacity as f64 * 100.0,
            total_written: self.total_written,
            total_read: self.total_read,
            overflow_bytes: self.overflow_bytes,
            underruns: self.underruns,
        }
    }
}

/// Thread-safe ring buffer shared between the capture pump and its consumer.
///
/// One lock guards every operation, so size queries never observe a
/// half-finished write or read. Until [`initialize`](Self::initialize) is
/// called, writes store nothing and reads return nothing.
#[derive(Debug)]
pub struct CircularAudioBuffer {
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    ring: RingBuffer,
    initialized: bool,
}

impl CircularAudioBuffer {
    pub fn new(capacity: usize) -> Result<Self, BridgeError> {
        Ok(Self {
            inner: Mutex::new(Inner {
                ring: RingBuffer::new(capacity)?,
                initialized: false,
            }),
        })
    }

    /// Allocate and initialize in one step.
    pub fn with_capacity(capacity: usize) -> Result<Self, BridgeError> {
        let buffer = Self::new(capacity)?;
        buffer.initialize();
        Ok(buffer)
    }

    /// Reset cursors and statistics and accept data from now on.
    pub fn initialize(&self) {
        let mut inner = self.inner.lock();
        inner.ring.reset();
        inner.initialized = true;
        log::info!("[BUFFER] Initialized: {} bytes", inner.ring.capacity());
    }

    pub fn write(&self, data: &[u8]) -> usize {
        let mut inner = self.inner.lock();
        if !inner.initialized {
            return 0;
        }
        inner.ring.write(data)
    }

    pub fn read(&self, max: usize) -> Vec<u8> {
        let mut inner = self.inner.lock();
        if !inner.initialized {
            return Vec::new();
        }
        inner.ring.read(max)
    }

    pub fn used_size(&self) -> usize {
        self.inner.lock().ring.used()
    }

    pub fn free_size(&self) -> usize {
        self.inner.lock().ring.free()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().ring.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.inner.lock().ring.is_full()
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().ring.capacity()
    }

    pub fn stats(&self) -> BufferStatus {
        self.inner.lock().ring.status()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;

    #[test]
    fn basic_write_read() {
        let mut buf = RingBuffer::new(10).unwrap();
        assert_eq!(buf.write(&[1, 2, 3]), 3);

        assert_eq!(buf.used(), 3);
        assert_eq!(buf.read(3), vec![1, 2, 3]);
        assert!(buf.is_empty());
    }

    #[test]
    fn zero_capacity_rejected() {
        assert!(RingBuffer::new(0).is_err());
        assert!(CircularAudioBuffer::new(0).is_err());
    }

    #[test]
    fn read_partial() {
        let mut buf = RingBuffer::new(10).unwrap();
        buf.write(&[1, 2, 3, 4, 5]);

        assert_eq!(buf.read(3), vec![1, 2, 3]);
        assert_eq!(buf.used(), 2);

        let rest = buf.read(10); // request more than available
        assert_eq!(rest, vec![4, 5]);
        assert!(buf.is_empty());
    }

    #[test]
    fn overflow_drops_oldest() {
        let mut buf = RingBuffer::new(4).unwrap();
        buf.write(&[1, 2, 3, 4]);
        buf.write(&[5, 6]); // overflow: drops 1, 2

        assert_eq!(buf.used(), 4);
        assert_eq!(buf.status().overflow_bytes, 2);
        assert_eq!(buf.read(4), vec![3, 4, 5, 6]);
    }

    #[test]
    fn overflow_only_evicts_what_is_needed() {
        let mut buf = RingBuffer::new(8).unwrap();
        buf.write(&[1, 2, 3, 4, 5]);
        buf.write(&[6, 7, 8, 9, 10]); // 3 free, 2 evicted

        assert_eq!(buf.status().overflow_bytes, 2);
        assert_eq!(buf.read(8), vec![3, 4, 5, 6, 7, 8, 9, 10]);
    }

    #[test]
    fn write_larger_than_capacity() {
        let mut buf = RingBuffer::new(3).unwrap();
        buf.write(&[9]);
        assert_eq!(buf.write(&[1, 2, 3, 4, 5]), 3); // only last 3 kept

        assert_eq!(buf.used(), 3);
        // 2 truncated from the input + 1 resident byte evicted
        assert_eq!(buf.status().overflow_bytes, 3);
        assert_eq!(buf.read(3), vec![3, 4, 5]);
    }

    #[test]
    fn wraparound() {
        let mut buf = RingBuffer::new(4).unwrap();

        buf.write(&[1, 2, 3]);
        buf.read(2); // read_index = 2

        buf.write(&[4, 5, 6]); // wraps around

        assert_eq!(buf.used(), 4);
        assert!(buf.is_full());
        assert_eq!(buf.read(4), vec![3, 4, 5, 6]);
    }

    #[test]
    fn reset_clears_buffer() {
        let mut buf = RingBuffer::new(10).unwrap();
        buf.write(&[1, 2, 3]);
        buf.reset();

        assert!(buf.is_empty());
        assert_eq!(buf.status(), BufferStatus {
            capacity: 10,
            free: 10,
            ..Default::default()
        });
    }

    #[test]
    fn empty_operations() {
        let mut buf = RingBuffer::new(10).unwrap();

        assert!(buf.read(5).is_empty());
        assert_eq!(buf.status().underruns, 1);
        assert!(buf.read(0).is_empty());
        assert_eq!(buf.status().underruns, 1);

        assert_eq!(buf.write(&[]), 0);
        assert!(buf.is_empty());
    }

    #[test]
    fn full_buffer_then_half_overflow() {
        let buf = CircularAudioBuffer::with_capacity(1024).unwrap();
        buf.write(&[0u8; 1024]);
        assert!(buf.is_full());

        buf.write(&[1u8; 512]);

        assert_eq!(buf.used_size(), 1024);
        assert_eq!(buf.stats().overflow_bytes, 512);
        let out = buf.read(1024);
        assert!(out[..512].iter().all(|&b| b == 0));
        assert!(out[512..].iter().all(|&b| b == 1));
    }

    #[test]
    fn read_frees_space_for_next_write() {
        let buf = CircularAudioBuffer::with_capacity(2048).unwrap();
        for _ in 0..3 {
            buf.write(&[7u8; 512]);
        }
        assert_eq!(buf.read(1024).len(), 1024);
        assert_eq!(buf.free_size(), 1536);

        buf.write(&[8u8; 512]);

        assert_eq!(buf.used_size(), 1024);
        assert_eq!(buf.stats().overflow_bytes, 0);
    }

    #[test]
    fn uninitialized_buffer_ignores_io() {
        let buf = CircularAudioBuffer::new(16).unwrap();
        assert_eq!(buf.write(&[1, 2, 3]), 0);
        assert!(buf.read(3).is_empty());

        buf.initialize();
        assert_eq!(buf.write(&[1, 2, 3]), 3);
        assert_eq!(buf.read(3), vec![1, 2, 3]);
    }

    #[test]
    fn initialize_resets_contents() {
        let buf = CircularAudioBuffer::with_capacity(16).unwrap();
        buf.write(&[1, 2, 3]);
        buf.initialize();
        assert!(buf.is_empty());
        assert_eq!(buf.stats().total_written, 0);
    }

    #[test]
    fn random_interleaving_matches_unbounded_reference() {
        let mut rng = fastrand::Rng::with_seed(0x5eed);
        let capacity = 97;
        let mut buf = RingBuffer::new(capacity).unwrap();
        let mut reference: VecDeque<u8> = VecDeque::new();
        let mut dropped = 0u64;
        let mut next = 0u8;

        for _ in 0..10_000 {
            if rng.bool() {
                let len = rng.usize(0..=capacity + 20);
                let data: Vec<u8> = (0..len)
                    .map(|_| {
                        next = next.wrapping_add(1);
                        next
                    })
                    .collect();
                buf.write(&data);
                reference.extend(&data);
                while reference.len() > capacity {
                    reference.pop_front();
                    dropped += 1;
                }
            } else {
                let max = rng.usize(0..=capacity);
                let got = buf.read(max);
                let want: Vec<u8> = reference.drain(..max.min(reference.len())).collect();
                assert_eq!(got, want);
            }
            assert_eq!(buf.used(), reference.len());
            assert_eq!(buf.is_empty(), reference.is_empty());
            assert_eq!(buf.is_full(), reference.len() == capacity);
            assert_eq!(buf.status().overflow_bytes, dropped);
        }
    }

    #[test]
    fn concurrent_writer_and_reader_preserve_order() {
        use std::sync::Arc;
        use std::thread;

        let buf = Arc::new(CircularAudioBuffer::with_capacity(1 << 20).unwrap());
        let writer = {
            let buf = Arc::clone(&buf);
            thread::spawn(move || {
                for i in 0..1000u32 {
                    buf.write(&i.to_le_bytes());
                }
            })
        };

        let mut received = Vec::new();
        while received.len() < 4000 {
            received.extend(buf.read(256));
        }
        writer.join().unwrap();

        for (i, chunk) in received.chunks(4).enumerate() {
            assert_eq!(u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]), i as u32);
        }
    }
}
