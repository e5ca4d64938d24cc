//! Fixed-capacity byte FIFO that drops its oldest bytes on overflow.
//!
//! Writers never see "full": once `capacity` bytes are buffered, each new byte
//! evicts the oldest one, so under sustained overflow only the most recent
//! `capacity` bytes survive. Every call runs under one lock.

use parking_lot::Mutex;
use thiserror::Error;

/// Capacity used by `CircularBuffer::default()`.
pub const DEFAULT_CAPACITY: usize = 64 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BufferError {
    #[error("Buffer capacity must be greater than zero")]
    ZeroCapacity,

    #[error("Refusing to write an empty slice")]
    EmptyWrite,
}

#[derive(Debug)]
struct Ring {
    data: Box<[u8]>,
    /// Next slot to write.
    head: usize,
    /// Oldest buffered byte.
    tail: usize,
    len: usize,
}

impl Ring {
    fn push(&mut self, byte: u8) {
        let capacity = self.data.len();
        if self.len == capacity {
            self.discard_oldest();
        }
        self.data[self.head] = byte;
        self.head = (self.head + 1) % capacity;
        self.len += 1;
    }

    fn discard_oldest(&mut self) {
        if self.len > 0 {
            self.tail = (self.tail + 1) % self.data.len();
            self.len -= 1;
        }
    }

    /// Copy out up to `out.len()` bytes starting at the tail; returns the new tail.
    fn copy_out(&self, out: &mut [u8]) -> (usize, usize) {
        let capacity = self.data.len();
        let count = out.len().min(self.len);
        let first = count.min(capacity - self.tail);
        out[..first].copy_from_slice(&self.data[self.tail..self.tail + first]);
        out[first..count].copy_from_slice(&self.data[..count - first]);
        (count, (self.tail + count) % capacity)
    }
}

/// Lock-protected circular byte buffer with oldest-first eviction.
#[derive(Debug)]
pub struct CircularBuffer {
    ring: Mutex<Ring>,
}

impl CircularBuffer {
    pub fn new(capacity: usize) -> Result<Self, BufferError> {
        if capacity == 0 {
            return Err(BufferError::ZeroCapacity);
        }
        Ok(Self {
            ring: Mutex::new(Ring {
                data: vec![0u8; capacity].into_boxed_slice(),
                head: 0,
                tail: 0,
                len: 0,
            }),
        })
    }

    /// Append `data`, evicting the oldest bytes as needed.
    ///
    /// Only an empty slice is rejected; capacity never causes a failure.
    pub fn write(&self, data: &[u8]) -> Result<(), BufferError> {
        if data.is_empty() {
            return Err(BufferError::EmptyWrite);
        }
        let mut ring = self.ring.lock();
        for &byte in data {
            ring.push(byte);
        }
        Ok(())
    }

    /// Move up to `out.len()` of the oldest bytes into `out`. Returns 0 when empty.
    pub fn read(&self, out: &mut [u8]) -> usize {
        let mut ring = self.ring.lock();
        let (count, tail) = ring.copy_out(out);
        ring.tail = tail;
        ring.len -= count;
        count
    }

    /// Like `read`, but leaves the bytes in place.
    pub fn peek(&self, out: &mut [u8]) -> usize {
        self.ring.lock().copy_out(out).0
    }

    /// Drop the single oldest byte, if any.
    pub fn discard_oldest(&self) {
        self.ring.lock().discard_oldest();
    }

    pub fn clear(&self) {
        let mut ring = self.ring.lock();
        ring.head = 0;
        ring.tail = 0;
        ring.len = 0;
    }

    pub fn len(&self) -> usize {
        self.ring.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.ring.lock().data.len()
    }
}

impl Default for CircularBuffer {
    fn default() -> Self {
        Self {
            ring: Mutex::new(Ring {
                data: vec![0u8; DEFAULT_CAPACITY].into_boxed_slice(),
                head: 0,
                tail: 0,
                len: 0,
            }),
        }
    }
}
