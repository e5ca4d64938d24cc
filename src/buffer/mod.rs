//! Bounded raw-byte staging.

pub mod circular;

pub use circular::{BufferError, CircularBuffer, DEFAULT_CAPACITY};
