//! Shared test utilities for comlink integration tests.
//!
//! This module provides common test infrastructure including:
//! - Channels wired to an in-process `MockBus`
//! - Callback collectors that forward chunks over an mpsc channel
//! - Polling helpers for conditions reached on the receive thread

#![allow(dead_code)]

use comlink::port::{ChannelOptions, MockBus, MockEndpoint, PortChannel};
use comlink::EndpointConfig;
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// How long a test waits for something the receive thread should do.
pub const RECV_WAIT: Duration = Duration::from_secs(2);

/// Short timeouts so failure paths finish quickly.
pub fn fast_options() -> ChannelOptions {
    ChannelOptions {
        write_timeout: Duration::from_millis(200),
        close_timeout: Duration::from_millis(500),
        poll_interval: Duration::from_millis(10),
        scratch_size: 64,
    }
}

/// A bus with the given endpoints registered.
pub fn bus_with(names: &[&str]) -> MockBus {
    let bus = MockBus::new();
    for name in names {
        bus.add_endpoint(*name);
    }
    bus
}

/// A channel over `bus` using `fast_options`.
pub fn channel_on(bus: &MockBus) -> Arc<PortChannel> {
    Arc::new(PortChannel::with_opener(Arc::new(bus.clone()), fast_options()))
}

/// One channel plus the endpoint it will open.
pub fn mock_channel(name: &str) -> (Arc<PortChannel>, MockEndpoint) {
    let bus = bus_with(&[name]);
    let endpoint = bus.endpoint(name).expect("endpoint registered");
    (channel_on(&bus), endpoint)
}

pub fn endpoint_config(name: &str) -> EndpointConfig {
    EndpointConfig::new(name, 115200)
}

/// Install a callback that forwards every chunk to the returned receiver.
pub fn collect_chunks(channel: &PortChannel) -> Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    channel.set_data_callback(move |chunk| {
        let _ = tx.send(chunk);
    });
    rx
}

/// Receive chunks until `expected_len` bytes have arrived, then concatenate.
pub fn recv_bytes(rx: &Receiver<Vec<u8>>, expected_len: usize) -> Vec<u8> {
    let mut out = Vec::new();
    while out.len() < expected_len {
        let chunk = rx
            .recv_timeout(RECV_WAIT)
            .unwrap_or_else(|_| panic!("timed out after {} of {expected_len} bytes", out.len()));
        out.extend_from_slice(&chunk);
    }
    out
}

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}
