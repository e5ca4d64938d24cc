//! In-process serial bus for testing.
//!
//! `MockBus` implements `DeviceOpener`, so a `PortChannel` can run its real
//! receive thread and write path against simulated endpoints without any
//! hardware. Each endpoint is exclusive: a second open while a handle is alive
//! fails with `PortError::InUse`, like a COM port opened without sharing.

use super::error::PortError;
use super::traits::{DeviceOpener, EndpointConfig, InterruptHandle, ModemStatus, SerialDevice};
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// State of one simulated line, shared by every handle onto it.
#[derive(Debug, Default)]
struct LineState {
    /// Chunks waiting to be read, boundaries preserved.
    incoming: VecDeque<Vec<u8>>,
    /// Error returned by the next read instead of data.
    read_failure: Option<io::ErrorKind>,
    /// Every successful write, one entry per call.
    write_log: Vec<Vec<u8>>,
    /// When set, writes make no progress and report a timed-out slice.
    stall_writes: bool,
    modem: ModemStatus,
    rts: bool,
    dtr: bool,
    /// Pending wake-up for a blocked read.
    interrupted: bool,
    /// Make the next `try_clone_device` fail.
    fail_clone: bool,
    /// Reads return `Ok(0)` immediately, like a tty whose device went away.
    hung_up: bool,
    read_calls: usize,
    /// Held while any device handle onto the line is alive.
    claimed: bool,
    open_count: usize,
    last_config: Option<EndpointConfig>,
}

#[derive(Debug, Default)]
struct Line {
    state: Mutex<LineState>,
    readable: Condvar,
}

/// Test-side handle onto one simulated endpoint.
#[derive(Debug, Clone)]
pub struct MockEndpoint {
    name: String,
    line: Arc<Line>,
}

impl MockEndpoint {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue one chunk for the reader. It is delivered as a single read when
    /// the reader's buffer is large enough.
    pub fn inject(&self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        let mut state = self.line.state.lock();
        state.incoming.push_back(data.to_vec());
        self.line.readable.notify_all();
    }

    /// Make the next read fail with `kind`.
    pub fn fail_next_read(&self, kind: io::ErrorKind) {
        let mut state = self.line.state.lock();
        state.read_failure = Some(kind);
        self.line.readable.notify_all();
    }

    /// Stop (or resume) accepting written bytes.
    pub fn stall_writes(&self, stalled: bool) {
        self.line.state.lock().stall_writes = stalled;
    }

    /// Make every read return zero bytes at once (or stop doing so).
    pub fn set_hung_up(&self, hung_up: bool) {
        let mut state = self.line.state.lock();
        state.hung_up = hung_up;
        self.line.readable.notify_all();
    }

    /// Number of `read_bytes` calls made on the line so far.
    pub fn read_calls(&self) -> usize {
        self.line.state.lock().read_calls
    }

    /// Make the next `try_clone_device` fail, to exercise open unwinding.
    pub fn fail_next_clone(&self) {
        self.line.state.lock().fail_clone = true;
    }

    pub fn set_modem_status(&self, modem: ModemStatus) {
        self.line.state.lock().modem = modem;
    }

    /// Every write that reached the line, one entry per call.
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.line.state.lock().write_log.clone()
    }

    pub fn rts(&self) -> bool {
        self.line.state.lock().rts
    }

    pub fn dtr(&self) -> bool {
        self.line.state.lock().dtr
    }

    /// True while some device handle still holds the line open.
    pub fn is_claimed(&self) -> bool {
        self.line.state.lock().claimed
    }

    /// How many times the line was opened successfully.
    pub fn open_count(&self) -> usize {
        self.line.state.lock().open_count
    }

    pub fn last_config(&self) -> Option<EndpointConfig> {
        self.line.state.lock().last_config.clone()
    }
}

/// A set of simulated endpoints addressable by name.
#[derive(Debug, Clone, Default)]
pub struct MockBus {
    lines: Arc<Mutex<HashMap<String, Arc<Line>>>>,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an endpoint, or return the existing one with that name.
    pub fn add_endpoint(&self, name: impl Into<String>) -> MockEndpoint {
        let name = name.into();
        let line = self
            .lines
            .lock()
            .entry(name.clone())
            .or_default()
            .clone();
        MockEndpoint { name, line }
    }

    pub fn endpoint(&self, name: &str) -> Option<MockEndpoint> {
        self.lines.lock().get(name).map(|line| MockEndpoint {
            name: name.to_string(),
            line: Arc::clone(line),
        })
    }
}

impl DeviceOpener for MockBus {
    fn open(
        &self,
        config: &EndpointConfig,
        poll_interval: Duration,
    ) -> Result<Box<dyn SerialDevice>, PortError> {
        let line = self
            .lines
            .lock()
            .get(&config.address)
            .cloned()
            .ok_or_else(|| PortError::not_found(&config.address))?;

        {
            let mut state = line.state.lock();
            if state.claimed {
                return Err(PortError::InUse(config.address.clone()));
            }
            state.claimed = true;
            state.open_count += 1;
            state.rts = config.rts;
            state.dtr = config.dtr;
            state.interrupted = false;
            state.last_config = Some(config.clone());
        }

        Ok(Box::new(MockDevice {
            name: config.address.clone(),
            claim: Arc::new(Claim {
                line: Arc::clone(&line),
            }),
            line,
            poll_interval,
        }))
    }
}

/// Releases the line when the last handle onto it is dropped.
#[derive(Debug)]
struct Claim {
    line: Arc<Line>,
}

impl Drop for Claim {
    fn drop(&mut self) {
        let mut state = self.line.state.lock();
        state.claimed = false;
        state.interrupted = false;
    }
}

/// A device handle produced by `MockBus`.
#[derive(Debug)]
pub struct MockDevice {
    name: String,
    line: Arc<Line>,
    claim: Arc<Claim>,
    poll_interval: Duration,
}

impl SerialDevice for MockDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        let deadline = Instant::now() + self.poll_interval;
        let mut state = self.line.state.lock();
        state.read_calls += 1;
        loop {
            if let Some(kind) = state.read_failure.take() {
                return Err(PortError::Io(io::Error::new(kind, "injected read failure")));
            }
            if state.interrupted {
                state.interrupted = false;
                return Err(PortError::Io(io::Error::new(
                    io::ErrorKind::Interrupted,
                    "read cancelled",
                )));
            }
            if state.hung_up {
                return Ok(0);
            }
            if let Some(mut chunk) = state.incoming.pop_front() {
                let n = chunk.len().min(buffer.len());
                buffer[..n].copy_from_slice(&chunk[..n]);
                if n < chunk.len() {
                    state.incoming.push_front(chunk.split_off(n));
                }
                return Ok(n);
            }
            if self
                .line
                .readable
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return Err(PortError::Io(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "no data within poll interval",
                )));
            }
        }
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError> {
        let stalled = self.line.state.lock().stall_writes;
        if stalled {
            std::thread::sleep(self.poll_interval);
            return Err(PortError::Io(io::Error::new(
                io::ErrorKind::TimedOut,
                "write stalled",
            )));
        }
        self.line.state.lock().write_log.push(data.to_vec());
        Ok(data.len())
    }

    fn modem_status(&mut self) -> Result<ModemStatus, PortError> {
        Ok(self.line.state.lock().modem)
    }

    fn set_rts(&mut self, level: bool) -> Result<(), PortError> {
        self.line.state.lock().rts = level;
        Ok(())
    }

    fn set_dtr(&mut self, level: bool) -> Result<(), PortError> {
        self.line.state.lock().dtr = level;
        Ok(())
    }

    fn try_clone_device(&self) -> Result<Box<dyn SerialDevice>, PortError> {
        let mut state = self.line.state.lock();
        if state.fail_clone {
            state.fail_clone = false;
            return Err(PortError::Io(io::Error::other("injected clone failure")));
        }
        drop(state);
        Ok(Box::new(Self {
            name: self.name.clone(),
            line: Arc::clone(&self.line),
            claim: Arc::clone(&self.claim),
            poll_interval: self.poll_interval,
        }))
    }

    fn interrupt_handle(&self) -> Option<InterruptHandle> {
        let line = Arc::clone(&self.line);
        Some(Arc::new(move || {
            let mut state = line.state.lock();
            state.interrupted = true;
            line.readable.notify_all();
        }))
    }
}
