//! The serial channel: one open connection plus its background receive loop.
//!
//! A `PortChannel` owns at most one [`Connection`]. Opening starts exactly one
//! receive thread that hands every chunk it reads to the installed data
//! callback; closing stops it with a bounded wait so teardown never hangs.

use super::error::PortError;
use super::signal::Signals;
use super::sync_port::NativeOpener;
use super::traits::{DeviceOpener, EndpointConfig, InterruptHandle, ModemStatus, SerialDevice};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Receives each chunk read from the device, on the receive thread.
pub type DataCallback = Arc<dyn Fn(Vec<u8>) + Send + Sync>;

type CallbackSlot = Arc<RwLock<Option<DataCallback>>>;

pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_millis(3000);
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_millis(3000);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);
pub const DEFAULT_SCRATCH_SIZE: usize = 1024;

/// Timing and sizing knobs for a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelOptions {
    /// Upper bound for one `write` call.
    pub write_timeout: Duration,
    /// Upper bound for waiting on the receive thread during `close`.
    pub close_timeout: Duration,
    /// Upper bound for each individual device read or write.
    pub poll_interval: Duration,
    /// Receive scratch buffer size; the largest chunk a callback can see.
    pub scratch_size: usize,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            scratch_size: DEFAULT_SCRATCH_SIZE,
        }
    }
}

/// Traffic totals for the current connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub chunks_delivered: u64,
}

#[derive(Debug, Default)]
struct Counters {
    bytes_received: AtomicU64,
    bytes_sent: AtomicU64,
    chunks_delivered: AtomicU64,
}

impl Counters {
    fn reset(&self) {
        self.bytes_received.store(0, Ordering::Relaxed);
        self.bytes_sent.store(0, Ordering::Relaxed);
        self.chunks_delivered.store(0, Ordering::Relaxed);
    }
}

/// Everything one open connection owns. Released as a unit, exactly once.
struct Connection {
    address: String,
    device: Arc<Mutex<Box<dyn SerialDevice>>>,
    signals: Arc<Signals>,
    interrupt: Option<InterruptHandle>,
    receiver: Option<JoinHandle<()>>,
    receiver_id: ThreadId,
    close_timeout: Duration,
}

impl Connection {
    /// Stop the receive thread and drop the handles. Safe to call twice.
    fn release(&mut self) {
        let Some(receiver) = self.receiver.take() else {
            return;
        };

        self.signals.shutdown.set();
        if let Some(interrupt) = &self.interrupt {
            interrupt();
        }

        let deadline = Instant::now() + self.close_timeout;
        if thread::current().id() == self.receiver_id {
            // Closed from inside the data callback: the loop exits on its own
            // once the callback returns.
            debug!(port = %self.address, "close requested from receive thread");
            drop(receiver);
        } else if self.signals.receive_exited.wait_timeout(self.close_timeout) {
            if receiver.join().is_err() {
                warn!(port = %self.address, "receive thread panicked");
            }
        } else {
            warn!(
                port = %self.address,
                timeout_ms = self.close_timeout.as_millis() as u64,
                "receive thread did not stop in time, detaching"
            );
            drop(receiver);
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if !self.signals.send_idle.wait_timeout(remaining) {
            warn!(port = %self.address, "write still in flight at close");
        }
        info!(port = %self.address, "serial channel closed");
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.release();
    }
}

/// One serial connection with a background receive loop.
///
/// All methods take `&self`; share the channel behind an `Arc` when several
/// threads need it. `write` has no internal queue, so concurrent writers must
/// serialize themselves.
pub struct PortChannel {
    opener: Arc<dyn DeviceOpener>,
    options: ChannelOptions,
    running: Arc<AtomicBool>,
    device_valid: AtomicBool,
    connection: Mutex<Option<Connection>>,
    callback: CallbackSlot,
    counters: Arc<Counters>,
}

impl PortChannel {
    /// A channel over the operating system's serial ports.
    pub fn new() -> Self {
        Self::with_opener(Arc::new(NativeOpener), ChannelOptions::default())
    }

    /// A channel over any device backend, e.g. `MockBus` in tests.
    pub fn with_opener(opener: Arc<dyn DeviceOpener>, options: ChannelOptions) -> Self {
        Self {
            opener,
            options,
            running: Arc::new(AtomicBool::new(false)),
            device_valid: AtomicBool::new(false),
            connection: Mutex::new(None),
            callback: Arc::new(RwLock::new(None)),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn options(&self) -> &ChannelOptions {
        &self.options
    }

    /// Open `config.address` and start the receive loop.
    ///
    /// Any connection already open on this channel is closed first. On error
    /// everything acquired so far is released and the channel stays closed.
    pub fn open(&self, config: &EndpointConfig) -> Result<(), PortError> {
        config.validate()?;
        if self.options.scratch_size == 0 {
            return Err(PortError::invalid_config("receive buffer size is zero"));
        }
        self.close();

        let mut slot = self.connection.lock();
        if slot.is_some() {
            return Err(PortError::AlreadyOpen);
        }

        let device = self.opener.open(config, self.options.poll_interval)?;
        let reader = device.try_clone_device()?;
        let interrupt = device.interrupt_handle();
        let signals = Arc::new(Signals::new());

        self.counters.reset();
        self.running.store(true, Ordering::SeqCst);
        let receive = ReceiveLoop {
            reader,
            scratch: vec![0u8; self.options.scratch_size],
            poll_interval: self.options.poll_interval,
            running: Arc::clone(&self.running),
            signals: Arc::clone(&signals),
            callback: Arc::clone(&self.callback),
            counters: Arc::clone(&self.counters),
        };
        let spawned = thread::Builder::new()
            .name(format!("serial-rx {}", config.address))
            .spawn(move || receive.run());
        let receiver = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(PortError::Spawn(e));
            }
        };

        *slot = Some(Connection {
            address: config.address.clone(),
            receiver_id: receiver.thread().id(),
            device: Arc::new(Mutex::new(device)),
            signals,
            interrupt,
            receiver: Some(receiver),
            close_timeout: self.options.close_timeout,
        });
        self.device_valid.store(true, Ordering::SeqCst);

        info!(
            port = %config.address,
            baud = config.baud_rate,
            data_bits = u8::from(config.data_bits),
            parity = ?config.parity,
            stop_bits = ?config.stop_bits,
            flow_control = ?config.flow_control,
            "serial channel opened"
        );
        Ok(())
    }

    /// Stop the receive loop and release the connection.
    ///
    /// Idempotent, callable from any thread including the data callback, and
    /// bounded by `close_timeout` even if the receive thread is stuck.
    pub fn close(&self) {
        self.running.store(false, Ordering::SeqCst);
        let taken = {
            let mut slot = self.connection.lock();
            self.device_valid.store(false, Ordering::SeqCst);
            slot.take()
        };
        if let Some(mut connection) = taken {
            connection.release();
        }
    }

    /// Non-blocking: true between a successful `open` and the next `close`.
    pub fn is_open(&self) -> bool {
        self.running.load(Ordering::SeqCst) && self.device_valid.load(Ordering::SeqCst)
    }

    /// Address of the open endpoint, if any.
    pub fn address(&self) -> Option<String> {
        self.connection
            .lock()
            .as_ref()
            .map(|connection| connection.address.clone())
    }

    pub fn stats(&self) -> ChannelStats {
        ChannelStats {
            bytes_received: self.counters.bytes_received.load(Ordering::Relaxed),
            bytes_sent: self.counters.bytes_sent.load(Ordering::Relaxed),
            chunks_delivered: self.counters.chunks_delivered.load(Ordering::Relaxed),
        }
    }

    /// Send `data`, waiting at most `write_timeout` for the device to take it.
    ///
    /// Returns the number of bytes transferred. Fails with `Timeout` when the
    /// device stops accepting bytes and with `Shutdown` when the channel is
    /// closed mid-write. Nothing is retried after an error.
    pub fn write(&self, data: &[u8]) -> Result<usize, PortError> {
        if data.is_empty() {
            return Err(PortError::EmptyPayload);
        }
        let (device, signals) = self.active()?;

        signals.send_idle.reset();
        let result = self.write_until_done(&device, &signals, data);
        signals.send_idle.set();

        if let Ok(sent) = result {
            self.counters
                .bytes_sent
                .fetch_add(sent as u64, Ordering::Relaxed);
        }
        result
    }

    fn write_until_done(
        &self,
        device: &Mutex<Box<dyn SerialDevice>>,
        signals: &Signals,
        data: &[u8],
    ) -> Result<usize, PortError> {
        let timeout = self.options.write_timeout;
        let deadline = Instant::now() + timeout;
        let mut written = 0;

        while written < data.len() {
            if signals.shutdown.is_set() || !self.running.load(Ordering::SeqCst) {
                return Err(PortError::Shutdown);
            }
            if Instant::now() >= deadline {
                return Err(PortError::timeout(timeout));
            }
            match device.lock().write_bytes(&data[written..]) {
                Ok(n) => written += n,
                Err(e) if e.is_pending() => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(written)
    }

    /// Read CTS/DSR/RI/CD.
    pub fn modem_status(&self) -> Result<ModemStatus, PortError> {
        let (device, _) = self.active()?;
        let status = device.lock().modem_status();
        status
    }

    pub fn set_rts(&self, level: bool) -> Result<(), PortError> {
        let (device, _) = self.active()?;
        let result = device.lock().set_rts(level);
        result
    }

    pub fn set_dtr(&self, level: bool) -> Result<(), PortError> {
        let (device, _) = self.active()?;
        let result = device.lock().set_dtr(level);
        result
    }

    /// Install the callback that receives every chunk.
    ///
    /// Replaces any previous callback. A chunk already being delivered may
    /// still go to the old one.
    pub fn set_data_callback<F>(&self, callback: F)
    where
        F: Fn(Vec<u8>) + Send + Sync + 'static,
    {
        *self.callback.write() = Some(Arc::new(callback));
    }

    /// Remove the callback; chunks read afterwards are dropped.
    pub fn clear_data_callback(&self) {
        *self.callback.write() = None;
    }

    fn active(&self) -> Result<(Arc<Mutex<Box<dyn SerialDevice>>>, Arc<Signals>), PortError> {
        if !self.is_open() {
            return Err(PortError::NotOpen);
        }
        self.connection
            .lock()
            .as_ref()
            .map(|connection| {
                (
                    Arc::clone(&connection.device),
                    Arc::clone(&connection.signals),
                )
            })
            .ok_or(PortError::NotOpen)
    }
}

impl Default for PortChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PortChannel {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for PortChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortChannel")
            .field("opener", &self.opener)
            .field("open", &self.is_open())
            .field("options", &self.options)
            .finish()
    }
}

/// State moved onto the receive thread.
struct ReceiveLoop {
    reader: Box<dyn SerialDevice>,
    scratch: Vec<u8>,
    poll_interval: Duration,
    running: Arc<AtomicBool>,
    signals: Arc<Signals>,
    callback: CallbackSlot,
    counters: Arc<Counters>,
}

impl ReceiveLoop {
    fn run(mut self) {
        debug!(port = self.reader.name(), "receive loop started");
        loop {
            if !self.running.load(Ordering::SeqCst) || self.signals.shutdown.is_set() {
                break;
            }
            let n = match self.reader.read_bytes(&mut self.scratch) {
                Ok(n) => n,
                Err(e) if e.is_pending() => continue,
                Err(e) => {
                    warn!(port = self.reader.name(), error = %e, "receive loop stopped");
                    break;
                }
            };
            if n == 0 {
                // Hung-up ttys report EOF as empty reads; wait a slice instead of spinning.
                self.signals.shutdown.wait_timeout(self.poll_interval);
                continue;
            }
            // A read that raced with close is discarded.
            if self.signals.shutdown.is_set() {
                continue;
            }

            self.counters
                .bytes_received
                .fetch_add(n as u64, Ordering::Relaxed);
            let callback = self.callback.read().clone();
            if let Some(callback) = callback {
                self.counters.chunks_delivered.fetch_add(1, Ordering::Relaxed);
                callback(self.scratch[..n].to_vec());
            }
        }
        debug!(port = self.reader.name(), "receive loop exited");
        self.signals.receive_exited.set();
    }
}
