//! Interactive monitor: channel -> staging buffer -> formatter -> log ring -> terminal.

use chrono::Local;
use comlink::log_view::{bytes_to_hex, format_incoming, format_line, LogKind, LogRing, RxMode};
use comlink::{AppResult, CircularBuffer, Config, EndpointConfig, PortChannel};
use parking_lot::Mutex;
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Settings for one monitor session after CLI overrides are applied.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub endpoint: EndpointConfig,
    pub rx_mode: RxMode,
    pub save_log: bool,
    pub log_dir: PathBuf,
}

impl MonitorSettings {
    pub fn from_config(config: &Config, port: &str) -> Self {
        Self {
            endpoint: config.serial.endpoint(port),
            rx_mode: config.log_view.rx_mode,
            save_log: config.log_view.save_to_disk,
            log_dir: config.log_view.directory.clone(),
        }
    }
}

/// Splits received bytes into display lines.
///
/// Hex mode renders whatever arrived as one line. Text mode holds bytes back
/// until a line feed completes the line.
#[derive(Debug)]
struct RxDecoder {
    mode: RxMode,
    pending: Vec<u8>,
}

impl RxDecoder {
    fn new(mode: RxMode) -> Self {
        Self {
            mode,
            pending: Vec::new(),
        }
    }

    fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        match self.mode {
            RxMode::Hex => vec![format_incoming(bytes, RxMode::Hex)],
            RxMode::Text => {
                self.pending.extend_from_slice(bytes);
                let mut lines = Vec::new();
                let mut start = 0;
                for end in memchr::memchr_iter(b'\n', &self.pending) {
                    lines.push(format_incoming(&self.pending[start..=end], RxMode::Text));
                    start = end + 1;
                }
                self.pending.drain(..start);
                lines
            }
        }
    }

    /// Whatever is left without a line ending.
    fn flush(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(format_incoming(&rest, self.mode))
    }
}

fn rx_line(decoded: &str) -> String {
    format!("RX {decoded}")
}

/// Sent bytes are always shown as hex, whatever the receive mode.
fn tx_line(payload: &[u8]) -> String {
    format!("TX {}", bytes_to_hex(payload))
}

/// Appends lines to the ring and mirrors them on stdout.
struct Console {
    ring: LogRing,
    persist: bool,
    staging: CircularBuffer,
    decoder: Mutex<RxDecoder>,
}

impl Console {
    fn emit(&self, kind: LogKind, text: &str) {
        let line = format_line(Local::now(), text);
        let color = kind.color();
        if let Err(e) = self.ring.append_line(&line, color, self.persist) {
            warn!(error = %e, "line not saved to session log");
        }

        let mut stdout = std::io::stdout().lock();
        if self.ring.should_rewrite() {
            // Rebuild the whole view from the bounded snapshot.
            let _ = write!(stdout, "\x1b[2J\x1b[H");
            for buffered in self.ring.snapshot() {
                let _ = writeln!(
                    stdout,
                    "{}{}\x1b[0m",
                    buffered.color.ansi_fg(),
                    buffered.text.trim_end()
                );
            }
            self.ring.mark_rewrite_done();
        } else {
            let _ = writeln!(stdout, "{}{}\x1b[0m", color.ansi_fg(), line.trim_end());
        }
        let _ = stdout.flush();
    }

    /// Move everything staged by the receive thread onto the display.
    fn drain_rx(&self) {
        let mut scratch = vec![0u8; self.staging.capacity()];
        loop {
            let n = self.staging.read(&mut scratch);
            if n == 0 {
                break;
            }
            let lines = self.decoder.lock().feed(&scratch[..n]);
            for line in lines {
                self.emit(LogKind::Rx, &rx_line(&line));
            }
        }
    }

    fn finish_rx(&self) {
        self.drain_rx();
        let rest = self.decoder.lock().flush();
        if let Some(rest) = rest {
            self.emit(LogKind::Rx, &rx_line(&rest));
        }
    }
}

/// Run until `shutdown` resolves. The channel is closed before returning.
pub async fn run(
    config: &Config,
    settings: MonitorSettings,
    shutdown: impl std::future::Future<Output = ()>,
) -> AppResult<()> {
    let ring = LogRing::new(config.log_view.limits());
    if settings.save_log {
        let path = ring.initialize(&settings.log_dir)?;
        eprintln!("Saving session to {}", path.display());
    }
    let console = Arc::new(Console {
        ring,
        persist: settings.save_log,
        staging: CircularBuffer::new(config.buffer.capacity)?,
        decoder: Mutex::new(RxDecoder::new(settings.rx_mode)),
    });
    let wake = Arc::new(Notify::new());

    let channel = Arc::new(PortChannel::with_opener(
        Arc::new(comlink::NativeOpener),
        config.transport.channel_options(),
    ));
    {
        let console = Arc::clone(&console);
        let wake = Arc::clone(&wake);
        channel.set_data_callback(move |chunk| {
            // Overflow drops the oldest staged bytes, never blocks the reader.
            if console.staging.write(&chunk).is_ok() {
                wake.notify_one();
            }
        });
    }

    if let Err(e) = channel.open(&settings.endpoint) {
        let address = &settings.endpoint.address;
        console.emit(LogKind::Error, &format!("Failed to open {address}: {e}"));
        return Err(e.into());
    }
    console.emit(
        LogKind::System,
        &format!(
            "Opened {} at {} baud",
            settings.endpoint.address, settings.endpoint.baud_rate
        ),
    );

    let display = spawn_display(Arc::clone(&console), Arc::clone(&wake));
    let input = tokio::spawn(send_stdin(Arc::clone(&channel), Arc::clone(&console)));

    shutdown.await;
    input.abort();

    let closing = Arc::clone(&channel);
    if tokio::task::spawn_blocking(move || closing.close()).await.is_err() {
        warn!("close task failed");
    }
    stop_display(display, &console).await;

    let stats = channel.stats();
    console.emit(
        LogKind::System,
        &format!(
            "Closed {} (rx {} bytes, tx {} bytes)",
            settings.endpoint.address, stats.bytes_received, stats.bytes_sent
        ),
    );
    Ok(())
}

fn spawn_display(console: Arc<Console>, wake: Arc<Notify>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            wake.notified().await;
            console.drain_rx();
        }
    })
}

/// Cancel the display task and print whatever it had not drained yet.
async fn stop_display(display: JoinHandle<()>, console: &Console) {
    display.abort();
    // A drain already running on another worker finishes before the final flush.
    let _ = display.await;
    console.finish_rx();
}

/// Send each stdin line as typed, without a line terminator, until stdin closes.
async fn send_stdin(channel: Arc<PortChannel>, console: Arc<Console>) {
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "stdin read failed");
                break;
            }
        };
        if line.is_empty() {
            continue;
        }
        let payload = line.into_bytes();
        let shown = tx_line(&payload);

        let writer = Arc::clone(&channel);
        let result = tokio::task::spawn_blocking(move || writer.write(&payload)).await;
        match result {
            Ok(Ok(sent)) => {
                debug!(bytes = sent, "sent");
                console.emit(LogKind::Tx, &shown);
            }
            Ok(Err(e)) => console.emit(LogKind::Error, &format!("Send failed: {e}")),
            Err(e) => warn!(error = %e, "write task failed"),
        }
    }
    debug!("stdin closed");
}
