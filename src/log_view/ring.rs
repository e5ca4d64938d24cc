//! Bounded display-line history with rewrite thresholds and an optional session file.

use super::error::{LogError, LogResult};
use super::format::Color;
use chrono::Local;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// One buffered display line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub text: String,
    pub color: Color,
}

/// Size limits and rewrite thresholds for a `LogRing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingLimits {
    /// Lines kept in memory; older ones are evicted first.
    pub max_buffered_lines: usize,
    /// Lines displayed since the last rebuild that trigger a new one.
    pub rewrite_line_threshold: u64,
    /// Bytes of text displayed since the last rebuild that trigger a new one.
    pub rewrite_byte_threshold: usize,
}

impl Default for RingLimits {
    fn default() -> Self {
        Self {
            max_buffered_lines: 2000,
            rewrite_line_threshold: 5000,
            rewrite_byte_threshold: 5 * 1024 * 1024,
        }
    }
}

#[derive(Debug)]
struct SessionSink {
    path: PathBuf,
    file: File,
}

#[derive(Debug, Default)]
struct RingState {
    lines: VecDeque<LogLine>,
    buffered_bytes: usize,
    lines_since_rewrite: u64,
    bytes_since_rewrite: usize,
    sink: Option<SessionSink>,
}

/// Bounded, insertion-ordered display log.
///
/// Every appended line is displayed (counted and buffered); only lines appended
/// with `persist` are also written to the session file. Volumes are measured in
/// UTF-8 bytes of the line text.
#[derive(Debug)]
pub struct LogRing {
    limits: RingLimits,
    state: Mutex<RingState>,
}

impl LogRing {
    pub fn new(limits: RingLimits) -> Self {
        Self {
            limits,
            state: Mutex::new(RingState::default()),
        }
    }

    pub fn limits(&self) -> &RingLimits {
        &self.limits
    }

    /// Create the session file under `directory` and write the BOM.
    ///
    /// The file is named `log_YYYYMMDD_HHMMSS.txt` from the local clock, with a
    /// numeric suffix if that name is taken. Once a sink is open, later calls
    /// return its path without creating another file.
    pub fn initialize(&self, directory: impl AsRef<Path>) -> LogResult<PathBuf> {
        let mut state = self.state.lock();
        if let Some(sink) = &state.sink {
            return Ok(sink.path.clone());
        }

        let directory = directory.as_ref();
        std::fs::create_dir_all(directory).map_err(|source| LogError::CreateDir {
            path: directory.to_path_buf(),
            source,
        })?;

        let stem = Local::now().format("log_%Y%m%d_%H%M%S").to_string();
        let (path, mut file) = create_unique(directory, &stem)?;
        file.write_all(UTF8_BOM)
            .and_then(|_| file.flush())
            .map_err(|source| LogError::Write {
                path: path.clone(),
                source,
            })?;

        info!(path = %path.display(), "session log opened");
        state.sink = Some(SessionSink {
            path: path.clone(),
            file,
        });
        Ok(path)
    }

    /// Path of the session file, once `initialize` has succeeded.
    pub fn session_file_path(&self) -> Option<PathBuf> {
        self.state.lock().sink.as_ref().map(|sink| sink.path.clone())
    }

    /// Buffer and count `text`; with `persist`, also append it to disk.
    ///
    /// The in-memory entry is kept even when persisting fails, so a line can be
    /// displayed without being saved but never saved without being displayed.
    pub fn append_line(&self, text: &str, color: Color, persist: bool) -> LogResult<()> {
        let mut state = self.state.lock();

        state.lines.push_back(LogLine {
            text: text.to_string(),
            color,
        });
        state.buffered_bytes += text.len();
        while state.lines.len() > self.limits.max_buffered_lines {
            if let Some(evicted) = state.lines.pop_front() {
                state.buffered_bytes -= evicted.text.len();
            }
        }

        state.lines_since_rewrite += 1;
        state.bytes_since_rewrite += text.len();

        if !persist {
            return Ok(());
        }
        let sink = state.sink.as_mut().ok_or(LogError::SinkNotOpen)?;
        write_crlf_line(&mut sink.file, text).map_err(|source| LogError::Write {
            path: sink.path.clone(),
            source,
        })
    }

    /// True once either threshold has been reached since the last rebuild.
    pub fn should_rewrite(&self) -> bool {
        let state = self.state.lock();
        state.lines_since_rewrite >= self.limits.rewrite_line_threshold
            || state.bytes_since_rewrite >= self.limits.rewrite_byte_threshold
    }

    /// Copy of the buffered lines, oldest first.
    pub fn snapshot(&self) -> Vec<LogLine> {
        self.state.lock().lines.iter().cloned().collect()
    }

    /// Record that the display was rebuilt from a snapshot. The counters now
    /// describe what is visible, i.e. the buffered content.
    pub fn mark_rewrite_done(&self) {
        let mut state = self.state.lock();
        state.lines_since_rewrite = state.lines.len() as u64;
        state.bytes_since_rewrite = state.buffered_bytes;
        debug!(
            lines = state.lines_since_rewrite,
            bytes = state.bytes_since_rewrite,
            "display rebuilt"
        );
    }

    pub fn len(&self) -> usize {
        self.state.lock().lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// UTF-8 bytes of text currently buffered.
    pub fn buffered_bytes(&self) -> usize {
        self.state.lock().buffered_bytes
    }
}

impl Default for LogRing {
    fn default() -> Self {
        Self::new(RingLimits::default())
    }
}

fn create_unique(directory: &Path, stem: &str) -> LogResult<(PathBuf, File)> {
    let mut suffix = 0u32;
    loop {
        let name = if suffix == 0 {
            format!("{stem}.txt")
        } else {
            format!("{stem}_{suffix}.txt")
        };
        let path = directory.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => suffix += 1,
            Err(source) => return Err(LogError::Write { path, source }),
        }
    }
}

/// Write `text` with exactly one trailing CRLF and flush.
fn write_crlf_line(file: &mut File, text: &str) -> std::io::Result<()> {
    let body = text.trim_end_matches(['\r', '\n']);
    file.write_all(body.as_bytes())?;
    file.write_all(b"\r\n")?;
    file.flush()
}
