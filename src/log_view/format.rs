//! Turning traffic into display lines.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// RGB text color attached to each log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// 24-bit ANSI foreground escape for terminals.
    pub fn ansi_fg(&self) -> String {
        format!("\x1b[38;2;{};{};{}m", self.r, self.g, self.b)
    }
}

/// What a log line describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogKind {
    Rx,
    Tx,
    System,
    Error,
}

impl LogKind {
    pub fn color(self) -> Color {
        match self {
            LogKind::Rx => Color::rgb(50, 150, 50),
            LogKind::Tx => Color::rgb(30, 90, 200),
            LogKind::System => Color::rgb(120, 120, 120),
            LogKind::Error => Color::rgb(180, 40, 40),
        }
    }
}

/// How received bytes are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RxMode {
    Text,
    #[default]
    Hex,
}

/// `[HH:MM:SS.mmm] text` terminated with CRLF, stamped with `at`.
pub fn format_line(at: DateTime<Local>, text: &str) -> String {
    format!("[{}] {}\r\n", at.format("%H:%M:%S%.3f"), text)
}

/// Uppercase hex pairs separated by single spaces: `0A FF 10`.
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, byte) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{byte:02X}");
    }
    out
}

/// Render a received chunk. Text mode decodes UTF-8, replacing invalid
/// sequences, and drops trailing line breaks so the line formatter owns them.
pub fn format_incoming(bytes: &[u8], mode: RxMode) -> String {
    match mode {
        RxMode::Hex => bytes_to_hex(bytes),
        RxMode::Text => {
            let end = bytes
                .iter()
                .rposition(|&b| b != b'\r' && b != b'\n')
                .map_or(0, |i| i + 1);
            String::from_utf8_lossy(&bytes[..end]).into_owned()
        }
    }
}
