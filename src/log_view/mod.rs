//! Bounded display log with an optional append-only session file.
//!
//! `LogRing` keeps the most recent lines for a display to rebuild from and
//! tells it when an incremental view has grown enough to be worth rebuilding.
//! `format` turns raw traffic into the colored lines it stores.

mod error;
pub mod format;
mod ring;

pub use error::{LogError, LogResult};
pub use format::{bytes_to_hex, format_incoming, format_line, Color, LogKind, RxMode};
pub use ring::{LogLine, LogRing, RingLimits};
