//! Sensor log acquisition module
//!
//! Turns raw rig-log text into a registered, channel-indexed frame.
//!
//! ## Architecture
//!
//! - `LogParser`: locates the header, detects delimiter and decimal
//!   separator, and produces a `RawLog` table with gaps for missing tokens
//! - `ChannelRegistry`: maps header cells to typed `ChannelId`s, checks the
//!   time axis and infers per-channel sample rates into a `TimeSeriesFrame`

pub mod log_parser;
pub mod registry;

pub use log_parser::{DecimalSeparator, Delimiter, LogParser, RawLog};
pub use registry::{normalize_unit, ChannelRegistry};

use thiserror::Error;

/// Errors that make a log unusable. The file is rejected and no report is produced.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Malformed log at line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    #[error("Unsupported log format: {0}")]
    UnsupportedFormat(String),

    #[error("Duplicate channel after normalization: {0}")]
    DuplicateChannel(String),

    #[error("Timestamps not strictly increasing in channel {channel} at line {line}")]
    NonMonotonicTimestamps { channel: String, line: usize },

    #[error("Invalid header pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
