//! Channel identity and the registered time-series frame.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

// ============================================================================
// Channel Identity
// ============================================================================

/// Stable identifier for a sensor channel: normalized name plus physical unit.
///
/// `key()` is the case-insensitive name alone. Units are not part of the key;
/// profile lookup compares them separately, so `Pressure [bar]` and
/// `Pressure [mbar]` share a key but never a profile.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelId {
    /// Display name, whitespace-normalized (e.g. "Pressure")
    pub name: String,
    /// Canonical unit (e.g. "bar", "L/min", "°C"), `None` when the header had none
    pub unit: Option<String>,
}

impl ChannelId {
    pub fn new(name: impl Into<String>, unit: Option<&str>) -> Self {
        Self {
            name: name.into(),
            unit: unit.map(str::to_string),
        }
    }

    /// Case-insensitive lookup key used for duplicate detection and profile lookup.
    pub fn key(&self) -> String {
        self.name.to_lowercase()
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.unit {
            Some(unit) => write!(f, "{} [{}]", self.name, unit),
            None => write!(f, "{}", self.name),
        }
    }
}

// ============================================================================
// Channel
// ============================================================================

/// One sensor stream with its inferred sampling characteristics.
///
/// `timestamps` are strictly increasing seconds relative to the log's own
/// time axis. A `None` value marks a gap left by a missing or malformed token.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub id: ChannelId,
    /// Reciprocal of the median timestamp delta (Hz)
    pub sample_rate_hz: f64,
    /// Coefficient of variation of timestamp deltas exceeded the threshold;
    /// the channel is resampled before windowing
    pub irregular: bool,
    pub timestamps: Vec<f64>,
    pub values: Vec<Option<f64>>,
}

impl Channel {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of gap samples.
    pub fn missing_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_none()).count()
    }

    /// Iterate `(timestamp, value)` pairs in time order.
    pub fn samples(&self) -> impl Iterator<Item = (f64, Option<f64>)> + '_ {
        self.timestamps.iter().copied().zip(self.values.iter().copied())
    }
}

// ============================================================================
// Time Series Frame
// ============================================================================

/// Channel-indexed view of one parsed sensor log.
///
/// Built once by the channel registry and immutable afterwards; all
/// accessors hand out shared references.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesFrame {
    source: Option<PathBuf>,
    channels: Vec<Channel>,
    duration_s: f64,
    recorded_at: Option<DateTime<Utc>>,
    malformed_rows: usize,
}

impl TimeSeriesFrame {
    pub(crate) fn new(
        source: Option<PathBuf>,
        channels: Vec<Channel>,
        duration_s: f64,
        recorded_at: Option<DateTime<Utc>>,
        malformed_rows: usize,
    ) -> Self {
        Self {
            source,
            channels,
            duration_s,
            recorded_at,
            malformed_rows,
        }
    }

    /// Path the log was read from, if it came from disk.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Channels in header order.
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn channel(&self, id: &ChannelId) -> Option<&Channel> {
        self.channels.iter().find(|c| &c.id == id)
    }

    /// Case-insensitive lookup by channel name.
    pub fn channel_by_name(&self, name: &str) -> Option<&Channel> {
        let key = name.trim().to_lowercase();
        self.channels.iter().find(|c| c.id.key() == key)
    }

    /// Span between the first and last timestamp (seconds).
    pub fn duration_s(&self) -> f64 {
        self.duration_s
    }

    /// Wall-clock time the log was written (file modification time when known).
    pub fn recorded_at(&self) -> Option<DateTime<Utc>> {
        self.recorded_at
    }

    /// Rows that contained at least one malformed token.
    pub fn malformed_rows(&self) -> usize {
        self.malformed_rows
    }
}
