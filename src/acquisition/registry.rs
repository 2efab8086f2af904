//! Channel registry: typed channel identities and sample-rate inference.
//!
//! Header cells such as `Pressure [bar]`, `TempSaug (°C)` or `Speed[1/min]`
//! become `ChannelId { name, unit }` with the unit mapped through a small
//! alias table. The first column must be the time axis. Every value column
//! shares that axis, so the sample rate is inferred once per file from the
//! median timestamp delta.

use chrono::{DateTime, Utc};
use regex::Regex;
use statrs::statistics::{Data, Median, Statistics};
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use super::{ParseError, RawLog};
use crate::config::RegistryConfig;
use crate::types::{Channel, ChannelId, TimeSeriesFrame};

/// Maps raw header cells to channels and builds the frame.
pub struct ChannelRegistry {
    irregular_cv_threshold: f64,
    selection: Vec<String>,
    cell_pattern: Regex,
}

impl ChannelRegistry {
    pub fn new(config: &RegistryConfig) -> Result<Self, ParseError> {
        Ok(Self {
            irregular_cv_threshold: config.irregular_cv_threshold,
            selection: config
                .channels
                .iter()
                .map(|c| normalize_name(c).to_lowercase())
                .collect(),
            cell_pattern: Regex::new(r"^(?P<name>.*?)\s*[\[\(](?P<unit>[^\]\)]*)[\]\)]\s*$")?,
        })
    }

    /// Split a header cell into a normalized name and canonical unit.
    pub fn identify(&self, cell: &str) -> ChannelId {
        let cell = cell.trim();
        match self.cell_pattern.captures(cell) {
            Some(caps) => {
                let name = caps.name("name").map_or("", |m| m.as_str());
                let unit = caps.name("unit").map_or("", |m| m.as_str());
                ChannelId {
                    name: normalize_name(name),
                    unit: normalize_unit(unit),
                }
            }
            None => ChannelId {
                name: normalize_name(cell),
                unit: None,
            },
        }
    }

    /// Register the columns of a parsed log into a frame.
    ///
    /// Rejects logs whose first column is not a time axis, whose timestamps
    /// are not strictly increasing, or whose channel names collide after
    /// normalization.
    pub fn register(
        &self,
        raw: RawLog,
        source: Option<PathBuf>,
        recorded_at: Option<DateTime<Utc>>,
    ) -> Result<TimeSeriesFrame, ParseError> {
        let time_id = self.identify(&raw.headers[0]);
        let scale = time_scale(&time_id).ok_or_else(|| {
            ParseError::UnsupportedFormat(format!(
                "first column '{}' is not a recognised time axis",
                raw.headers[0]
            ))
        })?;

        if raw.times.len() < 2 {
            return Err(ParseError::Malformed {
                line: raw.row_lines.first().copied().unwrap_or(raw.header_line + 1),
                reason: "need at least two timestamped rows to infer a sample rate".to_string(),
            });
        }

        let times: Vec<f64> = raw.times.iter().map(|t| t * scale).collect();
        if let Some(i) = times.windows(2).position(|w| w[1] <= w[0]) {
            return Err(ParseError::NonMonotonicTimestamps {
                channel: time_id.to_string(),
                line: raw.row_lines[i + 1],
            });
        }

        let (sample_rate_hz, cv) = infer_sampling(&times);
        let irregular = cv > self.irregular_cv_threshold;
        if irregular {
            warn!(
                cv = cv,
                threshold = self.irregular_cv_threshold,
                "Irregular sample spacing, channels will be resampled before windowing"
            );
        }

        // Identify every value column and reject collisions before selection
        let mut seen = HashSet::new();
        let mut ids = Vec::with_capacity(raw.columns.len());
        for (i, cell) in raw.headers.iter().enumerate().skip(1) {
            let id = self.identify(cell);
            if id.name.is_empty() {
                return Err(ParseError::UnsupportedFormat(format!(
                    "column {} ('{}') has no channel name",
                    i + 1,
                    cell
                )));
            }
            if !seen.insert(id.key()) {
                return Err(ParseError::DuplicateChannel(id.name));
            }
            ids.push(id);
        }

        for wanted in &self.selection {
            if !seen.contains(wanted) {
                return Err(ParseError::UnsupportedFormat(format!(
                    "requested channel '{wanted}' not present in log"
                )));
            }
        }

        let channels: Vec<Channel> = ids
            .into_iter()
            .zip(raw.columns)
            .filter(|(id, _)| self.selection.is_empty() || self.selection.contains(&id.key()))
            .map(|(id, values)| Channel {
                id,
                sample_rate_hz,
                irregular,
                timestamps: times.clone(),
                values,
            })
            .collect();

        for channel in &channels {
            debug!(
                channel = %channel.id,
                samples = channel.len(),
                gaps = channel.missing_count(),
                "Registered channel"
            );
        }

        let duration_s = times.last().copied().unwrap_or(0.0) - times[0];
        info!(
            channels = channels.len(),
            sample_rate_hz = sample_rate_hz,
            duration_s = duration_s,
            "Log registered"
        );

        Ok(TimeSeriesFrame::new(
            source,
            channels,
            duration_s,
            recorded_at,
            raw.malformed_rows,
        ))
    }
}

// ============================================================================
// Normalization
// ============================================================================

/// Trim and collapse inner whitespace.
fn normalize_name(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Map a raw unit string to its canonical spelling. Unknown units pass
/// through trimmed; an empty unit is `None`.
pub fn normalize_unit(raw: &str) -> Option<String> {
    let unit = normalize_name(raw);
    if unit.is_empty() {
        return None;
    }
    let canonical = match unit.to_lowercase().as_str() {
        "l/min" | "lpm" | "l/mn" => "L/min",
        "°c" | "degc" | "deg c" | "grad c" | "° c" => "°C",
        "rpm" | "1/min" | "u/min" | "min-1" | "min^-1" => "rpm",
        "nm" | "n·m" | "n*m" | "n m" => "Nm",
        "bar" => "bar",
        "mbar" => "mbar",
        "s" | "sec" => "s",
        "ms" => "ms",
        "min" => "min",
        "h" => "h",
        "hz" => "Hz",
        "kw" => "kW",
        "v" => "V",
        "a" => "A",
        _ => return Some(unit),
    };
    Some(canonical.to_string())
}

/// Seconds per unit of the time column, `None` if the column is not time.
fn time_scale(id: &ChannelId) -> Option<f64> {
    let name = id.name.to_lowercase();
    let is_time = name == "t"
        || name.contains("time")
        || name.contains("zeit")
        || name.contains("timestamp");
    if !is_time {
        return None;
    }
    match id.unit.as_deref() {
        None | Some("s") => Some(1.0),
        Some("ms") => Some(1e-3),
        Some("min") => Some(60.0),
        Some("h") => Some(3600.0),
        Some(_) => None,
    }
}

/// `(sample_rate_hz, coefficient_of_variation)` of the timestamp deltas.
fn infer_sampling(times: &[f64]) -> (f64, f64) {
    let deltas: Vec<f64> = times.windows(2).map(|w| w[1] - w[0]).collect();
    let median = Data::new(deltas.clone()).median();
    let mean = deltas.iter().mean();
    let cv = if deltas.len() > 1 && mean > 0.0 {
        deltas.iter().std_dev() / mean
    } else {
        0.0
    };
    (1.0 / median, cv)
}
