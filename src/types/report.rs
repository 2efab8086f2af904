//! Scoring results and the file-level report handed to collaborators.
//!
//! Everything here is a plain nested structure: a report can be serialized,
//! stored and rendered without touching any pipeline stage again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{ChannelId, Window};

// ============================================================================
// Per-Window Results
// ============================================================================

/// Standardized deviation of a single feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureContribution {
    pub feature: String,
    pub index: usize,
    pub value: f64,
    /// (value - mean) / effective std
    pub z_score: f64,
}

/// Outcome of scoring one window of one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyResult {
    pub window: Window,
    pub channel: ChannelId,
    pub score: f64,
    pub is_anomaly: bool,
    /// Window had zero variance and was not scored
    pub degenerate: bool,
    /// Profile was stale when this window was scored
    pub stale_profile: bool,
    /// Top contributors ranked by absolute z-score
    pub contributions: Vec<FeatureContribution>,
}

impl AnomalyResult {
    /// Feature with the largest absolute deviation, if any.
    pub fn top_feature(&self) -> Option<&str> {
        self.contributions.first().map(|c| c.feature.as_str())
    }
}

// ============================================================================
// File Report
// ============================================================================

/// Overall classification of a file or channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Normal,
    Anomalous,
    /// No channel produced a scoreable window
    NoVerdict,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Normal => write!(f, "NORMAL"),
            Verdict::Anomalous => write!(f, "ANOMALOUS"),
            Verdict::NoVerdict => write!(f, "NO VERDICT"),
        }
    }
}

/// Per-channel counts and rates.
///
/// `anomaly_rate`, `max_score` and `verdict` stay `None` for channels that
/// produced no scored window (too short or entirely degenerate).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSummary {
    pub channel: ChannelId,
    pub windows_total: usize,
    pub windows_scored: usize,
    pub windows_degenerate: usize,
    pub windows_anomalous: usize,
    pub anomaly_rate: Option<f64>,
    pub max_score: Option<f64>,
    pub verdict: Option<Verdict>,
}

/// Baseline provenance recorded on every report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileInfo {
    pub trained_at: DateTime<Utc>,
    pub label: Option<String>,
    pub stale: bool,
}

/// Aggregated result for one scored log file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileReport {
    pub source: Option<String>,
    pub verdict: Verdict,
    pub duration_s: f64,
    pub windows_scored: usize,
    /// Worst results by score, highest first
    pub worst: Vec<AnomalyResult>,
    pub channels: Vec<ChannelSummary>,
    pub profile: ProfileInfo,
}

impl FileReport {
    pub fn channel_summary(&self, name: &str) -> Option<&ChannelSummary> {
        let key = name.trim().to_lowercase();
        self.channels.iter().find(|s| s.channel.key() == key)
    }
}
