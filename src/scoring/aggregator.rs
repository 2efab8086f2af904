//! File-level aggregation of per-window results
//!
//! Counting and ranking only; no score is recomputed here.
//!
//! Verdict rules:
//! - a channel with no scored (non-degenerate) window has no verdict
//! - a channel is anomalous when any window is flagged, or, when
//!   `min_anomalous_fraction` is set, when at least that fraction of its
//!   scored windows is flagged
//! - the file is anomalous when any channel is, `NoVerdict` when no channel
//!   has a verdict, and normal otherwise

use std::cmp::Ordering;

use crate::config::ReportConfig;
use crate::types::{AnomalyResult, ChannelId, ChannelSummary, FileReport, ProfileInfo, Verdict};

pub struct ResultAggregator {
    top_n: usize,
    min_anomalous_fraction: Option<f64>,
}

impl ResultAggregator {
    pub fn new(config: &ReportConfig) -> Self {
        Self {
            top_n: config.top_n,
            min_anomalous_fraction: config.min_anomalous_fraction,
        }
    }

    /// Build the report for one file.
    ///
    /// `channels` lists every channel of the frame, including channels that
    /// produced no windows, so each one gets a summary row.
    pub fn aggregate(
        &self,
        channels: &[ChannelId],
        results: &[AnomalyResult],
        profile: ProfileInfo,
        source: Option<String>,
        duration_s: f64,
    ) -> FileReport {
        let summaries: Vec<ChannelSummary> = channels
            .iter()
            .map(|id| self.summarize(id, results))
            .collect();

        let verdict = if summaries.iter().all(|s| s.verdict.is_none()) {
            Verdict::NoVerdict
        } else if summaries.iter().any(|s| s.verdict == Some(Verdict::Anomalous)) {
            Verdict::Anomalous
        } else {
            Verdict::Normal
        };

        let mut worst: Vec<&AnomalyResult> = results.iter().filter(|r| !r.degenerate).collect();
        worst.sort_by(|a, b| rank(a, b));
        let worst: Vec<AnomalyResult> = worst.into_iter().take(self.top_n).cloned().collect();

        FileReport {
            source,
            verdict,
            duration_s,
            windows_scored: results.iter().filter(|r| !r.degenerate).count(),
            worst,
            channels: summaries,
            profile,
        }
    }

    fn summarize(&self, id: &ChannelId, results: &[AnomalyResult]) -> ChannelSummary {
        let own: Vec<&AnomalyResult> = results.iter().filter(|r| &r.channel == id).collect();
        let degenerate = own.iter().filter(|r| r.degenerate).count();
        let scored: Vec<&&AnomalyResult> = own.iter().filter(|r| !r.degenerate).collect();
        let anomalous = scored.iter().filter(|r| r.is_anomaly).count();

        let (anomaly_rate, max_score, verdict) = if scored.is_empty() {
            (None, None, None)
        } else {
            let rate = anomalous as f64 / scored.len() as f64;
            let max = scored.iter().map(|r| r.score).fold(f64::MIN, f64::max);
            let flagged = match self.min_anomalous_fraction {
                Some(fraction) => anomalous > 0 && rate >= fraction,
                None => anomalous > 0,
            };
            let verdict = if flagged { Verdict::Anomalous } else { Verdict::Normal };
            (Some(rate), Some(max), Some(verdict))
        };

        ChannelSummary {
            channel: id.clone(),
            windows_total: own.len(),
            windows_scored: scored.len(),
            windows_degenerate: degenerate,
            windows_anomalous: anomalous,
            anomaly_rate,
            max_score,
            verdict,
        }
    }
}

/// Highest score first; ties by channel, then window index.
fn rank(a: &AnomalyResult, b: &AnomalyResult) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.channel.cmp(&b.channel))
        .then_with(|| a.window.index.cmp(&b.window.index))
}
