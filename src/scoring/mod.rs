//! Anomaly scoring against a trained baseline
//!
//! Each feature is standardized as `z = (value - mean) / effective_std`, where
//! the effective std carries a floor so near-constant training features do not
//! blow up. The per-feature z-scores are collapsed into one score:
//!
//! - `Euclidean` (default): `sqrt(sum(z^2))`
//! - `MaxAbs`: `max(|z|)`
//!
//! A window is anomalous when the score is strictly greater than the
//! configured threshold. Degenerate windows are not scored: they get score 0,
//! no contributions and are never flagged.

pub mod aggregator;

pub use aggregator::ResultAggregator;

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::baseline::{BaselineError, BaselineModel, BaselineProfile};
use crate::config::{CombinationPolicy, ScoringConfig};
use crate::types::{AnomalyResult, FeatureContribution, FeatureVector, ProfileInfo};

/// Scoring-time precondition failures. Never retried.
#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("Channel {0} is not present in the baseline profile")]
    ChannelMismatch(String),

    #[error("Feature dimension mismatch for channel {channel}: profile has {expected}, vector has {actual}")]
    DimensionMismatch {
        channel: String,
        expected: usize,
        actual: usize,
    },

    #[error("Baseline model is not trained")]
    NotTrained,

    #[error("Profile was trained with a different feature layout: {0}")]
    LayoutMismatch(String),

    #[error("Baseline profile unavailable: {0}")]
    Profile(#[source] BaselineError),
}

impl From<BaselineError> for ScoringError {
    fn from(err: BaselineError) -> Self {
        match err {
            BaselineError::NotTrained => ScoringError::NotTrained,
            BaselineError::DimensionMismatch { .. } | BaselineError::SchemaMismatch(..) => {
                ScoringError::LayoutMismatch(err.to_string())
            }
            other => ScoringError::Profile(other),
        }
    }
}

/// Scores feature vectors against one immutable profile snapshot.
pub struct AnomalyScorer {
    profile: Arc<BaselineProfile>,
    combination: CombinationPolicy,
    threshold: f64,
    top_k: usize,
    std_floor: f64,
    stale: bool,
}

impl AnomalyScorer {
    pub fn new(profile: Arc<BaselineProfile>, config: &ScoringConfig, std_floor: f64, stale: bool) -> Self {
        Self {
            profile,
            combination: config.combination,
            threshold: config.threshold,
            top_k: config.top_k,
            std_floor,
            stale,
        }
    }

    /// Snapshot the model's active profile and judge its staleness against `reference`.
    pub fn from_model(
        model: &BaselineModel,
        config: &ScoringConfig,
        std_floor: f64,
        reference: DateTime<Utc>,
        horizon: Duration,
    ) -> Result<Self, ScoringError> {
        let profile = model.snapshot()?;
        let stale = profile.is_stale(reference, horizon);
        if stale {
            warn!(
                trained_at = %profile.trained_at,
                reference = %reference,
                invalidated = profile.invalidated,
                "Scoring with a stale baseline profile"
            );
        }
        Ok(Self::new(profile, config, std_floor, stale))
    }

    pub fn profile(&self) -> &BaselineProfile {
        &self.profile
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Provenance to attach to a report.
    pub fn profile_info(&self) -> ProfileInfo {
        ProfileInfo {
            trained_at: self.profile.trained_at,
            label: self.profile.label.clone(),
            stale: self.stale,
        }
    }

    /// Score one feature vector.
    pub fn score(&self, fv: &FeatureVector) -> Result<AnomalyResult, ScoringError> {
        let channel = fv.channel();
        let stats = self
            .profile
            .channel(channel)
            .ok_or_else(|| ScoringError::ChannelMismatch(channel.to_string()))?;
        if stats.dim() != fv.dim() {
            return Err(ScoringError::DimensionMismatch {
                channel: channel.to_string(),
                expected: stats.dim(),
                actual: fv.dim(),
            });
        }

        if fv.degenerate {
            return Ok(AnomalyResult {
                window: fv.window.clone(),
                channel: channel.clone(),
                score: 0.0,
                is_anomaly: false,
                degenerate: true,
                stale_profile: self.stale,
                contributions: Vec::new(),
            });
        }

        let z: Vec<f64> = fv
            .values
            .iter()
            .enumerate()
            .map(|(i, &v)| stats.z_score(i, v, self.std_floor))
            .collect();

        let score = match self.combination {
            CombinationPolicy::Euclidean => z.iter().map(|x| x * x).sum::<f64>().sqrt(),
            CombinationPolicy::MaxAbs => z.iter().fold(0.0_f64, |acc, x| acc.max(x.abs())),
        };
        let is_anomaly = score > self.threshold;

        let mut ranked: Vec<usize> = (0..z.len()).collect();
        ranked.sort_by(|&a, &b| z[b].abs().total_cmp(&z[a].abs()).then(a.cmp(&b)));
        let contributions = ranked
            .into_iter()
            .take(self.top_k)
            .map(|i| FeatureContribution {
                feature: stats.feature_names.get(i).cloned().unwrap_or_else(|| format!("f{i}")),
                index: i,
                value: fv.values[i],
                z_score: z[i],
            })
            .collect();

        if is_anomaly {
            debug!(
                channel = %channel,
                window = fv.window.index,
                score,
                "Window flagged anomalous"
            );
        }

        Ok(AnomalyResult {
            window: fv.window.clone(),
            channel: channel.clone(),
            score,
            is_anomaly,
            degenerate: false,
            stale_profile: self.stale,
            contributions,
        })
    }
}
