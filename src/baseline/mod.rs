//! Baseline Model - trained per-channel feature statistics
//!
//! A baseline profile holds, for every channel, the mean and sample standard
//! deviation of each feature over windows recorded during known-good runs.
//! Scoring standardizes live feature vectors against it.
//!
//! ## Architecture
//!
//! - `FeatureAccumulator`: Welford accumulator over fixed-length vectors
//! - `BaselineTrainer`: groups training vectors by channel and finalizes a profile
//! - `BaselineProfile`: immutable trained statistics, JSON-persistable
//! - `BaselineModel`: holder of the active profile with atomic replacement
//! - `ProfileStore` (in `store`): versioned on-disk history of profiles
//!
//! ## Lifecycle
//!
//! `Untrained -> Trained -> Stale`. Staleness (profile older than the
//! configured horizon relative to the scored file, or explicitly invalidated)
//! only annotates results; it never blocks scoring.
//!
//! ## Usage
//!
//! ```ignore
//! let model = BaselineModel::new();
//! let mut trainer = BaselineTrainer::new(layout.names(), &band_edges, window_length);
//! for fv in known_good_vectors {
//!     trainer.add(&fv)?;
//! }
//! model.install(trainer.finalize(30, Some("commissioning".into()))?);
//!
//! let profile = model.snapshot()?; // Arc<BaselineProfile>, never a mixed view
//! ```

pub mod store;

pub use store::{ProfileMetadata, ProfileStore};

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::types::{ChannelId, FeatureVector};

/// Schema version for persistence compatibility
pub const SCHEMA_VERSION: u32 = 1;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum BaselineError {
    #[error("Baseline model is not trained")]
    NotTrained,

    #[error("Insufficient training data for channel {channel}: have {have}, need {need}")]
    InsufficientTrainingData {
        channel: String,
        have: usize,
        need: usize,
    },

    #[error("No training vectors supplied")]
    EmptyCorpus,

    #[error("Feature dimension mismatch for channel {channel}: expected {expected}, got {actual}")]
    DimensionMismatch {
        channel: String,
        expected: usize,
        actual: usize,
    },

    #[error("No stored profiles under {0}")]
    NoProfiles(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Schema version mismatch: file has v{0}, expected v{1}")]
    SchemaMismatch(u32, u32),
}

/// Lifecycle state of a `BaselineModel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelState {
    Untrained,
    Trained,
    Stale,
}

impl std::fmt::Display for ModelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelState::Untrained => write!(f, "UNTRAINED"),
            ModelState::Trained => write!(f, "TRAINED"),
            ModelState::Stale => write!(f, "STALE"),
        }
    }
}

// ============================================================================
// Feature Accumulator
// ============================================================================

/// Accumulates feature vectors for one channel
///
/// Uses Welford's online algorithm per feature for numerically stable
/// mean/variance calculation.
#[derive(Debug, Clone)]
pub struct FeatureAccumulator {
    count: usize,
    mean: Vec<f64>,
    m2: Vec<f64>,
    min_values: Vec<f64>,
    max_values: Vec<f64>,
}

impl FeatureAccumulator {
    pub fn new(dim: usize) -> Self {
        Self {
            count: 0,
            mean: vec![0.0; dim],
            m2: vec![0.0; dim],
            min_values: vec![f64::MAX; dim],
            max_values: vec![f64::MIN; dim],
        }
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Add a vector. Vectors containing a non-finite value are skipped and
    /// `false` is returned; one NaN would poison the running mean for good.
    pub fn add(&mut self, values: &[f64]) -> bool {
        if values.iter().any(|v| !v.is_finite()) {
            return false;
        }
        self.count += 1;
        let n = self.count as f64;
        for (i, &value) in values.iter().enumerate() {
            self.min_values[i] = self.min_values[i].min(value);
            self.max_values[i] = self.max_values[i].max(value);

            let delta = value - self.mean[i];
            self.mean[i] += delta / n;
            let delta2 = value - self.mean[i];
            self.m2[i] += delta * delta2;
        }
        true
    }

    /// Sample variance per feature (n - 1 denominator).
    pub fn variance(&self) -> Vec<f64> {
        if self.count < 2 {
            return vec![0.0; self.dim()];
        }
        let denom = (self.count - 1) as f64;
        self.m2.iter().map(|m2| m2 / denom).collect()
    }

    pub fn std_dev(&self) -> Vec<f64> {
        self.variance().into_iter().map(f64::sqrt).collect()
    }

    /// Finalize into a channel profile.
    pub fn finalize(
        self,
        channel: ChannelId,
        feature_names: Vec<String>,
        min_samples: usize,
    ) -> Result<ChannelProfile, BaselineError> {
        if self.count < min_samples {
            return Err(BaselineError::InsufficientTrainingData {
                channel: channel.to_string(),
                have: self.count,
                need: min_samples,
            });
        }
        let std = self.std_dev();
        Ok(ChannelProfile {
            channel,
            feature_names,
            mean: self.mean,
            std,
            min_values: self.min_values,
            max_values: self.max_values,
            sample_count: self.count,
        })
    }
}

// ============================================================================
// Profiles
// ============================================================================

/// Trained statistics for one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelProfile {
    pub channel: ChannelId,
    pub feature_names: Vec<String>,
    pub mean: Vec<f64>,
    /// Sample standard deviation per feature
    pub std: Vec<f64>,
    pub min_values: Vec<f64>,
    pub max_values: Vec<f64>,
    pub sample_count: usize,
}

impl ChannelProfile {
    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    /// Standard deviation with a floor to avoid divide-by-zero.
    ///
    /// The floor is `floor * |mean|`, but never below `floor` itself.
    pub fn effective_std(&self, index: usize, floor: f64) -> f64 {
        let mean = self.mean[index];
        if !mean.is_finite() {
            return floor;
        }
        let min_std = (mean.abs() * floor).max(floor);
        self.std[index].max(min_std)
    }

    /// (value - mean) / effective std
    pub fn z_score(&self, index: usize, value: f64, floor: f64) -> f64 {
        (value - self.mean[index]) / self.effective_std(index, floor)
    }
}

/// Trained baseline for every channel seen during training.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineProfile {
    pub schema_version: u32,
    pub trained_at: DateTime<Utc>,
    #[serde(default)]
    pub label: Option<String>,
    /// Set by an explicit invalidation; the profile is reported stale
    #[serde(default)]
    pub invalidated: bool,
    /// Band configuration the features were computed with
    pub band_edges_hz: Vec<f64>,
    pub window_length: usize,
    /// Keyed by `ChannelId::key()`
    pub channels: BTreeMap<String, ChannelProfile>,
}

impl BaselineProfile {
    /// Profile for `id`, matched by case-insensitive name and exact unit.
    ///
    /// A profile stored under the same key with a different unit is `None`.
    pub fn channel(&self, id: &ChannelId) -> Option<&ChannelProfile> {
        self.channels
            .get(&id.key())
            .filter(|p| p.channel.unit == id.unit)
    }

    /// Stale when invalidated or older than `horizon` at `reference`.
    pub fn is_stale(&self, reference: DateTime<Utc>, horizon: Duration) -> bool {
        self.invalidated || reference - self.trained_at > horizon
    }

    /// Save to a JSON file. Parent directories are created automatically.
    pub fn save_to_file(&self, path: &Path) -> Result<(), BaselineError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        info!(
            path = %path.display(),
            channels = self.channels.len(),
            "Baseline profile saved"
        );
        Ok(())
    }

    /// Load from a JSON file written by `save_to_file`.
    pub fn load_from_file(path: &Path) -> Result<Self, BaselineError> {
        let json = std::fs::read_to_string(path)?;
        let profile: Self = serde_json::from_str(&json)?;
        if profile.schema_version != SCHEMA_VERSION {
            warn!(
                file_version = profile.schema_version,
                expected = SCHEMA_VERSION,
                "Schema version mismatch, refusing saved baseline profile"
            );
            return Err(BaselineError::SchemaMismatch(
                profile.schema_version,
                SCHEMA_VERSION,
            ));
        }
        info!(
            path = %path.display(),
            channels = profile.channels.len(),
            trained_at = %profile.trained_at,
            "Baseline profile loaded"
        );
        Ok(profile)
    }
}

// ============================================================================
// Trainer
// ============================================================================

/// Collects known-good feature vectors per channel.
///
/// Degenerate vectors are skipped; they carry no information about the
/// normal spread of a channel.
pub struct BaselineTrainer {
    feature_names: Vec<String>,
    band_edges_hz: Vec<f64>,
    window_length: usize,
    accumulators: BTreeMap<String, (ChannelId, FeatureAccumulator)>,
    skipped_degenerate: usize,
}

impl BaselineTrainer {
    pub fn new(feature_names: Vec<String>, band_edges_hz: &[f64], window_length: usize) -> Self {
        Self {
            feature_names,
            band_edges_hz: band_edges_hz.to_vec(),
            window_length,
            accumulators: BTreeMap::new(),
            skipped_degenerate: 0,
        }
    }

    /// Add one training vector.
    pub fn add(&mut self, fv: &FeatureVector) -> Result<(), BaselineError> {
        let channel = fv.channel();
        if fv.dim() != self.feature_names.len() {
            return Err(BaselineError::DimensionMismatch {
                channel: channel.to_string(),
                expected: self.feature_names.len(),
                actual: fv.dim(),
            });
        }

        // The channel is registered even when every window is degenerate, so
        // a constant channel fails finalize instead of vanishing from the profile
        let dim = self.feature_names.len();
        let (_, acc) = self
            .accumulators
            .entry(channel.key())
            .or_insert_with(|| (channel.clone(), FeatureAccumulator::new(dim)));
        if fv.degenerate {
            self.skipped_degenerate += 1;
            return Ok(());
        }
        if !acc.add(&fv.values) {
            debug!(channel = %channel, window = fv.window.index, "Skipping non-finite training vector");
        }
        Ok(())
    }

    /// Vectors accepted so far for `id`.
    pub fn count(&self, id: &ChannelId) -> usize {
        self.accumulators.get(&id.key()).map_or(0, |(_, acc)| acc.count())
    }

    /// Finalize every channel; any channel below `min_samples` fails the run.
    pub fn finalize(
        self,
        min_samples: usize,
        label: Option<String>,
    ) -> Result<BaselineProfile, BaselineError> {
        if self.accumulators.is_empty() {
            return Err(BaselineError::EmptyCorpus);
        }
        if self.skipped_degenerate > 0 {
            debug!(skipped = self.skipped_degenerate, "Degenerate windows excluded from training");
        }

        let mut channels = BTreeMap::new();
        for (key, (id, acc)) in self.accumulators {
            let profile = acc.finalize(id, self.feature_names.clone(), min_samples)?;
            info!(
                channel = %profile.channel,
                samples = profile.sample_count,
                "Channel baseline trained"
            );
            channels.insert(key, profile);
        }

        Ok(BaselineProfile {
            schema_version: SCHEMA_VERSION,
            trained_at: Utc::now(),
            label,
            invalidated: false,
            band_edges_hz: self.band_edges_hz,
            window_length: self.window_length,
            channels,
        })
    }
}

// ============================================================================
// Model
// ============================================================================

/// The active baseline profile, replaced atomically on retraining.
///
/// Readers take an `Arc` snapshot and keep using it to completion; a
/// concurrent `install` only affects snapshots taken afterwards.
#[derive(Default)]
pub struct BaselineModel {
    active: ArcSwapOption<BaselineProfile>,
}

impl BaselineModel {
    /// Create an untrained model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a model already holding `profile`.
    pub fn from_profile(profile: BaselineProfile) -> Self {
        let model = Self::new();
        model.install(profile);
        model
    }

    /// Load a profile file into a new model.
    pub fn load_from_file(path: &Path) -> Result<Self, BaselineError> {
        Ok(Self::from_profile(BaselineProfile::load_from_file(path)?))
    }

    /// Atomically replace the active profile.
    pub fn install(&self, profile: BaselineProfile) -> Arc<BaselineProfile> {
        let profile = Arc::new(profile);
        self.active.store(Some(Arc::clone(&profile)));
        info!(
            channels = profile.channels.len(),
            trained_at = %profile.trained_at,
            "Baseline profile installed"
        );
        profile
    }

    /// Train from a corpus of known-good vectors and install the result.
    pub fn train<'a>(
        &self,
        vectors: impl IntoIterator<Item = &'a FeatureVector>,
        trainer: BaselineTrainer,
        min_samples: usize,
        label: Option<String>,
    ) -> Result<Arc<BaselineProfile>, BaselineError> {
        let mut trainer = trainer;
        for fv in vectors {
            trainer.add(fv)?;
        }
        let profile = trainer.finalize(min_samples, label)?;
        Ok(self.install(profile))
    }

    /// Current profile, or `NotTrained`.
    pub fn snapshot(&self) -> Result<Arc<BaselineProfile>, BaselineError> {
        self.active.load_full().ok_or(BaselineError::NotTrained)
    }

    /// Mark the active profile stale. Scoring continues with annotations.
    ///
    /// The flag is set on whichever profile is active at the swap, so a
    /// concurrent `install` is never overwritten by an older profile.
    pub fn invalidate(&self) -> Result<(), BaselineError> {
        let previous = self.active.rcu(|current| {
            current.as_ref().map(|profile| {
                let mut replaced = (**profile).clone();
                replaced.invalidated = true;
                Arc::new(replaced)
            })
        });
        let previous = previous.ok_or(BaselineError::NotTrained)?;
        warn!(trained_at = %previous.trained_at, "Baseline profile invalidated");
        Ok(())
    }

    /// Lifecycle state relative to `reference` (usually the scored file's timestamp).
    pub fn state(&self, reference: DateTime<Utc>, horizon: Duration) -> ModelState {
        match self.active.load_full() {
            None => ModelState::Untrained,
            Some(p) if p.is_stale(reference, horizon) => ModelState::Stale,
            Some(_) => ModelState::Trained,
        }
    }
}
