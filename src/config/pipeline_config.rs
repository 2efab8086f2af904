//! Pipeline Configuration - every tunable of the scoring pipeline as TOML values
//!
//! Each section implements `Default` with the constants from `defaults`, so a
//! missing file or a missing section behaves exactly like the built-in values.
//! The configuration is handed to `Pipeline::new`; nothing in the library
//! reads it from a global or from the environment.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::defaults;
use super::validation::ValidationWarning;

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for a scoring deployment.
///
/// Load with `PipelineConfig::load_from_file()`, or use `Default` for the
/// built-in values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PipelineConfig {
    /// Log parsing tolerances
    #[serde(default)]
    pub parser: ParserConfig,

    /// Channel registration and sample-rate inference
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Window length, overlap and partial-window policy
    #[serde(default)]
    pub windowing: WindowingConfig,

    /// Frequency bands and peak search
    #[serde(default)]
    pub spectral: SpectralConfig,

    /// Degenerate-window handling
    #[serde(default)]
    pub features: FeatureConfig,

    /// Training requirements and staleness horizon
    #[serde(default)]
    pub baseline: BaselineConfig,

    /// Score combination and anomaly threshold
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// File-level verdict rule
    #[serde(default)]
    pub report: ReportConfig,
}

impl PipelineConfig {
    /// Load from a TOML file.
    ///
    /// Unknown keys are reported as warnings (with a suggestion when one is
    /// close), never as errors. Range violations fail with
    /// `ConfigError::Validation` listing every problem found.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config = Self::from_toml_str(&contents)
            .map_err(|e| match e {
                ConfigError::Parse(_, err) => ConfigError::Parse(path.to_path_buf(), err),
                other => other,
            })?;
        info!(path = %path.display(), "Loaded pipeline config");
        Ok(config)
    }

    /// Parse and validate configuration text.
    ///
    /// Unknown keys are logged here. Range warnings are left to `validate`,
    /// which `Pipeline::new` runs, so each warning is logged once.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        // Two-pass: check for unknown keys first (warnings only)
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config = Self::parse(contents)?;
        config.check()?;
        Ok(config)
    }

    /// Parse and validate without logging, returning every warning found.
    ///
    /// Unknown-key warnings come first, then range warnings.
    pub fn from_toml_str_with_warnings(
        contents: &str,
    ) -> Result<(Self, Vec<ValidationWarning>), ConfigError> {
        let mut warnings = super::validation::validate_unknown_keys(contents);
        let config = Self::parse(contents)?;
        warnings.extend(config.check()?);
        Ok((config, warnings))
    }

    fn parse(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse(PathBuf::new(), e))
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Write the configuration to disk as TOML.
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = self.to_toml()?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::Io(parent.to_path_buf(), e))?;
            }
        }
        std::fs::write(path, contents).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        info!(path = %path.display(), "Pipeline config saved");
        Ok(())
    }

    /// Validate all values for internal consistency.
    ///
    /// Rules:
    /// - Fractions and thresholds must be finite and inside their ranges
    /// - Overlap must lie in [0, 1)
    /// - Band edges must be non-negative and strictly increasing
    /// - Counts (window length, training samples, top-k) must be > 0
    pub fn validate(&self) -> Result<(), ConfigError> {
        for w in self.check()? {
            warn!("{}", w);
        }
        Ok(())
    }

    /// Same rules as `validate`; suspicious values are returned, not logged.
    pub fn check(&self) -> Result<Vec<ValidationWarning>, ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        // Parser
        Self::check_fraction(
            self.parser.malformed_row_threshold,
            "parser.malformed_row_threshold",
            &mut errors,
        );
        if self.parser.decimal_sample_size == 0 {
            errors.push("parser.decimal_sample_size must be > 0".to_string());
        }

        // Registry
        let cv = self.registry.irregular_cv_threshold;
        if !cv.is_finite() || cv <= 0.0 {
            errors.push(format!(
                "registry.irregular_cv_threshold = {cv} must be a finite value > 0"
            ));
        }

        // Windowing
        if self.windowing.length < 2 {
            errors.push(format!(
                "windowing.length = {} must be >= 2",
                self.windowing.length
            ));
        }
        let overlap = self.windowing.overlap;
        if !overlap.is_finite() || !(0.0..1.0).contains(&overlap) {
            errors.push(format!("windowing.overlap = {overlap} must be in [0, 1)"));
        }

        // Spectral
        let edges = &self.spectral.band_edges_hz;
        if edges.len() < 2 {
            errors.push("spectral.band_edges_hz needs at least two edges (one band)".to_string());
        }
        if edges.iter().any(|e| !e.is_finite() || *e < 0.0) {
            errors.push("spectral.band_edges_hz must be finite and >= 0".to_string());
        }
        if edges.windows(2).any(|w| w[1] <= w[0]) {
            errors.push("spectral.band_edges_hz must be strictly increasing".to_string());
        }

        // Baseline
        if self.baseline.min_training_samples < 2 {
            errors.push(format!(
                "baseline.min_training_samples = {} must be >= 2",
                self.baseline.min_training_samples
            ));
        }
        let floor = self.baseline.min_std_floor;
        if !floor.is_finite() || floor <= 0.0 {
            errors.push(format!(
                "baseline.min_std_floor = {floor} must be a finite value > 0"
            ));
        }
        if self.baseline.staleness_horizon_hours == 0 {
            errors.push("baseline.staleness_horizon_hours must be > 0".to_string());
        }

        // Scoring
        let threshold = self.scoring.threshold;
        if !threshold.is_finite() || threshold <= 0.0 {
            errors.push(format!(
                "scoring.threshold = {threshold} must be a finite value > 0"
            ));
        }
        if self.scoring.top_k == 0 {
            errors.push("scoring.top_k must be > 0".to_string());
        }

        // Report
        if self.report.top_n == 0 {
            errors.push("report.top_n must be > 0".to_string());
        }
        if let Some(fraction) = self.report.min_anomalous_fraction {
            if !fraction.is_finite() || fraction <= 0.0 || fraction > 1.0 {
                errors.push(format!(
                    "report.min_anomalous_fraction = {fraction} must be in (0, 1]"
                ));
            }
        }

        let (range_errors, range_warnings) = super::validation::validate_ranges(self);
        errors.extend(range_errors);

        if errors.is_empty() {
            Ok(range_warnings)
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    fn check_fraction(value: f64, name: &str, errors: &mut Vec<String>) {
        // NaN comparisons silently pass, so check finiteness explicitly
        if !value.is_finite() || !(0.0..=1.0).contains(&value) {
            errors.push(format!("{name} = {value} must be in [0, 1]"));
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    Serialize(toml::ser::Error),
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "Config I/O error ({}): {}", path.display(), e),
            ConfigError::Parse(path, e) => {
                write!(f, "Config parse error ({}): {}", path.display(), e)
            }
            ConfigError::Serialize(e) => write!(f, "Config serialization error: {}", e),
            ConfigError::Validation(errors) => {
                writeln!(f, "Config validation failed:")?;
                for e in errors {
                    writeln!(f, "  - {}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Parser Config
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParserConfig {
    /// Fraction of malformed rows (0-1) above which the file is rejected.
    #[serde(default = "default_malformed_row_threshold")]
    pub malformed_row_threshold: f64,

    /// Numeric tokens sampled for decimal-separator detection.
    #[serde(default = "default_decimal_sample_size")]
    pub decimal_sample_size: usize,
}

fn default_malformed_row_threshold() -> f64 { defaults::MALFORMED_ROW_THRESHOLD }
fn default_decimal_sample_size() -> usize { defaults::DECIMAL_SAMPLE_SIZE }

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            malformed_row_threshold: default_malformed_row_threshold(),
            decimal_sample_size: default_decimal_sample_size(),
        }
    }
}

// ============================================================================
// Registry Config
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Coefficient of variation of timestamp deltas that marks a channel irregular.
    #[serde(default = "default_irregular_cv")]
    pub irregular_cv_threshold: f64,

    /// Channel names to keep (case-insensitive). Empty keeps every channel.
    #[serde(default)]
    pub channels: Vec<String>,
}

fn default_irregular_cv() -> f64 { defaults::IRREGULAR_CV_THRESHOLD }

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            irregular_cv_threshold: default_irregular_cv(),
            channels: Vec::new(),
        }
    }
}

// ============================================================================
// Windowing Config
// ============================================================================

/// What to do with the trailing samples that do not fill a whole window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PartialWindowPolicy {
    /// Discard the remainder (no padding leakage)
    #[default]
    Drop,
    /// Emit one extra window padded with zeros
    ZeroPad,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowingConfig {
    /// Samples per window.
    #[serde(default = "default_window_length")]
    pub length: usize,

    /// Overlap fraction between consecutive windows, in [0, 1).
    #[serde(default)]
    pub overlap: f64,

    #[serde(default)]
    pub partial_policy: PartialWindowPolicy,
}

fn default_window_length() -> usize { defaults::WINDOW_LENGTH }

impl Default for WindowingConfig {
    fn default() -> Self {
        Self {
            length: default_window_length(),
            overlap: 0.0,
            partial_policy: PartialWindowPolicy::Drop,
        }
    }
}

// ============================================================================
// Spectral Config
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectralConfig {
    /// Band edges in Hz; N+1 edges define N bands.
    #[serde(default = "default_band_edges")]
    pub band_edges_hz: Vec<f64>,

    /// Let the DC bin win the peak-frequency search.
    #[serde(default)]
    pub include_dc: bool,
}

fn default_band_edges() -> Vec<f64> { defaults::BAND_EDGES_HZ.to_vec() }

impl Default for SpectralConfig {
    fn default() -> Self {
        Self {
            band_edges_hz: default_band_edges(),
            include_dc: false,
        }
    }
}

// ============================================================================
// Feature Config
// ============================================================================

/// Handling of zero-variance windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DegeneratePolicy {
    /// Emit a zero vector flagged as degenerate
    #[default]
    FlagZero,
    /// Fail the file with `DegenerateWindow`
    Propagate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FeatureConfig {
    #[serde(default)]
    pub degenerate_policy: DegeneratePolicy,
}

// ============================================================================
// Baseline Config
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineConfig {
    /// Minimum non-degenerate windows per channel to train.
    #[serde(default = "default_min_training_samples")]
    pub min_training_samples: usize,

    /// Minimum standard deviation floor to prevent divide-by-zero.
    #[serde(default = "default_min_std_floor")]
    pub min_std_floor: f64,

    /// Profile age (hours) after which results are annotated stale.
    #[serde(default = "default_staleness_horizon")]
    pub staleness_horizon_hours: u64,
}

fn default_min_training_samples() -> usize { defaults::MIN_TRAINING_SAMPLES }
fn default_min_std_floor() -> f64 { defaults::MIN_STD_FLOOR }
fn default_staleness_horizon() -> u64 { defaults::STALENESS_HORIZON_HOURS }

/// Horizons beyond this are clamped (about 114 years).
const MAX_STALENESS_HORIZON_HOURS: u64 = 1_000_000;

impl BaselineConfig {
    pub fn staleness_horizon(&self) -> chrono::Duration {
        let hours = self.staleness_horizon_hours.min(MAX_STALENESS_HORIZON_HOURS);
        chrono::Duration::hours(i64::try_from(hours).unwrap_or(i64::MAX / 3_600_000))
    }
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            min_training_samples: default_min_training_samples(),
            min_std_floor: default_min_std_floor(),
            staleness_horizon_hours: default_staleness_horizon(),
        }
    }
}

// ============================================================================
// Scoring Config
// ============================================================================

/// Rule collapsing per-feature z-scores into one scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CombinationPolicy {
    /// sqrt(sum z²)
    #[default]
    Euclidean,
    /// max |z|
    MaxAbs,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default)]
    pub combination: CombinationPolicy,

    /// Score above which a window is flagged anomalous.
    #[serde(default = "default_threshold")]
    pub threshold: f64,

    /// Contributing features kept per result.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_threshold() -> f64 { defaults::ANOMALY_THRESHOLD }
fn default_top_k() -> usize { defaults::TOP_K_CONTRIBUTIONS }

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            combination: CombinationPolicy::Euclidean,
            threshold: default_threshold(),
            top_k: default_top_k(),
        }
    }
}

// ============================================================================
// Report Config
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Worst results kept in the report.
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    /// When set, a channel is anomalous only if at least this fraction of its
    /// scored windows is flagged. Unset means any flagged window suffices.
    #[serde(default)]
    pub min_anomalous_fraction: Option<f64>,
}

fn default_top_n() -> usize { defaults::REPORT_TOP_N }

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
            min_anomalous_fraction: None,
        }
    }
}
