//! System-wide default constants.
//!
//! Every value here is the default of a `PipelineConfig` field; operators
//! override them through the TOML file. Grouped by pipeline stage.

// ============================================================================
// Parser
// ============================================================================

/// Fraction of malformed rows above which a log is rejected outright.
pub const MALFORMED_ROW_THRESHOLD: f64 = 0.05;

/// Numeric tokens inspected to decide between comma and dot decimals.
pub const DECIMAL_SAMPLE_SIZE: usize = 200;

// ============================================================================
// Channel Registry
// ============================================================================

/// Coefficient of variation of timestamp deltas above which a channel
/// is treated as irregularly sampled.
pub const IRREGULAR_CV_THRESHOLD: f64 = 0.1;

// ============================================================================
// Windowing & Spectral
// ============================================================================

/// Samples per analysis window.
pub const WINDOW_LENGTH: usize = 1024;

/// Band edges (Hz). Nine bands covering 0-500 Hz, finer at the low end where
/// hydraulic pulsation and shaft orders live.
pub const BAND_EDGES_HZ: [f64; 10] = [0.0, 1.0, 3.0, 8.0, 15.0, 30.0, 60.0, 125.0, 250.0, 500.0];

// ============================================================================
// Baseline
// ============================================================================

/// Minimum non-degenerate windows per channel before a profile can be trained.
pub const MIN_TRAINING_SAMPLES: usize = 30;

/// Floor on per-feature standard deviation (relative to |mean|, with the
/// same absolute minimum).
pub const MIN_STD_FLOOR: f64 = 0.001;

/// Profile age after which results are annotated as stale (hours). 720 = 30 days.
pub const STALENESS_HORIZON_HOURS: u64 = 720;

// ============================================================================
// Scoring & Report
// ============================================================================

/// Combined z-score above which a window is flagged.
pub const ANOMALY_THRESHOLD: f64 = 6.0;

/// Contributing features kept per result.
pub const TOP_K_CONTRIBUTIONS: usize = 3;

/// Worst results kept per file report.
pub const REPORT_TOP_N: usize = 10;
