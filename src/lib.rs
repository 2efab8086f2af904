//! rigscan: Test-Rig Sensor Log Anomaly Scoring
//!
//! Spectral and statistical anomaly detection for industrial test-rig logs.
//!
//! ## Architecture
//!
//! - **Acquisition**: log parsing and channel registration
//! - **Processing**: windowing, Hann-windowed spectra, per-window features
//! - **Baseline**: trained per-channel statistics with atomic replacement
//! - **Scoring**: z-score anomaly scoring and file-level aggregation
//! - **Pipeline**: the synchronous `score(file) -> FileReport` entry point

pub mod config;
pub mod types;
pub mod acquisition;
pub mod processing;
pub mod baseline;
pub mod scoring;
pub mod pipeline;

// Re-export configuration
pub use config::{ConfigError, PipelineConfig};

// Re-export commonly used types
pub use types::{
    AnomalyResult, Channel, ChannelId, ChannelSummary, FeatureContribution, FeatureVector,
    FileReport, ProfileInfo, TimeSeriesFrame, Verdict, Window,
};

// Re-export pipeline stages
pub use acquisition::{ChannelRegistry, LogParser, ParseError};
pub use processing::{FeatureExtractor, ProcessingError, SpectralAnalyzer, WindowSegmenter};

// Re-export baseline components
pub use baseline::{
    BaselineError, BaselineModel, BaselineProfile, BaselineTrainer, ModelState, ProfileStore,
};

// Re-export scoring
pub use scoring::{AnomalyScorer, ResultAggregator, ScoringError};

pub use pipeline::{Pipeline, PipelineError};
