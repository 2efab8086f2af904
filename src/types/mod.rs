//! Shared data structures for the rig-log scoring pipeline
//!
//! This module defines the values that flow between pipeline stages:
//! - Acquisition: ChannelId, Channel, TimeSeriesFrame (parsed + registered log)
//! - Processing: Window, SpectralFeature, FeatureVector (per-window features)
//! - Scoring: AnomalyResult, FeatureContribution (per-window verdicts)
//! - Reporting: FileReport, ChannelSummary, Verdict (file-level output)
//!
//! Every value is created once by the stage that owns it and never mutated
//! afterwards.

mod channel;
mod features;
mod report;

pub use channel::*;
pub use features::*;
pub use report::*;
