//! Scoring Pipeline
//!
//! The synchronous `score(file) -> FileReport` entry point plus the matching
//! training entry point.
//!
//! ```text
//! file -> LogParser -> ChannelRegistry -> WindowSegmenter
//!      -> SpectralAnalyzer -> FeatureExtractor
//!      -> AnomalyScorer (profile snapshot) -> ResultAggregator -> FileReport
//! ```
//!
//! A `Pipeline` holds no per-file state. Every scored file takes its own
//! snapshot of the active baseline profile, so retraining while files are
//! being scored never produces a mixed view. Independent files may be scored
//! concurrently from one `Pipeline` (`score_batch`).
//!
//! Deadlines are checked between windows only; a window is either fully
//! transformed and scored or not computed at all.

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::acquisition::{ChannelRegistry, LogParser, ParseError};
use crate::baseline::{BaselineError, BaselineModel, BaselineProfile, BaselineTrainer};
use crate::config::{ConfigError, PipelineConfig};
use crate::processing::{
    FeatureExtractor, ProcessingError, SpectralAnalyzer, UniformSeries, WindowSegmenter,
};
use crate::scoring::{AnomalyScorer, ResultAggregator, ScoringError};
use crate::types::{ChannelId, FeatureVector, FileReport, TimeSeriesFrame};

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Processing(#[from] ProcessingError),

    #[error(transparent)]
    Baseline(#[from] BaselineError),

    #[error(transparent)]
    Scoring(#[from] ScoringError),

    #[error("Deadline exceeded before window {window} of channel {channel}")]
    DeadlineExceeded { channel: String, window: usize },
}

// ============================================================================
// Pipeline
// ============================================================================

pub struct Pipeline {
    config: PipelineConfig,
    model: Arc<BaselineModel>,
    parser: LogParser,
    registry: ChannelRegistry,
    segmenter: WindowSegmenter,
    extractor: FeatureExtractor,
    aggregator: ResultAggregator,
}

impl Pipeline {
    /// Build a pipeline from an explicit configuration and a shared model.
    pub fn new(config: PipelineConfig, model: Arc<BaselineModel>) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            parser: LogParser::new(&config.parser)?,
            registry: ChannelRegistry::new(&config.registry)?,
            segmenter: WindowSegmenter::new(&config.windowing)?,
            extractor: FeatureExtractor::new(&config.spectral, &config.features),
            aggregator: ResultAggregator::new(&config.report),
            config,
            model,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn model(&self) -> &Arc<BaselineModel> {
        &self.model
    }

    // ------------------------------------------------------------------------
    // Acquisition
    // ------------------------------------------------------------------------

    /// Parse and register a log file. The file's modification time becomes
    /// the frame's `recorded_at`.
    pub fn load_frame(&self, path: &Path) -> Result<TimeSeriesFrame, PipelineError> {
        let raw = self.parser.parse_file(path)?;
        let recorded_at = std::fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .map(DateTime::<Utc>::from);
        Ok(self.registry.register(raw, Some(path.to_path_buf()), recorded_at)?)
    }

    /// Parse and register log text that did not come from disk.
    pub fn frame_from_str(&self, text: &str, source: Option<&str>) -> Result<TimeSeriesFrame, PipelineError> {
        let raw = self.parser.parse_str(text)?;
        Ok(self.registry.register(raw, source.map(PathBuf::from), None)?)
    }

    // ------------------------------------------------------------------------
    // Features
    // ------------------------------------------------------------------------

    /// Feature vectors for every window of every channel, in channel order
    /// then window order.
    pub fn extract_features(
        &self,
        frame: &TimeSeriesFrame,
        deadline: Option<Instant>,
    ) -> Result<Vec<FeatureVector>, PipelineError> {
        let length = self.segmenter.length();
        // One analyzer per distinct sample rate, shared by its channels
        let mut analyzers: HashMap<u64, SpectralAnalyzer> = HashMap::new();
        let mut vectors = Vec::new();

        for channel in frame.channels() {
            let series = UniformSeries::from_channel(channel);
            if self.segmenter.window_count(series.len()) == 0 {
                debug!(
                    channel = %channel.id,
                    samples = series.len(),
                    window_length = length,
                    "Channel shorter than one window, no verdict available"
                );
                continue;
            }

            let analyzer = match analyzers.entry(series.sample_rate_hz.to_bits()) {
                Entry::Occupied(e) => e.into_mut(),
                Entry::Vacant(e) => e.insert(SpectralAnalyzer::new(
                    length,
                    series.sample_rate_hz,
                    &self.config.spectral.band_edges_hz,
                    self.config.spectral.include_dc,
                )?),
            };

            for slice in self.segmenter.windows(&series) {
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    return Err(PipelineError::DeadlineExceeded {
                        channel: channel.id.to_string(),
                        window: slice.window.index,
                    });
                }
                vectors.push(self.extractor.extract(analyzer, &slice)?);
            }
        }
        Ok(vectors)
    }

    // ------------------------------------------------------------------------
    // Scoring
    // ------------------------------------------------------------------------

    /// Score one log file against the active baseline profile.
    pub fn score(&self, path: &Path) -> Result<FileReport, PipelineError> {
        self.score_path(path, None)
    }

    /// Like `score`, but gives up between windows once `deadline` has passed.
    pub fn score_with_deadline(&self, path: &Path, deadline: Instant) -> Result<FileReport, PipelineError> {
        self.score_path(path, Some(deadline))
    }

    /// Score log text that did not come from disk.
    pub fn score_str(&self, text: &str, source: Option<&str>) -> Result<FileReport, PipelineError> {
        let frame = self.frame_from_str(text, source)?;
        self.score_frame(&frame, None)
    }

    fn score_path(&self, path: &Path, deadline: Option<Instant>) -> Result<FileReport, PipelineError> {
        let frame = self.load_frame(path)?;
        self.score_frame(&frame, deadline)
    }

    /// Score a registered frame.
    ///
    /// Staleness is judged against the frame's `recorded_at`, or the current
    /// time when the recording time is unknown.
    pub fn score_frame(
        &self,
        frame: &TimeSeriesFrame,
        deadline: Option<Instant>,
    ) -> Result<FileReport, PipelineError> {
        let reference = frame.recorded_at().unwrap_or_else(Utc::now);
        let scorer = AnomalyScorer::from_model(
            &self.model,
            &self.config.scoring,
            self.config.baseline.min_std_floor,
            reference,
            self.config.baseline.staleness_horizon(),
        )?;
        self.check_layout(scorer.profile())?;

        let vectors = self.extract_features(frame, deadline)?;
        let results = vectors
            .iter()
            .map(|fv| scorer.score(fv))
            .collect::<Result<Vec<_>, _>>()?;

        let channels: Vec<ChannelId> = frame.channels().iter().map(|c| c.id.clone()).collect();
        let source = frame.source().map(|p| p.display().to_string());
        let report = self.aggregator.aggregate(
            &channels,
            &results,
            scorer.profile_info(),
            source,
            frame.duration_s(),
        );

        info!(
            source = report.source.as_deref().unwrap_or("-"),
            verdict = %report.verdict,
            windows = report.windows_scored,
            stale_profile = report.profile.stale,
            "File scored"
        );
        Ok(report)
    }

    /// Score independent files concurrently. Results come back in input order.
    pub fn score_batch<P>(&self, paths: &[P]) -> Vec<Result<FileReport, PipelineError>>
    where
        P: AsRef<Path> + Sync,
    {
        paths
            .par_iter()
            .map(|p| {
                let result = self.score(p.as_ref());
                if let Err(e) = &result {
                    warn!(path = %p.as_ref().display(), error = %e, "File rejected");
                }
                result
            })
            .collect()
    }

    /// Profiles trained with other band edges or window length produce
    /// vectors of a different meaning, even at equal dimension.
    fn check_layout(&self, profile: &BaselineProfile) -> Result<(), ScoringError> {
        if profile.band_edges_hz != self.config.spectral.band_edges_hz {
            return Err(ScoringError::LayoutMismatch(format!(
                "profile band edges {:?}, configured {:?}",
                profile.band_edges_hz, self.config.spectral.band_edges_hz
            )));
        }
        if profile.window_length != self.config.windowing.length {
            return Err(ScoringError::LayoutMismatch(format!(
                "profile window length {}, configured {}",
                profile.window_length, self.config.windowing.length
            )));
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Training
    // ------------------------------------------------------------------------

    /// Train from known-good log files and install the profile.
    pub fn train_from_files<P: AsRef<Path>>(
        &self,
        paths: &[P],
        label: Option<String>,
    ) -> Result<Arc<BaselineProfile>, PipelineError> {
        let frames = paths
            .iter()
            .map(|p| self.load_frame(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        self.train_from_frames(&frames, label)
    }

    /// Train from registered known-good frames and install the profile.
    ///
    /// Degenerate windows are excluded from the statistics.
    pub fn train_from_frames(
        &self,
        frames: &[TimeSeriesFrame],
        label: Option<String>,
    ) -> Result<Arc<BaselineProfile>, PipelineError> {
        let mut vectors = Vec::new();
        for frame in frames {
            vectors.extend(self.extract_features(frame, None)?);
        }
        info!(
            files = frames.len(),
            windows = vectors.len(),
            "Training baseline profile"
        );

        let trainer = BaselineTrainer::new(
            self.extractor.layout().names(),
            &self.config.spectral.band_edges_hz,
            self.config.windowing.length,
        );
        let profile = self.model.train(
            &vectors,
            trainer,
            self.config.baseline.min_training_samples,
            label,
        )?;
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WindowingConfig;
    use crate::types::Verdict;
    use std::f64::consts::PI;
    use std::time::Duration;

    /// Tab-separated log with one sinusoidal channel at 100 Hz.
    fn sine_log(seconds: usize, amplitude: f64) -> String {
        let mut text = String::from("Time [s]\tPressure [bar]\n");
        for i in 0..seconds * 100 {
            let t = i as f64 / 100.0;
            let v = amplitude * (2.0 * PI * 5.0 * t).sin();
            text.push_str(&format!("{t:.2}\t{v:.6}\n"));
        }
        text
    }

    fn config(length: usize) -> PipelineConfig {
        PipelineConfig {
            windowing: WindowingConfig {
                length,
                ..WindowingConfig::default()
            },
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn test_window_count_per_channel() {
        let pipeline = Pipeline::new(config(1024), Arc::new(BaselineModel::new())).unwrap();
        let frame = pipeline.frame_from_str(&sine_log(20, 1.0), Some("mem")).unwrap();
        let vectors = pipeline.extract_features(&frame, None).unwrap();
        assert_eq!(vectors.len(), 1);
        assert_eq!(vectors[0].dim(), 14);
    }

    #[test]
    fn test_untrained_model_refuses_scoring() {
        let pipeline = Pipeline::new(config(256), Arc::new(BaselineModel::new())).unwrap();
        let err = pipeline.score_str(&sine_log(10, 1.0), None).unwrap_err();
        assert!(matches!(err, PipelineError::Scoring(ScoringError::NotTrained)));
    }

    #[test]
    fn test_expired_deadline_stops_between_windows() {
        let pipeline = Pipeline::new(config(256), Arc::new(BaselineModel::new())).unwrap();
        let frame = pipeline.frame_from_str(&sine_log(10, 1.0), None).unwrap();
        let past = Instant::now().checked_sub(Duration::from_millis(1)).unwrap_or_else(Instant::now);
        let err = pipeline.extract_features(&frame, Some(past)).unwrap_err();
        assert!(matches!(err, PipelineError::DeadlineExceeded { window: 0, .. }));
    }

    #[test]
    fn test_same_text_scores_identically() {
        let model = Arc::new(BaselineModel::new());
        let pipeline = Pipeline::new(config(128), Arc::clone(&model)).unwrap();
        let frame = pipeline.frame_from_str(&sine_log(60, 1.0), None).unwrap();
        pipeline.train_from_frames(&[frame], None).unwrap();

        let a = pipeline.score_str(&sine_log(10, 1.0), None).unwrap();
        let b = pipeline.score_str(&sine_log(10, 1.0), None).unwrap();
        assert_eq!(a, b);
        assert_ne!(a.verdict, Verdict::NoVerdict);
        assert_eq!(a.windows_scored, 7);
    }

    #[test]
    fn test_layout_mismatch_rejected() {
        let model = Arc::new(BaselineModel::new());
        let trainer = Pipeline::new(config(128), Arc::clone(&model)).unwrap();
        let frame = trainer.frame_from_str(&sine_log(60, 1.0), None).unwrap();
        trainer.train_from_frames(&[frame], None).unwrap();

        let scorer = Pipeline::new(config(256), model).unwrap();
        let err = scorer.score_str(&sine_log(10, 1.0), None).unwrap_err();
        assert!(matches!(err, PipelineError::Scoring(ScoringError::LayoutMismatch(_))));
    }
}
