//! Feature extraction
//!
//! One `FeatureVector` per window, laid out as:
//!
//! | index        | feature             |
//! |--------------|---------------------|
//! | 0 .. N-1     | band energies       |
//! | N            | `peak_frequency_hz` |
//! | N + 1        | `rms`               |
//! | N + 2        | `kurtosis` (excess) |
//! | N + 3        | `skew`              |
//! | N + 4        | `missing_ratio`     |
//!
//! Moments are population moments over the whole window, padding included.
//! Summation order is fixed, so identical samples give bit-identical vectors.

use tracing::debug;

use super::{ProcessingError, SpectralAnalyzer, WindowSlice};
use crate::config::{DegeneratePolicy, FeatureConfig, SpectralConfig};
use crate::types::FeatureVector;

/// Time-domain features appended after the band energies.
const SCALAR_FEATURES: [&str; 5] = ["peak_frequency_hz", "rms", "kurtosis", "skew", "missing_ratio"];

// ============================================================================
// Layout
// ============================================================================

/// Names and positions of the features for a given band configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureLayout {
    band_edges_hz: Vec<f64>,
}

impl FeatureLayout {
    pub fn new(band_edges_hz: &[f64]) -> Self {
        Self {
            band_edges_hz: band_edges_hz.to_vec(),
        }
    }

    pub fn band_count(&self) -> usize {
        self.band_edges_hz.len().saturating_sub(1)
    }

    pub fn dim(&self) -> usize {
        self.band_count() + SCALAR_FEATURES.len()
    }

    /// Feature names in vector order, e.g. `band_3_8hz`, `rms`.
    pub fn names(&self) -> Vec<String> {
        self.band_edges_hz
            .windows(2)
            .map(|w| format!("band_{}_{}hz", format_hz(w[0]), format_hz(w[1])))
            .chain(SCALAR_FEATURES.iter().map(|s| (*s).to_string()))
            .collect()
    }

    /// Index of the band containing `freq_hz`, if any.
    pub fn band_for_frequency(&self, freq_hz: f64) -> Option<usize> {
        let n = self.band_count();
        self.band_edges_hz.windows(2).enumerate().find_map(|(i, w)| {
            let inside = freq_hz >= w[0] && (freq_hz < w[1] || (i + 1 == n && freq_hz <= w[1]));
            inside.then_some(i)
        })
    }

    pub fn rms_index(&self) -> usize {
        self.band_count() + 1
    }
}

/// `3.0` -> `3`, `0.5` -> `0p5`
fn format_hz(f: f64) -> String {
    if f.fract() == 0.0 {
        format!("{f:.0}")
    } else {
        f.to_string().replace('.', "p")
    }
}

// ============================================================================
// Extractor
// ============================================================================

pub struct FeatureExtractor {
    layout: FeatureLayout,
    policy: DegeneratePolicy,
}

impl FeatureExtractor {
    pub fn new(spectral: &SpectralConfig, features: &FeatureConfig) -> Self {
        Self {
            layout: FeatureLayout::new(&spectral.band_edges_hz),
            policy: features.degenerate_policy,
        }
    }

    pub fn layout(&self) -> &FeatureLayout {
        &self.layout
    }

    /// Build the feature vector for one window.
    ///
    /// A zero-variance window either fails with `DegenerateWindow` or yields
    /// an all-zero vector with `degenerate = true`, per the configured policy.
    pub fn extract(
        &self,
        analyzer: &SpectralAnalyzer,
        slice: &WindowSlice,
    ) -> Result<FeatureVector, ProcessingError> {
        if analyzer.band_count() != self.layout.band_count() {
            return Err(ProcessingError::InvalidWindow(format!(
                "analyzer has {} bands, layout expects {}",
                analyzer.band_count(),
                self.layout.band_count()
            )));
        }

        let samples = &slice.samples;
        let n = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / n;
        let (m2, m3, m4) = samples.iter().fold((0.0, 0.0, 0.0), |(m2, m3, m4), &x| {
            let d = x - mean;
            let d2 = d * d;
            (m2 + d2, m3 + d2 * d, m4 + d2 * d2)
        });
        let (m2, m3, m4) = (m2 / n, m3 / n, m4 / n);

        let constant = samples.windows(2).all(|w| w[0] == w[1]);
        if constant || m2 <= 0.0 {
            return match self.policy {
                DegeneratePolicy::Propagate => Err(ProcessingError::DegenerateWindow {
                    channel: slice.window.channel.to_string(),
                    index: slice.window.index,
                }),
                DegeneratePolicy::FlagZero => {
                    debug!(
                        channel = %slice.window.channel,
                        window = slice.window.index,
                        "Constant window flagged as degenerate"
                    );
                    Ok(FeatureVector {
                        window: slice.window.clone(),
                        values: vec![0.0; self.layout.dim()],
                        degenerate: true,
                    })
                }
            };
        }

        let spectral = analyzer.analyze(&slice.window, samples)?;
        let rms = (samples.iter().map(|x| x * x).sum::<f64>() / n).sqrt();
        let skew = m3 / m2.powf(1.5);
        let kurtosis = m4 / (m2 * m2) - 3.0;
        let missing_ratio = slice.filled_count() as f64 / n;

        let mut values = spectral.band_energies;
        values.extend([spectral.peak_frequency_hz, rms, kurtosis, skew, missing_ratio]);

        Ok(FeatureVector {
            window: slice.window.clone(),
            values,
            degenerate: false,
        })
    }
}
