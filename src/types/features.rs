//! Window references and per-window feature values.

use serde::{Deserialize, Serialize};

use super::ChannelId;

/// A fixed-length slice of one channel, identified by position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Window {
    pub channel: ChannelId,
    /// Ordinal of the window within its channel (0-based)
    pub index: usize,
    /// First sample index in the uniform series
    pub start: usize,
    pub length: usize,
    /// Overlap fraction in [0, 1)
    pub overlap: f64,
    /// Window start relative to the log's time axis (seconds)
    pub start_time_s: f64,
    /// Trailing partial window padded with zeros
    pub padded: bool,
}

/// Frequency-domain descriptors of one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectralFeature {
    pub window: Window,
    /// Energy per configured band, in band order
    pub band_energies: Vec<f64>,
    pub peak_frequency_hz: f64,
    /// Energy summed over the whole one-sided spectrum
    pub total_energy: f64,
}

/// Fixed-length feature vector for one channel window.
///
/// Layout: band energies, peak frequency, RMS, kurtosis, skew, missing ratio.
/// `degenerate` marks the zero vector emitted for a constant-valued window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub window: Window,
    pub values: Vec<f64>,
    pub degenerate: bool,
}

impl FeatureVector {
    pub fn channel(&self) -> &ChannelId {
        &self.window.channel
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }
}
