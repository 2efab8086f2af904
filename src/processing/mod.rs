//! Signal processing module - windowing, spectra and per-window features
//!
//! ## Architecture
//!
//! - `windowing`: gap filling, resampling of irregular channels and the
//!   lazy fixed-length window iterator
//! - `fft`: Hann-windowed magnitude spectra, band energies and peak frequency
//! - `features`: time-domain statistics combined with the spectral
//!   descriptors into one `FeatureVector` per window

mod features;
mod fft;
mod windowing;

pub use features::{FeatureExtractor, FeatureLayout};
pub use fft::SpectralAnalyzer;
pub use windowing::{UniformSeries, WindowSegmenter, WindowSlice, Windows};

use thiserror::Error;

/// Errors in signal processing
#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("Degenerate window {index} in channel {channel}: zero variance")]
    DegenerateWindow { channel: String, index: usize },

    #[error("Invalid sampling rate: {0}")]
    InvalidSamplingRate(f64),

    #[error("Invalid window: {0}")]
    InvalidWindow(String),
}
