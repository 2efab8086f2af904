//! Spectral analysis using rustfft
//!
//! Each window is multiplied by a symmetric Hann taper and transformed with a
//! pre-planned forward FFT of exactly the window length. The one-sided
//! magnitude spectrum is scaled by 1/N at DC and Nyquist and 2/N elsewhere,
//! so a sinusoid of amplitude A shows up with a peak near A/2 (the Hann
//! coherent gain).
//!
//! Band energy is the sum of squared linear magnitudes of the bins with
//! `lo <= f < hi`; the last band also includes its upper edge. Bins above
//! the last edge contribute only to the total energy.

use num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::f64::consts::PI;
use std::sync::Arc;

use super::ProcessingError;
use crate::types::{SpectralFeature, Window};

/// Pre-planned spectral analyzer for one (window length, sample rate) pair.
///
/// Band edges are fixed at construction and shared by every channel
/// analyzed with this instance.
pub struct SpectralAnalyzer {
    fft: Arc<dyn Fft<f64>>,
    size: usize,
    sampling_rate: f64,
    taper: Vec<f64>,
    /// Half-open bin ranges per band
    band_bins: Vec<(usize, usize)>,
    include_dc: bool,
}

impl SpectralAnalyzer {
    /// Create a new analyzer
    ///
    /// # Arguments
    /// * `size` - Window length in samples (FFT size, no padding)
    /// * `sampling_rate` - Sampling rate in Hz
    /// * `band_edges_hz` - N+1 strictly increasing edges for N bands
    /// * `include_dc` - Allow bin 0 to be reported as the peak
    pub fn new(
        size: usize,
        sampling_rate: f64,
        band_edges_hz: &[f64],
        include_dc: bool,
    ) -> Result<Self, ProcessingError> {
        if !sampling_rate.is_finite() || sampling_rate <= 0.0 {
            return Err(ProcessingError::InvalidSamplingRate(sampling_rate));
        }
        if size < 2 {
            return Err(ProcessingError::InvalidWindow(format!(
                "FFT size {size} is shorter than two samples"
            )));
        }
        if band_edges_hz.len() < 2 || band_edges_hz.windows(2).any(|w| w[1] <= w[0]) {
            return Err(ProcessingError::InvalidWindow(
                "band edges must hold at least two strictly increasing values".to_string(),
            ));
        }

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(size);

        let denom = (size - 1) as f64;
        let taper = (0..size)
            .map(|n| 0.5 - 0.5 * (2.0 * PI * n as f64 / denom).cos())
            .collect();

        let resolution = sampling_rate / size as f64;
        let n_positive = size / 2 + 1;
        let n_bands = band_edges_hz.len() - 1;
        let band_bins = (0..n_bands)
            .map(|b| {
                let lo = band_edges_hz[b];
                let hi = band_edges_hz[b + 1];
                let last = b + 1 == n_bands;
                let first_bin = (0..n_positive)
                    .find(|&k| k as f64 * resolution >= lo)
                    .unwrap_or(n_positive);
                let end_bin = (first_bin..n_positive)
                    .find(|&k| {
                        let f = k as f64 * resolution;
                        if last { f > hi } else { f >= hi }
                    })
                    .unwrap_or(n_positive);
                (first_bin, end_bin)
            })
            .collect();

        Ok(Self {
            fft,
            size,
            sampling_rate,
            taper,
            band_bins,
            include_dc,
        })
    }

    /// Scaled one-sided magnitude spectrum of `samples` (length must equal the FFT size).
    pub fn magnitude_spectrum(&self, samples: &[f64]) -> Result<Vec<f64>, ProcessingError> {
        if samples.len() != self.size {
            return Err(ProcessingError::InvalidWindow(format!(
                "expected {} samples, got {}",
                self.size,
                samples.len()
            )));
        }

        let mut buffer: Vec<Complex<f64>> = samples
            .iter()
            .zip(&self.taper)
            .map(|(&x, &w)| Complex::new(x * w, 0.0))
            .collect();

        // Compute FFT in-place
        self.fft.process(&mut buffer);

        // 2/N for the one-sided spectrum, except DC and (even N) Nyquist
        let n_positive = self.size / 2 + 1;
        let has_nyquist = self.size % 2 == 0;
        let magnitudes = buffer
            .iter()
            .take(n_positive)
            .enumerate()
            .map(|(i, c)| {
                let single = i == 0 || (has_nyquist && i == n_positive - 1);
                let scale = if single { 1.0 } else { 2.0 };
                c.norm() * scale / self.size as f64
            })
            .collect();
        Ok(magnitudes)
    }

    /// Band energies, peak frequency and total energy for one window.
    pub fn analyze(&self, window: &Window, samples: &[f64]) -> Result<SpectralFeature, ProcessingError> {
        let magnitudes = self.magnitude_spectrum(samples)?;

        let band_energies = self
            .band_bins
            .iter()
            .map(|&(lo, hi)| magnitudes[lo..hi].iter().map(|m| m * m).sum())
            .collect();
        let total_energy = magnitudes.iter().map(|m| m * m).sum();

        // Strict comparison keeps the lowest bin on ties
        let first = usize::from(!self.include_dc);
        let mut peak_bin = first.min(magnitudes.len() - 1);
        for (k, &m) in magnitudes.iter().enumerate().skip(first) {
            if m > magnitudes[peak_bin] {
                peak_bin = k;
            }
        }

        Ok(SpectralFeature {
            window: window.clone(),
            band_energies,
            peak_frequency_hz: peak_bin as f64 * self.frequency_resolution(),
            total_energy,
        })
    }

    /// Number of configured bands.
    pub fn band_count(&self) -> usize {
        self.band_bins.len()
    }

    /// Get the FFT size
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }

    /// Get the frequency resolution (Hz per bin)
    pub fn frequency_resolution(&self) -> f64 {
        self.sampling_rate / self.size as f64
    }
}
