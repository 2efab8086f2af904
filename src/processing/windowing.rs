//! Window segmentation
//!
//! A channel is first turned into a `UniformSeries`: gaps are filled with the
//! previous valid sample (the next one at the start of the series), and
//! irregularly sampled channels are resampled onto a uniform grid from the
//! nearest valid sample. Every filled sample, and every grid point whose
//! nearest sample is more than half a period away, is flagged so the feature
//! stage can report the missing ratio.
//!
//! `WindowSegmenter::windows` then yields fixed-length windows lazily. With
//! `n` samples, length `L` and step `S = max(1, floor(L * (1 - overlap)))`
//! there are `(n - L) / S + 1` full windows when `n >= L` and none otherwise.
//! The trailing partial window is dropped or zero-padded according to the
//! configured policy; a series shorter than one window never yields a padded
//! window.

use tracing::debug;

use super::ProcessingError;
use crate::config::{PartialWindowPolicy, WindowingConfig};
use crate::types::{Channel, ChannelId, Window};

// ============================================================================
// Uniform Series
// ============================================================================

/// Gap-free, uniformly spaced samples of one channel.
#[derive(Debug, Clone, PartialEq)]
pub struct UniformSeries {
    pub channel: ChannelId,
    pub sample_rate_hz: f64,
    pub start_time_s: f64,
    pub values: Vec<f64>,
    /// `true` where the value was gap-filled or resampled from a distant sample
    pub filled: Vec<bool>,
}

impl UniformSeries {
    pub fn from_channel(channel: &Channel) -> Self {
        let start_time_s = channel.timestamps.first().copied().unwrap_or(0.0);
        let (values, filled) = if channel.irregular {
            let resampled = resample_nearest(channel);
            debug!(
                channel = %channel.id,
                from = channel.len(),
                to = resampled.0.len(),
                "Resampled irregular channel"
            );
            resampled
        } else {
            fill_gaps(&channel.values)
        };
        Self {
            channel: channel.id.clone(),
            sample_rate_hz: channel.sample_rate_hz,
            start_time_s,
            values,
            filled,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Nearest-neighbour resampling onto `t0 + k / fs`.
///
/// Each grid point takes the value of the nearest valid source sample, the
/// earlier one on a tie. The point is flagged filled when that sample lies
/// more than half a sample period away.
fn resample_nearest(channel: &Channel) -> (Vec<f64>, Vec<bool>) {
    let times = &channel.timestamps;
    let (Some(&t0), Some(&t_last)) = (times.first(), times.last()) else {
        return (Vec::new(), Vec::new());
    };
    let fs = channel.sample_rate_hz;
    if !fs.is_finite() || fs <= 0.0 {
        return fill_gaps(&channel.values);
    }

    let dt = 1.0 / fs;
    let tolerance = 0.5 * dt;
    let n = ((t_last - t0) * fs + 1e-9).floor() as usize + 1;

    let valid: Vec<(f64, f64)> = times
        .iter()
        .zip(&channel.values)
        .filter_map(|(t, v)| v.map(|v| (*t, v)))
        .collect();
    if valid.is_empty() {
        return (vec![0.0; n], vec![true; n]);
    }

    let mut values = Vec::with_capacity(n);
    let mut filled = Vec::with_capacity(n);
    let mut j = 0usize;
    for k in 0..n {
        let t = t0 + k as f64 * dt;
        // Strictly closer only, so ties stay on the earlier sample
        while j + 1 < valid.len() && (valid[j + 1].0 - t).abs() < (valid[j].0 - t).abs() {
            j += 1;
        }
        let (time, value) = valid[j];
        values.push(value);
        filled.push((time - t).abs() > tolerance);
    }
    (values, filled)
}

/// Forward-fill gaps; leading gaps take the first valid value.
///
/// A series without a single valid sample becomes all zeros, all filled.
fn fill_gaps(raw: &[Option<f64>]) -> (Vec<f64>, Vec<bool>) {
    let first_valid = raw.iter().flatten().next().copied().unwrap_or(0.0);
    let mut last = first_valid;
    let mut values = Vec::with_capacity(raw.len());
    let mut filled = Vec::with_capacity(raw.len());
    for sample in raw {
        match sample {
            Some(v) => {
                last = *v;
                values.push(*v);
                filled.push(false);
            }
            None => {
                values.push(last);
                filled.push(true);
            }
        }
    }
    (values, filled)
}

// ============================================================================
// Segmenter
// ============================================================================

/// Samples and flags of one window, ready for spectral analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowSlice {
    pub window: Window,
    pub samples: Vec<f64>,
    /// Gap-fill flags for the real samples; padding is never flagged
    pub filled: Vec<bool>,
}

impl WindowSlice {
    pub fn filled_count(&self) -> usize {
        self.filled.iter().filter(|f| **f).count()
    }
}

/// Splits uniform series into fixed-length, optionally overlapping windows.
#[derive(Debug, Clone)]
pub struct WindowSegmenter {
    length: usize,
    overlap: f64,
    policy: PartialWindowPolicy,
}

impl WindowSegmenter {
    pub fn new(config: &WindowingConfig) -> Result<Self, ProcessingError> {
        if config.length < 2 {
            return Err(ProcessingError::InvalidWindow(format!(
                "length {} is shorter than two samples",
                config.length
            )));
        }
        if !(0.0..1.0).contains(&config.overlap) {
            return Err(ProcessingError::InvalidWindow(format!(
                "overlap {} outside [0, 1)",
                config.overlap
            )));
        }
        Ok(Self {
            length: config.length,
            overlap: config.overlap,
            policy: config.partial_policy,
        })
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// Samples between consecutive window starts.
    pub fn step(&self) -> usize {
        ((self.length as f64 * (1.0 - self.overlap)).floor() as usize).max(1)
    }

    /// Number of windows produced for a series of `n` samples.
    pub fn window_count(&self, n: usize) -> usize {
        if n < self.length {
            return 0;
        }
        let step = self.step();
        let full = (n - self.length) / step + 1;
        let last_end = (full - 1) * step + self.length;
        match self.policy {
            PartialWindowPolicy::ZeroPad if last_end < n => full + 1,
            _ => full,
        }
    }

    /// Lazily iterate the windows of `series`.
    pub fn windows<'a>(&'a self, series: &'a UniformSeries) -> Windows<'a> {
        Windows {
            segmenter: self,
            series,
            next: 0,
            total: self.window_count(series.len()),
        }
    }
}

/// Iterator over the windows of one series.
pub struct Windows<'a> {
    segmenter: &'a WindowSegmenter,
    series: &'a UniformSeries,
    next: usize,
    total: usize,
}

impl Iterator for Windows<'_> {
    type Item = WindowSlice;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.total {
            return None;
        }
        let index = self.next;
        self.next += 1;

        let length = self.segmenter.length;
        let start = index * self.segmenter.step();
        let end = (start + length).min(self.series.len());
        let padded = end - start < length;

        let mut samples = self.series.values[start..end].to_vec();
        let mut filled = self.series.filled[start..end].to_vec();
        samples.resize(length, 0.0);
        filled.resize(length, false);

        Some(WindowSlice {
            window: Window {
                channel: self.series.channel.clone(),
                index,
                start,
                length,
                overlap: self.segmenter.overlap,
                start_time_s: self.series.start_time_s + start as f64 / self.series.sample_rate_hz,
                padded,
            },
            samples,
            filled,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.total - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Windows<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(n: usize) -> UniformSeries {
        UniformSeries {
            channel: ChannelId::new("Pressure", Some("bar")),
            sample_rate_hz: 100.0,
            start_time_s: 0.0,
            values: (0..n).map(|i| i as f64).collect(),
            filled: vec![false; n],
        }
    }

    fn segmenter(length: usize, overlap: f64, policy: PartialWindowPolicy) -> WindowSegmenter {
        WindowSegmenter::new(&WindowingConfig {
            length,
            overlap,
            partial_policy: policy,
        })
        .unwrap()
    }

    #[test]
    fn test_single_full_window_remainder_dropped() {
        let seg = segmenter(1024, 0.0, PartialWindowPolicy::Drop);
        let s = series(2000);
        let windows: Vec<_> = seg.windows(&s).collect();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].samples.len(), 1024);
        assert!(!windows[0].window.padded);
    }

    #[test]
    fn test_overlap_step_and_count() {
        let seg = segmenter(1024, 0.5, PartialWindowPolicy::Drop);
        assert_eq!(seg.step(), 512);
        assert_eq!(seg.window_count(20_000), 38);

        let s = series(20_000);
        let last = seg.windows(&s).last().unwrap();
        assert_eq!(last.window.index, 37);
        assert_eq!(last.window.start, 37 * 512);
        assert!((last.window.start_time_s - 189.44).abs() < 1e-9);
    }

    #[test]
    fn test_zero_pad_adds_partial_window() {
        let seg = segmenter(1024, 0.0, PartialWindowPolicy::ZeroPad);
        let s = series(2000);
        let windows: Vec<_> = seg.windows(&s).collect();
        assert_eq!(windows.len(), 2);
        let tail = &windows[1];
        assert!(tail.window.padded);
        assert_eq!(tail.samples.len(), 1024);
        assert_eq!(tail.samples[975], 1999.0);
        assert_eq!(tail.samples[976], 0.0);
    }

    #[test]
    fn test_exact_fit_has_no_padded_window() {
        let seg = segmenter(100, 0.0, PartialWindowPolicy::ZeroPad);
        assert_eq!(seg.window_count(300), 3);
    }

    #[test]
    fn test_short_series_yields_nothing_under_either_policy() {
        for policy in [PartialWindowPolicy::Drop, PartialWindowPolicy::ZeroPad] {
            let seg = segmenter(1024, 0.0, policy);
            let s = series(1000);
            assert_eq!(seg.windows(&s).count(), 0);
        }
    }

    #[test]
    fn test_invalid_overlap_rejected() {
        let result = WindowSegmenter::new(&WindowingConfig {
            length: 64,
            overlap: 1.0,
            partial_policy: PartialWindowPolicy::Drop,
        });
        assert!(matches!(result, Err(ProcessingError::InvalidWindow(_))));
    }

    #[test]
    fn test_gap_fill_flags() {
        let (values, filled) = fill_gaps(&[None, Some(2.0), None, None, Some(5.0)]);
        assert_eq!(values, vec![2.0, 2.0, 2.0, 2.0, 5.0]);
        assert_eq!(filled, vec![true, false, true, true, false]);
    }

    #[test]
    fn test_irregular_channel_resampled() {
        let channel = Channel {
            id: ChannelId::new("Flow", Some("L/min")),
            sample_rate_hz: 10.0,
            irregular: true,
            timestamps: vec![0.0, 0.1, 0.2, 0.5, 0.6],
            values: vec![Some(1.0), Some(2.0), Some(3.0), Some(6.0), Some(7.0)],
        };
        let s = UniformSeries::from_channel(&channel);
        assert_eq!(s.len(), 7);
        // 0.3 is nearest to 0.2, 0.4 is nearest to 0.5
        assert_eq!(s.values, vec![1.0, 2.0, 3.0, 3.0, 6.0, 6.0, 7.0]);
        assert_eq!(s.filled, vec![false, false, false, true, true, false, false]);
    }

    #[test]
    fn test_resample_tie_takes_earlier_sample() {
        // Grid point 0.5 sits exactly between 0.25 and 0.75
        let channel = Channel {
            id: ChannelId::new("Flow", Some("L/min")),
            sample_rate_hz: 4.0,
            irregular: true,
            timestamps: vec![0.0, 0.25, 0.75, 1.0],
            values: vec![Some(1.0), Some(2.0), Some(4.0), Some(5.0)],
        };
        let s = UniformSeries::from_channel(&channel);
        assert_eq!(s.values, vec![1.0, 2.0, 2.0, 4.0, 5.0]);
        assert_eq!(s.filled, vec![false, false, true, false, false]);
    }

    #[test]
    fn test_resample_skips_gap_samples() {
        let channel = Channel {
            id: ChannelId::new("Flow", Some("L/min")),
            sample_rate_hz: 10.0,
            irregular: true,
            timestamps: vec![0.0, 0.1, 0.2, 0.35],
            values: vec![Some(1.0), None, Some(3.0), Some(4.0)],
        };
        let s = UniformSeries::from_channel(&channel);
        assert_eq!(s.len(), 4);
        // 0.1 falls back to its nearest valid neighbour, the earlier on a tie
        assert_eq!(s.values[1], 1.0);
        assert!(s.filled[1]);
        assert_eq!(s.values[2], 3.0);
        assert!(!s.filled[2]);
    }
}
