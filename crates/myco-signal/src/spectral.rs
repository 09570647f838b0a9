//! Windowed frequency-domain analysis of a single channel.
//!
//! Slow electrical oscillations in mycelial cultures carry most of their
//! energy well below 1 Hz, with transient activity reaching into the tens
//! of Hz depending on electrode spacing and culture state. The analyzer
//! transforms the most recent buffer window into a [`SpectrumFrame`]:
//! per-bin magnitudes inside a configured frequency range, aggregate band
//! powers, the strongest spectral peaks, and an SNR estimate.
//!
//! Frames are plain data; rendering layers consume them read-only.

use std::collections::HashMap;
use std::sync::Arc;

use num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use serde::{Deserialize, Serialize};

/// Minimum window length for a meaningful transform. Shorter windows
/// produce a zeroed frame rather than an error.
pub const MIN_SPECTRUM_SAMPLES: usize = 16;

/// Inclusive frequency range retained in the output frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrequencyRange {
    pub min_hz: f64,
    pub max_hz: f64,
}

impl FrequencyRange {
    pub fn new(min_hz: f64, max_hz: f64) -> Self {
        Self { min_hz, max_hz }
    }

    pub fn contains(&self, f: f64) -> bool {
        f >= self.min_hz && f <= self.max_hz
    }
}

impl Default for FrequencyRange {
    fn default() -> Self {
        // DC drift through fast transient activity.
        Self {
            min_hz: 0.0,
            max_hz: 50.0,
        }
    }
}

/// Fractional index ranges of the retained bin array over which each band
/// power is averaged. Ranges are configuration, not constants baked into
/// the analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandRanges {
    pub ultra_low: (f64, f64),
    pub low: (f64, f64),
    pub mid: (f64, f64),
    pub high: (f64, f64),
}

impl Default for BandRanges {
    fn default() -> Self {
        Self {
            ultra_low: (0.0, 0.10),
            low: (0.10, 0.35),
            mid: (0.35, 0.65),
            high: (0.65, 1.0),
        }
    }
}

/// Mean spectral magnitude inside each configured band.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BandPowers {
    pub ultra_low: f64,
    pub low: f64,
    pub mid: f64,
    pub high: f64,
}

impl BandPowers {
    pub fn total(&self) -> f64 {
        self.ultra_low + self.low + self.mid + self.high
    }

    /// Band powers scaled to sum to 1 (all zeros if there is no energy).
    pub fn normalized(&self) -> [f64; 4] {
        let total = self.total();
        if total > 0.0 {
            [
                self.ultra_low / total,
                self.low / total,
                self.mid / total,
                self.high / total,
            ]
        } else {
            [0.0; 4]
        }
    }
}

/// A local spectral maximum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpectralPeak {
    pub frequency_hz: f64,
    pub magnitude: f64,
}

/// One frequency-domain snapshot of a channel window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectrumFrame {
    /// Ascending bin frequencies, all inside the configured range.
    pub frequencies: Vec<f64>,
    /// Bin magnitudes, same length as `frequencies`.
    pub magnitudes: Vec<f64>,
    pub band_powers: BandPowers,
    /// At most five peaks, sorted strictly descending by magnitude.
    pub peaks: Vec<SpectralPeak>,
    pub snr_db: f64,
    /// Frequency of the globally largest magnitude, 0 for an empty frame.
    pub dominant_freq_hz: f64,
}

impl SpectrumFrame {
    /// The degraded frame published when the window is too short.
    pub fn zeroed() -> Self {
        Self {
            frequencies: Vec::new(),
            magnitudes: Vec::new(),
            band_powers: BandPowers::default(),
            peaks: Vec::new(),
            snr_db: 0.0,
            dominant_freq_hz: 0.0,
        }
    }

    pub fn total_power(&self) -> f64 {
        self.magnitudes.iter().map(|m| m * m).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.magnitudes.is_empty()
    }
}

/// Windowed spectral analyzer.
///
/// Planned transforms are cached per window length so repeated windows of
/// the same size reuse their plan.
pub struct SpectralAnalyzer {
    band_ranges: BandRanges,
    /// Fraction of the highest-frequency bins treated as the noise slice
    /// for the SNR estimate.
    noise_fraction: f64,
    plans: HashMap<usize, Arc<dyn Fft<f64>>>,
}

impl SpectralAnalyzer {
    pub fn new(band_ranges: BandRanges, noise_fraction: f64) -> Self {
        Self {
            band_ranges,
            noise_fraction: noise_fraction.clamp(0.0, 1.0),
            plans: HashMap::new(),
        }
    }

    /// Transform `window` into a [`SpectrumFrame`].
    ///
    /// Windows shorter than [`MIN_SPECTRUM_SAMPLES`] and non-positive
    /// sample rates yield [`SpectrumFrame::zeroed`].
    pub fn analyze(
        &mut self,
        window: &[f64],
        sample_rate_hz: f64,
        range: FrequencyRange,
    ) -> SpectrumFrame {
        let n = window.len();
        if n < MIN_SPECTRUM_SAMPLES || sample_rate_hz <= 0.0 {
            return SpectrumFrame::zeroed();
        }

        let mut buffer: Vec<Complex<f64>> =
            window.iter().map(|&x| Complex::new(x, 0.0)).collect();
        let fft = Arc::clone(
            self.plans
                .entry(n)
                .or_insert_with(|| FftPlanner::new().plan_fft_forward(n)),
        );
        fft.process(&mut buffer);

        // Retain bins with f = k * fs / N inside the requested range,
        // up to Nyquist. Magnitude normalization is 1/N so a unit-amplitude
        // input maps to bounded bin values.
        let freq_step = sample_rate_hz / n as f64;
        let mut frequencies = Vec::new();
        let mut magnitudes = Vec::new();
        for (k, value) in buffer.iter().enumerate().take(n / 2 + 1) {
            let f = k as f64 * freq_step;
            if range.contains(f) {
                frequencies.push(f);
                magnitudes.push(value.norm() / n as f64);
            }
        }

        let band_powers = self.band_powers(&magnitudes);
        let peaks = Self::find_peaks(&frequencies, &magnitudes);
        let snr_db = self.snr_db(&magnitudes);
        let dominant_freq_hz = Self::dominant_frequency(&frequencies, &magnitudes);

        SpectrumFrame {
            frequencies,
            magnitudes,
            band_powers,
            peaks,
            snr_db,
            dominant_freq_hz,
        }
    }

    /// Arithmetic mean of magnitude over a fractional index range of the
    /// retained bins.
    fn band_mean(magnitudes: &[f64], range: (f64, f64)) -> f64 {
        let n = magnitudes.len();
        if n == 0 {
            return 0.0;
        }

        let lo = (range.0 * n as f64) as usize;
        if lo >= n {
            return 0.0;
        }
        let hi = ((range.1 * n as f64).ceil() as usize).clamp(lo + 1, n);
        let slice = &magnitudes[lo..hi];
        slice.iter().sum::<f64>() / slice.len() as f64
    }

    fn band_powers(&self, magnitudes: &[f64]) -> BandPowers {
        BandPowers {
            ultra_low: Self::band_mean(magnitudes, self.band_ranges.ultra_low),
            low: Self::band_mean(magnitudes, self.band_ranges.low),
            mid: Self::band_mean(magnitudes, self.band_ranges.mid),
            high: Self::band_mean(magnitudes, self.band_ranges.high),
        }
    }

    /// Peaks are interior bins strictly greater than every neighbor within
    /// two bins on each side; sorted descending by magnitude, capped at 5.
    fn find_peaks(frequencies: &[f64], magnitudes: &[f64]) -> Vec<SpectralPeak> {
        let n = magnitudes.len();
        let mut peaks = Vec::new();

        for i in 1..n.saturating_sub(1) {
            let m = magnitudes[i];
            let mut is_peak = m > magnitudes[i - 1] && m > magnitudes[i + 1];
            if is_peak && i >= 2 {
                is_peak = m > magnitudes[i - 2];
            }
            if is_peak && i + 2 < n {
                is_peak = m > magnitudes[i + 2];
            }
            if is_peak {
                peaks.push(SpectralPeak {
                    frequency_hz: frequencies[i],
                    magnitude: m,
                });
            }
        }

        peaks.sort_by(|a, b| {
            b.magnitude
                .partial_cmp(&a.magnitude)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        peaks.truncate(5);
        peaks
    }

    /// SNR against the highest-frequency slice of bins.
    ///
    /// `noise_power` is the summed squared magnitude over the top
    /// `noise_fraction` of bins by frequency; `signal_power` is the rest.
    /// Guarded to return 0 rather than an infinity when either side of the
    /// ratio vanishes.
    fn snr_db(&self, magnitudes: &[f64]) -> f64 {
        let n = magnitudes.len();
        if n == 0 || self.noise_fraction <= 0.0 {
            return 0.0;
        }

        let total_power: f64 = magnitudes.iter().map(|m| m * m).sum();
        let noise_bins = ((self.noise_fraction * n as f64).round() as usize).clamp(1, n);
        let noise_power: f64 = magnitudes[n - noise_bins..].iter().map(|m| m * m).sum();
        let signal_power = (total_power - noise_power).max(0.0);

        if noise_power > 0.0 && signal_power > 0.0 {
            10.0 * (signal_power / noise_power).log10()
        } else {
            0.0
        }
    }

    fn dominant_frequency(frequencies: &[f64], magnitudes: &[f64]) -> f64 {
        magnitudes
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .filter(|(_, m)| **m > 0.0)
            .map(|(i, _)| frequencies[i])
            .unwrap_or(0.0)
    }
}

impl Default for SpectralAnalyzer {
    fn default() -> Self {
        Self::new(BandRanges::default(), 0.2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn sine(freq_hz: f64, sample_rate_hz: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| (2.0 * PI * freq_hz * i as f64 / sample_rate_hz).sin())
            .collect()
    }

    #[test]
    fn test_short_window_yields_zeroed_frame() {
        let mut analyzer = SpectralAnalyzer::default();
        let frame = analyzer.analyze(&[1.0; 8], 100.0, FrequencyRange::default());

        assert!(frame.is_empty());
        assert_eq!(frame.dominant_freq_hz, 0.0);
        assert_eq!(frame.snr_db, 0.0);
        assert!(frame.peaks.is_empty());
    }

    #[test]
    fn test_empty_window_yields_zeroed_frame() {
        let mut analyzer = SpectralAnalyzer::default();
        let frame = analyzer.analyze(&[], 100.0, FrequencyRange::default());

        assert!(frame.magnitudes.iter().all(|&m| m == 0.0));
        assert_eq!(frame.dominant_freq_hz, 0.0);
    }

    #[test]
    fn test_silent_window_has_no_dominant_frequency() {
        let mut analyzer = SpectralAnalyzer::default();
        let frame = analyzer.analyze(&[0.0; 64], 100.0, FrequencyRange::default());

        // Bins exist but carry no energy.
        assert!(!frame.frequencies.is_empty());
        assert!(frame.magnitudes.iter().all(|&m| m == 0.0));
        assert_eq!(frame.dominant_freq_hz, 0.0);
        // No noise power means the SNR guard reports 0.
        assert_eq!(frame.snr_db, 0.0);
        assert!(frame.peaks.is_empty());
    }

    #[test]
    fn test_frequencies_bounded_and_aligned() {
        let mut analyzer = SpectralAnalyzer::default();
        let range = FrequencyRange::new(1.0, 30.0);
        let signal = sine(10.0, 100.0, 256);
        let frame = analyzer.analyze(&signal, 100.0, range);

        assert_eq!(frame.frequencies.len(), frame.magnitudes.len());
        assert!(!frame.frequencies.is_empty());
        for f in &frame.frequencies {
            assert!(range.contains(*f), "frequency {} outside range", f);
        }
        // Monotonic ascending.
        for pair in frame.frequencies.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn test_dominant_frequency_of_pure_tone() {
        let mut analyzer = SpectralAnalyzer::default();
        // 10 Hz tone lands exactly on a bin for 256 samples at 256 Hz.
        let signal = sine(10.0, 256.0, 256);
        let frame = analyzer.analyze(&signal, 256.0, FrequencyRange::new(0.0, 128.0));

        assert!(
            (frame.dominant_freq_hz - 10.0).abs() < 1.0,
            "expected dominant near 10 Hz, got {}",
            frame.dominant_freq_hz
        );
        assert!(frame.total_power() >= 0.0);
    }

    #[test]
    fn test_peak_list_sorted_and_capped() {
        let mut analyzer = SpectralAnalyzer::default();
        // Sum of tones produces several distinct peaks.
        let signal: Vec<f64> = (0..512)
            .map(|i| {
                let t = i as f64 / 256.0;
                (2.0 * PI * 8.0 * t).sin()
                    + 0.7 * (2.0 * PI * 20.0 * t).sin()
                    + 0.4 * (2.0 * PI * 40.0 * t).sin()
            })
            .collect();
        let frame = analyzer.analyze(&signal, 256.0, FrequencyRange::new(0.0, 128.0));

        assert!(frame.peaks.len() <= 5);
        assert!(!frame.peaks.is_empty());
        for pair in frame.peaks.windows(2) {
            assert!(pair[0].magnitude > pair[1].magnitude);
        }
        // Strongest peak tracks the strongest tone.
        assert!((frame.peaks[0].frequency_hz - 8.0).abs() < 1.5);
    }

    #[test]
    fn test_snr_finite_for_tonal_signal() {
        let mut analyzer = SpectralAnalyzer::default();
        // Slightly off-bin so spectral leakage guarantees a nonzero
        // noise slice.
        let signal = sine(5.3, 128.0, 256);
        let frame = analyzer.analyze(&signal, 128.0, FrequencyRange::new(0.0, 64.0));

        assert!(frame.snr_db.is_finite());
        // A low-frequency tone against high-frequency noise bins is
        // comfortably positive.
        assert!(frame.snr_db > 0.0);
    }

    #[test]
    fn test_band_powers_follow_signal_content() {
        let mut analyzer = SpectralAnalyzer::default();
        let range = FrequencyRange::new(0.0, 64.0);

        // Energy near the bottom of the range.
        let low_tone = sine(2.0, 128.0, 256);
        let low_frame = analyzer.analyze(&low_tone, 128.0, range);
        assert!(low_frame.band_powers.ultra_low > low_frame.band_powers.high);

        // Energy near the top of the range.
        let high_tone = sine(55.0, 128.0, 256);
        let high_frame = analyzer.analyze(&high_tone, 128.0, range);
        assert!(high_frame.band_powers.high > high_frame.band_powers.ultra_low);
    }

    #[test]
    fn test_band_ranges_are_configuration() {
        // Widening the ultra-low range changes its aggregate.
        let narrow = BandRanges {
            ultra_low: (0.0, 0.05),
            ..BandRanges::default()
        };
        let wide = BandRanges {
            ultra_low: (0.0, 0.5),
            ..BandRanges::default()
        };

        let signal = sine(10.0, 128.0, 256);
        let range = FrequencyRange::new(0.0, 64.0);

        let mut a = SpectralAnalyzer::new(narrow, 0.2);
        let mut b = SpectralAnalyzer::new(wide, 0.2);
        let fa = a.analyze(&signal, 128.0, range);
        let fb = b.analyze(&signal, 128.0, range);

        assert!((fa.band_powers.ultra_low - fb.band_powers.ultra_low).abs() > 1e-12);
    }

    #[test]
    fn test_normalized_band_powers_sum_to_one() {
        let mut analyzer = SpectralAnalyzer::default();
        let signal = sine(10.0, 128.0, 256);
        let frame = analyzer.analyze(&signal, 128.0, FrequencyRange::new(0.0, 64.0));

        let normalized = frame.band_powers.normalized();
        let sum: f64 = normalized.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);

        let zeroed = BandPowers::default().normalized();
        assert_eq!(zeroed, [0.0; 4]);
    }
}
