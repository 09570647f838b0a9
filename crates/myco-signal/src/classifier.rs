//! Coarse behavioral classification of the current culture state.
//!
//! The classifier reduces the latest spectrum and spike activity to a
//! small feature vector and matches it against a fixed table of reference
//! vectors, one per behavioral class. The table lives in a config struct
//! so reference tuning never requires touching the matching code.
//!
//! Deviations from a rolling baseline are reported as an anomaly score in
//! [0, 1]; crossing the configured threshold is data for the consumer, not
//! an error.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::spectral::SpectrumFrame;

/// Behavioral classes observed in long-running mycelial recordings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityClass {
    /// Low, slowly drifting activity.
    Quiescent,
    /// Sustained rhythmic oscillation.
    Oscillatory,
    /// Dense spiking with broadband energy.
    Bursting,
    /// State change in progress.
    Transitional,
}

/// Direction of the recent activity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Rising,
    Falling,
    Stable,
}

/// Output of one classification pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub primary: ActivityClass,
    pub confidence: f64,
    pub secondary: ActivityClass,
    pub secondary_confidence: f64,
    /// Deviation from the rolling baseline, clipped to [0, 1].
    pub anomaly_score: f64,
    pub trend: Trend,
}

impl ClassificationResult {
    /// Whether the anomaly score crosses the alert threshold. Surfaced as
    /// data; the engine never raises on anomalies.
    pub fn is_anomalous(&self, threshold: f64) -> bool {
        self.anomaly_score > threshold
    }
}

impl Default for ClassificationResult {
    fn default() -> Self {
        Self {
            primary: ActivityClass::Quiescent,
            confidence: 0.0,
            secondary: ActivityClass::Quiescent,
            secondary_confidence: 0.0,
            anomaly_score: 0.0,
            trend: Trend::Stable,
        }
    }
}

/// Number of elements in the feature vector: four normalized band powers,
/// normalized spike rate, trend slope.
pub const FEATURE_LEN: usize = 6;

/// Reference feature vector for one class.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ClassReference {
    pub class: ActivityClass,
    pub features: [f64; FEATURE_LEN],
}

/// Classifier tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    pub references: Vec<ClassReference>,
    /// Spike rate (Hz) mapping to a saturated rate feature of 1.0.
    pub rate_scale_hz: f64,
    /// Exponential update weight for the rolling anomaly baseline.
    pub baseline_alpha: f64,
    /// Number of recent activity levels kept for the trend fit.
    pub trend_window: usize,
    /// Normalized slope magnitude below which the trend reads as stable.
    pub trend_deadband: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            references: vec![
                ClassReference {
                    class: ActivityClass::Quiescent,
                    features: [0.70, 0.20, 0.07, 0.03, 0.05, 0.0],
                },
                ClassReference {
                    class: ActivityClass::Oscillatory,
                    features: [0.15, 0.30, 0.45, 0.10, 0.30, 0.0],
                },
                ClassReference {
                    class: ActivityClass::Bursting,
                    features: [0.10, 0.20, 0.30, 0.40, 0.90, 0.0],
                },
                ClassReference {
                    class: ActivityClass::Transitional,
                    features: [0.25, 0.25, 0.25, 0.25, 0.40, 0.50],
                },
            ],
            rate_scale_hz: 2.0,
            baseline_alpha: 0.1,
            trend_window: 16,
            trend_deadband: 0.05,
        }
    }
}

/// Nearest-reference classifier with a rolling anomaly baseline.
pub struct Classifier {
    config: ClassifierConfig,
    baseline: Option<[f64; FEATURE_LEN]>,
    activity_history: VecDeque<f64>,
}

impl Classifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            config,
            baseline: None,
            activity_history: VecDeque::new(),
        }
    }

    /// Classify the current state from the latest spectrum and spike rate.
    pub fn classify(&mut self, frame: &SpectrumFrame, spike_rate_hz: f64) -> ClassificationResult {
        // Track the activity level first so the trend reflects this tick.
        let activity = frame.band_powers.total() + spike_rate_hz;
        self.activity_history.push_back(activity);
        while self.activity_history.len() > self.config.trend_window.max(2) {
            self.activity_history.pop_front();
        }

        let slope = self.normalized_slope();
        let trend = if slope > self.config.trend_deadband {
            Trend::Rising
        } else if slope < -self.config.trend_deadband {
            Trend::Falling
        } else {
            Trend::Stable
        };

        let features = self.feature_vector(frame, spike_rate_hz, slope);

        // Rank references by cosine similarity.
        let mut scored: Vec<(ActivityClass, f64)> = self
            .config
            .references
            .iter()
            .map(|r| (r.class, cosine_similarity(&features, &r.features)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let (primary, confidence) = scored.first().copied().unwrap_or((
            ActivityClass::Quiescent,
            0.0,
        ));
        let (secondary, secondary_confidence) =
            scored.get(1).copied().unwrap_or((primary, 0.0));

        let anomaly_score = self.anomaly_score(&features);

        ClassificationResult {
            primary,
            confidence: confidence.clamp(0.0, 1.0),
            secondary,
            secondary_confidence: secondary_confidence.clamp(0.0, 1.0),
            anomaly_score,
            trend,
        }
    }

    fn feature_vector(
        &self,
        frame: &SpectrumFrame,
        spike_rate_hz: f64,
        slope: f64,
    ) -> [f64; FEATURE_LEN] {
        let bands = frame.band_powers.normalized();
        let rate = if self.config.rate_scale_hz > 0.0 {
            (spike_rate_hz / self.config.rate_scale_hz).clamp(0.0, 1.0)
        } else {
            0.0
        };
        [bands[0], bands[1], bands[2], bands[3], rate, slope]
    }

    /// Least-squares slope of the recent activity levels, normalized by
    /// their mean magnitude and clamped to [-1, 1].
    fn normalized_slope(&self) -> f64 {
        let n = self.activity_history.len();
        if n < 3 {
            return 0.0;
        }

        let m = n as f64;
        let x_mean = (m - 1.0) / 2.0;
        let y_mean: f64 = self.activity_history.iter().sum::<f64>() / m;

        let mut numerator = 0.0;
        let mut denominator = 0.0;
        for (i, &y) in self.activity_history.iter().enumerate() {
            let dx = i as f64 - x_mean;
            numerator += dx * (y - y_mean);
            denominator += dx * dx;
        }
        if denominator <= 0.0 {
            return 0.0;
        }

        let slope = numerator / denominator;
        let scale = y_mean.abs().max(1e-9);
        (slope / scale).clamp(-1.0, 1.0)
    }

    /// Distance of the current features from the rolling baseline, clipped
    /// to [0, 1]. The first observation seeds the baseline and scores 0.
    fn anomaly_score(&mut self, features: &[f64; FEATURE_LEN]) -> f64 {
        match self.baseline {
            None => {
                self.baseline = Some(*features);
                0.0
            }
            Some(ref mut baseline) => {
                let distance: f64 = features
                    .iter()
                    .zip(baseline.iter())
                    .map(|(f, b)| (f - b) * (f - b))
                    .sum::<f64>()
                    .sqrt();
                let score = (distance / (FEATURE_LEN as f64).sqrt()).clamp(0.0, 1.0);

                let alpha = self.config.baseline_alpha.clamp(0.0, 1.0);
                for (b, f) in baseline.iter_mut().zip(features.iter()) {
                    *b = (1.0 - alpha) * *b + alpha * f;
                }

                score
            }
        }
    }

    /// Forget the rolling baseline and activity history.
    pub fn reset(&mut self) {
        self.baseline = None;
        self.activity_history.clear();
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(ClassifierConfig::default())
    }
}

fn cosine_similarity(a: &[f64; FEATURE_LEN], b: &[f64; FEATURE_LEN]) -> f64 {
    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a > 0.0 && norm_b > 0.0 {
        dot / (norm_a * norm_b)
    } else {
        0.0
    }
}
