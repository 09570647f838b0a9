//! Transient event extraction from the raw sample stream.
//!
//! Mycelial action-potential-like transients appear as brief excursions
//! above the slowly drifting resting potential. The detector scans each
//! channel for local maxima whose height above a local baseline exceeds a
//! configurable threshold, with a per-channel refractory period so a single
//! transient is never counted twice.
//!
//! The exact detection criterion is deliberately pluggable: the baseline
//! rule is a trait, so a median, moving-mean, or adaptive estimator can be
//! swapped without touching the scan loop.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use myco_core::{ChannelId, Sample, Timestamp};

/// A detected transient. Immutable; retained only inside the engine's
/// bounded recent window and evicted by age.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpikeEvent {
    pub id: Uuid,
    pub timestamp: Timestamp,
    pub channel: ChannelId,
    /// Height of the transient above the local baseline, in microvolts.
    pub amplitude_uv: f64,
}

/// Estimates the local resting level of a signal window.
pub trait BaselineEstimator: Send + Sync {
    fn baseline(&self, window: &[f64]) -> f64;
}

/// Median of the trailing window. Robust against the spikes themselves
/// inflating the baseline.
#[derive(Debug, Clone, Copy, Default)]
pub struct MedianBaseline;

impl BaselineEstimator for MedianBaseline {
    fn baseline(&self, window: &[f64]) -> f64 {
        if window.is_empty() {
            return 0.0;
        }
        let mut sorted = window.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let mid = sorted.len() / 2;
        if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        }
    }
}

/// Arithmetic mean of the trailing window. Cheaper, less robust.
#[derive(Debug, Clone, Copy, Default)]
pub struct MovingMeanBaseline;

impl BaselineEstimator for MovingMeanBaseline {
    fn baseline(&self, window: &[f64]) -> f64 {
        if window.is_empty() {
            return 0.0;
        }
        window.iter().sum::<f64>() / window.len() as f64
    }
}

/// Multi-channel spike detector with per-channel refractory tracking.
///
/// The detector is incremental: repeated calls over overlapping windows
/// never re-emit an already reported sample, so the engine can hand it the
/// trailing buffer window on every analysis tick.
pub struct SpikeDetector {
    threshold_uv: f64,
    refractory: Duration,
    baseline_window: usize,
    baseline: Box<dyn BaselineEstimator>,
    /// Timestamp of the last emitted spike per channel.
    last_spike: HashMap<ChannelId, Timestamp>,
    /// Newest sample already evaluated per channel.
    last_seen: HashMap<ChannelId, Timestamp>,
}

impl SpikeDetector {
    pub fn new(threshold_uv: f64, refractory: Duration, baseline_window: usize) -> Self {
        Self::with_baseline(
            threshold_uv,
            refractory,
            baseline_window,
            Box::new(MedianBaseline),
        )
    }

    pub fn with_baseline(
        threshold_uv: f64,
        refractory: Duration,
        baseline_window: usize,
        baseline: Box<dyn BaselineEstimator>,
    ) -> Self {
        Self {
            threshold_uv,
            refractory,
            baseline_window: baseline_window.max(1),
            baseline,
            last_spike: HashMap::new(),
            last_seen: HashMap::new(),
        }
    }

    /// Scan a channel window for new transients.
    ///
    /// A sample qualifies when it is a strict local maximum and its height
    /// above the local baseline exceeds the threshold, and the channel is
    /// outside its refractory period. The final sample of the window is
    /// left unevaluated until a successor arrives, since it cannot yet be
    /// confirmed as a local maximum.
    pub fn detect(&mut self, channel: ChannelId, samples: &[Sample]) -> Vec<SpikeEvent> {
        let mut events = Vec::new();
        if samples.len() < 3 {
            return events;
        }

        let values: Vec<f64> = samples.iter().map(|s| s.value_uv).collect();
        let already_seen = self.last_seen.get(&channel).copied();

        for i in 1..samples.len() - 1 {
            let t = samples[i].timestamp;
            if let Some(seen) = already_seen {
                if t <= seen {
                    continue;
                }
            }

            let v = values[i];
            if !(v > values[i - 1] && v > values[i + 1]) {
                continue;
            }

            let start = i.saturating_sub(self.baseline_window);
            let baseline = self.baseline.baseline(&values[start..i]);
            let amplitude = v - baseline;
            if amplitude <= self.threshold_uv {
                continue;
            }

            if let Some(last) = self.last_spike.get(&channel) {
                if t.secs_since(*last) < self.refractory.as_secs_f64() {
                    continue;
                }
            }

            self.last_spike.insert(channel, t);
            events.push(SpikeEvent {
                id: Uuid::new_v4(),
                timestamp: t,
                channel,
                amplitude_uv: amplitude,
            });
        }

        // Everything up to the penultimate sample has now been evaluated.
        let newest_evaluated = samples[samples.len() - 2].timestamp;
        let entry = self.last_seen.entry(channel).or_insert(newest_evaluated);
        if newest_evaluated > *entry {
            *entry = newest_evaluated;
        }

        events
    }

    pub fn threshold_uv(&self) -> f64 {
        self.threshold_uv
    }

    pub fn set_threshold_uv(&mut self, threshold_uv: f64) {
        self.threshold_uv = threshold_uv;
    }

    pub fn refractory(&self) -> Duration {
        self.refractory
    }

    /// Forget all per-channel detection state.
    pub fn reset(&mut self) {
        self.last_spike.clear();
        self.last_seen.clear();
    }
}
