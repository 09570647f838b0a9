//! Grouping of spikes into higher-order temporal patterns.
//!
//! Runs of temporally adjacent spikes on one channel form "spike trains";
//! longer runs are treated as "words", following the vocabulary used in
//! fungal electrical-activity research. The clusterer walks the trailing
//! spike window each analysis tick and republishes the full pattern list,
//! so consumers always see clusters derived from the same bounded history.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use myco_core::{ChannelId, Timestamp};

use crate::spikes::SpikeEvent;

/// Pattern taxonomy. The gap clusterer emits `SpikeTrain` and `Word`;
/// `Burst` and `Oscillation` are part of the published schema for richer
/// classifiers layered on top.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    SpikeTrain,
    Word,
    Burst,
    Oscillation,
}

/// A closed cluster of spikes on one channel. Immutable once emitted;
/// spans of patterns on the same channel never overlap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub start: Timestamp,
    pub end: Timestamp,
    pub channel: ChannelId,
    pub kind: PatternKind,
    /// Confidence in [0, 0.95], non-decreasing in member count.
    pub confidence: f64,
    pub spike_ids: Vec<Uuid>,
}

impl Pattern {
    pub fn member_count(&self) -> usize {
        self.spike_ids.len()
    }

    pub fn duration_secs(&self) -> f64 {
        self.end.secs_since(self.start)
    }
}

/// Gap-threshold clusterer.
///
/// Per channel, spikes accumulate into a run while each inter-spike gap
/// stays below the threshold. A gap at or above the threshold (or the end
/// of the spike stream) closes the run; runs with at least `min_members`
/// spikes are emitted as patterns, smaller runs are discarded. The spike
/// that caused closure seeds the next run.
#[derive(Debug, Clone)]
pub struct PatternClusterer {
    gap_threshold: Duration,
    min_members: usize,
    word_members: usize,
}

/// Confidence grows with cluster size and saturates here.
const CONFIDENCE_CAP: f64 = 0.95;
const CONFIDENCE_BASE: f64 = 0.5;
const CONFIDENCE_PER_MEMBER: f64 = 0.1;

impl PatternClusterer {
    pub fn new(gap_threshold: Duration) -> Self {
        Self {
            gap_threshold,
            min_members: 3,
            word_members: 5,
        }
    }

    pub fn gap_threshold(&self) -> Duration {
        self.gap_threshold
    }

    /// Cluster the trailing spike window into patterns.
    ///
    /// The input may span multiple channels and need not be sorted; spikes
    /// are grouped per channel and ordered by timestamp internally.
    pub fn cluster(&self, spikes: &[SpikeEvent]) -> Vec<Pattern> {
        let mut by_channel: BTreeMap<ChannelId, Vec<&SpikeEvent>> = BTreeMap::new();
        for spike in spikes {
            by_channel.entry(spike.channel).or_default().push(spike);
        }

        let gap_secs = self.gap_threshold.as_secs_f64();
        let mut patterns = Vec::new();

        for (channel, mut channel_spikes) in by_channel {
            channel_spikes.sort_by_key(|s| s.timestamp);

            let mut run: Vec<&SpikeEvent> = Vec::new();
            for spike in channel_spikes {
                let closes = run
                    .last()
                    .map(|prev| spike.timestamp.secs_since(prev.timestamp) >= gap_secs)
                    .unwrap_or(false);

                if closes {
                    if let Some(pattern) = self.emit(channel, &run) {
                        patterns.push(pattern);
                    }
                    run.clear();
                }
                run.push(spike);
            }

            // Stream exhausted: the trailing run closes too.
            if let Some(pattern) = self.emit(channel, &run) {
                patterns.push(pattern);
            }
        }

        patterns
    }

    fn emit(&self, channel: ChannelId, run: &[&SpikeEvent]) -> Option<Pattern> {
        if run.len() < self.min_members {
            return None;
        }

        let kind = if run.len() >= self.word_members {
            PatternKind::Word
        } else {
            PatternKind::SpikeTrain
        };
        let confidence =
            (CONFIDENCE_BASE + CONFIDENCE_PER_MEMBER * run.len() as f64).min(CONFIDENCE_CAP);

        Some(Pattern {
            start: run[0].timestamp,
            end: run[run.len() - 1].timestamp,
            channel,
            kind,
            confidence,
            spike_ids: run.iter().map(|s| s.id).collect(),
        })
    }
}

impl Default for PatternClusterer {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spike(channel: u16, at_secs: f64) -> SpikeEvent {
        SpikeEvent {
            id: Uuid::new_v4(),
            timestamp: Timestamp::from_secs_f64(at_secs),
            channel: ChannelId::new(channel),
            amplitude_uv: 42.0,
        }
    }

    #[test]
    fn test_three_spike_run_forms_one_train() {
        // Spikes at 0, 0.5, 1.0 s with a 2 s gap threshold.
        let clusterer = PatternClusterer::new(Duration::from_secs(2));
        let spikes = vec![spike(0, 0.0), spike(0, 0.5), spike(0, 1.0)];

        let patterns = clusterer.cluster(&spikes);
        assert_eq!(patterns.len(), 1);

        let p = &patterns[0];
        assert_eq!(p.kind, PatternKind::SpikeTrain);
        assert_eq!(p.member_count(), 3);
        assert!((p.confidence - 0.8).abs() < 1e-9);
        assert_eq!(p.start, Timestamp::from_secs_f64(0.0));
        assert_eq!(p.end, Timestamp::from_secs_f64(1.0));
    }

    #[test]
    fn test_six_member_cluster_is_word_at_cap() {
        let clusterer = PatternClusterer::new(Duration::from_secs(2));
        let spikes: Vec<SpikeEvent> = (0..6).map(|i| spike(0, i as f64 * 0.5)).collect();

        let patterns = clusterer.cluster(&spikes);
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].kind, PatternKind::Word);
        assert_eq!(patterns[0].confidence, 0.95);
    }

    #[test]
    fn test_gap_splits_run_into_two_patterns() {
        let clusterer = PatternClusterer::new(Duration::from_secs(2));
        // Two tight runs separated by a 5 s gap.
        let mut spikes: Vec<SpikeEvent> = (0..3).map(|i| spike(0, i as f64 * 0.5)).collect();
        spikes.extend((0..3).map(|i| spike(0, 6.0 + i as f64 * 0.5)));

        let patterns = clusterer.cluster(&spikes);
        assert_eq!(patterns.len(), 2);

        // Non-overlapping spans.
        assert!(patterns[0].end < patterns[1].start);
    }

    #[test]
    fn test_small_runs_discarded() {
        let clusterer = PatternClusterer::new(Duration::from_secs(2));
        let spikes = vec![spike(0, 0.0), spike(0, 0.5)];

        assert!(clusterer.cluster(&spikes).is_empty());
    }

    #[test]
    fn test_confidence_monotonic_and_capped() {
        let clusterer = PatternClusterer::new(Duration::from_secs(2));

        let mut previous = 0.0;
        for members in 3..12 {
            let spikes: Vec<SpikeEvent> =
                (0..members).map(|i| spike(0, i as f64 * 0.1)).collect();
            let patterns = clusterer.cluster(&spikes);
            let confidence = patterns[0].confidence;

            assert!(confidence >= previous);
            assert!(confidence <= 0.95);
            previous = confidence;
        }
    }

    #[test]
    fn test_channels_cluster_independently() {
        let clusterer = PatternClusterer::new(Duration::from_secs(2));
        let mut spikes: Vec<SpikeEvent> = (0..3).map(|i| spike(0, i as f64 * 0.5)).collect();
        spikes.extend((0..5).map(|i| spike(1, i as f64 * 0.5)));

        let patterns = clusterer.cluster(&spikes);
        assert_eq!(patterns.len(), 2);

        let ch0 = patterns
            .iter()
            .find(|p| p.channel == ChannelId::new(0))
            .unwrap();
        let ch1 = patterns
            .iter()
            .find(|p| p.channel == ChannelId::new(1))
            .unwrap();
        assert_eq!(ch0.kind, PatternKind::SpikeTrain);
        assert_eq!(ch1.kind, PatternKind::Word);
    }

    #[test]
    fn test_unsorted_input_tolerated() {
        let clusterer = PatternClusterer::new(Duration::from_secs(2));
        let spikes = vec![spike(0, 1.0), spike(0, 0.0), spike(0, 0.5)];

        let patterns = clusterer.cluster(&spikes);
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].start, Timestamp::from_secs_f64(0.0));
    }
}
