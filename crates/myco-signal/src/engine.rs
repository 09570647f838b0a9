//! The analysis engine: explicit state, explicit clock.
//!
//! All pipeline state lives in an [`AnalysisEngine`] instance advanced by
//! `tick(dt)`; there is no global or static state. Sample ingestion is the
//! single writer, every analysis stage is a bounded synchronous
//! computation, and outputs are published by replacement: each snapshot
//! field is rebuilt as a whole and swapped in behind an `Arc`, so readers
//! never observe a partially written result.
//!
//! Two cadences drive the work: the analysis tick (spike detection,
//! clustering, spectrum, classification) and the slower causality epoch.
//! Stopping the tick loop is the only cancellation mechanism; no stage
//! blocks on I/O.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use myco_core::{ChannelId, Error, Result, Sample, SampleRecord, Timestamp};

use crate::buffer::SignalBuffer;
use crate::causality::{CausalGraph, CausalityEstimator};
use crate::classifier::{ClassificationResult, Classifier, ClassifierConfig};
use crate::patterns::{Pattern, PatternClusterer};
use crate::spectral::{BandRanges, FrequencyRange, SpectralAnalyzer, SpectrumFrame};
use crate::spikes::{SpikeDetector, SpikeEvent};

/// Engine tuning. Every knob the pipeline exposes lives here.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Per-channel sample capacity.
    pub buffer_capacity: usize,
    /// Samples fed to the spectral transform.
    pub analysis_window: usize,
    /// Trailing samples used for the spike baseline.
    pub baseline_window: usize,
    /// Minimum interval between analysis passes.
    pub min_tick_interval: Duration,
    /// Interval between causality recomputations.
    pub causality_epoch: Duration,
    /// Trailing samples per channel fed to the influence estimator.
    pub causality_window: usize,
    /// Spike height above baseline required for detection, in microvolts.
    pub spike_threshold_uv: f64,
    /// Per-channel dead time after a detected spike.
    pub refractory: Duration,
    /// Inter-spike gap that closes a pattern cluster.
    pub gap_threshold: Duration,
    /// Age limit for retained spikes.
    pub spike_retention: Duration,
    /// Count limit for retained spikes (also the clustering window).
    pub max_recent_spikes: usize,
    /// Window over which the spike rate is measured.
    pub spike_rate_window: Duration,
    /// Channels silent for longer than this are excluded from
    /// multi-channel computations instead of failing them.
    pub channel_stale_after: Duration,
    pub freq_range: FrequencyRange,
    pub band_ranges: BandRanges,
    /// Fraction of top-frequency bins treated as noise for the SNR.
    pub noise_fraction: f64,
    /// Minimum strength for a causal edge to be surfaced.
    pub reporting_threshold: f64,
    /// Anomaly score above which the snapshot carries an alert flag.
    pub anomaly_threshold: f64,
    /// Channel whose spectrum is published in the snapshot; the first
    /// active channel when unset.
    pub focus_channel: Option<ChannelId>,
    pub classifier: ClassifierConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 4096,
            analysis_window: 256,
            baseline_window: 16,
            min_tick_interval: Duration::from_millis(16),
            causality_epoch: Duration::from_millis(500),
            causality_window: 256,
            spike_threshold_uv: 30.0,
            refractory: Duration::from_millis(200),
            gap_threshold: Duration::from_secs(2),
            spike_retention: Duration::from_secs(60),
            max_recent_spikes: 100,
            spike_rate_window: Duration::from_secs(10),
            channel_stale_after: Duration::from_secs(5),
            freq_range: FrequencyRange::default(),
            band_ranges: BandRanges::default(),
            noise_fraction: 0.2,
            reporting_threshold: 0.15,
            anomaly_threshold: 0.7,
            focus_channel: None,
            classifier: ClassifierConfig::default(),
        }
    }
}

/// Read-only view of the latest published outputs.
///
/// Cloning is cheap (`Arc` per field) and yields an internally consistent
/// set: once cloned, a snapshot never changes under the reader.
#[derive(Debug, Clone)]
pub struct EngineSnapshot {
    pub spectrum: Arc<SpectrumFrame>,
    pub spikes: Arc<Vec<SpikeEvent>>,
    pub patterns: Arc<Vec<Pattern>>,
    pub causality: Arc<CausalGraph>,
    pub classification: Arc<ClassificationResult>,
    /// Whether the anomaly score crossed the configured threshold.
    pub anomaly_alert: bool,
}

impl Default for EngineSnapshot {
    fn default() -> Self {
        Self {
            spectrum: Arc::new(SpectrumFrame::zeroed()),
            spikes: Arc::new(Vec::new()),
            patterns: Arc::new(Vec::new()),
            causality: Arc::new(CausalGraph::empty(Timestamp::from_nanos(0))),
            classification: Arc::new(ClassificationResult::default()),
            anomaly_alert: false,
        }
    }
}

/// The analysis pipeline instance.
pub struct AnalysisEngine {
    config: EngineConfig,
    buffers: BTreeMap<ChannelId, SignalBuffer>,
    detector: SpikeDetector,
    clusterer: PatternClusterer,
    spectral: SpectralAnalyzer,
    causality: CausalityEstimator,
    classifier: Classifier,
    recent_spikes: VecDeque<SpikeEvent>,
    latest_ts: Option<Timestamp>,
    since_analysis: Duration,
    since_causality: Duration,
    snapshot: EngineSnapshot,
}

impl AnalysisEngine {
    pub fn new(config: EngineConfig) -> Self {
        let detector = SpikeDetector::new(
            config.spike_threshold_uv,
            config.refractory,
            config.baseline_window,
        );
        let clusterer = PatternClusterer::new(config.gap_threshold);
        let spectral = SpectralAnalyzer::new(config.band_ranges, config.noise_fraction);
        let causality = CausalityEstimator::new(32, config.reporting_threshold);
        let classifier = Classifier::new(config.classifier.clone());

        Self {
            config,
            buffers: BTreeMap::new(),
            detector,
            clusterer,
            spectral,
            causality,
            classifier,
            recent_spikes: VecDeque::new(),
            latest_ts: None,
            since_analysis: Duration::ZERO,
            since_causality: Duration::ZERO,
            snapshot: EngineSnapshot::default(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Validate and buffer one incoming record.
    ///
    /// A channel's buffer is created when the channel first appears;
    /// channels that never deliver are simply absent from every
    /// multi-channel computation.
    pub fn ingest(&mut self, record: &SampleRecord) -> Result<()> {
        if !record.is_valid() {
            return Err(Error::InvalidRecord(format!(
                "channel {} value {} rate {}",
                record.channel, record.value_uv, record.sample_rate_hz
            )));
        }

        let buffer = self.buffers.entry(record.channel).or_insert_with(|| {
            SignalBuffer::new(
                record.channel,
                record.sample_rate_hz,
                self.config.buffer_capacity,
            )
        });
        buffer.set_sample_rate(record.sample_rate_hz);

        let sample = record.to_sample();
        self.latest_ts = Some(match self.latest_ts {
            Some(t) if t > sample.timestamp => t,
            _ => sample.timestamp,
        });
        buffer.push(sample);

        Ok(())
    }

    /// Advance the engine clock.
    ///
    /// Analysis runs when at least the minimum tick interval has
    /// accumulated; causality runs on its own slower epoch. Work per call
    /// is bounded, so stopping the caller's loop is a complete
    /// cancellation.
    pub fn tick(&mut self, dt: Duration) {
        self.since_analysis += dt;
        self.since_causality += dt;

        if self.since_analysis >= self.config.min_tick_interval {
            self.since_analysis = Duration::ZERO;
            self.run_analysis();
        }

        if self.since_causality >= self.config.causality_epoch {
            self.since_causality = Duration::ZERO;
            self.run_causality();
        }
    }

    /// Latest published outputs. See [`EngineSnapshot`].
    pub fn snapshot(&self) -> EngineSnapshot {
        self.snapshot.clone()
    }

    pub fn active_channels(&self) -> Vec<ChannelId> {
        self.buffers.keys().copied().collect()
    }

    /// All currently buffered samples across channels, in channel order.
    pub fn samples(&self) -> Vec<Sample> {
        self.buffers
            .values()
            .flat_map(|b| b.iter().copied())
            .collect()
    }

    /// Spectrum of an arbitrary channel's current window, on demand.
    pub fn analyze_channel(&mut self, channel: ChannelId) -> SpectrumFrame {
        let Some(buffer) = self.buffers.get(&channel) else {
            return SpectrumFrame::zeroed();
        };
        let values = buffer.values(self.config.analysis_window);
        let sample_rate = buffer.sample_rate_hz();
        let range = self.config.freq_range;
        self.spectral.analyze(&values, sample_rate, range)
    }

    /// Spikes per second over the configured rate window.
    pub fn spike_rate_hz(&self) -> f64 {
        let window_secs = self.config.spike_rate_window.as_secs_f64();
        if window_secs <= 0.0 {
            return 0.0;
        }
        let Some(anchor) = self.latest_ts else {
            return 0.0;
        };

        let count = self
            .recent_spikes
            .iter()
            .filter(|s| anchor.secs_since(s.timestamp) <= window_secs)
            .count();
        count as f64 / window_secs
    }

    fn run_analysis(&mut self) {
        // Spike detection over each channel's trailing window. The
        // detector is incremental, so overlap with prior passes is safe.
        let scan_len = self.config.analysis_window + self.config.baseline_window;
        let mut new_spikes = Vec::new();
        for (channel, buffer) in &self.buffers {
            let window = buffer.window(scan_len);
            new_spikes.extend(self.detector.detect(*channel, &window));
        }
        new_spikes.sort_by_key(|s| s.timestamp);
        self.recent_spikes.extend(new_spikes);
        self.evict_spikes();

        let spikes: Vec<SpikeEvent> = self.recent_spikes.iter().cloned().collect();
        let patterns = self.clusterer.cluster(&spikes);
        let spectrum = self.focus_spectrum();
        let spike_rate = self.spike_rate_hz();
        let classification = self.classifier.classify(&spectrum, spike_rate);
        let anomaly_alert = classification.is_anomalous(self.config.anomaly_threshold);

        self.snapshot = EngineSnapshot {
            spectrum: Arc::new(spectrum),
            spikes: Arc::new(spikes),
            patterns: Arc::new(patterns),
            causality: Arc::clone(&self.snapshot.causality),
            classification: Arc::new(classification),
            anomaly_alert,
        };
    }

    fn run_causality(&mut self) {
        let stale_secs = self.config.channel_stale_after.as_secs_f64();
        let anchor = self.latest_ts;

        let mut series = BTreeMap::new();
        for (channel, buffer) in &self.buffers {
            // Silent channels drop out rather than failing the epoch.
            let is_stale = match (anchor, buffer.latest()) {
                (Some(anchor), Some(last)) => anchor.secs_since(last.timestamp) > stale_secs,
                _ => true,
            };
            if is_stale {
                continue;
            }

            let values = buffer.values(self.config.causality_window);
            if values.len() >= self.causality.min_samples() {
                series.insert(*channel, values);
            }
        }
        debug!(channels = series.len(), "causality epoch");

        let epoch = self.latest_ts.unwrap_or(Timestamp::from_nanos(0));
        let graph = self.causality.estimate(&series, epoch);
        self.snapshot.causality = Arc::new(graph);
    }

    fn focus_spectrum(&mut self) -> SpectrumFrame {
        let focus = self
            .config
            .focus_channel
            .or_else(|| self.buffers.keys().next().copied());
        match focus {
            Some(channel) => self.analyze_channel(channel),
            None => SpectrumFrame::zeroed(),
        }
    }

    fn evict_spikes(&mut self) {
        let retention = self.config.spike_retention.as_secs_f64();
        if let Some(anchor) = self.latest_ts {
            while let Some(front) = self.recent_spikes.front() {
                if anchor.secs_since(front.timestamp) > retention {
                    self.recent_spikes.pop_front();
                } else {
                    break;
                }
            }
        }
        while self.recent_spikes.len() > self.config.max_recent_spikes {
            self.recent_spikes.pop_front();
        }
    }
}

impl Default for AnalysisEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
