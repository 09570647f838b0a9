//! # Myco Signal
//!
//! Real-time analysis pipeline for multichannel extracellular recordings
//! from living mycelial cultures.
//!
//! Raw microvolt samples stream in from an external device layer and flow
//! through the pipeline:
//!
//! 1. **Buffering**: per-channel bounded FIFOs ([`SignalBuffer`])
//! 2. **Spectral analysis**: windowed transform into band powers, peaks,
//!    and SNR ([`SpectralAnalyzer`])
//! 3. **Spike detection**: transients above a local baseline
//!    ([`SpikeDetector`])
//! 4. **Pattern clustering**: spike trains and words from temporally
//!    adjacent spikes ([`PatternClusterer`])
//! 5. **Causality**: directional inter-channel influence and the epoch's
//!    pacemaker ([`CausalityEstimator`])
//! 6. **Classification**: coarse behavioral state with anomaly scoring
//!    ([`Classifier`])
//!
//! The [`AnalysisEngine`] owns all of this behind an explicit `tick(dt)`
//! clock and publishes read-only snapshots; rendering, transport, and
//! persistence live entirely outside this crate and talk to it through
//! [`stream::SampleSource`], [`engine::EngineSnapshot`], and
//! [`export::ExportBundle`].

pub mod buffer;
pub mod causality;
pub mod classifier;
pub mod engine;
pub mod export;
pub mod patterns;
pub mod spectral;
pub mod spikes;
pub mod stream;
pub mod synth;

pub use buffer::SignalBuffer;
pub use causality::{
    CausalEdge, CausalGraph, CausalityEstimator, InfluenceEstimator, LaggedVarianceReduction,
};
pub use classifier::{
    ActivityClass, ClassificationResult, Classifier, ClassifierConfig, Trend,
};
pub use engine::{AnalysisEngine, EngineConfig, EngineSnapshot};
pub use export::ExportBundle;
pub use patterns::{Pattern, PatternClusterer, PatternKind};
pub use spectral::{
    BandPowers, BandRanges, FrequencyRange, SpectralAnalyzer, SpectralPeak, SpectrumFrame,
    MIN_SPECTRUM_SAMPLES,
};
pub use spikes::{
    BaselineEstimator, MedianBaseline, MovingMeanBaseline, SpikeDetector, SpikeEvent,
};
pub use stream::{run_streaming, SampleSource};
pub use synth::{SynthConfig, SyntheticSource};
