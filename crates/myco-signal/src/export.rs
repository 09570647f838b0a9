//! Stable JSON export of the engine's current state.
//!
//! The bundle schema is the contract with external tooling: re-importing a
//! prior export reproduces the same pattern count and timestamps exactly.
//! Timestamps serialize as raw nanosecond integers, so the round trip is
//! bit-for-bit; `exportedAt` is an ISO-8601 UTC instant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use myco_core::{Result, Sample};

use crate::causality::CausalGraph;
use crate::classifier::ClassificationResult;
use crate::engine::AnalysisEngine;
use crate::patterns::Pattern;
use crate::spikes::SpikeEvent;

/// One exported state bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportBundle {
    pub samples: Vec<Sample>,
    pub spikes: Vec<SpikeEvent>,
    pub patterns: Vec<Pattern>,
    pub causality: CausalGraph,
    pub classification: ClassificationResult,
    #[serde(rename = "exportedAt")]
    pub exported_at: DateTime<Utc>,
}

impl ExportBundle {
    /// Capture the engine's buffered samples and latest snapshot.
    pub fn from_engine(engine: &AnalysisEngine) -> Self {
        let snapshot = engine.snapshot();
        Self {
            samples: engine.samples(),
            spikes: (*snapshot.spikes).clone(),
            patterns: (*snapshot.patterns).clone(),
            causality: (*snapshot.causality).clone(),
            classification: (*snapshot.classification).clone(),
            exported_at: Utc::now(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
