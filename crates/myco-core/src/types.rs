//! Fundamental types shared across the analysis crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timestamp wrapper with nanosecond precision.
///
/// Stored as a raw `i64` so that serialized values survive an
/// export/import round trip bit-for-bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now().timestamp_nanos_opt().unwrap_or(0))
    }

    pub fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    /// Convenience constructor for second-resolution times.
    pub fn from_secs_f64(secs: f64) -> Self {
        Self((secs * 1_000_000_000.0) as i64)
    }

    pub fn as_nanos(&self) -> i64 {
        self.0
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.0 as f64 / 1_000_000_000.0
    }

    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.0)
    }

    /// Seconds elapsed since an earlier timestamp (negative if `earlier` is newer).
    pub fn secs_since(&self, earlier: Timestamp) -> f64 {
        (self.0 - earlier.0) as f64 / 1_000_000_000.0
    }
}

/// Identifier for a recording electrode channel.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ChannelId(pub u16);

impl ChannelId {
    pub fn new(index: u16) -> Self {
        Self(index)
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ch{}", self.0)
    }
}

/// A single extracellular potential measurement. Immutable once produced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: Timestamp,
    pub channel: ChannelId,
    /// Electrode potential in microvolts.
    pub value_uv: f64,
}

impl Sample {
    pub fn new(timestamp: Timestamp, channel: ChannelId, value_uv: f64) -> Self {
        Self {
            timestamp,
            channel,
            value_uv,
        }
    }
}

/// Wire record delivered by the device/transport layer.
///
/// The transport layer owns connection management, retries, and timeouts;
/// the analysis core only ever sees a stream of these records and tolerates
/// irregular delivery and missing channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    pub device_id: String,
    pub channel: ChannelId,
    pub timestamp: Timestamp,
    pub value_uv: f64,
    pub sample_rate_hz: f64,
}

impl SampleRecord {
    pub fn new(
        device_id: impl Into<String>,
        channel: ChannelId,
        timestamp: Timestamp,
        value_uv: f64,
        sample_rate_hz: f64,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            channel,
            timestamp,
            value_uv,
            sample_rate_hz,
        }
    }

    /// Validate record integrity before it enters the buffers.
    pub fn is_valid(&self) -> bool {
        self.value_uv.is_finite() && self.sample_rate_hz.is_finite() && self.sample_rate_hz > 0.0
    }

    pub fn to_sample(&self) -> Sample {
        Sample::new(self.timestamp, self.channel, self.value_uv)
    }
}
