//! Myco Core - foundational types for mycelial electrophysiology analysis.
//!
//! This crate provides the shared vocabulary of the analysis platform:
//! timestamps, channel identifiers, raw samples, and the error type used
//! across all crates. The processing pipeline itself lives in `myco-signal`.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{ChannelId, Sample, SampleRecord, Timestamp};
