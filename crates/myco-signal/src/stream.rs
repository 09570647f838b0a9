//! Streaming boundary between the transport layer and the engine.
//!
//! The engine itself never touches I/O. This module defines the narrow
//! capability interface a device/transport backend must provide
//! ([`SampleSource`]) and a runner that drains such a source into an
//! [`AnalysisEngine`] on a fixed tick cadence, publishing snapshots over a
//! channel. Transport retries and timeouts belong to the source
//! implementation; a failed source simply ends the stream, which the
//! consumer observes as the closed channel.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{error, warn};

use myco_core::{Result, SampleRecord};

use crate::engine::{AnalysisEngine, EngineSnapshot};

/// Capability interface to a sample-producing backend.
///
/// Implementations wrap serial devices, network feeds, or file replays.
/// The engine only ever needs these five operations.
#[async_trait]
pub trait SampleSource: Send + Sync {
    /// Begin producing records.
    async fn start(&mut self) -> Result<()>;

    /// Stop producing records.
    async fn stop(&mut self) -> Result<()>;

    fn is_running(&self) -> bool;

    /// Receive the next record, waiting for one to arrive.
    async fn recv(&mut self) -> Result<SampleRecord>;

    /// Receive a record if one is immediately available.
    fn try_recv(&mut self) -> Option<SampleRecord>;
}

/// Drive an engine from a sample source.
///
/// Spawns a task that ingests records as they arrive and advances the
/// engine clock every `tick_period`, publishing a snapshot per tick. The
/// returned receiver yields those snapshots; dropping it shuts the task
/// down. Invalid records are logged and skipped; a source error ends the
/// stream.
pub async fn run_streaming<S>(
    mut engine: AnalysisEngine,
    mut source: S,
    tick_period: Duration,
) -> Result<mpsc::Receiver<EngineSnapshot>>
where
    S: SampleSource + 'static,
{
    source.start().await?;
    let (tx, rx) = mpsc::channel(64);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(tick_period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    engine.tick(tick_period);
                    if tx.send(engine.snapshot()).await.is_err() {
                        // Receiver dropped.
                        break;
                    }
                }
                record = source.recv() => match record {
                    Ok(record) => {
                        if let Err(e) = engine.ingest(&record) {
                            warn!("discarding record: {e}");
                        }
                    }
                    Err(e) => {
                        error!("sample source failed: {e}");
                        break;
                    }
                },
            }
        }

        let _ = source.stop().await;
    });

    Ok(rx)
}
