//! Deterministic synthetic recording source.
//!
//! Demo and test fixture only: the analysis engine never generates data.
//! The source emits a per-channel sinusoid with seeded pseudo-noise and
//! optional periodic spike transients, paced at the configured sample
//! rate. Two sources built from the same config produce identical
//! streams.

use std::f64::consts::PI;
use std::time::Duration;

use async_trait::async_trait;

use myco_core::{ChannelId, Error, Result, SampleRecord, Timestamp};

use crate::stream::SampleSource;

/// Synthetic stream shape.
#[derive(Debug, Clone)]
pub struct SynthConfig {
    pub device_id: String,
    pub channels: u16,
    pub sample_rate_hz: f64,
    /// Oscillation frequency of the underlying sinusoid.
    pub base_freq_hz: f64,
    pub amplitude_uv: f64,
    /// Peak-to-peak scale of the injected pseudo-noise.
    pub noise_uv: f64,
    /// Inject a spike transient every this many samples per channel;
    /// 0 disables spikes.
    pub spike_interval: usize,
    pub spike_amplitude_uv: f64,
    pub seed: u64,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            device_id: "synthetic-culture".to_string(),
            channels: 4,
            sample_rate_hz: 100.0,
            base_freq_hz: 0.8,
            amplitude_uv: 20.0,
            noise_uv: 2.0,
            spike_interval: 0,
            spike_amplitude_uv: 120.0,
            seed: 0x5EED_CA57,
        }
    }
}

/// Seeded synthetic [`SampleSource`].
pub struct SyntheticSource {
    config: SynthConfig,
    running: bool,
    /// Global record counter; channel index cycles fastest.
    index: u64,
    rng_state: u64,
}

impl SyntheticSource {
    pub fn new(config: SynthConfig) -> Self {
        let rng_state = config.seed.max(1);
        Self {
            config,
            running: false,
            index: 0,
            rng_state,
        }
    }

    /// xorshift64 noise in [-1, 1].
    fn next_noise(&mut self) -> f64 {
        let mut x = self.rng_state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.rng_state = x;
        (x >> 11) as f64 / (1u64 << 53) as f64 * 2.0 - 1.0
    }

    fn next_record(&mut self) -> SampleRecord {
        let channels = self.config.channels.max(1) as u64;
        let channel = (self.index % channels) as u16;
        let sample_idx = self.index / channels;
        self.index += 1;

        let t = sample_idx as f64 / self.config.sample_rate_hz;
        // Per-channel phase offset keeps the channels distinguishable.
        let phase = channel as f64 * PI / 4.0;
        let mut value = self.config.amplitude_uv
            * (2.0 * PI * self.config.base_freq_hz * t + phase).sin()
            + self.config.noise_uv * self.next_noise();

        if self.config.spike_interval > 0
            && sample_idx > 0
            && sample_idx % self.config.spike_interval as u64 == 0
        {
            value += self.config.spike_amplitude_uv;
        }

        SampleRecord::new(
            self.config.device_id.clone(),
            ChannelId::new(channel),
            Timestamp::from_secs_f64(t),
            value,
            self.config.sample_rate_hz,
        )
    }

    fn record_period(&self) -> Duration {
        let channels = self.config.channels.max(1) as f64;
        Duration::from_secs_f64(1.0 / (self.config.sample_rate_hz * channels))
    }
}

#[async_trait]
impl SampleSource for SyntheticSource {
    async fn start(&mut self) -> Result<()> {
        self.running = true;
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        self.running = false;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running
    }

    async fn recv(&mut self) -> Result<SampleRecord> {
        if !self.running {
            return Err(Error::Acquisition("source not started".into()));
        }
        // Pace delivery at the device's native rate.
        tokio::time::sleep(self.record_period()).await;
        Ok(self.next_record())
    }

    fn try_recv(&mut self) -> Option<SampleRecord> {
        if self.running {
            Some(self.next_record())
        } else {
            None
        }
    }
}
