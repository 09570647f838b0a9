//! Bounded per-channel sample storage.
//!
//! Every analysis stage reads from a [`SignalBuffer`]: a time-ordered FIFO
//! of raw samples for one electrode channel. The buffer never errors on
//! underflow; callers asking for more samples than are stored simply get a
//! shorter window and must degrade accordingly.

use std::collections::VecDeque;

use myco_core::{ChannelId, Sample};

/// Bounded, time-ordered store of raw samples for a single channel.
///
/// Invariant: `len() <= capacity`; the oldest sample is evicted first when
/// a push would exceed capacity.
#[derive(Debug, Clone)]
pub struct SignalBuffer {
    channel: ChannelId,
    sample_rate_hz: f64,
    capacity: usize,
    samples: VecDeque<Sample>,
}

impl SignalBuffer {
    pub fn new(channel: ChannelId, sample_rate_hz: f64, capacity: usize) -> Self {
        Self {
            channel,
            sample_rate_hz,
            capacity: capacity.max(1),
            samples: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    /// Append a sample at the tail, evicting the oldest on overflow.
    pub fn push(&mut self, sample: Sample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// The last `n` samples in arrival order, or fewer if the buffer holds
    /// fewer. Never fails; an empty buffer yields an empty window.
    pub fn window(&self, n: usize) -> Vec<Sample> {
        let start = self.samples.len().saturating_sub(n);
        self.samples.iter().skip(start).copied().collect()
    }

    /// Raw values (microvolts) of the last `n` samples.
    pub fn values(&self, n: usize) -> Vec<f64> {
        let start = self.samples.len().saturating_sub(n);
        self.samples.iter().skip(start).map(|s| s.value_uv).collect()
    }

    pub fn latest(&self) -> Option<&Sample> {
        self.samples.back()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    pub fn sample_rate_hz(&self) -> f64 {
        self.sample_rate_hz
    }

    /// Devices may renegotiate their rate mid-session; the buffer keeps the
    /// most recently reported value.
    pub fn set_sample_rate(&mut self, sample_rate_hz: f64) {
        if sample_rate_hz.is_finite() && sample_rate_hz > 0.0 {
            self.sample_rate_hz = sample_rate_hz;
        }
    }

    /// Time covered by the stored samples, in seconds.
    pub fn span_secs(&self) -> f64 {
        match (self.samples.front(), self.samples.back()) {
            (Some(first), Some(last)) => last.timestamp.secs_since(first.timestamp),
            _ => 0.0,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use myco_core::Timestamp;

    fn sample(ts_nanos: i64, value: f64) -> Sample {
        Sample::new(Timestamp::from_nanos(ts_nanos), ChannelId::new(0), value)
    }

    #[test]
    fn test_push_and_window() {
        let mut buf = SignalBuffer::new(ChannelId::new(0), 100.0, 8);
        for i in 0..5 {
            buf.push(sample(i, i as f64));
        }

        assert_eq!(buf.len(), 5);
        let window = buf.window(3);
        assert_eq!(window.len(), 3);
        assert_eq!(window[0].value_uv, 2.0);
        assert_eq!(window[2].value_uv, 4.0);
    }

    #[test]
    fn test_fifo_eviction_at_capacity() {
        let mut buf = SignalBuffer::new(ChannelId::new(0), 100.0, 4);
        for i in 0..10 {
            buf.push(sample(i, i as f64));
        }

        // Size never exceeds capacity; the oldest entries are gone.
        assert_eq!(buf.len(), 4);
        assert_eq!(buf.values(4), vec![6.0, 7.0, 8.0, 9.0]);
    }

    #[test]
    fn test_short_window_is_not_an_error() {
        let mut buf = SignalBuffer::new(ChannelId::new(0), 100.0, 8);
        buf.push(sample(0, 1.0));

        assert_eq!(buf.window(100).len(), 1);
        assert!(SignalBuffer::new(ChannelId::new(1), 100.0, 8)
            .window(16)
            .is_empty());
    }

    #[test]
    fn test_span_secs() {
        let mut buf = SignalBuffer::new(ChannelId::new(0), 100.0, 8);
        assert_eq!(buf.span_secs(), 0.0);

        buf.push(sample(0, 0.0));
        buf.push(sample(2_000_000_000, 0.0));
        assert!((buf.span_secs() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_sample_rate_update_ignores_bad_values() {
        let mut buf = SignalBuffer::new(ChannelId::new(0), 100.0, 8);
        buf.set_sample_rate(250.0);
        assert_eq!(buf.sample_rate_hz(), 250.0);

        buf.set_sample_rate(0.0);
        buf.set_sample_rate(f64::NAN);
        assert_eq!(buf.sample_rate_hz(), 250.0);
    }
}
