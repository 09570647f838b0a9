//! Directional inter-channel influence estimation.
//!
//! For every ordered channel pair (i, j) the estimator scores how much of
//! channel j's near-future variance is explained by channel i's recent
//! past beyond what j's own history already explains, normalized to
//! [0, 1]. The channel with the highest total outgoing influence is the
//! culture's "pacemaker" for the epoch.
//!
//! The statistical method is pluggable through [`InfluenceEstimator`]:
//! the default is a lag-1 linear variance-reduction ratio (a Granger-style
//! surrogate for transfer entropy); a binned transfer-entropy estimator
//! can be swapped in without changing the epoch machinery.

use std::collections::BTreeMap;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use myco_core::{ChannelId, Timestamp};

/// One directed edge of the influence graph.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CausalEdge {
    pub from: ChannelId,
    pub to: ChannelId,
    /// Influence strength in [0, 1].
    pub strength: f64,
}

/// Atomic snapshot of the influence graph for one epoch.
///
/// Recomputed as a whole on the causality cadence; a new graph replaces
/// the previous snapshot, readers never observe a partial update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CausalGraph {
    /// Channels included this epoch, ascending. Channels without enough
    /// recent samples are absent rather than failing the computation.
    pub channels: Vec<ChannelId>,
    /// Full influence matrix, `matrix[[i, j]]` = influence of
    /// `channels[i]` on `channels[j]`. Zero diagonal.
    pub matrix: Array2<f64>,
    /// Edges at or above the reporting threshold, the only flows surfaced
    /// to consumers. Weaker influences stay in the matrix.
    pub edges: Vec<CausalEdge>,
    /// Channel with the highest total outgoing influence, if any is
    /// positive.
    pub pacemaker: Option<ChannelId>,
    pub epoch: Timestamp,
}

impl CausalGraph {
    pub fn empty(epoch: Timestamp) -> Self {
        Self {
            channels: Vec::new(),
            matrix: Array2::zeros((0, 0)),
            edges: Vec::new(),
            pacemaker: None,
            epoch,
        }
    }

    /// Influence of `from` on `to`, 0 when either channel is absent.
    pub fn strength(&self, from: ChannelId, to: ChannelId) -> f64 {
        let i = self.channels.iter().position(|c| *c == from);
        let j = self.channels.iter().position(|c| *c == to);
        match (i, j) {
            (Some(i), Some(j)) => self.matrix[[i, j]],
            _ => 0.0,
        }
    }
}

/// Scores directional influence of one series on another, in [0, 1].
pub trait InfluenceEstimator: Send + Sync {
    fn influence(&self, source: &[f64], target: &[f64]) -> f64;
}

/// Lag-1 linear variance-reduction estimator.
///
/// Fits two least-squares predictions of the target's next value: one from
/// the target's own past, one additionally using the source's past. The
/// influence score is the relative residual-variance reduction,
/// `max(0, 1 - RSS_full / RSS_self)`. Degenerate windows (short or
/// constant) score 0.
#[derive(Debug, Clone, Copy)]
pub struct LaggedVarianceReduction {
    pub lag: usize,
}

impl LaggedVarianceReduction {
    pub fn new(lag: usize) -> Self {
        Self { lag: lag.max(1) }
    }
}

impl Default for LaggedVarianceReduction {
    fn default() -> Self {
        Self { lag: 1 }
    }
}

const EPS: f64 = 1e-12;

impl InfluenceEstimator for LaggedVarianceReduction {
    fn influence(&self, source: &[f64], target: &[f64]) -> f64 {
        let n = source.len().min(target.len());
        if n < self.lag + 8 {
            return 0.0;
        }

        // Align both series from the tail.
        let src = &source[source.len() - n..];
        let tgt = &target[target.len() - n..];
        let m = n - self.lag;

        // Regression variables: y = tgt[t], p = tgt[t-lag], x = src[t-lag].
        let mean = |f: &dyn Fn(usize) -> f64| -> f64 {
            (0..m).map(f).sum::<f64>() / m as f64
        };
        let y_of = |t: usize| tgt[t + self.lag];
        let p_of = |t: usize| tgt[t];
        let x_of = |t: usize| src[t];

        let y_mean = mean(&y_of);
        let p_mean = mean(&p_of);
        let x_mean = mean(&x_of);

        let mut syy = 0.0;
        let mut spp = 0.0;
        let mut sxx = 0.0;
        let mut spy = 0.0;
        let mut sxy = 0.0;
        let mut spx = 0.0;
        for t in 0..m {
            let y = y_of(t) - y_mean;
            let p = p_of(t) - p_mean;
            let x = x_of(t) - x_mean;
            syy += y * y;
            spp += p * p;
            sxx += x * x;
            spy += p * y;
            sxy += x * y;
            spx += p * x;
        }

        // Self model: y ~ p.
        let rss_self = if spp > EPS { syy - spy * spy / spp } else { syy };
        if rss_self <= EPS {
            // Target already fully explained by its own history.
            return 0.0;
        }

        // Full model: y ~ p + x, solved from the normal equations.
        let det = spp * sxx - spx * spx;
        if det.abs() <= EPS {
            return 0.0;
        }
        let a = (spy * sxx - sxy * spx) / det;
        let c = (sxy * spp - spy * spx) / det;
        let rss_full = (syy - a * spy - c * sxy).max(0.0);

        ((rss_self - rss_full) / rss_self).clamp(0.0, 1.0)
    }
}

/// Epoch-based influence graph builder.
pub struct CausalityEstimator {
    /// Channels with fewer recent samples than this are excluded.
    min_samples: usize,
    /// Only edges at or above this strength are surfaced.
    reporting_threshold: f64,
    estimator: Box<dyn InfluenceEstimator>,
}

impl CausalityEstimator {
    pub fn new(min_samples: usize, reporting_threshold: f64) -> Self {
        Self::with_estimator(
            min_samples,
            reporting_threshold,
            Box::new(LaggedVarianceReduction::default()),
        )
    }

    pub fn with_estimator(
        min_samples: usize,
        reporting_threshold: f64,
        estimator: Box<dyn InfluenceEstimator>,
    ) -> Self {
        Self {
            min_samples: min_samples.max(2),
            reporting_threshold,
            estimator,
        }
    }

    pub fn min_samples(&self) -> usize {
        self.min_samples
    }

    /// Build the influence graph for one epoch from trailing per-channel
    /// value windows.
    pub fn estimate(&self, series: &BTreeMap<ChannelId, Vec<f64>>, epoch: Timestamp) -> CausalGraph {
        let channels: Vec<ChannelId> = series
            .iter()
            .filter(|(_, values)| values.len() >= self.min_samples)
            .map(|(ch, _)| *ch)
            .collect();
        let n = channels.len();
        if n < 2 {
            return CausalGraph::empty(epoch);
        }

        let mut matrix = Array2::zeros((n, n));
        let mut edges = Vec::new();

        for (i, from) in channels.iter().enumerate() {
            for (j, to) in channels.iter().enumerate() {
                if i == j {
                    continue;
                }

                let raw = self.estimator.influence(&series[from], &series[to]);
                let strength = if raw.is_finite() {
                    raw.clamp(0.0, 1.0)
                } else {
                    0.0
                };
                matrix[[i, j]] = strength;

                if strength >= self.reporting_threshold {
                    edges.push(CausalEdge {
                        from: *from,
                        to: *to,
                        strength,
                    });
                }
            }
        }

        edges.sort_by(|a, b| {
            b.strength
                .partial_cmp(&a.strength)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        // Pacemaker: largest total outgoing influence.
        let pacemaker = (0..n)
            .map(|i| (i, matrix.row(i).sum()))
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .filter(|(_, total)| *total > 0.0)
            .map(|(i, _)| channels[i]);

        CausalGraph {
            channels,
            matrix,
            edges,
            pacemaker,
            epoch,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Chaotic driver series. Linearly hard to self-predict, which makes
    /// a genuine driven relationship stand out.
    fn logistic_map(n: usize, x0: f64) -> Vec<f64> {
        let mut values = Vec::with_capacity(n);
        let mut x = x0;
        for _ in 0..n {
            values.push(x);
            x = 3.9 * x * (1.0 - x);
        }
        values
    }

    fn driven_pair(n: usize) -> (Vec<f64>, Vec<f64>) {
        let x = logistic_map(n + 1, 0.4);
        // y copies x with one step of delay.
        let y: Vec<f64> = x[..n].to_vec();
        (x[1..].to_vec(), y)
    }

    #[test]
    fn test_driven_target_scores_high_forward_influence() {
        let estimator = LaggedVarianceReduction::default();
        let (x, y) = driven_pair(256);

        // y[t] = x[t-1], so x's past fully explains y's future.
        let forward = estimator.influence(&x, &y);
        let reverse = estimator.influence(&y, &x);

        assert!(forward > 0.9, "forward influence {} too low", forward);
        assert!(reverse < forward);
        assert!((0.0..=1.0).contains(&forward));
        assert!((0.0..=1.0).contains(&reverse));
    }

    #[test]
    fn test_degenerate_series_score_zero() {
        let estimator = LaggedVarianceReduction::default();

        assert_eq!(estimator.influence(&[1.0; 4], &[1.0; 4]), 0.0);
        assert_eq!(estimator.influence(&[2.0; 64], &[3.0; 64]), 0.0);
    }

    #[test]
    fn test_graph_diagonal_zero_and_bounded() {
        let mut series = BTreeMap::new();
        let (x, y) = driven_pair(256);
        series.insert(ChannelId::new(0), x);
        series.insert(ChannelId::new(1), y);
        series.insert(ChannelId::new(2), logistic_map(256, 0.7));

        let estimator = CausalityEstimator::new(32, 0.15);
        let graph = estimator.estimate(&series, Timestamp::from_nanos(0));

        assert_eq!(graph.channels.len(), 3);
        for i in 0..3 {
            assert_eq!(graph.matrix[[i, i]], 0.0);
            for j in 0..3 {
                let s = graph.matrix[[i, j]];
                assert!((0.0..=1.0).contains(&s), "strength {} out of range", s);
            }
        }
    }

    #[test]
    fn test_pacemaker_is_driving_channel() {
        let mut series = BTreeMap::new();
        let (x, y) = driven_pair(256);
        series.insert(ChannelId::new(0), x);
        series.insert(ChannelId::new(1), y);

        let estimator = CausalityEstimator::new(32, 0.15);
        let graph = estimator.estimate(&series, Timestamp::from_nanos(0));

        assert_eq!(graph.pacemaker, Some(ChannelId::new(0)));
        assert!(graph.strength(ChannelId::new(0), ChannelId::new(1)) > 0.9);
    }

    #[test]
    fn test_weak_edges_not_surfaced() {
        let mut series = BTreeMap::new();
        let (x, y) = driven_pair(256);
        series.insert(ChannelId::new(0), x);
        series.insert(ChannelId::new(1), y);

        // High bar: only the genuine driven edge survives.
        let estimator = CausalityEstimator::new(32, 0.5);
        let graph = estimator.estimate(&series, Timestamp::from_nanos(0));

        assert_eq!(graph.edges.len(), 1);
        assert_eq!(graph.edges[0].from, ChannelId::new(0));
        assert_eq!(graph.edges[0].to, ChannelId::new(1));
    }

    #[test]
    fn test_short_channels_excluded_not_fatal() {
        let mut series = BTreeMap::new();
        let (x, y) = driven_pair(256);
        series.insert(ChannelId::new(0), x);
        series.insert(ChannelId::new(1), y);
        series.insert(ChannelId::new(7), vec![1.0; 4]);

        let estimator = CausalityEstimator::new(32, 0.15);
        let graph = estimator.estimate(&series, Timestamp::from_nanos(0));

        assert_eq!(graph.channels.len(), 2);
        assert!(!graph.channels.contains(&ChannelId::new(7)));
    }

    #[test]
    fn test_single_channel_yields_empty_graph() {
        let mut series = BTreeMap::new();
        series.insert(ChannelId::new(0), logistic_map(128, 0.4));

        let estimator = CausalityEstimator::new(32, 0.15);
        let graph = estimator.estimate(&series, Timestamp::from_nanos(5));

        assert!(graph.channels.is_empty());
        assert!(graph.edges.is_empty());
        assert_eq!(graph.pacemaker, None);
        assert_eq!(graph.epoch, Timestamp::from_nanos(5));
    }
}
