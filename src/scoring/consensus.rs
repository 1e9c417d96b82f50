//! Crowd consensus.
//!
//! Plain or weighted mean of a population's probability estimates,
//! plus the coarse probability histogram shown next to it.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// How a consensus value was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsensusMethod {
    /// No weights supplied (or length mismatch): plain mean.
    Unweighted,
    /// Weighted mean `Σ(p·w) / Σw`.
    Weighted,
    /// Weights supplied but unusable (total not positive, or a negative /
    /// non-finite weight). Plain mean used instead of dividing by zero.
    UnweightedFallback,
}

/// A consensus value together with the method that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Consensus {
    pub value: u8,
    pub method: ConsensusMethod,
}

/// Round a positive mean to the nearest whole percent, half up.
fn round_half_up(mean: f64) -> u8 {
    (mean + 0.5).floor().clamp(0.0, 100.0) as u8
}

fn unweighted_mean(forecasts: &[u8]) -> f64 {
    let sum: f64 = forecasts.iter().map(|&p| f64::from(p)).sum();
    sum / forecasts.len() as f64
}

/// Consensus with the method that was actually applied.
///
/// `None` when there are no forecasts.
pub fn consensus_detailed(forecasts: &[u8], weights: Option<&[f64]>) -> Option<Consensus> {
    if forecasts.is_empty() {
        return None;
    }

    let weights = match weights {
        Some(w) if w.len() == forecasts.len() => w,
        _ => {
            return Some(Consensus {
                value: round_half_up(unweighted_mean(forecasts)),
                method: ConsensusMethod::Unweighted,
            });
        }
    };

    let usable = weights.iter().all(|w| w.is_finite() && *w >= 0.0);
    let total: f64 = weights.iter().sum();
    if !usable || total <= 0.0 {
        debug!(
            forecasters = forecasts.len(),
            total_weight = total,
            "Unusable weights, falling back to unweighted consensus"
        );
        return Some(Consensus {
            value: round_half_up(unweighted_mean(forecasts)),
            method: ConsensusMethod::UnweightedFallback,
        });
    }

    let weighted_sum: f64 = forecasts
        .iter()
        .zip(weights)
        .map(|(&p, &w)| f64::from(p) * w)
        .sum();

    Some(Consensus {
        value: round_half_up(weighted_sum / total),
        method: ConsensusMethod::Weighted,
    })
}

/// Crowd estimate in whole percent. Falls back to the plain mean when
/// `weights` is absent, mismatched in length, or sums to zero.
pub fn consensus(forecasts: &[u8], weights: Option<&[f64]>) -> Option<u8> {
    consensus_detailed(forecasts, weights).map(|c| c.value)
}

// ---------------------------------------------------------------------------
// Distribution
// ---------------------------------------------------------------------------

/// Histogram bucket labels; upper bounds are inclusive.
pub const BUCKET_LABELS: [&str; 5] = ["0–20", "21–40", "41–60", "61–80", "81–100"];

/// Index into [`BUCKET_LABELS`] for a probability.
pub fn bucket_index(probability_percent: u8) -> usize {
    match probability_percent {
        0..=20 => 0,
        21..=40 => 1,
        41..=60 => 2,
        61..=80 => 3,
        _ => 4,
    }
}

/// One bar of the crowd histogram.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionBucket {
    pub label: String,
    pub count: usize,
}

/// Count forecasts per probability bucket. Always returns all five buckets.
pub fn distribution(forecasts: &[u8]) -> Vec<DistributionBucket> {
    let mut counts = [0usize; BUCKET_LABELS.len()];
    for &p in forecasts {
        counts[bucket_index(p)] += 1;
    }
    BUCKET_LABELS
        .iter()
        .zip(counts)
        .map(|(label, count)| DistributionBucket {
            label: (*label).to_string(),
            count,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
