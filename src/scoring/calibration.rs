//! Calibration module.
//!
//! Reduces a forecaster's resolved history to one score
//! (1 - mean Brier) and maps it onto a qualitative tier.

use super::brier::{brier_score, round_to};
use crate::types::{CalibrationTier, ResolvedForecast};

/// Lower bound (inclusive) of the Expert tier.
pub const EXPERT_THRESHOLD: f64 = 0.92;
/// Lower bound (inclusive) of the Skilled tier.
pub const SKILLED_THRESHOLD: f64 = 0.82;
/// Lower bound (inclusive) of the Learning tier.
pub const LEARNING_THRESHOLD: f64 = 0.72;

/// `1 - mean(brier)` over the history, rounded to 4 dp.
///
/// Returns `None` for an empty history. The result is not clamped:
/// a run of confident misses can push it below zero.
pub fn calibration_score(resolved: &[ResolvedForecast]) -> Option<f64> {
    if resolved.is_empty() {
        return None;
    }
    let sum: f64 = resolved
        .iter()
        .map(|r| brier_score(r.probability_percent, r.outcome))
        .sum();
    let mean_brier = sum / resolved.len() as f64;
    Some(round_to(1.0 - mean_brier, 4))
}

/// Tier lookup. Each threshold is inclusive on its lower bound.
pub fn calibration_tier(score: Option<f64>) -> CalibrationTier {
    match score {
        None => CalibrationTier::Unranked,
        Some(s) if s >= EXPERT_THRESHOLD => CalibrationTier::Expert,
        Some(s) if s >= SKILLED_THRESHOLD => CalibrationTier::Skilled,
        Some(s) if s >= LEARNING_THRESHOLD => CalibrationTier::Learning,
        Some(_) => CalibrationTier::Developing,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
