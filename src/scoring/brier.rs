//! Brier scoring primitives.
//!
//! Brier = (p - o)², where p is the stated probability as a fraction
//! and o is 1 for YES, 0 for NO. Lower is better.

/// Brier score of a forecaster who always says 50%.
pub const NAIVE_BRIER: f64 = 0.25;

/// Round to `places` decimal places, half away from zero.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Squared error between a percent probability and a binary outcome.
///
/// Callers validate `probability_percent` to [1, 99] before scoring;
/// no bounds check happens here.
pub fn brier_score(probability_percent: u8, outcome: bool) -> f64 {
    let p = f64::from(probability_percent) / 100.0;
    let o = if outcome { 1.0 } else { 0.0 };
    (p - o).powi(2)
}

/// Signed improvement over the naive 50% forecaster, rounded to 4 dp.
/// Positive beats the baseline, negative loses to it.
pub fn brier_delta_vs_naive(probability_percent: u8, outcome: bool) -> f64 {
    round_to(NAIVE_BRIER - brier_score(probability_percent, outcome), 4)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
