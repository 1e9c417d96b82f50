//! Scoring engine: Brier primitives, calibration, and crowd consensus.
//!
//! Everything here is pure: no storage, no clocks, no shared state.
//! Safe to call from any number of tasks concurrently.

pub mod brier;
pub mod calibration;
pub mod consensus;

pub use brier::{brier_delta_vs_naive, brier_score, round_to, NAIVE_BRIER};
pub use calibration::{calibration_score, calibration_tier};
pub use consensus::{consensus, consensus_detailed, Consensus, ConsensusMethod};
