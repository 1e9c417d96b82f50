//! Forecast calibration engine.
//!
//! Scores probabilistic forecasts on yes/no events (Brier), keeps each
//! forecaster's calibration score and tier, and aggregates the crowd
//! into plain or skill-weighted consensus. Persistence is behind the
//! `storage::ForecastStore` port.

pub mod config;
pub mod types;
pub mod scoring;
pub mod storage;
pub mod engine;
pub mod scenario;
