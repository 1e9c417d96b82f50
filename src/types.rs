//! Shared types for the forecasting engine.
//!
//! These types form the data model used across all modules.
//! Scoring, storage, and engine modules depend on them without
//! circular references.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::scoring::calibration::{calibration_score, calibration_tier};
use crate::storage::StoreError;

/// Lowest probability a forecaster may state, in percent.
pub const MIN_PROBABILITY_PERCENT: u8 = 1;
/// Highest probability a forecaster may state, in percent.
pub const MAX_PROBABILITY_PERCENT: u8 = 99;

/// Check that a submitted probability lies in [1, 99].
pub fn validate_probability(probability_percent: u8) -> Result<u8, EngineError> {
    if (MIN_PROBABILITY_PERCENT..=MAX_PROBABILITY_PERCENT).contains(&probability_percent) {
        Ok(probability_percent)
    } else {
        Err(EngineError::Validation(format!(
            "probability must be between {MIN_PROBABILITY_PERCENT} and {MAX_PROBABILITY_PERCENT} percent, got {probability_percent}"
        )))
    }
}

// ---------------------------------------------------------------------------
// Prediction event
// ---------------------------------------------------------------------------

/// Lifecycle state of a prediction event. `Resolved` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventState {
    Open,
    Resolved,
}

impl fmt::Display for EventState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventState::Open => write!(f, "OPEN"),
            EventState::Resolved => write!(f, "RESOLVED"),
        }
    }
}

/// A yes/no question with a deadline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionEvent {
    pub id: String,
    pub title: String,
    pub category: String,
    /// Free-text background shown to forecasters.
    pub context: String,
    pub deadline: DateTime<Utc>,
    pub resolved: bool,
    /// Write-once; set together with `resolved_at`.
    pub outcome: Option<bool>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl fmt::Display for PredictionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} ({}", self.category, self.title, self.state())?;
        match self.outcome {
            Some(true) => write!(f, ": YES)"),
            Some(false) => write!(f, ": NO)"),
            None => write!(f, ", closes {})", self.deadline.format("%Y-%m-%d %H:%M")),
        }
    }
}

impl PredictionEvent {
    /// Build a new open event with a generated id.
    pub fn new(
        title: impl Into<String>,
        category: impl Into<String>,
        context: impl Into<String>,
        deadline: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            category: category.into(),
            context: context.into(),
            deadline,
            resolved: false,
            outcome: None,
            resolved_at: None,
        }
    }

    pub fn state(&self) -> EventState {
        if self.resolved {
            EventState::Resolved
        } else {
            EventState::Open
        }
    }

    pub fn is_open(&self) -> bool {
        self.state() == EventState::Open
    }

    /// Whether submissions are past the deadline at `now`.
    pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        now > self.deadline
    }
}

// ---------------------------------------------------------------------------
// Forecast record
// ---------------------------------------------------------------------------

/// One forecaster's probability estimate for one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRecord {
    pub event_id: String,
    pub forecaster_id: String,
    /// Always within [1, 99].
    pub probability_percent: u8,
    pub submitted_at: DateTime<Utc>,
    pub brier_score: Option<f64>,
    /// Signed delta against the naive 50% forecaster.
    pub calibration_contribution: Option<f64>,
    pub outcome: Option<bool>,
}

impl fmt::Display for ForecastRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} on {}: {}%",
            self.forecaster_id, self.event_id, self.probability_percent
        )?;
        if let Some(brier) = self.brier_score {
            write!(f, " (brier {brier:.4})")?;
        }
        Ok(())
    }
}

impl ForecastRecord {
    /// A fresh, unscored record.
    pub fn new(
        event_id: impl Into<String>,
        forecaster_id: impl Into<String>,
        probability_percent: u8,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            forecaster_id: forecaster_id.into(),
            probability_percent,
            submitted_at,
            brier_score: None,
            calibration_contribution: None,
            outcome: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.outcome.is_some()
    }

    /// The (probability, outcome) pair, if this record has been scored.
    pub fn as_resolved(&self) -> Option<ResolvedForecast> {
        self.outcome.map(|outcome| ResolvedForecast {
            probability_percent: self.probability_percent,
            outcome,
        })
    }
}

/// The minimal input to calibration: what was stated and what happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedForecast {
    pub probability_percent: u8,
    pub outcome: bool,
}

// ---------------------------------------------------------------------------
// Calibration profile
// ---------------------------------------------------------------------------

/// Qualitative skill label derived from a calibration score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CalibrationTier {
    Unranked,
    Developing,
    Learning,
    Skilled,
    Expert,
}

impl CalibrationTier {
    pub const ALL: &'static [CalibrationTier] = &[
        CalibrationTier::Unranked,
        CalibrationTier::Developing,
        CalibrationTier::Learning,
        CalibrationTier::Skilled,
        CalibrationTier::Expert,
    ];
}

impl fmt::Display for CalibrationTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalibrationTier::Unranked => write!(f, "Unranked"),
            CalibrationTier::Developing => write!(f, "Developing"),
            CalibrationTier::Learning => write!(f, "Learning"),
            CalibrationTier::Skilled => write!(f, "Skilled"),
            CalibrationTier::Expert => write!(f, "Expert"),
        }
    }
}

/// Derived calibration state of one forecaster. Recomputed in place on
/// every resolution that touches the forecaster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationProfile {
    pub forecaster_id: String,
    pub calibration_score: Option<f64>,
    pub calibration_forecast_count: u32,
    pub calibration_tier: CalibrationTier,
}

impl fmt::Display for CalibrationProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.calibration_score {
            Some(score) => write!(
                f,
                "{}: {score:.3} {} · {} resolved",
                self.forecaster_id, self.calibration_tier, self.calibration_forecast_count
            ),
            None => write!(f, "{}: No forecasts yet", self.forecaster_id),
        }
    }
}

impl CalibrationProfile {
    /// Profile of a forecaster with no resolved history.
    pub fn unranked(forecaster_id: impl Into<String>) -> Self {
        Self {
            forecaster_id: forecaster_id.into(),
            calibration_score: None,
            calibration_forecast_count: 0,
            calibration_tier: CalibrationTier::Unranked,
        }
    }

    /// Recompute a profile from the forecaster's full resolved history.
    pub fn from_history(forecaster_id: impl Into<String>, resolved: &[ResolvedForecast]) -> Self {
        let score = calibration_score(resolved);
        Self {
            forecaster_id: forecaster_id.into(),
            calibration_score: score,
            calibration_forecast_count: resolved.len() as u32,
            calibration_tier: calibration_tier(score),
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for the engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Event not found: {0}")]
    EventNotFound(String),

    #[error("No forecast from {forecaster_id} on event {event_id}")]
    ForecastNotFound {
        event_id: String,
        forecaster_id: String,
    },

    #[error("{forecaster_id} has already forecast event {event_id}")]
    DuplicateForecast {
        event_id: String,
        forecaster_id: String,
    },

    #[error("Event already resolved: {0}")]
    AlreadyResolved(String),

    #[error("Forecasting closed for event {event_id} (deadline {deadline})")]
    ForecastingClosed {
        event_id: String,
        deadline: DateTime<Utc>,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl EngineError {
    /// Errors that indicate an operation on an already-resolved event.
    pub fn is_resolution_error(&self) -> bool {
        matches!(self, EngineError::AlreadyResolved(_))
    }

    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Storage(e) => e.is_retryable(),
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
