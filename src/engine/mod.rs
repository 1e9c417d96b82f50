//! Forecasting engine: the operations exposed to callers.
//!
//! Submission, withdrawal, and queries live here; resolution and the
//! skill-weighted export are in their own modules. All persistence goes
//! through the [`ForecastStore`] port.

pub mod export;
pub mod resolver;

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::scoring::consensus;
use crate::storage::{ForecastStore, StoreError};
use crate::types::{
    validate_probability, CalibrationProfile, EngineError, ForecastRecord, PredictionEvent,
};

pub use export::{CrowdComparison, SkillWeightedSummary, WeightedForecaster};
pub use resolver::{score_record, ResolutionReport};

pub struct ForecastEngine {
    store: Arc<dyn ForecastStore>,
    config: EngineConfig,
}

impl ForecastEngine {
    pub fn new(store: Arc<dyn ForecastStore>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn ForecastStore> {
        &self.store
    }

    /// Fetch an event or fail with `EventNotFound`.
    async fn require_event(&self, event_id: &str) -> Result<PredictionEvent, EngineError> {
        self.store
            .get_event(event_id)
            .await?
            .ok_or_else(|| EngineError::EventNotFound(event_id.to_string()))
    }

    /// Fetch an event and fail with `AlreadyResolved` unless it is open.
    async fn require_open_event(&self, event_id: &str) -> Result<PredictionEvent, EngineError> {
        let event = self.require_event(event_id).await?;
        if !event.is_open() {
            return Err(EngineError::AlreadyResolved(event_id.to_string()));
        }
        Ok(event)
    }

    /// Fail unless the event is open and, when deadlines are enforced,
    /// `now` is not past its deadline.
    async fn require_accepting_forecasts(
        &self,
        event_id: &str,
        now: DateTime<Utc>,
    ) -> Result<PredictionEvent, EngineError> {
        let event = self.require_open_event(event_id).await?;
        if self.config.enforce_deadline && event.is_past_deadline(now) {
            return Err(EngineError::ForecastingClosed {
                event_id: event_id.to_string(),
                deadline: event.deadline,
            });
        }
        Ok(event)
    }

    // -- Events --------------------------------------------------------------

    /// Create a new open event.
    pub async fn open_event(
        &self,
        title: &str,
        category: &str,
        context: &str,
        deadline: DateTime<Utc>,
    ) -> Result<PredictionEvent, EngineError> {
        if title.trim().is_empty() {
            return Err(EngineError::Validation("event title must not be empty".into()));
        }
        let event = PredictionEvent::new(title.trim(), category, context, deadline);
        self.store.insert_event(event.clone()).await?;
        info!(event_id = %event.id, title = %event.title, deadline = %event.deadline, "Event opened");
        Ok(event)
    }

    pub async fn event(&self, event_id: &str) -> Result<PredictionEvent, EngineError> {
        self.require_event(event_id).await
    }

    // -- Submission ----------------------------------------------------------

    /// Submit a forecast, stamped with the current time.
    pub async fn submit_forecast(
        &self,
        forecaster_id: &str,
        event_id: &str,
        probability_percent: u8,
    ) -> Result<ForecastRecord, EngineError> {
        self.submit_forecast_at(forecaster_id, event_id, probability_percent, Utc::now())
            .await
    }

    /// Submit a forecast as of `now`.
    ///
    /// One record per (event, forecaster); rejected once the event is
    /// resolved or, when deadlines are enforced, after its deadline.
    pub async fn submit_forecast_at(
        &self,
        forecaster_id: &str,
        event_id: &str,
        probability_percent: u8,
        now: DateTime<Utc>,
    ) -> Result<ForecastRecord, EngineError> {
        if forecaster_id.trim().is_empty() {
            return Err(EngineError::Validation("forecaster id must not be empty".into()));
        }
        let probability_percent = validate_probability(probability_percent)?;
        self.require_accepting_forecasts(event_id, now).await?;

        let record = ForecastRecord::new(event_id, forecaster_id, probability_percent, now);
        self.store
            .create_forecast_record(record.clone())
            .await
            .map_err(|e| match e {
                StoreError::Conflict(_) => EngineError::DuplicateForecast {
                    event_id: event_id.to_string(),
                    forecaster_id: forecaster_id.to_string(),
                },
                other => edit_error(other),
            })?;

        info!(
            event_id,
            forecaster_id,
            probability = probability_percent,
            "Forecast submitted"
        );
        Ok(record)
    }

    /// Delete a forecast so it can be resubmitted.
    pub async fn withdraw_forecast(
        &self,
        forecaster_id: &str,
        event_id: &str,
    ) -> Result<ForecastRecord, EngineError> {
        self.withdraw_forecast_at(forecaster_id, event_id, Utc::now())
            .await
    }

    /// Delete a forecast as of `now`. Same window as submission: before
    /// resolution and, when deadlines are enforced, before the deadline.
    pub async fn withdraw_forecast_at(
        &self,
        forecaster_id: &str,
        event_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ForecastRecord, EngineError> {
        self.require_accepting_forecasts(event_id, now).await?;

        let existing = self
            .store
            .get_forecast_record(event_id, forecaster_id)
            .await?
            .ok_or_else(|| EngineError::ForecastNotFound {
                event_id: event_id.to_string(),
                forecaster_id: forecaster_id.to_string(),
            })?;

        let removed = self
            .store
            .delete_forecast_record(event_id, forecaster_id)
            .await
            .map_err(edit_error)?;
        if !removed {
            return Err(EngineError::ForecastNotFound {
                event_id: event_id.to_string(),
                forecaster_id: forecaster_id.to_string(),
            });
        }

        info!(event_id, forecaster_id, "Forecast withdrawn");
        Ok(existing)
    }

    /// Replace a forecast with a new probability.
    pub async fn revise_forecast(
        &self,
        forecaster_id: &str,
        event_id: &str,
        probability_percent: u8,
    ) -> Result<ForecastRecord, EngineError> {
        self.revise_forecast_at(forecaster_id, event_id, probability_percent, Utc::now())
            .await
    }

    /// Replace a forecast as of `now`. The swap is a single store write,
    /// so a rejected revision leaves the original forecast in place.
    pub async fn revise_forecast_at(
        &self,
        forecaster_id: &str,
        event_id: &str,
        probability_percent: u8,
        now: DateTime<Utc>,
    ) -> Result<ForecastRecord, EngineError> {
        let probability_percent = validate_probability(probability_percent)?;
        self.require_accepting_forecasts(event_id, now).await?;

        let record = ForecastRecord::new(event_id, forecaster_id, probability_percent, now);
        let previous = self
            .store
            .replace_forecast_record(record.clone())
            .await
            .map_err(edit_error)?;

        info!(
            event_id,
            forecaster_id,
            from = previous.probability_percent,
            to = probability_percent,
            "Forecast revised"
        );
        Ok(record)
    }

    // -- Queries -------------------------------------------------------------

    /// Current calibration profile; Unranked if the forecaster has none.
    pub async fn calibration_profile(
        &self,
        forecaster_id: &str,
    ) -> Result<CalibrationProfile, EngineError> {
        Ok(self
            .store
            .get_calibration_profile(forecaster_id)
            .await?
            .unwrap_or_else(|| CalibrationProfile::unranked(forecaster_id)))
    }

    /// Unweighted crowd consensus for an event. `None` with no forecasts.
    pub async fn event_consensus(&self, event_id: &str) -> Result<Option<u8>, EngineError> {
        self.require_event(event_id).await?;
        let probabilities: Vec<u8> = self
            .store
            .list_forecast_records(event_id)
            .await?
            .iter()
            .map(|r| r.probability_percent)
            .collect();
        let value = consensus(&probabilities, None);
        debug!(event_id, forecasters = probabilities.len(), consensus = ?value, "Consensus computed");
        Ok(value)
    }
}

/// Map a store error from a forecast write onto the caller-facing error.
fn edit_error(e: StoreError) -> EngineError {
    match e {
        StoreError::EventNotOpen(id) => EngineError::AlreadyResolved(id),
        StoreError::EventNotFound(id) => EngineError::EventNotFound(id),
        StoreError::ForecastNotFound {
            event_id,
            forecaster_id,
        } => EngineError::ForecastNotFound {
            event_id,
            forecaster_id,
        },
        other => EngineError::Storage(other),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
