//! Storage port.
//!
//! The engine never talks to a database directly. Everything it reads or
//! writes goes through [`ForecastStore`]; `memory` provides the in-process
//! adapter used by tests and the scenario runner.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{CalibrationProfile, ForecastRecord, PredictionEvent};

/// Errors reported by a storage adapter.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    /// Backend unreachable or transaction aborted.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Write rejected because the data it was computed from has changed.
    #[error("write conflict: {0}")]
    Conflict(String),

    /// The event is not in the Open state.
    #[error("event {0} is not open")]
    EventNotOpen(String),

    #[error("event {0} does not exist")]
    EventNotFound(String),

    #[error("no forecast from {forecaster_id} on event {event_id}")]
    ForecastNotFound {
        event_id: String,
        forecaster_id: String,
    },

    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Conflict(_))
    }
}

/// Every write a resolution performs, committed as one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionBatch {
    pub event_id: String,
    pub outcome: bool,
    pub resolved_at: DateTime<Utc>,
    /// One scored record per forecaster on the event.
    pub records: Vec<ForecastRecord>,
    /// Recomputed profile for each forecaster in `records`.
    pub profiles: Vec<CalibrationProfile>,
    /// Resolved records on other events each profile was computed from,
    /// keyed by forecaster. The store re-counts these under its write
    /// lock; a mismatch means the batch is stale.
    pub prior_resolved: BTreeMap<String, u32>,
}

/// Abstraction over the persistence backend.
///
/// Implementors must make `commit_resolution` all-or-nothing and must
/// reject it when the event is no longer open.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ForecastStore: Send + Sync {
    /// Create an event. Fails with `Conflict` if the id is taken.
    async fn insert_event(&self, event: PredictionEvent) -> Result<(), StoreError>;

    async fn get_event(&self, event_id: &str) -> Result<Option<PredictionEvent>, StoreError>;

    /// Open → Resolved. Fails with `EventNotOpen` if already resolved and
    /// `EventNotFound` if the id is unknown.
    async fn transition_event_to_resolved(
        &self,
        event_id: &str,
        outcome: bool,
        resolved_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn get_forecast_record(
        &self,
        event_id: &str,
        forecaster_id: &str,
    ) -> Result<Option<ForecastRecord>, StoreError>;

    /// Create-only insert. Fails with `Conflict` if the pair already has a
    /// record, `EventNotOpen` if the event is resolved and `EventNotFound`
    /// if it does not exist.
    async fn create_forecast_record(&self, record: ForecastRecord) -> Result<(), StoreError>;

    /// Swap an existing record on an open event for `record` in one step
    /// and return the one it replaced. Fails with `ForecastNotFound` when
    /// there is nothing to replace.
    async fn replace_forecast_record(
        &self,
        record: ForecastRecord,
    ) -> Result<ForecastRecord, StoreError>;

    /// Create or overwrite.
    async fn put_forecast_record(&self, record: ForecastRecord) -> Result<(), StoreError>;

    /// Returns whether a record was removed. Fails with `EventNotOpen`
    /// once the event is resolved.
    async fn delete_forecast_record(
        &self,
        event_id: &str,
        forecaster_id: &str,
    ) -> Result<bool, StoreError>;

    async fn list_forecast_records(&self, event_id: &str) -> Result<Vec<ForecastRecord>, StoreError>;

    /// Every record a forecaster has submitted, across all events.
    async fn list_forecaster_history(
        &self,
        forecaster_id: &str,
    ) -> Result<Vec<ForecastRecord>, StoreError>;

    async fn list_all_forecasters_with_record(
        &self,
        event_id: &str,
    ) -> Result<Vec<String>, StoreError>;

    async fn get_calibration_profile(
        &self,
        forecaster_id: &str,
    ) -> Result<Option<CalibrationProfile>, StoreError>;

    async fn put_calibration_profile(
        &self,
        forecaster_id: &str,
        profile: CalibrationProfile,
    ) -> Result<(), StoreError>;

    /// Apply a whole resolution atomically.
    async fn commit_resolution(&self, batch: ResolutionBatch) -> Result<(), StoreError>;
}
