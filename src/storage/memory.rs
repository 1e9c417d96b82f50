//! In-memory storage adapter.
//!
//! All state lives behind a single `RwLock`, so a resolution batch is
//! validated and applied under one write guard and readers never observe
//! a half-applied resolution.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::RwLock;
use tracing::debug;

use super::{ForecastStore, ResolutionBatch, StoreError};
use crate::types::{CalibrationProfile, ForecastRecord, PredictionEvent};

/// Full contents of a [`MemoryStore`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub events: BTreeMap<String, PredictionEvent>,
    /// event id → forecaster id → record
    pub records: BTreeMap<String, BTreeMap<String, ForecastRecord>>,
    pub profiles: BTreeMap<String, CalibrationProfile>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<StoreSnapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        Self {
            inner: RwLock::new(snapshot),
        }
    }

    /// Clone the current contents.
    pub async fn snapshot(&self) -> StoreSnapshot {
        self.inner.read().await.clone()
    }

    /// Pretty JSON dump of the current contents.
    pub async fn to_json(&self) -> Result<String, StoreError> {
        let snapshot = self.snapshot().await;
        serde_json::to_string_pretty(&snapshot).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        let snapshot: StoreSnapshot =
            serde_json::from_str(json).map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(Self::from_snapshot(snapshot))
    }
}

fn require_open(state: &StoreSnapshot, event_id: &str) -> Result<(), StoreError> {
    match state.events.get(event_id) {
        Some(event) if event.resolved => Err(StoreError::EventNotOpen(event_id.to_string())),
        Some(_) => Ok(()),
        None => Err(StoreError::EventNotFound(event_id.to_string())),
    }
}

/// Resolved records a forecaster holds on events other than `event_id`.
fn resolved_elsewhere(state: &StoreSnapshot, forecaster_id: &str, event_id: &str) -> u32 {
    let count = state
        .records
        .iter()
        .filter(|(id, _)| id.as_str() != event_id)
        .filter_map(|(_, by_forecaster)| by_forecaster.get(forecaster_id))
        .filter(|record| record.outcome.is_some())
        .count();
    u32::try_from(count).unwrap_or(u32::MAX)
}

/// Check a batch against current state without mutating anything.
fn validate_batch(state: &StoreSnapshot, batch: &ResolutionBatch) -> Result<(), StoreError> {
    require_open(state, &batch.event_id)?;

    let empty = BTreeMap::new();
    let stored = state.records.get(&batch.event_id).unwrap_or(&empty);

    let batch_forecasters: BTreeSet<&str> =
        batch.records.iter().map(|r| r.forecaster_id.as_str()).collect();
    let stored_forecasters: BTreeSet<&str> = stored.keys().map(String::as_str).collect();
    if batch_forecasters.len() != batch.records.len() || batch_forecasters != stored_forecasters {
        return Err(StoreError::Conflict(format!(
            "forecaster set for event {} changed during resolution",
            batch.event_id
        )));
    }

    for record in &batch.records {
        let current = stored.get(&record.forecaster_id);
        let unchanged = record.event_id == batch.event_id
            && current.map(|c| c.probability_percent) == Some(record.probability_percent);
        if !unchanged {
            return Err(StoreError::Conflict(format!(
                "forecast from {} on {} was edited during resolution",
                record.forecaster_id, batch.event_id
            )));
        }
    }

    let profile_forecasters: BTreeSet<&str> =
        batch.profiles.iter().map(|p| p.forecaster_id.as_str()).collect();
    if profile_forecasters != batch_forecasters || batch.profiles.len() != batch.records.len() {
        return Err(StoreError::Conflict(format!(
            "profiles in batch for {} do not match its records",
            batch.event_id
        )));
    }

    // Stored profiles are derived data and may have been overwritten, so
    // staleness is judged against the records themselves.
    for profile in &batch.profiles {
        let current = resolved_elsewhere(state, &profile.forecaster_id, &batch.event_id);
        let prior = batch.prior_resolved.get(&profile.forecaster_id).copied();
        if prior != Some(current) {
            return Err(StoreError::Conflict(format!(
                "resolved history of {} moved (stored {current}, batch {prior:?})",
                profile.forecaster_id
            )));
        }
        if profile.calibration_forecast_count != current + 1 {
            return Err(StoreError::Conflict(format!(
                "profile for {} covers {} forecasts, expected {}",
                profile.forecaster_id,
                profile.calibration_forecast_count,
                current + 1
            )));
        }
    }

    Ok(())
}

#[async_trait]
impl ForecastStore for MemoryStore {
    async fn insert_event(&self, event: PredictionEvent) -> Result<(), StoreError> {
        let mut state = self.inner.write().await;
        if state.events.contains_key(&event.id) {
            return Err(StoreError::Conflict(format!("event {} already exists", event.id)));
        }
        state.events.insert(event.id.clone(), event);
        Ok(())
    }

    async fn get_event(&self, event_id: &str) -> Result<Option<PredictionEvent>, StoreError> {
        Ok(self.inner.read().await.events.get(event_id).cloned())
    }

    async fn transition_event_to_resolved(
        &self,
        event_id: &str,
        outcome: bool,
        resolved_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.inner.write().await;
        let event = state
            .events
            .get_mut(event_id)
            .ok_or_else(|| StoreError::EventNotFound(event_id.to_string()))?;
        if event.resolved {
            return Err(StoreError::EventNotOpen(event_id.to_string()));
        }
        event.resolved = true;
        event.outcome = Some(outcome);
        event.resolved_at = Some(resolved_at);
        Ok(())
    }

    async fn get_forecast_record(
        &self,
        event_id: &str,
        forecaster_id: &str,
    ) -> Result<Option<ForecastRecord>, StoreError> {
        let state = self.inner.read().await;
        Ok(state
            .records
            .get(event_id)
            .and_then(|by_forecaster| by_forecaster.get(forecaster_id))
            .cloned())
    }

    async fn create_forecast_record(&self, record: ForecastRecord) -> Result<(), StoreError> {
        let mut state = self.inner.write().await;
        require_open(&state, &record.event_id)?;
        let by_forecaster = state.records.entry(record.event_id.clone()).or_default();
        if by_forecaster.contains_key(&record.forecaster_id) {
            return Err(StoreError::Conflict(format!(
                "{} already has a forecast on {}",
                record.forecaster_id, record.event_id
            )));
        }
        by_forecaster.insert(record.forecaster_id.clone(), record);
        Ok(())
    }

    async fn replace_forecast_record(
        &self,
        record: ForecastRecord,
    ) -> Result<ForecastRecord, StoreError> {
        let mut state = self.inner.write().await;
        require_open(&state, &record.event_id)?;
        let slot = state
            .records
            .get_mut(&record.event_id)
            .and_then(|by_forecaster| by_forecaster.get_mut(&record.forecaster_id))
            .ok_or_else(|| StoreError::ForecastNotFound {
                event_id: record.event_id.clone(),
                forecaster_id: record.forecaster_id.clone(),
            })?;
        Ok(std::mem::replace(slot, record))
    }

    async fn put_forecast_record(&self, record: ForecastRecord) -> Result<(), StoreError> {
        let mut state = self.inner.write().await;
        state
            .records
            .entry(record.event_id.clone())
            .or_default()
            .insert(record.forecaster_id.clone(), record);
        Ok(())
    }

    async fn delete_forecast_record(
        &self,
        event_id: &str,
        forecaster_id: &str,
    ) -> Result<bool, StoreError> {
        let mut state = self.inner.write().await;
        if state.events.get(event_id).is_some_and(|e| e.resolved) {
            return Err(StoreError::EventNotOpen(event_id.to_string()));
        }
        let removed = state
            .records
            .get_mut(event_id)
            .and_then(|by_forecaster| by_forecaster.remove(forecaster_id))
            .is_some();
        Ok(removed)
    }

    async fn list_forecast_records(&self, event_id: &str) -> Result<Vec<ForecastRecord>, StoreError> {
        let state = self.inner.read().await;
        Ok(state
            .records
            .get(event_id)
            .map(|by_forecaster| by_forecaster.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn list_forecaster_history(
        &self,
        forecaster_id: &str,
    ) -> Result<Vec<ForecastRecord>, StoreError> {
        let state = self.inner.read().await;
        Ok(state
            .records
            .values()
            .filter_map(|by_forecaster| by_forecaster.get(forecaster_id))
            .cloned()
            .collect())
    }

    async fn list_all_forecasters_with_record(
        &self,
        event_id: &str,
    ) -> Result<Vec<String>, StoreError> {
        let state = self.inner.read().await;
        Ok(state
            .records
            .get(event_id)
            .map(|by_forecaster| by_forecaster.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn get_calibration_profile(
        &self,
        forecaster_id: &str,
    ) -> Result<Option<CalibrationProfile>, StoreError> {
        Ok(self.inner.read().await.profiles.get(forecaster_id).cloned())
    }

    async fn put_calibration_profile(
        &self,
        forecaster_id: &str,
        profile: CalibrationProfile,
    ) -> Result<(), StoreError> {
        let mut state = self.inner.write().await;
        state.profiles.insert(forecaster_id.to_string(), profile);
        Ok(())
    }

    async fn commit_resolution(&self, batch: ResolutionBatch) -> Result<(), StoreError> {
        let mut state = self.inner.write().await;
        validate_batch(&state, &batch)?;

        if let Some(event) = state.events.get_mut(&batch.event_id) {
            event.resolved = true;
            event.outcome = Some(batch.outcome);
            event.resolved_at = Some(batch.resolved_at);
        }
        let by_forecaster = state.records.entry(batch.event_id.clone()).or_default();
        for record in batch.records {
            by_forecaster.insert(record.forecaster_id.clone(), record);
        }
        for profile in batch.profiles {
            state.profiles.insert(profile.forecaster_id.clone(), profile);
        }

        debug!(event_id = %batch.event_id, "Resolution batch committed");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
