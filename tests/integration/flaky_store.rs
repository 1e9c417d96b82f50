//! Fault-injecting store for integration testing.
//!
//! Wraps a `MemoryStore` and can fail commits, fail every call, or slip
//! a late forecast in just before a resolution commits. Everything else
//! delegates to the wrapped store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};

use forecast_engine::storage::memory::MemoryStore;
use forecast_engine::storage::{ForecastStore, ResolutionBatch, StoreError};
use forecast_engine::types::{CalibrationProfile, ForecastRecord, PredictionEvent};

pub struct FlakyStore {
    inner: Arc<MemoryStore>,
    /// Number of upcoming commits to fail with `Unavailable`.
    failing_commits: Mutex<u32>,
    /// If set, every operation returns this error.
    force_error: Mutex<Option<String>>,
    /// Written straight into the inner store on the next commit, before it runs.
    late_forecast: Mutex<Option<ForecastRecord>>,
    commit_calls: Mutex<u32>,
}

impl FlakyStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            failing_commits: Mutex::new(0),
            force_error: Mutex::new(None),
            late_forecast: Mutex::new(None),
            commit_calls: Mutex::new(0),
        }
    }

    pub fn fail_next_commits(&self, n: u32) {
        *self.failing_commits.lock().unwrap() = n;
    }

    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap() = None;
    }

    pub fn inject_late_forecast(&self, record: ForecastRecord) {
        *self.late_forecast.lock().unwrap() = Some(record);
    }

    pub fn commit_calls(&self) -> u32 {
        *self.commit_calls.lock().unwrap()
    }

    fn check(&self) -> Result<(), StoreError> {
        match self.force_error.lock().unwrap().as_ref() {
            Some(msg) => Err(StoreError::Unavailable(msg.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ForecastStore for FlakyStore {
    async fn insert_event(&self, event: PredictionEvent) -> Result<(), StoreError> {
        self.check()?;
        self.inner.insert_event(event).await
    }

    async fn get_event(&self, event_id: &str) -> Result<Option<PredictionEvent>, StoreError> {
        self.check()?;
        self.inner.get_event(event_id).await
    }

    async fn transition_event_to_resolved(
        &self,
        event_id: &str,
        outcome: bool,
        resolved_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.check()?;
        self.inner
            .transition_event_to_resolved(event_id, outcome, resolved_at)
            .await
    }

    async fn get_forecast_record(
        &self,
        event_id: &str,
        forecaster_id: &str,
    ) -> Result<Option<ForecastRecord>, StoreError> {
        self.check()?;
        self.inner.get_forecast_record(event_id, forecaster_id).await
    }

    async fn create_forecast_record(&self, record: ForecastRecord) -> Result<(), StoreError> {
        self.check()?;
        self.inner.create_forecast_record(record).await
    }

    async fn replace_forecast_record(
        &self,
        record: ForecastRecord,
    ) -> Result<ForecastRecord, StoreError> {
        self.check()?;
        self.inner.replace_forecast_record(record).await
    }

    async fn put_forecast_record(&self, record: ForecastRecord) -> Result<(), StoreError> {
        self.check()?;
        self.inner.put_forecast_record(record).await
    }

    async fn delete_forecast_record(
        &self,
        event_id: &str,
        forecaster_id: &str,
    ) -> Result<bool, StoreError> {
        self.check()?;
        self.inner.delete_forecast_record(event_id, forecaster_id).await
    }

    async fn list_forecast_records(&self, event_id: &str) -> Result<Vec<ForecastRecord>, StoreError> {
        self.check()?;
        self.inner.list_forecast_records(event_id).await
    }

    async fn list_forecaster_history(
        &self,
        forecaster_id: &str,
    ) -> Result<Vec<ForecastRecord>, StoreError> {
        self.check()?;
        self.inner.list_forecaster_history(forecaster_id).await
    }

    async fn list_all_forecasters_with_record(
        &self,
        event_id: &str,
    ) -> Result<Vec<String>, StoreError> {
        self.check()?;
        self.inner.list_all_forecasters_with_record(event_id).await
    }

    async fn get_calibration_profile(
        &self,
        forecaster_id: &str,
    ) -> Result<Option<CalibrationProfile>, StoreError> {
        self.check()?;
        self.inner.get_calibration_profile(forecaster_id).await
    }

    async fn put_calibration_profile(
        &self,
        forecaster_id: &str,
        profile: CalibrationProfile,
    ) -> Result<(), StoreError> {
        self.check()?;
        self.inner.put_calibration_profile(forecaster_id, profile).await
    }

    async fn commit_resolution(&self, batch: ResolutionBatch) -> Result<(), StoreError> {
        self.check()?;
        *self.commit_calls.lock().unwrap() += 1;

        let late = self.late_forecast.lock().unwrap().take();
        if let Some(record) = late {
            self.inner.create_forecast_record(record).await?;
        }

        let fail = {
            let mut remaining = self.failing_commits.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                true
            } else {
                false
            }
        };
        if fail {
            return Err(StoreError::Unavailable("transaction aborted".into()));
        }

        self.inner.commit_resolution(batch).await
    }
}
