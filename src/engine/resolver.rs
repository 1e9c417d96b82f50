//! Event resolution.
//!
//! Collects every write a resolution needs (event transition, scored
//! records, recomputed calibration profiles) into one [`ResolutionBatch`]
//! and hands it to the store to commit atomically. A batch the store
//! rejects as stale is rebuilt from fresh reads and retried; scoring is a
//! pure function of (probability, outcome), so a retry never double-counts.

use chrono::{DateTime, Utc};
use futures::{stream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use super::ForecastEngine;
use crate::scoring::{brier_delta_vs_naive, brier_score, round_to};
use crate::storage::{ResolutionBatch, StoreError};
use crate::types::{CalibrationProfile, EngineError, ForecastRecord, ResolvedForecast};

/// Outcome of a successful resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionReport {
    pub event_id: String,
    pub outcome: bool,
    pub resolved_at: DateTime<Utc>,
    pub forecasters_scored: usize,
    /// Mean Brier across the event's forecasters, rounded to 4 dp.
    pub mean_brier: Option<f64>,
    /// Commit attempts used (1 unless a conflict forced a rebuild).
    pub attempts: u32,
}

impl ResolutionReport {
    fn from_batch(batch: &ResolutionBatch, attempts: u32) -> Self {
        let scores: Vec<f64> = batch.records.iter().filter_map(|r| r.brier_score).collect();
        let mean_brier = if scores.is_empty() {
            None
        } else {
            Some(round_to(scores.iter().sum::<f64>() / scores.len() as f64, 4))
        };
        Self {
            event_id: batch.event_id.clone(),
            outcome: batch.outcome,
            resolved_at: batch.resolved_at,
            forecasters_scored: batch.records.len(),
            mean_brier,
            attempts,
        }
    }
}

/// Attach Brier score, naive delta, and outcome to a record.
pub fn score_record(mut record: ForecastRecord, outcome: bool) -> ForecastRecord {
    record.brier_score = Some(brier_score(record.probability_percent, outcome));
    record.calibration_contribution = Some(brier_delta_vs_naive(record.probability_percent, outcome));
    record.outcome = Some(outcome);
    record
}

impl ForecastEngine {
    /// Resolve an open event now. See [`ForecastEngine::resolve_event_at`].
    pub async fn resolve_event(
        &self,
        event_id: &str,
        outcome: bool,
    ) -> Result<ResolutionReport, EngineError> {
        self.resolve_event_at(event_id, outcome, Utc::now()).await
    }

    /// Resolve an open event, scoring every forecaster on it and
    /// recomputing their calibration profiles in one atomic commit.
    ///
    /// Fails with `AlreadyResolved` if the event is resolved, including
    /// when another caller wins the race to resolve it.
    pub async fn resolve_event_at(
        &self,
        event_id: &str,
        outcome: bool,
        resolved_at: DateTime<Utc>,
    ) -> Result<ResolutionReport, EngineError> {
        let max_attempts = self.config.max_resolution_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let batch = self.prepare_resolution(event_id, outcome, resolved_at).await?;
            let report = ResolutionReport::from_batch(&batch, attempt);

            match self.store.commit_resolution(batch).await {
                Ok(()) => {
                    info!(
                        event_id,
                        outcome,
                        forecasters = report.forecasters_scored,
                        mean_brier = ?report.mean_brier,
                        attempts = attempt,
                        "Event resolved"
                    );
                    return Ok(report);
                }
                Err(StoreError::EventNotOpen(id)) => {
                    warn!(event_id = %id, "Event resolved concurrently by another caller");
                    return Err(EngineError::AlreadyResolved(id));
                }
                Err(StoreError::EventNotFound(id)) => return Err(EngineError::EventNotFound(id)),
                Err(StoreError::Conflict(reason)) if attempt < max_attempts => {
                    warn!(event_id, attempt, reason = %reason, "Resolution batch stale, rebuilding");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Read the event's population and build the full resolution batch.
    async fn prepare_resolution(
        &self,
        event_id: &str,
        outcome: bool,
        resolved_at: DateTime<Utc>,
    ) -> Result<ResolutionBatch, EngineError> {
        self.require_open_event(event_id).await?;

        let records: Vec<ForecastRecord> = self
            .store
            .list_forecast_records(event_id)
            .await?
            .into_iter()
            .map(|r| score_record(r, outcome))
            .collect();

        let histories = self
            .fetch_histories(records.iter().map(|r| r.forecaster_id.clone()).collect())
            .await?;

        let mut prior_resolved = BTreeMap::new();
        let profiles: Vec<CalibrationProfile> = records
            .iter()
            .zip(histories)
            .map(|(record, history)| {
                let mut resolved: Vec<ResolvedForecast> = history
                    .iter()
                    .filter(|h| h.event_id != event_id)
                    .filter_map(ForecastRecord::as_resolved)
                    .collect();
                prior_resolved.insert(
                    record.forecaster_id.clone(),
                    u32::try_from(resolved.len()).unwrap_or(u32::MAX),
                );
                resolved.push(ResolvedForecast {
                    probability_percent: record.probability_percent,
                    outcome,
                });
                let profile = CalibrationProfile::from_history(&record.forecaster_id, &resolved);
                debug!(
                    forecaster_id = %record.forecaster_id,
                    brier = ?record.brier_score,
                    calibration = ?profile.calibration_score,
                    tier = %profile.calibration_tier,
                    "Forecaster rescored"
                );
                profile
            })
            .collect();

        Ok(ResolutionBatch {
            event_id: event_id.to_string(),
            outcome,
            resolved_at,
            records,
            profiles,
            prior_resolved,
        })
    }

    /// Full record history for each forecaster, in input order.
    async fn fetch_histories(
        &self,
        forecaster_ids: Vec<String>,
    ) -> Result<Vec<Vec<ForecastRecord>>, StoreError> {
        let store = self.store.clone();
        stream::iter(forecaster_ids)
            .map(move |id| {
                let store = store.clone();
                async move { store.list_forecaster_history(&id).await }
            })
            .buffered(self.config.fanout_concurrency.max(1))
            .try_collect()
            .await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
