//! Skill-weighted export and crowd comparison.
//!
//! Read-only views over one event's forecasters.

use futures::{stream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ForecastEngine;
use crate::scoring::consensus::{distribution, DistributionBucket};
use crate::scoring::{consensus, consensus_detailed, ConsensusMethod};
use crate::types::{CalibrationProfile, CalibrationTier, EngineError};

/// One forecaster's entry in the skill-weighted export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedForecaster {
    pub forecaster_id: String,
    pub probability_percent: u8,
    /// `None` when the forecaster has no resolved history yet.
    pub calibration_score: Option<f64>,
    pub calibration_tier: CalibrationTier,
    /// Weight used in the consensus: score (or the neutral default), floored at 0.
    pub weight: f64,
}

/// Calibration-weighted crowd view of one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillWeightedSummary {
    pub event_id: String,
    pub consensus: Option<u8>,
    pub consensus_method: Option<ConsensusMethod>,
    pub unweighted_consensus: Option<u8>,
    pub forecaster_count: usize,
    /// Highest calibration first; ties broken by forecaster id.
    pub forecasters: Vec<WeightedForecaster>,
}

/// How one forecaster's call compares to the rest of the crowd.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrowdComparison {
    pub event_id: String,
    pub forecaster_id: String,
    pub your_forecast: u8,
    pub crowd_mean: u8,
    /// `your_forecast - crowd_mean`, in percentage points.
    pub difference: i16,
    pub participants: usize,
    pub distribution: Vec<DistributionBucket>,
}

impl ForecastEngine {
    /// Every forecaster on the event, weighted by calibration score.
    pub async fn skill_weighted_summary(
        &self,
        event_id: &str,
    ) -> Result<SkillWeightedSummary, EngineError> {
        self.require_event(event_id).await?;
        let records = self.store.list_forecast_records(event_id).await?;

        let store = &self.store;
        let profiles: Vec<Option<CalibrationProfile>> = stream::iter(&records)
            .map(|r| async move { store.get_calibration_profile(&r.forecaster_id).await })
            .buffered(self.config.fanout_concurrency.max(1))
            .try_collect()
            .await?;

        let neutral = self.config.neutral_weight;
        let mut forecasters: Vec<WeightedForecaster> = records
            .iter()
            .zip(profiles)
            .map(|(record, profile)| {
                let profile =
                    profile.unwrap_or_else(|| CalibrationProfile::unranked(&record.forecaster_id));
                let effective = profile.calibration_score.unwrap_or(neutral);
                WeightedForecaster {
                    forecaster_id: record.forecaster_id.clone(),
                    probability_percent: record.probability_percent,
                    calibration_score: profile.calibration_score,
                    calibration_tier: profile.calibration_tier,
                    weight: effective.max(0.0),
                }
            })
            .collect();

        forecasters.sort_by(|a, b| {
            let score_a = a.calibration_score.unwrap_or(neutral);
            let score_b = b.calibration_score.unwrap_or(neutral);
            score_b
                .total_cmp(&score_a)
                .then_with(|| a.forecaster_id.cmp(&b.forecaster_id))
        });

        let probabilities: Vec<u8> = forecasters.iter().map(|f| f.probability_percent).collect();
        let weights: Vec<f64> = forecasters.iter().map(|f| f.weight).collect();
        let weighted = consensus_detailed(&probabilities, Some(&weights));

        debug!(
            event_id,
            forecasters = forecasters.len(),
            consensus = ?weighted.map(|c| c.value),
            method = ?weighted.map(|c| c.method),
            "Skill-weighted summary built"
        );

        Ok(SkillWeightedSummary {
            event_id: event_id.to_string(),
            consensus: weighted.map(|c| c.value),
            consensus_method: weighted.map(|c| c.method),
            unweighted_consensus: consensus(&probabilities, None),
            forecaster_count: forecasters.len(),
            forecasters,
        })
    }

    /// Compare one forecaster's call with the crowd on the same event.
    pub async fn crowd_comparison(
        &self,
        event_id: &str,
        forecaster_id: &str,
    ) -> Result<CrowdComparison, EngineError> {
        self.require_event(event_id).await?;
        let records = self.store.list_forecast_records(event_id).await?;

        let yours = records
            .iter()
            .find(|r| r.forecaster_id == forecaster_id)
            .map(|r| r.probability_percent)
            .ok_or_else(|| EngineError::ForecastNotFound {
                event_id: event_id.to_string(),
                forecaster_id: forecaster_id.to_string(),
            })?;

        let probabilities: Vec<u8> = records.iter().map(|r| r.probability_percent).collect();
        let crowd_mean = consensus(&probabilities, None).unwrap_or(yours);

        Ok(CrowdComparison {
            event_id: event_id.to_string(),
            forecaster_id: forecaster_id.to_string(),
            your_forecast: yours,
            crowd_mean,
            difference: i16::from(yours) - i16::from(crowd_mean),
            participants: probabilities.len(),
            distribution: distribution(&probabilities),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
