//! Scenario replay.
//!
//! Replays a scripted week of forecasting (events, forecasts,
//! resolutions) through the engine and collects the resulting
//! consensus values, summaries, and calibration profiles.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

use crate::engine::{ForecastEngine, ResolutionReport, SkillWeightedSummary};
use crate::types::{CalibrationProfile, EngineError};

// ---------------------------------------------------------------------------
// Scenario input
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioEvent {
    /// Local name used by forecasts and resolutions in the same file.
    pub key: String,
    pub title: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub context: String,
    pub deadline: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioForecast {
    pub event: String,
    pub forecaster: String,
    pub probability: u8,
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResolution {
    pub event: String,
    pub outcome: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub events: Vec<ScenarioEvent>,
    #[serde(default)]
    pub forecasts: Vec<ScenarioForecast>,
    #[serde(default)]
    pub resolutions: Vec<ScenarioResolution>,
}

// ---------------------------------------------------------------------------
// Scenario output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct EventReport {
    pub key: String,
    pub event_id: String,
    pub title: String,
    /// Unweighted consensus once all forecasts were in, before resolution.
    pub consensus_before_resolution: Option<u8>,
    pub resolution: Option<ResolutionReport>,
    pub summary: SkillWeightedSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub events: Vec<EventReport>,
    pub profiles: Vec<CalibrationProfile>,
    /// Steps the engine refused, with the reason.
    pub rejected: Vec<String>,
}

impl Scenario {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse scenario JSON")
    }

    pub fn load(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario file: {path}"))?;
        Self::from_json(&contents).with_context(|| format!("Invalid scenario file: {path}"))
    }

    /// Replay the scenario. Engine rejections are recorded, not fatal;
    /// storage failures abort the run.
    pub async fn run(&self, engine: &ForecastEngine) -> Result<ScenarioReport> {
        let mut ids: BTreeMap<&str, String> = BTreeMap::new();
        let mut rejected = Vec::new();

        for spec in &self.events {
            let event = engine
                .open_event(&spec.title, &spec.category, &spec.context, spec.deadline)
                .await
                .with_context(|| format!("Failed to open event '{}'", spec.key))?;
            ids.insert(spec.key.as_str(), event.id);
        }

        let mut forecasters = BTreeSet::new();
        for forecast in &self.forecasts {
            let Some(event_id) = ids.get(forecast.event.as_str()) else {
                rejected.push(format!("forecast on unknown event '{}'", forecast.event));
                continue;
            };
            let at = forecast.submitted_at.unwrap_or_else(Utc::now);
            match engine
                .submit_forecast_at(&forecast.forecaster, event_id, forecast.probability, at)
                .await
            {
                Ok(_) => {
                    forecasters.insert(forecast.forecaster.clone());
                }
                Err(e @ EngineError::Storage(_)) => return Err(e.into()),
                Err(e) => {
                    warn!(forecaster = %forecast.forecaster, event = %forecast.event, error = %e, "Forecast rejected");
                    rejected.push(format!("{} on '{}': {e}", forecast.forecaster, forecast.event));
                }
            }
        }

        let mut consensus_before = BTreeMap::new();
        for (key, event_id) in &ids {
            consensus_before.insert(*key, engine.event_consensus(event_id).await?);
        }

        let mut resolutions = BTreeMap::new();
        for resolution in &self.resolutions {
            let Some(event_id) = ids.get(resolution.event.as_str()) else {
                rejected.push(format!("resolution of unknown event '{}'", resolution.event));
                continue;
            };
            match engine.resolve_event(event_id, resolution.outcome).await {
                Ok(report) => {
                    resolutions.insert(resolution.event.as_str(), report);
                }
                Err(e) if e.is_resolution_error() => {
                    warn!(event = %resolution.event, error = %e, "Resolution rejected");
                    rejected.push(format!("resolve '{}': {e}", resolution.event));
                }
                Err(e) => return Err(e.into()),
            }
        }

        let mut events = Vec::with_capacity(self.events.len());
        for spec in &self.events {
            let event_id = ids
                .get(spec.key.as_str())
                .cloned()
                .with_context(|| format!("Event '{}' was not opened", spec.key))?;
            let summary = engine.skill_weighted_summary(&event_id).await?;
            events.push(EventReport {
                key: spec.key.clone(),
                title: spec.title.clone(),
                consensus_before_resolution: consensus_before.get(spec.key.as_str()).copied().flatten(),
                resolution: resolutions.remove(spec.key.as_str()),
                summary,
                event_id,
            });
        }

        let mut profiles = Vec::with_capacity(forecasters.len());
        for forecaster in &forecasters {
            profiles.push(engine.calibration_profile(forecaster).await?);
        }

        info!(
            events = events.len(),
            forecasters = profiles.len(),
            rejected = rejected.len(),
            "Scenario replay complete"
        );

        Ok(ScenarioReport {
            events,
            profiles,
            rejected,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
