//! End-to-end forecast lifecycle: submit → consensus → resolve → calibrate.

use chrono::{Duration, Utc};
use std::sync::Arc;

use forecast_engine::config::EngineConfig;
use forecast_engine::engine::ForecastEngine;
use forecast_engine::scoring::ConsensusMethod;
use forecast_engine::storage::memory::MemoryStore;
use forecast_engine::storage::{ForecastStore, StoreError};
use forecast_engine::types::{CalibrationTier, EngineError, ForecastRecord, PredictionEvent};

use crate::flaky_store::FlakyStore;

fn approx(actual: f64, expected: f64) {
    assert!((actual - expected).abs() < 1e-9, "expected {expected}, got {actual}");
}

async fn open(engine: &ForecastEngine, title: &str) -> PredictionEvent {
    engine
        .open_event(title, "Index", "", Utc::now() + Duration::days(7))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_three_forecaster_scenario() {
    let store = Arc::new(MemoryStore::new());
    let engine = ForecastEngine::new(store.clone(), EngineConfig::default());
    let event = open(&engine, "Will Nifty 50 close above its current level this week?").await;

    engine.submit_forecast("alice", &event.id, 70).await.unwrap();
    engine.submit_forecast("bob", &event.id, 30).await.unwrap();
    engine.submit_forecast("carol", &event.id, 55).await.unwrap();

    assert_eq!(engine.event_consensus(&event.id).await.unwrap(), Some(52));

    let report = engine.resolve_event(&event.id, true).await.unwrap();
    assert_eq!(report.forecasters_scored, 3);
    assert!(report.outcome);

    let expected = [("alice", 0.09), ("bob", 0.49), ("carol", 0.2025)];
    for (who, brier) in expected {
        let record = store.get_forecast_record(&event.id, who).await.unwrap().unwrap();
        approx(record.brier_score.unwrap(), brier);
        assert_eq!(record.outcome, Some(true));
        assert!(record.calibration_contribution.is_some());
    }

    let event = engine.event(&event.id).await.unwrap();
    assert!(event.resolved);
    assert_eq!(event.outcome, Some(true));
    assert_eq!(event.resolved_at, Some(report.resolved_at));

    assert_eq!(engine.calibration_profile("alice").await.unwrap().calibration_tier, CalibrationTier::Skilled);
    assert_eq!(engine.calibration_profile("carol").await.unwrap().calibration_tier, CalibrationTier::Learning);
    assert_eq!(engine.calibration_profile("bob").await.unwrap().calibration_tier, CalibrationTier::Developing);

    // Weights 0.91, 0.7975, 0.51 → (63.7 + 43.8625 + 15.3) / 2.2175 = 55.4
    let summary = engine.skill_weighted_summary(&event.id).await.unwrap();
    assert_eq!(summary.consensus, Some(55));
    assert_eq!(summary.consensus_method, Some(ConsensusMethod::Weighted));
    assert_eq!(summary.unweighted_consensus, Some(52));
    let order: Vec<&str> = summary.forecasters.iter().map(|f| f.forecaster_id.as_str()).collect();
    assert_eq!(order, vec!["alice", "carol", "bob"]);
}

#[tokio::test]
async fn test_forecasts_frozen_after_resolution() {
    let engine = ForecastEngine::new(Arc::new(MemoryStore::new()), EngineConfig::default());
    let event = open(&engine, "Will Bitcoin trade above $70,000 this week?").await;
    engine.submit_forecast("alice", &event.id, 80).await.unwrap();
    engine.resolve_event(&event.id, false).await.unwrap();

    let err = engine.submit_forecast("bob", &event.id, 40).await.unwrap_err();
    assert!(err.is_resolution_error());
    let err = engine.withdraw_forecast("alice", &event.id).await.unwrap_err();
    assert!(err.is_resolution_error());
    let err = engine.revise_forecast("alice", &event.id, 20).await.unwrap_err();
    assert!(err.is_resolution_error());
}

#[tokio::test]
async fn test_second_resolution_leaves_scores_untouched() {
    let store = Arc::new(MemoryStore::new());
    let engine = ForecastEngine::new(store.clone(), EngineConfig::default());
    let event = open(&engine, "Will DXY weaken vs INR this week?").await;
    engine.submit_forecast("alice", &event.id, 65).await.unwrap();
    engine.submit_forecast("bob", &event.id, 20).await.unwrap();

    engine.resolve_event(&event.id, true).await.unwrap();
    let after_first = store.snapshot().await;

    let err = engine.resolve_event(&event.id, true).await.unwrap_err();
    assert!(matches!(err, EngineError::AlreadyResolved(_)));
    let err = engine.resolve_event(&event.id, false).await.unwrap_err();
    assert!(matches!(err, EngineError::AlreadyResolved(_)));

    assert_eq!(store.snapshot().await, after_first);
    assert_eq!(engine.calibration_profile("alice").await.unwrap().calibration_forecast_count, 1);
}

#[tokio::test]
async fn test_failed_commit_is_invisible_and_retryable() {
    let memory = Arc::new(MemoryStore::new());
    let flaky = Arc::new(FlakyStore::new(memory.clone()));
    let engine = ForecastEngine::new(flaky.clone(), EngineConfig::default());
    let event = open(&engine, "Will Nifty 50 close higher?").await;
    for (who, p) in [("alice", 70), ("bob", 30), ("carol", 55)] {
        engine.submit_forecast(who, &event.id, p).await.unwrap();
    }
    let before = memory.snapshot().await;

    flaky.fail_next_commits(1);
    let err = engine.resolve_event(&event.id, true).await.unwrap_err();
    assert!(matches!(err, EngineError::Storage(StoreError::Unavailable(_))));
    assert!(err.is_retryable());

    // Nothing partially applied: event open, nobody scored, no profiles.
    assert_eq!(memory.snapshot().await, before);
    assert!(engine.event(&event.id).await.unwrap().is_open());
    assert_eq!(engine.calibration_profile("bob").await.unwrap().calibration_tier, CalibrationTier::Unranked);

    let report = engine.resolve_event(&event.id, true).await.unwrap();
    assert_eq!(report.forecasters_scored, 3);
    let records = memory.list_forecast_records(&event.id).await.unwrap();
    assert!(records.iter().all(|r| r.brier_score.is_some()));
    assert_eq!(engine.calibration_profile("bob").await.unwrap().calibration_forecast_count, 1);
    assert_eq!(flaky.commit_calls(), 2);
}

#[tokio::test]
async fn test_late_forecast_forces_rebuild() {
    let memory = Arc::new(MemoryStore::new());
    let flaky = Arc::new(FlakyStore::new(memory.clone()));
    let engine = ForecastEngine::new(flaky.clone(), EngineConfig::default());
    let event = open(&engine, "Will Bitcoin trade above $70,000?").await;
    engine.submit_forecast("alice", &event.id, 70).await.unwrap();

    flaky.inject_late_forecast(ForecastRecord::new(&event.id, "dave", 90, Utc::now()));
    let report = engine.resolve_event(&event.id, true).await.unwrap();

    assert_eq!(report.attempts, 2);
    assert_eq!(report.forecasters_scored, 2);
    let dave = memory.get_forecast_record(&event.id, "dave").await.unwrap().unwrap();
    approx(dave.brier_score.unwrap(), 0.01);
    assert_eq!(engine.calibration_profile("dave").await.unwrap().calibration_tier, CalibrationTier::Expert);
}

#[tokio::test]
async fn test_store_outage_surfaces_on_every_operation() {
    let memory = Arc::new(MemoryStore::new());
    let flaky = Arc::new(FlakyStore::new(memory.clone()));
    let engine = ForecastEngine::new(flaky.clone(), EngineConfig::default());
    let event = open(&engine, "Will the RBI cut rates?").await;

    flaky.set_error("connection reset");
    assert!(matches!(
        engine.submit_forecast("alice", &event.id, 50).await.unwrap_err(),
        EngineError::Storage(StoreError::Unavailable(_))
    ));
    assert!(engine.skill_weighted_summary(&event.id).await.is_err());
    assert!(engine.resolve_event(&event.id, true).await.is_err());

    flaky.clear_error();
    engine.submit_forecast("alice", &event.id, 50).await.unwrap();
    let report = engine.resolve_event(&event.id, true).await.unwrap();
    assert_eq!(report.mean_brier, Some(0.25));
}

#[tokio::test]
async fn test_calibration_history_spans_events() {
    let engine = ForecastEngine::new(Arc::new(MemoryStore::new()), EngineConfig::default());
    let mut ids = Vec::new();
    for title in ["Week 1 close", "Week 2 close", "Week 3 close", "Week 4 close"] {
        ids.push(open(&engine, title).await.id);
    }
    // Sharp and right every week.
    for id in &ids {
        engine.submit_forecast("sharp", id, 95).await.unwrap();
        engine.submit_forecast("hedger", id, 50).await.unwrap();
    }
    for id in &ids {
        engine.resolve_event(id, true).await.unwrap();
    }

    let sharp = engine.calibration_profile("sharp").await.unwrap();
    assert_eq!(sharp.calibration_forecast_count, 4);
    assert_eq!(sharp.calibration_score, Some(0.9975));
    assert_eq!(sharp.calibration_tier, CalibrationTier::Expert);

    let hedger = engine.calibration_profile("hedger").await.unwrap();
    assert_eq!(hedger.calibration_score, Some(0.75));
    assert_eq!(hedger.calibration_tier, CalibrationTier::Learning);
}
