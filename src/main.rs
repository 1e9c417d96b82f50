//! Forecast engine scenario runner.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! replays a scenario file against an in-memory store, and prints the
//! resulting summaries and calibration profiles as JSON.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use forecast_engine::config::{self, AppConfig};
use forecast_engine::engine::ForecastEngine;
use forecast_engine::scenario::Scenario;
use forecast_engine::storage::memory::MemoryStore;

const DEFAULT_SCENARIO: &str = "scenarios/weekly.json";

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path = std::env::var("FORECAST_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let cfg = AppConfig::load_or_default(&config_path)?;

    init_logging(&cfg.logging);

    let scenario_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_SCENARIO.to_string());
    let scenario = Scenario::load(&scenario_path)?;
    info!(
        path = %scenario_path,
        events = scenario.events.len(),
        forecasts = scenario.forecasts.len(),
        resolutions = scenario.resolutions.len(),
        "Scenario loaded"
    );

    let store = Arc::new(MemoryStore::new());
    let engine = ForecastEngine::new(store, cfg.engine.clone());
    let report = scenario.run(&engine).await?;

    let json = serde_json::to_string_pretty(&report).context("Failed to serialise scenario report")?;
    println!("{json}");

    Ok(())
}

/// Initialise the `tracing` subscriber. Logs go to stderr so stdout
/// stays valid JSON.
fn init_logging(cfg: &config::LoggingConfig) {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cfg.filter));

    if json_logging(cfg, std::env::var("FORECAST_LOG_JSON").ok().as_deref()) {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    }
}

/// JSON output when the config asks for it or `FORECAST_LOG_JSON` is set
/// to anything but `0`/`false`.
fn json_logging(cfg: &config::LoggingConfig, env_value: Option<&str>) -> bool {
    let from_env = env_value.is_some_and(|v| !matches!(v.trim(), "0" | "false" | ""));
    cfg.json || from_env
}
