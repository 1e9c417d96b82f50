//! Integration tests for the forecasting engine.

mod flaky_store;
mod lifecycle;
