//! # Integration Tests
//!
//! End-to-end batches through `BatchProcessor` against the in-memory store.

pub mod fixtures;

mod properties;
mod scenarios;
mod telemetry;
