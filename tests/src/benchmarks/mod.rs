//! # Parallel-Ledger Benchmarks
//!
//! Criterion bodies, registered from `benches/batch_benchmarks.rs`.

pub mod batch_engine;
