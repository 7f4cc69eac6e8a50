//! # Parallel-Ledger Batch Engine
//!
//! Executes batches of ledger transactions concurrently and commits them only
//! with a proof that the run is equivalent to a serial order and that total
//! value is conserved.
//!
//! ## Architecture
//!
//! - **Domain**: Transactions, dependency graph, conflicts, traces, results, errors
//! - **Algorithms**: Dependency analysis, conflict detection, Kahn's level decomposition
//! - **Execution**: Batch-scoped worker pools, copy-on-write views, cancellation
//! - **Proofs**: Constraint encoding, bounded solver, linearizability and conservation
//! - **Commit**: Two-outcome commit manager
//! - **Ports**: Inbound (`BatchProcessingApi`) and outbound (`StateStore`,
//!   `OracleValidator`, `TelemetrySink`)
//! - **Adapters**: In-memory store, attestation oracle, tracing and Prometheus sinks
//! - **Application**: `BatchProcessor` orchestration and serial fallback
//!
//! ## Pipeline
//!
//! ```text
//! validate -> graph -> conflicts -> levels -> parallel execution
//!          -> linearizability (serial fallback if unproven)
//!          -> conservation -> oracles -> commit | rollback
//! ```

pub mod adapters;
pub mod algorithms;
pub mod application;
pub mod commit;
pub mod config;
pub mod domain;
pub mod execution;
pub mod ports;
pub mod proofs;

pub use adapters::{
    AttestationOracleValidator, InMemoryStateStore, PrometheusTelemetrySink, TracingTelemetrySink,
};
pub use application::BatchProcessor;
pub use config::EngineConfig;
pub use domain::atomic_batch::{AtomicBatch, AtomicStep};
pub use domain::entities::*;
pub use domain::errors::{BatchError, ErrorCode, TxError};
pub use domain::results::*;
pub use domain::value_objects::*;
pub use ports::inbound::BatchProcessingApi;
pub use ports::outbound::{BatchTelemetry, OracleValidator, StateStore, TelemetrySink};
