//! # Adapters Layer (Hexagonal Architecture)
//!
//! Implementations of the outbound ports.

mod memory_store;
mod oracle;
mod telemetry;

pub use memory_store::InMemoryStateStore;
pub use oracle::{attest, AttestationOracleValidator};
pub use telemetry::{PrometheusTelemetrySink, TracingTelemetrySink};
