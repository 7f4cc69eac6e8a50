//! Ports module for the batch engine
//!
//! Defines inbound (API) and outbound (SPI) port traits.

pub mod inbound;
pub mod outbound;

pub use inbound::BatchProcessingApi;
pub use outbound::{BatchTelemetry, OracleValidator, StateStore, TelemetrySink};
