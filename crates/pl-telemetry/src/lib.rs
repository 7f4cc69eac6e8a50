//! # Parallel-Ledger Telemetry
//!
//! Logging and metrics for the batch engine.
//!
//! ## Components
//!
//! - **Logging**: `tracing-subscriber` with env-filter, pretty or JSON output
//! - **Metrics**: Prometheus counters and histograms for batch outcomes
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pl_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() {
//!     init_telemetry(&TelemetryConfig::from_env()).expect("telemetry");
//!     // Batches submitted from here on are logged and counted
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `PL_SERVICE_NAME` | `parallel-ledger` | Service name in logs |
//! | `PL_LOG_LEVEL` | `info` | Log level filter |
//! | `PL_JSON_LOGS` | `false` | JSON log lines |
//! | `PL_CONSOLE_OUTPUT` | `true` | Write logs to stdout |

mod config;
pub mod metrics;
mod tracing_setup;

pub use config::TelemetryConfig;
pub use metrics::{encode_metrics, observe_batch, register_metrics, BatchObservation};
pub use tracing_setup::init_tracing;

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize tracing subscriber: {0}")]
    TracerInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),
}

/// Register metrics and install the tracing subscriber.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    // Metrics first (no global state conflicts)
    register_metrics()?;
    init_tracing(config)
}

/// Convenience macro for creating a span with batch context.
///
/// ```rust,ignore
/// let _span = pl_telemetry::batch_span!("execute_level", batch_id = %id, level = 3).entered();
/// ```
#[macro_export]
macro_rules! batch_span {
    ($name:expr, $($field:tt)*) => {
        tracing::info_span!($name, $($field)*)
    };
}
