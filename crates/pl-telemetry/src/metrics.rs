//! Prometheus metrics for batch execution.
//!
//! All metrics follow the naming convention: `pl_<component>_<metric>_<unit>`
//!
//! ## Metric Types
//!
//! - **Counter**: Monotonically increasing value (e.g., batches_total)
//! - **Gauge**: Value that can go up or down (e.g., last_batch_levels)
//! - **Histogram**: Distribution of values (e.g., batch_duration_seconds)

use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
};
use std::sync::Once;

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    /// Batches processed, by outcome (committed / serial_fallback / rolled_back / rejected)
    pub static ref BATCHES_TOTAL: CounterVec = CounterVec::new(
        Opts::new("pl_engine_batches_total", "Total batches processed"),
        &["outcome"]
    ).expect("metric creation failed");

    /// Transactions committed as part of successful batches
    pub static ref TRANSACTIONS_COMMITTED: Counter = Counter::new(
        "pl_engine_transactions_committed_total",
        "Total transactions committed"
    ).expect("metric creation failed");

    /// Conflicts classified across all batches
    pub static ref CONFLICTS_DETECTED: Counter = Counter::new(
        "pl_engine_conflicts_detected_total",
        "Total pairwise conflicts classified"
    ).expect("metric creation failed");

    /// End-to-end batch duration
    pub static ref BATCH_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "pl_engine_batch_duration_seconds",
            "Time from submission to commit or rollback"
        ).buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0, 300.0])
    ).expect("metric creation failed");

    /// Proof generation duration
    pub static ref PROOF_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "pl_engine_proof_duration_seconds",
            "Time spent generating linearizability and conservation proofs"
        ).buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.1, 1.0, 10.0, 30.0])
    ).expect("metric creation failed");

    /// Throughput improvement (transactions per level) of each batch
    pub static ref PARALLELISM_RATIO: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "pl_engine_parallelism_ratio",
            "Transactions per execution level"
        ).buckets(vec![1.0, 1.5, 2.0, 4.0, 8.0, 16.0, 32.0, 64.0, 128.0])
    ).expect("metric creation failed");

    /// Levels of the most recent batch
    pub static ref LAST_BATCH_LEVELS: Gauge = Gauge::new(
        "pl_engine_last_batch_levels",
        "Execution levels of the most recent batch"
    ).expect("metric creation failed");
}

static REGISTER: Once = Once::new();

/// Register all batch metrics with [`REGISTRY`].
///
/// Safe to call more than once; only the first call registers.
pub fn register_metrics() -> Result<(), TelemetryError> {
    let mut result = Ok(());
    REGISTER.call_once(|| {
        let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(BATCHES_TOTAL.clone()),
            Box::new(TRANSACTIONS_COMMITTED.clone()),
            Box::new(CONFLICTS_DETECTED.clone()),
            Box::new(BATCH_DURATION.clone()),
            Box::new(PROOF_DURATION.clone()),
            Box::new(PARALLELISM_RATIO.clone()),
            Box::new(LAST_BATCH_LEVELS.clone()),
        ];

        for metric in metrics {
            if let Err(e) = REGISTRY.register(metric) {
                result = Err(TelemetryError::MetricsInit(e.to_string()));
                return;
            }
        }
    });
    result
}

/// One finished batch, as seen by the metrics layer.
#[derive(Debug, Clone)]
pub struct BatchObservation<'a> {
    pub outcome: &'a str,
    pub transactions: usize,
    pub levels: usize,
    pub conflicts: usize,
    pub duration_secs: f64,
    pub proof_secs: f64,
    pub throughput_ratio: f64,
}

/// Record a finished batch.
pub fn observe_batch(observation: &BatchObservation<'_>) {
    BATCHES_TOTAL
        .with_label_values(&[observation.outcome])
        .inc();
    if observation.outcome == "committed" || observation.outcome == "serial_fallback" {
        TRANSACTIONS_COMMITTED.inc_by(observation.transactions as f64);
    }
    CONFLICTS_DETECTED.inc_by(observation.conflicts as f64);
    BATCH_DURATION.observe(observation.duration_secs);
    PROOF_DURATION.observe(observation.proof_secs);
    PARALLELISM_RATIO.observe(observation.throughput_ratio);
    LAST_BATCH_LEVELS.set(observation.levels as f64);
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}
