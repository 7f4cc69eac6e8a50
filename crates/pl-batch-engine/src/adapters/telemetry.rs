//! Telemetry sinks

use crate::ports::outbound::{BatchTelemetry, TelemetrySink};
use pl_telemetry::{observe_batch, BatchObservation};
use tracing::info;

/// Logs one structured line per batch.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingTelemetrySink;

impl TelemetrySink for TracingTelemetrySink {
    fn record_batch(&self, t: &BatchTelemetry) {
        info!(
            batch_id = %t.batch_id,
            outcome = t.outcome,
            transactions = t.transactions,
            parallel_transactions = t.parallel_transactions,
            levels = t.levels,
            conflicts = t.conflicts,
            workers = t.worker_count,
            duration_ms = t.duration.as_secs_f64() * 1000.0,
            execution_ms = t.execution_duration.as_secs_f64() * 1000.0,
            proof_ms = t.proof_duration.as_secs_f64() * 1000.0,
            throughput_ratio = t.throughput_ratio,
            "Batch finished"
        );
    }
}

/// Feeds the Prometheus registry in `pl-telemetry`.
#[derive(Clone, Copy, Debug, Default)]
pub struct PrometheusTelemetrySink;

impl TelemetrySink for PrometheusTelemetrySink {
    fn record_batch(&self, t: &BatchTelemetry) {
        observe_batch(&BatchObservation {
            outcome: t.outcome,
            transactions: t.transactions,
            levels: t.levels,
            conflicts: t.conflicts,
            duration_secs: t.duration.as_secs_f64(),
            proof_secs: t.proof_duration.as_secs_f64(),
            throughput_ratio: t.throughput_ratio,
        });
    }
}
