//! # Telemetry Wiring
//!
//! Batches processed with the Prometheus sink show up in the exported registry.

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use pl_batch_engine::{
        AttestationOracleValidator, BatchProcessingApi, BatchProcessor, InMemoryStateStore,
        PrometheusTelemetrySink, Transaction,
    };
    use pl_telemetry::metrics::BATCHES_TOTAL;
    use pl_telemetry::{init_telemetry, TelemetryConfig, TelemetryError};
    use std::sync::Arc;

    fn processor(store: Arc<InMemoryStateStore>) -> BatchProcessor {
        BatchProcessor::new(
            default_config(),
            store,
            Arc::new(AttestationOracleValidator::new([TRUSTED_ORACLE])),
            Arc::new(PrometheusTelemetrySink),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_prometheus_sink_exports_batch_outcomes() {
        let config = TelemetryConfig {
            console_output: false,
            ..TelemetryConfig::for_component("batch-engine")
        };
        // A global subscriber may already be installed in this process
        match init_telemetry(&config) {
            Ok(()) | Err(TelemetryError::TracerInit(_)) => {}
            Err(e) => panic!("metrics registration failed: {e}"),
        }
        let store = Arc::new(InMemoryStateStore::with_balances([(make_addr(0), 10)]));
        let processor = processor(store);
        let committed_before = BATCHES_TOTAL.with_label_values(&["committed"]).get();
        let rejected_before = BATCHES_TOTAL.with_label_values(&["rejected"]).get();

        let ok = processor
            .process_batch(vec![Transaction::transfer(make_hash(1), make_addr(0), make_addr(1), 4)])
            .await;
        let rejected = processor.process_batch(Vec::new()).await;

        assert!(ok.success);
        assert!(!rejected.success);
        assert!(BATCHES_TOTAL.with_label_values(&["committed"]).get() >= committed_before + 1.0);
        assert!(BATCHES_TOTAL.with_label_values(&["rejected"]).get() >= rejected_before + 1.0);

        let text = pl_telemetry::encode_metrics().unwrap();
        assert!(text.contains("pl_engine_batches_total"));
        assert!(text.contains("pl_engine_batch_duration_seconds"));
    }
}
