//! Batch Processor Service
//!
//! Main service implementing BatchProcessingApi.

use crate::algorithms::{
    apply_serialize_edges, build_dependency_graph_bounded, compute_levels, detect_conflicts,
    topological_order,
};
use crate::commit::CommitManager;
use crate::config::EngineConfig;
use crate::domain::atomic_batch::AtomicBatch;
use crate::domain::entities::{Conflict, DependencyGraph, Transaction};
use crate::domain::errors::{BatchError, ConfigError, ErrorCode, OracleError};
use crate::domain::invariants::schedule_is_valid;
use crate::domain::results::{
    BatchResult, CommitState, ExecutionMode, ExecutionOutcome, ExecutionResult, ProofResult,
    ProofStatus,
};
use crate::domain::value_objects::{AccountId, AccountState, TxId};
use crate::execution::{execute_serial, Cancellation, ParallelExecutor, RayonWorkerPool, WorkerPool};
use crate::ports::inbound::BatchProcessingApi;
use crate::ports::outbound::{BatchTelemetry, OracleValidator, StateStore, TelemetrySink};
use crate::proofs::{ConservationValidator, LinearizabilityProver};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

/// Batch Processor
///
/// Orchestrates the batch pipeline:
/// 1. Validate input
/// 2. Build dependency graph, detect conflicts, compute levels
/// 3. Execute levels in parallel on a batch-scoped worker pool
/// 4. Prove linearizability (serial fallback when the budget runs out)
/// 5. Validate conservation and oracle proofs
/// 6. Commit or roll back
pub struct BatchProcessor {
    config: EngineConfig,
    store: Arc<dyn StateStore>,
    oracle: Arc<dyn OracleValidator>,
    telemetry: Arc<dyn TelemetrySink>,
    /// Fixed pool for every batch; a fresh rayon pool per batch when unset
    pool: Option<Arc<dyn WorkerPool>>,
}

/// Output of the analysis phase
struct Analysis {
    graph: DependencyGraph,
    conflicts: Vec<Conflict>,
    levels: Vec<Vec<TxId>>,
}

impl BatchProcessor {
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn StateStore>,
        oracle: Arc<dyn OracleValidator>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            store,
            oracle,
            telemetry,
            pool: None,
        })
    }

    /// Run every batch on `pool`, e.g. an inline pool for deterministic tests.
    pub fn with_worker_pool(mut self, pool: Arc<dyn WorkerPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Validate batch size, ids and account bindings
    fn validate_batch(&self, transactions: &[Transaction]) -> Result<(), BatchError> {
        if transactions.is_empty() {
            return Err(BatchError::EmptyBatch);
        }

        if transactions.len() > self.config.max_batch_size {
            return Err(BatchError::BatchTooLarge {
                size: transactions.len(),
                max: self.config.max_batch_size,
            });
        }

        let mut seen = HashSet::with_capacity(transactions.len());
        for tx in transactions {
            if !seen.insert(tx.id()) {
                return Err(BatchError::ConflictResolution {
                    tx: tx.id(),
                    reason: "duplicate transaction id makes submission order ambiguous".into(),
                });
            }
            tx.validate().map_err(|e| BatchError::InvalidTransaction {
                tx: tx.id(),
                reason: e.to_string(),
            })?;
        }

        Ok(())
    }

    fn analyze(&self, transactions: &[Transaction]) -> Result<Analysis, BatchError> {
        let mut graph = build_dependency_graph_bounded(transactions, self.config.max_edge_count)?;
        let conflicts = detect_conflicts(transactions, &graph);
        let serialized = apply_serialize_edges(&mut graph, &conflicts);

        if graph.edge_count() > self.config.max_edge_count {
            return Err(BatchError::TooManyEdges {
                count: graph.edge_count(),
                max: self.config.max_edge_count,
            });
        }

        let levels = compute_levels(&graph)?;
        debug_assert!(schedule_is_valid(&levels, &graph));

        debug!(
            edges = graph.edge_count(),
            conflicts = conflicts.len(),
            serialized,
            levels = levels.len(),
            "Batch analysed"
        );
        Ok(Analysis {
            graph,
            conflicts,
            levels,
        })
    }

    /// Snapshot of every touched account, zero for accounts the store lacks.
    async fn load_snapshot(&self, transactions: &[Transaction]) -> Result<AccountState, BatchError> {
        let touched: BTreeSet<AccountId> = transactions
            .iter()
            .flat_map(|tx| tx.access_sets().touched())
            .collect();
        let loaded = self
            .store
            .load(&touched)
            .await
            .map_err(|e| BatchError::Commit(format!("snapshot load failed: {e}")))?;

        Ok(touched
            .into_iter()
            .map(|a| (a, loaded.get(&a).copied().unwrap_or(0)))
            .collect())
    }

    fn worker_pool(&self) -> Result<Arc<dyn WorkerPool>, BatchError> {
        match &self.pool {
            Some(pool) => Ok(pool.clone()),
            None => Ok(Arc::new(RayonWorkerPool::new(self.config.worker_count)?)),
        }
    }

    async fn execute_parallel(
        &self,
        transactions: Arc<[Transaction]>,
        levels: Vec<Vec<TxId>>,
        initial: AccountState,
    ) -> Result<ExecutionResult, BatchError> {
        let pool = self.worker_pool()?;
        let cancel = Cancellation::with_timeout(self.config.batch_timeout);

        tokio::task::spawn_blocking(move || {
            ParallelExecutor::new(pool.as_ref()).execute(&transactions, &levels, initial, &cancel)
        })
        .await
        .map_err(|e| BatchError::Internal(format!("executor task failed: {e}")))
    }

    async fn prove_linearizability(
        &self,
        transactions: Arc<[Transaction]>,
        graph: Arc<DependencyGraph>,
        execution: ExecutionResult,
    ) -> Result<(ExecutionResult, ProofResult), BatchError> {
        let prover = LinearizabilityProver::new(self.config.proof_budget);

        tokio::task::spawn_blocking(move || -> Result<_, BatchError> {
            let proof = prover.prove(&transactions, &graph, &execution)?;
            Ok((execution, proof))
        })
        .await
        .map_err(|e| BatchError::Internal(format!("prover task failed: {e}")))?
    }

    /// Re-run the batch one transaction at a time in dependency order and
    /// certify the result against that order.
    async fn execute_fallback(
        &self,
        transactions: Arc<[Transaction]>,
        graph: Arc<DependencyGraph>,
        order: Vec<TxId>,
        initial: AccountState,
    ) -> Result<(ExecutionResult, Option<ProofResult>), BatchError> {
        let cancel = Cancellation::with_timeout(self.config.batch_timeout);
        let prover = LinearizabilityProver::new(self.config.proof_budget);

        tokio::task::spawn_blocking(move || -> Result<_, BatchError> {
            let execution = execute_serial(&transactions, &order, initial, &cancel)?;
            if !execution.is_complete() {
                return Ok((execution, None));
            }
            let proof = prover.certify(&transactions, &graph, &execution, &order)?;
            Ok((execution, Some(proof)))
        })
        .await
        .map_err(|e| BatchError::Internal(format!("serial fallback task failed: {e}")))?
    }

    async fn validate_oracles(&self, transactions: &[Transaction]) -> Result<(), BatchError> {
        for tx in transactions.iter().filter(|tx| !tx.oracle_proofs().is_empty()) {
            self.oracle
                .validate(tx.id(), tx.oracle_proofs())
                .await
                .map_err(|e| {
                    let (oracle, reason) = match e {
                        OracleError::Rejected { oracle, reason } => (oracle, reason),
                        OracleError::Unavailable(reason) => (
                            tx.oracle_proofs()
                                .first()
                                .map(|p| p.oracle.clone())
                                .unwrap_or_default(),
                            reason,
                        ),
                    };
                    BatchError::OracleValidation {
                        tx: tx.id(),
                        oracle,
                        reason,
                    }
                })?;
        }
        Ok(())
    }

    /// Run the pipeline, filling `result` as stages complete.
    async fn run(
        &self,
        batch_id: Uuid,
        transactions: Vec<Transaction>,
        result: &mut BatchResult,
    ) -> Result<(), BatchError> {
        // 1. Validate input
        self.validate_batch(&transactions)?;

        // 2. Analyse
        let Analysis {
            graph,
            conflicts,
            levels,
        } = self.analyze(&transactions)?;
        result.conflicts = conflicts;
        let transactions: Arc<[Transaction]> = transactions.into();
        let graph = Arc::new(graph);

        let initial = self.load_snapshot(&transactions).await?;
        let mut manager = CommitManager::new(batch_id, self.store.clone());

        // 3. Execute
        let mut execution = self
            .execute_parallel(transactions.clone(), levels.clone(), initial.clone())
            .await?;
        result.execution_duration = execution.duration;
        result.worker_count = execution.worker_count;
        result.parallel_transactions = execution.parallel_transactions();

        if let Some(err) = execution_failure(&execution.outcome) {
            return Err(abort(&mut manager, &mut execution, result, err));
        }
        info!(
            %batch_id,
            levels = execution.independent_sets.len(),
            parallel_transactions = result.parallel_transactions,
            "Parallel execution complete"
        );

        // 4. Linearizability
        let (mut execution, linearizability) = self
            .prove_linearizability(transactions.clone(), graph.clone(), execution)
            .await?;

        let (mut execution, linearizability) = match linearizability.status {
            ProofStatus::Proven => (execution, linearizability),
            ProofStatus::Disproven => {
                error!(%batch_id, "Parallel execution disproven");
                let counterexample = linearizability.counterexample.clone().unwrap_or_default();
                result.counterexample = Some(counterexample.clone());
                result.linearizability = Some(linearizability);
                return Err(abort(
                    &mut manager,
                    &mut execution,
                    result,
                    BatchError::Linearizability {
                        counterexample: Box::new(counterexample),
                    },
                ));
            }
            ProofStatus::Unproven => {
                let reason = format!(
                    "linearizability search exceeded its budget of {:?}",
                    self.config.proof_budget
                );
                warn!(%batch_id, %reason, "Falling back to serial execution");
                result.mode = ExecutionMode::SerialFallback;
                result.fallback_reason = Some(reason);

                let order = topological_order(&levels);
                let (mut serial, proof) = self
                    .execute_fallback(transactions.clone(), graph.clone(), order, initial)
                    .await?;
                result.execution_duration += serial.duration;
                result.worker_count = serial.worker_count;
                result.parallel_transactions = 0;

                if let Some(err) = execution_failure(&serial.outcome) {
                    return Err(abort(&mut manager, &mut serial, result, err));
                }
                match proof {
                    Some(proof) if proof.valid => (serial, proof),
                    _ => {
                        return Err(abort(
                            &mut manager,
                            &mut serial,
                            result,
                            BatchError::Internal("serial execution failed certification".into()),
                        ))
                    }
                }
            }
        };
        result.linearizability = Some(linearizability.clone());

        // 5. Conservation
        let report = ConservationValidator::new().validate(&transactions, &execution);
        result.conservation = Some(report.proof.clone());
        let conservation = report.proof.clone();
        if let Some(err) = report.into_error() {
            return Err(abort(&mut manager, &mut execution, result, err));
        }

        // 6. Oracle obligations
        if let Err(err) = self.validate_oracles(&transactions).await {
            warn!(%batch_id, error = %err, "Oracle validation failed");
            return Err(abort(&mut manager, &mut execution, result, err));
        }

        // 7. Commit
        match manager
            .commit(&execution, &linearizability, &conservation)
            .await
        {
            Ok(state) => {
                result.final_state = state;
                result.commit_state = manager.state();
                result.levels = execution.independent_sets.len();
                result.independent_sets = std::mem::take(&mut execution.independent_sets);
                result.trace = std::mem::take(&mut execution.trace);
                Ok(())
            }
            Err(err) => Err(abort(&mut manager, &mut execution, result, err)),
        }
    }

    async fn process(&self, lowered: Result<Vec<Transaction>, BatchError>) -> BatchResult {
        let started = Instant::now();
        let batch_id = Uuid::new_v4();
        let total = lowered.as_ref().map_or(0, Vec::len);
        let mut result = BatchResult::new(batch_id, total);

        info!(%batch_id, tx_count = total, "Processing batch");

        let outcome = match lowered {
            Ok(transactions) => {
                self.run(batch_id, transactions, &mut result)
                    .instrument(pl_telemetry::batch_span!("batch", batch_id = %batch_id))
                    .await
            }
            Err(err) => Err(err),
        };

        match outcome {
            Ok(()) => {
                result.success = true;
                result.throughput_improvement = match result.mode {
                    ExecutionMode::Parallel => throughput(total, result.levels),
                    ExecutionMode::SerialFallback => 1.0,
                };
            }
            Err(err) => {
                if err.is_analysis_phase() {
                    warn!(%batch_id, error = %err, "Batch rejected");
                } else {
                    error!(%batch_id, error = %err, "Batch rolled back");
                }
                result.commit_state = CommitState::RolledBack;
                result.error_code = Some(err.code());
                result.offending_tx = err.offending_tx();
                if let BatchError::CircularDependency { cycle } = &err {
                    result.cycle = Some(cycle.clone());
                }
                result.error = Some(err.to_string());
            }
        }
        result.duration = started.elapsed();

        self.telemetry.record_batch(&telemetry(&result));
        result
    }
}

#[async_trait]
impl BatchProcessingApi for BatchProcessor {
    async fn process_batch(&self, transactions: Vec<Transaction>) -> BatchResult {
        self.process(Ok(transactions)).await
    }

    async fn process_atomic_batch(&self, batch: AtomicBatch) -> BatchResult {
        debug!(name = %batch.name, "Lowering atomic batch");
        self.process(batch.lower()).await
    }
}

fn execution_failure(outcome: &ExecutionOutcome) -> Option<BatchError> {
    match outcome {
        ExecutionOutcome::Completed => None,
        ExecutionOutcome::Failed { tx, reason } => Some(BatchError::TransactionFailed {
            tx: *tx,
            reason: reason.clone(),
        }),
        ExecutionOutcome::TimedOut { completed, pending } => Some(BatchError::Timeout {
            completed: *completed,
            pending: *pending,
        }),
    }
}

/// Roll back and record what the caller gets to see of the failed run.
fn abort(
    manager: &mut CommitManager,
    execution: &mut ExecutionResult,
    result: &mut BatchResult,
    err: BatchError,
) -> BatchError {
    result.final_state = manager.rollback(execution);
    result.levels = execution.independent_sets.len();
    result.independent_sets = std::mem::take(&mut execution.independent_sets);
    result.trace = std::mem::take(&mut execution.trace);
    err
}

/// Transactions per level: the speed-up bound of level-parallel execution
fn throughput(transactions: usize, levels: usize) -> f64 {
    if levels == 0 {
        1.0
    } else {
        transactions as f64 / levels as f64
    }
}

fn telemetry(result: &BatchResult) -> BatchTelemetry {
    let outcome = match (result.success, result.mode, result.error_code) {
        (true, ExecutionMode::Parallel, _) => "committed",
        (true, ExecutionMode::SerialFallback, _) => "serial_fallback",
        (
            false,
            _,
            Some(ErrorCode::CircularDependency | ErrorCode::ConflictResolution | ErrorCode::InvalidBatch),
        ) => "rejected",
        _ => "rolled_back",
    };
    let proof_duration = [&result.linearizability, &result.conservation]
        .into_iter()
        .flatten()
        .map(|p| p.duration)
        .sum::<Duration>();

    BatchTelemetry {
        batch_id: result.batch_id,
        outcome,
        transactions: result.total_transactions,
        parallel_transactions: result.parallel_transactions,
        levels: result.levels,
        conflicts: result.conflicts.len(),
        worker_count: result.worker_count,
        duration: result.duration,
        execution_duration: result.execution_duration,
        proof_duration,
        throughput_ratio: result.throughput_improvement,
    }
}
