//! Parallel Executor
//!
//! Runs levels one after another. Inside a level every transaction executes
//! concurrently on the worker pool against its own view; the executor merges
//! their writes single-threaded once the whole level has finished.

use super::cancellation::Cancellation;
use super::pool::{LevelTask, WorkerPool};
use super::view::{execute_isolated, BatchClock, TxOutcome, ViewContext};
use crate::domain::entities::Transaction;
use crate::domain::errors::TxError;
use crate::domain::results::{ExecutionOutcome, ExecutionResult, ExecutionTrace};
use crate::domain::value_objects::{AccountState, TxId};
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, warn};

pub struct ParallelExecutor<'p> {
    pool: &'p dyn WorkerPool,
}

impl<'p> ParallelExecutor<'p> {
    pub fn new(pool: &'p dyn WorkerPool) -> Self {
        Self { pool }
    }

    /// Execute `levels` over `initial`, which must hold every touched account.
    ///
    /// Stops at the first level containing a failure or a cancellation; the
    /// returned state then reflects only the levels merged before it.
    pub fn execute(
        &self,
        transactions: &[Transaction],
        levels: &[Vec<TxId>],
        initial: AccountState,
        cancel: &Cancellation,
    ) -> ExecutionResult {
        let started = Instant::now();
        let clock = BatchClock::start();
        let by_id: HashMap<TxId, &Transaction> =
            transactions.iter().map(|tx| (tx.id(), tx)).collect();
        let total: usize = levels.iter().map(Vec::len).sum();

        let mut state = initial.clone();
        let mut trace = ExecutionTrace::new();
        let mut executed: Vec<Vec<TxId>> = Vec::new();
        let mut completed = 0usize;
        let mut outcome = ExecutionOutcome::Completed;

        for (level, ids) in levels.iter().enumerate() {
            if cancel.is_cancelled() {
                warn!(level, completed, "Deadline reached at level barrier");
                outcome = ExecutionOutcome::TimedOut {
                    completed,
                    pending: total - completed,
                };
                break;
            }

            let outcomes = self.run_level(&by_id, ids, &state, &clock, cancel, level);
            executed.push(ids.clone());

            let mut level_events: Vec<_> = outcomes
                .iter()
                .flat_map(|o| o.events.iter().cloned())
                .collect();
            level_events.sort_by_key(|e| e.at_ns);
            trace.extend(level_events);

            let committed = outcomes.iter().filter(|o| o.is_committed()).count();
            match first_failure(&outcomes) {
                Some(LevelFailure::Failed { tx, reason }) => {
                    warn!(level, tx = ?tx, %reason, "Transaction failed, abandoning batch");
                    outcome = ExecutionOutcome::Failed { tx, reason };
                    break;
                }
                Some(LevelFailure::Cancelled) => {
                    completed += committed;
                    warn!(level, completed, "Cancelled inside level");
                    outcome = ExecutionOutcome::TimedOut {
                        completed,
                        pending: total - completed,
                    };
                    break;
                }
                None => {}
            }

            // Barrier passed: single-threaded merge
            for result in outcomes {
                if let Ok(writes) = result.result {
                    state.extend(writes);
                }
            }
            completed += committed;
            debug!(level, transactions = ids.len(), "Level merged");
        }

        ExecutionResult {
            initial_state: initial,
            final_state: state,
            trace,
            independent_sets: executed,
            duration: started.elapsed(),
            worker_count: self.pool.worker_count(),
            outcome,
        }
    }

    fn run_level(
        &self,
        by_id: &HashMap<TxId, &Transaction>,
        ids: &[TxId],
        state: &AccountState,
        clock: &BatchClock,
        cancel: &Cancellation,
        level: usize,
    ) -> Vec<TxOutcome> {
        let ctx = ViewContext {
            shared: state,
            clock,
            cancel,
            level,
        };

        let tasks: Vec<LevelTask<'_>> = ids
            .iter()
            .filter_map(|id| by_id.get(id).copied())
            .map(|tx| Box::new(move |worker| execute_isolated(tx, ctx, worker)) as LevelTask<'_>)
            .collect();

        self.pool.run_level(tasks)
    }
}

enum LevelFailure {
    Failed { tx: TxId, reason: TxError },
    Cancelled,
}

/// A real failure wins over a cancellation; ties go to submission order.
fn first_failure(outcomes: &[TxOutcome]) -> Option<LevelFailure> {
    let mut cancelled = false;
    for outcome in outcomes {
        match &outcome.result {
            Ok(_) => {}
            Err(TxError::Cancelled) => cancelled = true,
            Err(reason) => {
                return Some(LevelFailure::Failed {
                    tx: outcome.tx,
                    reason: reason.clone(),
                })
            }
        }
    }
    cancelled.then_some(LevelFailure::Cancelled)
}
