//! Worker pools
//!
//! The executor never touches a global thread pool. The processor hands it a
//! [`WorkerPool`] scoped to one batch; tests swap in [`InlineWorkerPool`] for
//! fully deterministic runs.

use super::view::TxOutcome;
use crate::domain::errors::BatchError;
use rayon::prelude::*;

/// One unit of work for a level. Receives the worker index it runs on.
pub type LevelTask<'a> = Box<dyn FnOnce(usize) -> TxOutcome + Send + 'a>;

/// Bounded executor handle for one level at a time.
pub trait WorkerPool: Send + Sync {
    fn worker_count(&self) -> usize;

    /// Run every task and return outcomes in task order. Returns only once
    /// all tasks have finished, which is the level barrier.
    fn run_level<'a>(&self, tasks: Vec<LevelTask<'a>>) -> Vec<TxOutcome>;
}

/// Dedicated rayon pool, never the global one.
pub struct RayonWorkerPool {
    pool: rayon::ThreadPool,
    workers: usize,
}

impl RayonWorkerPool {
    pub fn new(workers: usize) -> Result<Self, BatchError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("pl-worker-{i}"))
            .build()
            .map_err(|e| BatchError::Internal(format!("worker pool: {e}")))?;
        Ok(Self { pool, workers })
    }
}

impl std::fmt::Debug for RayonWorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RayonWorkerPool")
            .field("workers", &self.workers)
            .finish()
    }
}

impl WorkerPool for RayonWorkerPool {
    fn worker_count(&self) -> usize {
        self.workers
    }

    fn run_level<'a>(&self, tasks: Vec<LevelTask<'a>>) -> Vec<TxOutcome> {
        self.pool.install(|| {
            tasks
                .into_par_iter()
                .map(|task| task(rayon::current_thread_index().unwrap_or(0)))
                .collect()
        })
    }
}

/// Runs every task on the calling thread, in order, as worker 0.
#[derive(Clone, Copy, Debug, Default)]
pub struct InlineWorkerPool;

impl WorkerPool for InlineWorkerPool {
    fn worker_count(&self) -> usize {
        1
    }

    fn run_level<'a>(&self, tasks: Vec<LevelTask<'a>>) -> Vec<TxOutcome> {
        tasks.into_iter().map(|task| task(0)).collect()
    }
}
