//! Inbound Ports (Driving Ports / API)

use crate::domain::atomic_batch::AtomicBatch;
use crate::domain::entities::Transaction;
use crate::domain::results::BatchResult;
use async_trait::async_trait;

/// Primary batch processing API
#[async_trait]
pub trait BatchProcessingApi: Send + Sync {
    /// Execute, prove and commit a batch.
    ///
    /// Every failure is reported inside the returned [`BatchResult`]; a batch
    /// either commits every transaction or none of them.
    ///
    /// 1. Validates the batch and builds the dependency graph
    /// 2. Detects conflicts and computes execution levels
    /// 3. Executes levels in parallel against isolated views
    /// 4. Proves linearizability and conservation
    /// 5. Validates oracle proofs and commits atomically
    async fn process_batch(&self, transactions: Vec<Transaction>) -> BatchResult;

    /// Lower an atomic batch into transactions and process them as one batch.
    async fn process_atomic_batch(&self, batch: AtomicBatch) -> BatchResult;
}
