//! Serial execution
//!
//! Used for the fallback path when the linearizability search runs out of
//! budget, and for replaying witness orders.

use super::cancellation::Cancellation;
use super::parallel::ParallelExecutor;
use super::pool::InlineWorkerPool;
use crate::domain::entities::Transaction;
use crate::domain::errors::{BatchError, TxError};
use crate::domain::results::ExecutionResult;
use crate::domain::value_objects::{AccountState, TxId};
use std::collections::HashMap;

/// Replay `order` from `initial`, one transaction at a time.
///
/// Returns the resulting state, or the first transaction that failed.
pub fn replay_serial(
    transactions: &[Transaction],
    order: &[TxId],
    initial: &AccountState,
) -> Result<AccountState, (TxId, TxError)> {
    let by_id: HashMap<TxId, &Transaction> = transactions.iter().map(|tx| (tx.id(), tx)).collect();
    let mut state = initial.clone();

    for id in order {
        let tx = by_id.get(id).ok_or((*id, TxError::NotInBatch))?;
        tx.execute(&mut state).map_err(|reason| (*id, reason))?;
    }
    Ok(state)
}

/// Run `order` as singleton levels on the calling thread.
///
/// Produces a full trace, so the result flows through the same proof and
/// commit path as a parallel run.
pub fn execute_serial(
    transactions: &[Transaction],
    order: &[TxId],
    initial: AccountState,
    cancel: &Cancellation,
) -> Result<ExecutionResult, BatchError> {
    if order.len() != transactions.len() {
        return Err(BatchError::Internal(format!(
            "serial order covers {} of {} transactions",
            order.len(),
            transactions.len()
        )));
    }
    let levels: Vec<Vec<TxId>> = order.iter().map(|id| vec![*id]).collect();
    Ok(ParallelExecutor::new(&InlineWorkerPool).execute(transactions, &levels, initial, cancel))
}
