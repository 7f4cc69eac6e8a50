//! Commit Manager
//!
//! Owns the commit decision for exactly one batch. The batch starts
//! `Pending` and ends in `Committed` or `RolledBack`; neither terminal state
//! can be left.

use crate::domain::errors::BatchError;
use crate::domain::results::{
    CommitState, ExecutionResult, ProofResult, TraceEvent, TraceEventKind,
};
use crate::domain::value_objects::AccountState;
use crate::ports::outbound::StateStore;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub struct CommitManager {
    batch_id: Uuid,
    store: Arc<dyn StateStore>,
    state: CommitState,
}

impl CommitManager {
    pub fn new(batch_id: Uuid, store: Arc<dyn StateStore>) -> Self {
        Self {
            batch_id,
            store,
            state: CommitState::Pending,
        }
    }

    pub fn state(&self) -> CommitState {
        self.state
    }

    fn transition(&mut self, next: CommitState) -> Result<(), BatchError> {
        if self.state.is_terminal() {
            return Err(BatchError::Internal(format!(
                "batch {} already {:?}",
                self.batch_id, self.state
            )));
        }
        self.state = next;
        Ok(())
    }

    /// Publish `execution.final_state` to the store.
    ///
    /// Requires a complete execution and both proofs valid. A store failure
    /// leaves the batch rolled back with nothing written.
    pub async fn commit(
        &mut self,
        execution: &ExecutionResult,
        linearizability: &ProofResult,
        conservation: &ProofResult,
    ) -> Result<AccountState, BatchError> {
        if !execution.is_complete() {
            return Err(BatchError::Internal("commit of an incomplete execution".into()));
        }
        if !linearizability.valid || !conservation.valid {
            return Err(BatchError::Internal("commit without valid proofs".into()));
        }
        if self.state.is_terminal() {
            return Err(BatchError::Internal(format!(
                "batch {} already {:?}",
                self.batch_id, self.state
            )));
        }

        match self
            .store
            .commit(self.batch_id, &execution.initial_state, &execution.final_state)
            .await
        {
            Ok(()) => {
                self.transition(CommitState::Committed)?;
                info!(batch_id = %self.batch_id, accounts = execution.final_state.len(), "Batch committed");
                Ok(execution.final_state.clone())
            }
            Err(e) => {
                self.transition(CommitState::RolledBack)?;
                warn!(batch_id = %self.batch_id, error = %e, "Store rejected commit");
                Err(BatchError::Commit(e.to_string()))
            }
        }
    }

    /// Discard every local commit of `execution`.
    ///
    /// Appends a `Rollback` event per locally committed transaction and
    /// resets the final state to the initial snapshot, which is returned.
    pub fn rollback(&mut self, execution: &mut ExecutionResult) -> AccountState {
        if self.state == CommitState::Committed {
            warn!(batch_id = %self.batch_id, "Rollback requested after commit; ignoring");
            return execution.final_state.clone();
        }
        self.state = CommitState::RolledBack;

        let mut at_ns = execution.trace.events.last().map_or(0, |e| e.at_ns);
        let committed: Vec<TraceEvent> = execution
            .trace
            .events
            .iter()
            .filter(|e| e.kind == TraceEventKind::Commit)
            .cloned()
            .collect();
        for event in committed.into_iter().rev() {
            at_ns += 1;
            execution.trace.push(TraceEvent {
                at_ns,
                kind: TraceEventKind::Rollback,
                ..event
            });
        }

        execution.final_state = execution.initial_state.clone();
        info!(batch_id = %self.batch_id, "Batch rolled back");
        execution.final_state.clone()
    }
}
