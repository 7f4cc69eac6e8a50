//! Isolated per-transaction execution
//!
//! A transaction never touches shared state. It copies the accounts it
//! touches into a private view, runs guards and operations there, and hands
//! its writes back to the executor, which merges them at the level barrier.

use super::cancellation::Cancellation;
use crate::domain::entities::Transaction;
use crate::domain::errors::TxError;
use crate::domain::results::{TraceEvent, TraceEventKind};
use crate::domain::value_objects::{AccountState, TxId};
use std::time::Instant;

/// Monotonic clock shared by every worker of one batch.
#[derive(Clone, Copy, Debug)]
pub struct BatchClock {
    epoch: Instant,
}

impl BatchClock {
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    /// Nanoseconds since the batch started executing
    pub fn now_ns(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }
}

/// What one transaction produced inside its view.
#[derive(Clone, Debug)]
pub struct TxOutcome {
    pub tx: TxId,
    pub events: Vec<TraceEvent>,
    /// Write-set values on success
    pub result: Result<AccountState, TxError>,
}

impl TxOutcome {
    pub fn is_committed(&self) -> bool {
        self.result.is_ok()
    }
}

/// Where and when a transaction runs.
#[derive(Clone, Copy, Debug)]
pub struct ViewContext<'a> {
    pub shared: &'a AccountState,
    pub clock: &'a BatchClock,
    pub cancel: &'a Cancellation,
    pub level: usize,
}

/// Run `tx` against a copy-on-write view of `ctx.shared`.
pub fn execute_isolated(tx: &Transaction, ctx: ViewContext<'_>, worker: usize) -> TxOutcome {
    let mut events = Vec::new();
    let mut record = |kind: TraceEventKind| {
        events.push(TraceEvent {
            tx: tx.id(),
            worker,
            level: ctx.level,
            at_ns: ctx.clock.now_ns(),
            kind,
        });
    };

    record(TraceEventKind::Start);

    let sets = tx.access_sets();
    let mut view = AccountState::new();
    for account in sets.touched() {
        let value = ctx.shared.get(&account).copied().unwrap_or(0);
        view.insert(account, value);
        record(TraceEventKind::Read { account, value });
    }

    let result = run_steps(tx, &mut view, ctx.cancel).map(|()| {
        view.into_iter()
            .filter(|(account, _)| sets.writes.contains(account))
            .collect::<AccountState>()
    });

    match &result {
        Ok(writes) => {
            for (account, value) in writes {
                record(TraceEventKind::Write {
                    account: *account,
                    value: *value,
                });
            }
            record(TraceEventKind::Commit);
        }
        Err(reason) => record(TraceEventKind::Abort {
            reason: reason.clone(),
        }),
    }

    TxOutcome {
        tx: tx.id(),
        events,
        result,
    }
}

/// Guards then operations, checking for cancellation between steps.
fn run_steps(tx: &Transaction, view: &mut AccountState, cancel: &Cancellation) -> Result<(), TxError> {
    for guard in tx.guards() {
        if cancel.is_cancelled() {
            return Err(TxError::Cancelled);
        }
        guard.check(tx, view)?;
    }
    for op in tx.operations() {
        if cancel.is_cancelled() {
            return Err(TxError::Cancelled);
        }
        op.apply(tx, view)?;
    }
    Ok(())
}
