//! Error types for batch execution

use super::entities::Guard;
use super::results::Counterexample;
use super::value_objects::{AccountId, Balance, TxId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// All errors that can end a batch.
///
/// Analysis-phase errors reject the batch before any execution. Everything
/// else is routed through the commit manager's rollback.
#[derive(Debug, Clone, Error)]
pub enum BatchError {
    /// Derived edges form a cycle; carries the shortest cycle found
    #[error("Circular dependency: {}", format_ids(cycle))]
    CircularDependency { cycle: Vec<TxId> },

    /// Parallel execution is positively not equivalent to any serial order
    #[error("Linearizability violated: {}", counterexample.summary)]
    Linearizability { counterexample: Box<Counterexample> },

    /// Total value changed, or could not be proven invariant
    #[error("Conservation violated: expected {expected}, got {actual} ({reason})")]
    ConservationViolation {
        expected: Balance,
        actual: Balance,
        implicated: Vec<TxId>,
        reason: String,
    },

    /// Parallel phase ran past its deadline
    #[error("Batch timed out: {completed} completed, {pending} pending")]
    Timeout { completed: usize, pending: usize },

    /// A conflict cannot be tie-broken deterministically
    #[error("Unresolvable conflict on {tx:?}: {reason}")]
    ConflictResolution { tx: TxId, reason: String },

    /// An oracle attestation was rejected
    #[error("Oracle validation failed for {tx:?} ({oracle}): {reason}")]
    OracleValidation {
        tx: TxId,
        oracle: String,
        reason: String,
    },

    /// Guard violation or runtime error inside a transaction
    #[error("Transaction {tx:?} failed: {reason}")]
    TransactionFailed { tx: TxId, reason: TxError },

    /// Empty transaction batch
    #[error("Empty transaction batch")]
    EmptyBatch,

    /// Batch size exceeded limits
    #[error("Batch size exceeded: {size} > {max}")]
    BatchTooLarge { size: usize, max: usize },

    /// Edge count exceeded limits (anti-DoS)
    #[error("Edge count exceeded: {count} > {max}")]
    TooManyEdges { count: usize, max: usize },

    /// Malformed transaction
    #[error("Invalid transaction {tx:?}: {reason}")]
    InvalidTransaction { tx: TxId, reason: String },

    /// The persistent store refused the commit
    #[error("Commit failed: {0}")]
    Commit(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BatchError {
    pub fn code(&self) -> ErrorCode {
        match self {
            BatchError::CircularDependency { .. } => ErrorCode::CircularDependency,
            BatchError::Linearizability { .. } => ErrorCode::Linearizability,
            BatchError::ConservationViolation { .. } => ErrorCode::ConservationViolation,
            BatchError::Timeout { .. } => ErrorCode::Timeout,
            BatchError::ConflictResolution { .. } => ErrorCode::ConflictResolution,
            BatchError::OracleValidation { .. } => ErrorCode::OracleValidation,
            BatchError::TransactionFailed { .. } => ErrorCode::TransactionFailed,
            BatchError::EmptyBatch
            | BatchError::BatchTooLarge { .. }
            | BatchError::TooManyEdges { .. }
            | BatchError::InvalidTransaction { .. } => ErrorCode::InvalidBatch,
            BatchError::Commit(_) => ErrorCode::Commit,
            BatchError::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Transaction the failure is pinned on, if any
    pub fn offending_tx(&self) -> Option<TxId> {
        match self {
            BatchError::CircularDependency { cycle } => cycle.first().copied(),
            BatchError::Linearizability { counterexample } => {
                counterexample.implicated.first().copied()
            }
            BatchError::ConservationViolation { implicated, .. } => implicated.first().copied(),
            BatchError::ConflictResolution { tx, .. }
            | BatchError::OracleValidation { tx, .. }
            | BatchError::TransactionFailed { tx, .. }
            | BatchError::InvalidTransaction { tx, .. } => Some(*tx),
            _ => None,
        }
    }

    /// Whether the error is raised before any execution
    pub fn is_analysis_phase(&self) -> bool {
        matches!(
            self.code(),
            ErrorCode::CircularDependency | ErrorCode::ConflictResolution | ErrorCode::InvalidBatch
        )
    }
}

fn format_ids(ids: &[TxId]) -> String {
    ids.iter()
        .map(|id| format!("{:?}", id))
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Stable, serialisable error code carried in `BatchResult`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    CircularDependency,
    Linearizability,
    ConservationViolation,
    Timeout,
    ConflictResolution,
    OracleValidation,
    TransactionFailed,
    InvalidBatch,
    Commit,
    Internal,
}

/// Per-transaction evaluation errors
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum TxError {
    #[error("insufficient funds in {account:?}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        account: AccountId,
        balance: Balance,
        requested: Balance,
    },

    #[error("balance overflow in {account:?}")]
    BalanceOverflow { account: AccountId },

    #[error("guard {guard:?} violated at balance {balance}")]
    GuardViolated { guard: Guard, balance: Balance },

    #[error("account name `{name}` is not bound")]
    UnboundAccount { name: String },

    #[error("transaction is not part of the batch")]
    NotInBatch,

    #[error("cancelled")]
    Cancelled,
}

/// Persistent state store errors
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("State read failed: {0}")]
    ReadFailed(String),

    #[error("State write failed: {0}")]
    WriteFailed(String),

    /// An account changed after the batch loaded its snapshot
    #[error("Stale snapshot for {account:?}: expected {expected}, found {found}")]
    StaleSnapshot {
        account: AccountId,
        expected: Balance,
        found: Balance,
    },
}

/// Oracle collaborator errors
#[derive(Debug, Clone, Error)]
pub enum OracleError {
    #[error("Attestation from {oracle} rejected: {reason}")]
    Rejected { oracle: String, reason: String },

    #[error("Oracle unavailable: {0}")]
    Unavailable(String),
}

/// Configuration errors
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("{name} = {value} is outside {min}..={max}")]
    OutOfRange {
        name: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}
