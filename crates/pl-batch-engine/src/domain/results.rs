//! Execution, proof and batch result types

use super::entities::Conflict;
use super::errors::{ErrorCode, TxError};
use super::value_objects::{AccountId, AccountState, Balance, TxId};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use uuid::Uuid;

/// What happened at one point of a transaction's execution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TraceEventKind {
    Start,
    /// Value loaded into the transaction's isolated view
    Read { account: AccountId, value: Balance },
    /// Value written back at local commit
    Write { account: AccountId, value: Balance },
    /// Committed locally; merged at the next level barrier
    Commit,
    /// Aborted before local commit
    Abort { reason: TxError },
    /// Effects discarded by batch rollback
    Rollback,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub tx: TxId,
    /// Worker thread index inside the pool
    pub worker: usize,
    pub level: usize,
    /// Nanoseconds since the batch started executing
    pub at_ns: u64,
    #[serde(flatten)]
    pub kind: TraceEventKind,
}

/// Ordered execution trace of a batch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionTrace {
    pub events: Vec<TraceEvent>,
}

impl ExecutionTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: TraceEvent) {
        self.events.push(event);
    }

    pub fn extend(&mut self, events: impl IntoIterator<Item = TraceEvent>) {
        self.events.extend(events);
    }

    pub fn events_for<'a>(&'a self, tx: &'a TxId) -> impl Iterator<Item = &'a TraceEvent> + 'a {
        self.events.iter().filter(move |e| e.tx == *tx)
    }

    /// Values a transaction loaded into its view
    pub fn observed_reads(&self, tx: &TxId) -> AccountState {
        self.events_for(tx)
            .filter_map(|e| match e.kind {
                TraceEventKind::Read { account, value } => Some((account, value)),
                _ => None,
            })
            .collect()
    }

    /// [`observed_reads`](Self::observed_reads) for every transaction in one pass
    pub fn reads_by_tx(&self) -> HashMap<TxId, AccountState> {
        let mut reads: HashMap<TxId, AccountState> = HashMap::new();
        for event in &self.events {
            if let TraceEventKind::Read { account, value } = event.kind {
                reads.entry(event.tx).or_default().insert(account, value);
            }
        }
        reads
    }

    /// Values a transaction wrote back at local commit
    pub fn observed_writes(&self, tx: &TxId) -> AccountState {
        self.events_for(tx)
            .filter_map(|e| match e.kind {
                TraceEventKind::Write { account, value } => Some((account, value)),
                _ => None,
            })
            .collect()
    }

    /// Transactions that committed locally, in trace order
    pub fn committed(&self) -> Vec<TxId> {
        self.events
            .iter()
            .filter(|e| e.kind == TraceEventKind::Commit)
            .map(|e| e.tx)
            .collect()
    }

    /// `(start, end)` of a transaction in nanoseconds
    pub fn interval(&self, tx: &TxId) -> Option<(u64, u64)> {
        let mut events = self.events_for(tx);
        let first = events.next()?;
        let last = events.last().unwrap_or(first);
        Some((first.at_ns, last.at_ns))
    }
}

/// How the parallel phase ended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Completed,
    Failed { tx: TxId, reason: TxError },
    TimedOut { completed: usize, pending: usize },
}

/// Output of one executor run. Owned by the batch that produced it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Pre-batch values of every touched account
    pub initial_state: AccountState,
    /// Values after the last merged level
    pub final_state: AccountState,
    pub trace: ExecutionTrace,
    /// Levels actually executed, each in submission order
    pub independent_sets: Vec<Vec<TxId>>,
    pub duration: Duration,
    pub worker_count: usize,
    pub outcome: ExecutionOutcome,
}

impl ExecutionResult {
    pub fn is_complete(&self) -> bool {
        self.outcome == ExecutionOutcome::Completed
    }

    /// Transactions executed in a level alongside at least one other
    pub fn parallel_transactions(&self) -> usize {
        self.independent_sets
            .iter()
            .filter(|level| level.len() > 1)
            .map(Vec::len)
            .sum()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofProperty {
    Linearizability,
    Conservation,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofStatus {
    /// Constraint system satisfied (or negation refuted)
    Proven,
    /// Counterexample found
    Disproven,
    /// Budget exhausted before a verdict
    Unproven,
}

/// Machine-checkable record of a proof.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofArtifact {
    pub format: String,
    /// Property the assignment witnesses
    pub statement: String,
    pub constraints: usize,
    pub variables: usize,
    /// Variable name -> value
    pub assignment: BTreeMap<String, String>,
    /// Hex SHA-256 over the fields above
    pub digest: String,
}

impl ProofArtifact {
    pub fn new(
        format: &str,
        statement: String,
        constraints: usize,
        variables: usize,
        assignment: BTreeMap<String, String>,
    ) -> Self {
        let digest = artifact_digest(format, &statement, constraints, variables, &assignment);
        Self {
            format: format.to_string(),
            statement,
            constraints,
            variables,
            assignment,
            digest,
        }
    }

    /// Recompute the digest and compare.
    pub fn verify_digest(&self) -> bool {
        artifact_digest(
            &self.format,
            &self.statement,
            self.constraints,
            self.variables,
            &self.assignment,
        ) == self.digest
    }
}

fn artifact_digest(
    format: &str,
    statement: &str,
    constraints: usize,
    variables: usize,
    assignment: &BTreeMap<String, String>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format.as_bytes());
    hasher.update([0u8]);
    hasher.update(statement.as_bytes());
    hasher.update([0u8]);
    hasher.update((constraints as u64).to_be_bytes());
    hasher.update((variables as u64).to_be_bytes());
    for (name, value) in assignment {
        hasher.update(name.as_bytes());
        hasher.update([b'=']);
        hasher.update(value.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

/// Concrete assignment that violates a property.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counterexample {
    pub summary: String,
    /// Order under which the violation was observed
    pub order: Vec<TxId>,
    /// Rendered constraints in the unsatisfiable core
    pub violated: Vec<String>,
    pub assignment: BTreeMap<String, String>,
    pub implicated: Vec<TxId>,
}

/// Outcome of one proof call. Produced once per property per batch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProofResult {
    pub property: ProofProperty,
    pub status: ProofStatus,
    pub valid: bool,
    pub serial_order: Option<Vec<TxId>>,
    pub artifact: Option<ProofArtifact>,
    pub counterexample: Option<Counterexample>,
    pub duration: Duration,
}

impl ProofResult {
    pub fn proven(
        property: ProofProperty,
        serial_order: Option<Vec<TxId>>,
        artifact: ProofArtifact,
        duration: Duration,
    ) -> Self {
        Self {
            property,
            status: ProofStatus::Proven,
            valid: true,
            serial_order,
            artifact: Some(artifact),
            counterexample: None,
            duration,
        }
    }

    pub fn disproven(property: ProofProperty, counterexample: Counterexample, duration: Duration) -> Self {
        Self {
            property,
            status: ProofStatus::Disproven,
            valid: false,
            serial_order: None,
            artifact: None,
            counterexample: Some(counterexample),
            duration,
        }
    }

    pub fn unproven(property: ProofProperty, duration: Duration) -> Self {
        Self {
            property,
            status: ProofStatus::Unproven,
            valid: false,
            serial_order: None,
            artifact: None,
            counterexample: None,
            duration,
        }
    }
}

/// Commit manager state machine
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitState {
    Pending,
    Committed,
    RolledBack,
}

impl CommitState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CommitState::Pending)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Parallel,
    /// Parallel proof was inconclusive; the batch re-ran serially
    SerialFallback,
}

/// Externally visible outcome of one batch submission.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchResult {
    pub batch_id: Uuid,
    pub success: bool,
    pub mode: ExecutionMode,
    pub commit_state: CommitState,
    pub total_transactions: usize,
    pub parallel_transactions: usize,
    pub levels: usize,
    /// Submission to commit/rollback
    pub duration: Duration,
    /// Executor wall-clock time
    pub execution_duration: Duration,
    pub worker_count: usize,
    /// Transactions per executed level
    pub throughput_improvement: f64,
    pub linearizability: Option<ProofResult>,
    pub conservation: Option<ProofResult>,
    pub trace: ExecutionTrace,
    pub independent_sets: Vec<Vec<TxId>>,
    pub conflicts: Vec<Conflict>,
    /// Values of touched accounts as visible after the batch
    pub final_state: AccountState,
    pub error_code: Option<ErrorCode>,
    pub error: Option<String>,
    pub offending_tx: Option<TxId>,
    pub counterexample: Option<Counterexample>,
    pub cycle: Option<Vec<TxId>>,
    pub fallback_reason: Option<String>,
}

impl BatchResult {
    /// Result skeleton for a batch id; the processor fills it in stage by stage.
    pub fn new(batch_id: Uuid, total_transactions: usize) -> Self {
        Self {
            batch_id,
            success: false,
            mode: ExecutionMode::Parallel,
            commit_state: CommitState::Pending,
            total_transactions,
            parallel_transactions: 0,
            levels: 0,
            duration: Duration::ZERO,
            execution_duration: Duration::ZERO,
            worker_count: 0,
            throughput_improvement: 1.0,
            linearizability: None,
            conservation: None,
            trace: ExecutionTrace::new(),
            independent_sets: Vec::new(),
            conflicts: Vec::new(),
            final_state: AccountState::new(),
            error_code: None,
            error: None,
            offending_tx: None,
            counterexample: None,
            cycle: None,
            fallback_reason: None,
        }
    }

    pub fn used_serial_fallback(&self) -> bool {
        self.mode == ExecutionMode::SerialFallback
    }
}
