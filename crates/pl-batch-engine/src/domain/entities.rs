//! Core entities for batch execution
//!
//! A [`Transaction`] arrives fully resolved from the parser collaborator. Its
//! operations and guards name accounts through local bindings (`"payer"`,
//! `"payee"`, ...) that map to ledger account ids.

use super::errors::TxError;
use super::value_objects::{
    AccessSets, AccountId, AccountState, Balance, DependencyKind, Resolution, TxId,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::OnceLock;

/// A single state-changing step of a transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// Move `amount` from one account to another
    Transfer {
        from: String,
        to: String,
        amount: Balance,
    },
    /// Remove `amount` from an account
    Debit { account: String, amount: Balance },
    /// Add `amount` to an account
    Credit { account: String, amount: Balance },
    /// Overwrite an account balance
    SetBalance { account: String, value: Balance },
    /// Observe an account without changing it
    Read { account: String },
}

impl Operation {
    /// Account names this operation reads and writes.
    pub fn access_names(&self) -> (Vec<&str>, Vec<&str>) {
        match self {
            Operation::Transfer { from, to, .. } => {
                (vec![from.as_str(), to.as_str()], vec![from.as_str(), to.as_str()])
            }
            Operation::Debit { account, .. } | Operation::Credit { account, .. } => {
                (vec![account.as_str()], vec![account.as_str()])
            }
            Operation::SetBalance { account, .. } => (vec![], vec![account.as_str()]),
            Operation::Read { account } => (vec![account.as_str()], vec![]),
        }
    }

    /// Apply the operation to `state`, which must hold every account the
    /// transaction touches.
    pub fn apply(&self, tx: &Transaction, state: &mut AccountState) -> Result<(), TxError> {
        match self {
            Operation::Transfer { from, to, amount } => {
                let from = tx.account(from)?;
                let to = tx.account(to)?;
                debit(state, from, *amount)?;
                credit(state, to, *amount)
            }
            Operation::Debit { account, amount } => debit(state, tx.account(account)?, *amount),
            Operation::Credit { account, amount } => credit(state, tx.account(account)?, *amount),
            Operation::SetBalance { account, value } => {
                state.insert(tx.account(account)?, *value);
                Ok(())
            }
            Operation::Read { account } => {
                tx.account(account)?;
                Ok(())
            }
        }
    }
}

fn debit(state: &mut AccountState, account: AccountId, amount: Balance) -> Result<(), TxError> {
    let balance = state.entry(account).or_insert(0);
    *balance = balance
        .checked_sub(amount)
        .ok_or(TxError::InsufficientFunds {
            account,
            balance: *balance,
            requested: amount,
        })?;
    Ok(())
}

fn credit(state: &mut AccountState, account: AccountId, amount: Balance) -> Result<(), TxError> {
    let balance = state.entry(account).or_insert(0);
    *balance = balance
        .checked_add(amount)
        .ok_or(TxError::BalanceOverflow { account })?;
    Ok(())
}

/// Pre-condition checked against the transaction's view before any operation runs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "guard", rename_all = "snake_case")]
pub enum Guard {
    /// Balance must be at least `amount`
    MinBalance { account: String, amount: Balance },
    /// Balance must be at most `amount`
    MaxBalance { account: String, amount: Balance },
}

impl Guard {
    pub fn account_name(&self) -> &str {
        match self {
            Guard::MinBalance { account, .. } | Guard::MaxBalance { account, .. } => account.as_str(),
        }
    }

    pub fn check(&self, tx: &Transaction, state: &AccountState) -> Result<(), TxError> {
        let account = tx.account(self.account_name())?;
        let balance = state.get(&account).copied().unwrap_or(0);
        let holds = match self {
            Guard::MinBalance { amount, .. } => balance >= *amount,
            Guard::MaxBalance { amount, .. } => balance <= *amount,
        };
        if holds {
            Ok(())
        } else {
            Err(TxError::GuardViolated {
                guard: self.clone(),
                balance,
            })
        }
    }
}

/// External attestation a transaction depends on, validated by the oracle collaborator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleProof {
    /// Oracle that produced the attestation
    pub oracle: String,
    /// Claim being attested, e.g. `"EUR/USD=1.0842"`
    pub claim: String,
    /// Hex-encoded attestation bytes
    pub attestation: String,
}

impl OracleProof {
    pub fn new(oracle: impl Into<String>, claim: impl Into<String>, attestation: impl Into<String>) -> Self {
        Self {
            oracle: oracle.into(),
            claim: claim.into(),
            attestation: attestation.into(),
        }
    }
}

/// Immutable unit of work.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Transaction {
    id: TxId,
    intent: String,
    accounts: BTreeMap<String, AccountId>,
    operations: Vec<Operation>,
    #[serde(default)]
    guards: Vec<Guard>,
    #[serde(default)]
    oracle_proofs: Vec<OracleProof>,
    #[serde(default)]
    depends_on: Vec<TxId>,
    #[serde(skip)]
    access: OnceLock<AccessSets>,
}

impl Transaction {
    pub fn builder(id: TxId, intent: impl Into<String>) -> TransactionBuilder {
        TransactionBuilder {
            tx: Transaction {
                id,
                intent: intent.into(),
                accounts: BTreeMap::new(),
                operations: Vec::new(),
                guards: Vec::new(),
                oracle_proofs: Vec::new(),
                depends_on: Vec::new(),
                access: OnceLock::new(),
            },
        }
    }

    /// Plain transfer with bindings `from` and `to`.
    pub fn transfer(id: TxId, from: AccountId, to: AccountId, amount: Balance) -> Self {
        Self::builder(id, "transfer")
            .bind("from", from)
            .bind("to", to)
            .operation(Operation::Transfer {
                from: "from".into(),
                to: "to".into(),
                amount,
            })
            .build()
    }

    pub fn id(&self) -> TxId {
        self.id
    }

    pub fn intent(&self) -> &str {
        &self.intent
    }

    pub fn accounts(&self) -> &BTreeMap<String, AccountId> {
        &self.accounts
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn guards(&self) -> &[Guard] {
        &self.guards
    }

    pub fn oracle_proofs(&self) -> &[OracleProof] {
        &self.oracle_proofs
    }

    pub fn depends_on(&self) -> &[TxId] {
        &self.depends_on
    }

    /// Resolve a local account binding.
    pub fn account(&self, name: &str) -> Result<AccountId, TxError> {
        self.accounts
            .get(name)
            .copied()
            .ok_or_else(|| TxError::UnboundAccount {
                name: name.to_string(),
            })
    }

    /// Check that every name used by operations and guards is bound.
    pub fn validate(&self) -> Result<(), TxError> {
        for op in &self.operations {
            let (reads, writes) = op.access_names();
            for name in reads.into_iter().chain(writes) {
                self.account(name)?;
            }
        }
        for guard in &self.guards {
            self.account(guard.account_name())?;
        }
        Ok(())
    }

    /// Read/write sets, computed once and reused for the rest of the batch.
    ///
    /// Unbound names are skipped; [`Transaction::validate`] rejects them first.
    pub fn access_sets(&self) -> &AccessSets {
        self.access.get_or_init(|| {
            let mut sets = AccessSets::new();
            for op in &self.operations {
                let (reads, writes) = op.access_names();
                sets.reads
                    .extend(reads.into_iter().filter_map(|n| self.accounts.get(n).copied()));
                sets.writes
                    .extend(writes.into_iter().filter_map(|n| self.accounts.get(n).copied()));
            }
            sets.reads.extend(
                self.guards
                    .iter()
                    .filter_map(|g| self.accounts.get(g.account_name()).copied()),
            );
            sets
        })
    }

    /// Run guards then operations against `state`.
    pub fn execute(&self, state: &mut AccountState) -> Result<(), TxError> {
        for guard in &self.guards {
            guard.check(self, state)?;
        }
        for op in &self.operations {
            op.apply(self, state)?;
        }
        Ok(())
    }
}

impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.intent == other.intent
            && self.accounts == other.accounts
            && self.operations == other.operations
            && self.guards == other.guards
            && self.oracle_proofs == other.oracle_proofs
            && self.depends_on == other.depends_on
    }
}

impl Eq for Transaction {}

/// Builder for [`Transaction`]
#[derive(Debug)]
pub struct TransactionBuilder {
    tx: Transaction,
}

impl TransactionBuilder {
    pub fn bind(mut self, name: impl Into<String>, account: AccountId) -> Self {
        self.tx.accounts.insert(name.into(), account);
        self
    }

    pub fn operation(mut self, op: Operation) -> Self {
        self.tx.operations.push(op);
        self
    }

    pub fn guard(mut self, guard: Guard) -> Self {
        self.tx.guards.push(guard);
        self
    }

    pub fn oracle_proof(mut self, proof: OracleProof) -> Self {
        self.tx.oracle_proofs.push(proof);
        self
    }

    pub fn depends_on(mut self, id: TxId) -> Self {
        self.tx.depends_on.push(id);
        self
    }

    pub fn build(self) -> Transaction {
        self.tx
    }
}

/// Dependency graph edge
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    /// Transaction that must complete first
    pub from: TxId,
    /// Transaction that starts after
    pub to: TxId,
    /// Type of dependency
    pub kind: DependencyKind,
    /// Contended account (if applicable)
    pub account: Option<AccountId>,
}

impl Dependency {
    pub fn new(from: TxId, to: TxId, kind: DependencyKind) -> Self {
        Self {
            from,
            to,
            kind,
            account: None,
        }
    }

    pub fn with_account(mut self, account: AccountId) -> Self {
        self.account = Some(account);
        self
    }
}

/// Dependency graph over transaction ids.
///
/// Nodes keep submission order; all iteration that feeds scheduling goes
/// through that order so results never depend on hash-map layout.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Transaction ids in submission order
    pub nodes: Vec<TxId>,
    /// All edges (dependencies)
    pub edges: Vec<Dependency>,
    /// Adjacency list: from -> [to, to, ...]
    pub adjacency: HashMap<TxId, Vec<TxId>>,
    /// In-degree count for each node
    pub in_degree: HashMap<TxId, usize>,
    positions: HashMap<TxId, usize>,
    edge_index: HashSet<(TxId, TxId)>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a transaction node to the graph
    pub fn add_node(&mut self, id: TxId) {
        if self.positions.contains_key(&id) {
            return;
        }
        self.positions.insert(id, self.nodes.len());
        self.nodes.push(id);
        self.adjacency.entry(id).or_default();
        self.in_degree.entry(id).or_insert(0);
    }

    /// Add a dependency edge. Returns false if the same ordered edge exists.
    pub fn add_edge(&mut self, dep: Dependency) -> bool {
        if !self.edge_index.insert((dep.from, dep.to)) {
            return false;
        }

        self.adjacency.entry(dep.from).or_default().push(dep.to);
        *self.in_degree.entry(dep.to).or_insert(0) += 1;
        self.edges.push(dep);
        true
    }

    /// Check if an edge exists from -> to
    pub fn has_edge(&self, from: &TxId, to: &TxId) -> bool {
        self.edge_index.contains(&(*from, *to))
    }

    /// Whether `to` is reachable from `from` along edges
    pub fn reaches(&self, from: &TxId, to: &TxId) -> bool {
        let mut seen: HashSet<TxId> = HashSet::new();
        let mut queue: VecDeque<TxId> = VecDeque::from([*from]);
        while let Some(node) = queue.pop_front() {
            for next in self.successors(&node) {
                if next == to {
                    return true;
                }
                if seen.insert(*next) {
                    queue.push_back(*next);
                }
            }
        }
        false
    }

    /// Whether the pair is ordered in either direction
    pub fn orders(&self, a: &TxId, b: &TxId) -> bool {
        self.reaches(a, b) || self.reaches(b, a)
    }

    pub fn successors(&self, id: &TxId) -> &[TxId] {
        self.adjacency.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Submission position of a node
    pub fn position(&self, id: &TxId) -> Option<usize> {
        self.positions.get(id).copied()
    }

    /// Get all zero in-degree nodes in submission order
    pub fn get_zero_degree_nodes(&self) -> Vec<TxId> {
        self.nodes
            .iter()
            .filter(|id| self.in_degree.get(id).copied().unwrap_or(0) == 0)
            .copied()
            .collect()
    }

    /// Number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of edges
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}

/// Classified pairwise conflict, reported verbatim in the batch result.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    pub kind: DependencyKind,
    /// Earlier transaction in submission order
    pub first: TxId,
    /// Later transaction in submission order
    pub second: TxId,
    /// Lowest contended account id
    pub account: AccountId,
    pub resolution: Resolution,
}
