//! Constraint encoding shared by both provers
//!
//! Transactions are numbered by submission index (`T0`, `T1`, ...). Every
//! transaction gets symbolic `start`/`end` instants and `before`/`after`
//! values for each account it touches.

use crate::domain::entities::{DependencyGraph, Operation, Transaction};
use crate::domain::errors::{BatchError, TxError};
use crate::domain::results::ExecutionResult;
use crate::domain::value_objects::{AccountId, AccountState, Balance, DependencyKind, TxId};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

/// Symbolic variable
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Var {
    Start(usize),
    End(usize),
    Before(usize, AccountId),
    After(usize, AccountId),
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Var::Start(tx) => write!(f, "start[T{tx}]"),
            Var::End(tx) => write!(f, "end[T{tx}]"),
            Var::Before(tx, account) => write!(f, "before[T{tx}][{account:?}]"),
            Var::After(tx, account) => write!(f, "after[T{tx}][{account:?}]"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Constraint {
    /// `start < end` for one transaction
    Interval { tx: usize },
    /// `end[from] < start[to]`
    Precedes {
        from: usize,
        to: usize,
        kind: DependencyKind,
    },
    /// `after = f(before)` under the transaction's operations
    Transform { tx: usize },
    /// `before[tx][account]` equals the value the trace shows it read
    Observed {
        tx: usize,
        account: AccountId,
        value: Balance,
    },
    /// `before[tx][account]` equals the latest earlier `after`, or the initial value
    Chain { tx: usize, account: AccountId },
    /// The last `after` on `account` equals the reported final value
    FinalState { account: AccountId, value: Balance },
    /// Sum of `after` equals sum of `before` over the whole batch
    SumInvariant,
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Interval { tx } => write!(f, "{} < {}", Var::Start(*tx), Var::End(*tx)),
            Constraint::Precedes { from, to, kind } => write!(
                f,
                "{} < {} ({})",
                Var::End(*from),
                Var::Start(*to),
                kind.label()
            ),
            Constraint::Transform { tx } => write!(f, "after[T{tx}] = T{tx}(before[T{tx}])"),
            Constraint::Observed { tx, account, value } => {
                write!(f, "{} = {value}", Var::Before(*tx, *account))
            }
            Constraint::Chain { tx, account } => {
                write!(f, "{} = prior after[{account:?}]", Var::Before(*tx, *account))
            }
            Constraint::FinalState { account, value } => {
                write!(f, "final[{account:?}] = {value}")
            }
            Constraint::SumInvariant => write!(f, "sum(after) = sum(before)"),
        }
    }
}

/// Constraint system for one batch. Owned by a single proof call.
#[derive(Debug)]
pub struct ConstraintSystem<'a> {
    /// Submission order
    pub transactions: Vec<&'a Transaction>,
    pub touched: Vec<BTreeSet<AccountId>>,
    /// Direct predecessors per transaction
    pub predecessors: Vec<Vec<usize>>,
    pub successors: Vec<Vec<usize>>,
    /// Values each transaction read, from the trace
    pub observed: Vec<AccountState>,
    pub initial: AccountState,
    pub final_state: AccountState,
    pub constraints: Vec<Constraint>,
}

impl<'a> ConstraintSystem<'a> {
    /// Encode a completed execution.
    pub fn encode(
        transactions: &'a [Transaction],
        graph: &DependencyGraph,
        execution: &ExecutionResult,
    ) -> Result<Self, BatchError> {
        if !execution.is_complete() {
            return Err(BatchError::Internal(
                "cannot encode an incomplete execution".into(),
            ));
        }

        let index: HashMap<TxId, usize> = transactions
            .iter()
            .enumerate()
            .map(|(i, tx)| (tx.id(), i))
            .collect();
        let n = transactions.len();

        let mut reads_by_tx = execution.trace.reads_by_tx();
        let mut constraints = Vec::new();
        let mut touched = Vec::with_capacity(n);
        let mut observed = Vec::with_capacity(n);

        for (i, tx) in transactions.iter().enumerate() {
            let accounts = tx.access_sets().touched();
            constraints.push(Constraint::Interval { tx: i });
            constraints.push(Constraint::Transform { tx: i });
            for account in &accounts {
                constraints.push(Constraint::Chain {
                    tx: i,
                    account: *account,
                });
            }

            let reads = reads_by_tx.remove(&tx.id()).unwrap_or_default();
            for (account, value) in &reads {
                constraints.push(Constraint::Observed {
                    tx: i,
                    account: *account,
                    value: *value,
                });
            }
            touched.push(accounts);
            observed.push(reads);
        }

        let mut predecessors = vec![Vec::new(); n];
        let mut successors = vec![Vec::new(); n];
        for edge in &graph.edges {
            let (Some(&from), Some(&to)) = (index.get(&edge.from), index.get(&edge.to)) else {
                return Err(BatchError::Internal(format!(
                    "edge {:?} -> {:?} leaves the batch",
                    edge.from, edge.to
                )));
            };
            predecessors[to].push(from);
            successors[from].push(to);
            constraints.push(Constraint::Precedes {
                from,
                to,
                kind: edge.kind,
            });
        }

        for (account, value) in &execution.final_state {
            constraints.push(Constraint::FinalState {
                account: *account,
                value: *value,
            });
        }

        Ok(Self {
            transactions: transactions.iter().collect(),
            touched,
            predecessors,
            successors,
            observed,
            initial: execution.initial_state.clone(),
            final_state: execution.final_state.clone(),
            constraints,
        })
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Two start/end instants per transaction plus before/after per touched account
    pub fn variable_count(&self) -> usize {
        self.touched.iter().map(|t| 2 + 2 * t.len()).sum()
    }

    /// Neither touches the other's accounts nor is ordered directly against it
    pub fn independent(&self, a: usize, b: usize) -> bool {
        self.touched[a].is_disjoint(&self.touched[b])
            && !self.predecessors[a].contains(&b)
            && !self.predecessors[b].contains(&a)
    }

    pub fn tx_id(&self, index: usize) -> TxId {
        self.transactions[index].id()
    }
}

/// Symbolic value of one account after a transaction: `after = keep * before + delta`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Affine {
    /// Whether the pre-state value survives
    pub keeps_prior: bool,
    pub delta: i128,
}

impl Affine {
    pub const IDENTITY: Affine = Affine {
        keeps_prior: true,
        delta: 0,
    };

    /// `after - before`; constant only when the prior value is kept
    pub fn net(&self) -> NetChange {
        if self.keeps_prior {
            NetChange::Constant(self.delta)
        } else {
            NetChange::DependsOnPrior { delta: self.delta }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NetChange {
    Constant(i128),
    /// `delta - before`
    DependsOnPrior { delta: i128 },
}

/// Per-account symbolic effect of a transaction's operations.
pub fn symbolic_effect(tx: &Transaction) -> Result<BTreeMap<AccountId, Affine>, TxError> {
    let mut effect: BTreeMap<AccountId, Affine> = BTreeMap::new();

    for op in tx.operations() {
        match op {
            Operation::Transfer { from, to, amount } => {
                shift(&mut effect, tx.account(from)?, *amount, -1)?;
                shift(&mut effect, tx.account(to)?, *amount, 1)?;
            }
            Operation::Debit { account, amount } => {
                shift(&mut effect, tx.account(account)?, *amount, -1)?
            }
            Operation::Credit { account, amount } => {
                shift(&mut effect, tx.account(account)?, *amount, 1)?
            }
            Operation::SetBalance { account, value } => {
                let account = tx.account(account)?;
                let delta =
                    i128::try_from(*value).map_err(|_| TxError::BalanceOverflow { account })?;
                effect.insert(
                    account,
                    Affine {
                        keeps_prior: false,
                        delta,
                    },
                );
            }
            Operation::Read { .. } => {}
        }
    }
    Ok(effect)
}

fn shift(
    effect: &mut BTreeMap<AccountId, Affine>,
    account: AccountId,
    amount: Balance,
    sign: i128,
) -> Result<(), TxError> {
    let overflow = TxError::BalanceOverflow { account };
    let amount = i128::try_from(amount).map_err(|_| overflow.clone())?;
    let entry = effect.entry(account).or_insert(Affine::IDENTITY);
    entry.delta = entry
        .delta
        .checked_add(amount * sign)
        .ok_or(overflow)?;
    Ok(())
}
