//! Value objects for batch execution

use primitive_types::{H160, H256};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Transaction identifier
pub type TxId = H256;
/// Account identifier
pub type AccountId = H160;
/// Account balance
pub type Balance = u128;
/// Per-account balances, ordered by account id
pub type AccountState = BTreeMap<AccountId, Balance>;

/// Relationship between two transactions that touch the same account.
///
/// Always read in submission order: the first transaction is the earlier one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DependencyKind {
    /// Later transaction reads what the earlier one writes
    ReadAfterWrite,
    /// Both write the same account
    WriteAfterWrite,
    /// Later transaction writes what the earlier one reads
    WriteAfterRead,
    /// Ordering requested through `depends_on`
    Declared,
    /// Submission-order edge added for a conflict the graph did not order
    Serialized,
}

impl DependencyKind {
    /// Short audit label (RAW / WAW / WAR / DECL / SER)
    pub fn label(&self) -> &'static str {
        match self {
            DependencyKind::ReadAfterWrite => "RAW",
            DependencyKind::WriteAfterWrite => "WAW",
            DependencyKind::WriteAfterRead => "WAR",
            DependencyKind::Declared => "DECL",
            DependencyKind::Serialized => "SER",
        }
    }
}

/// How a conflict is kept safe during execution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// The dependency graph already orders the pair
    EnforceOrder,
    /// No natural order; tie-broken by submission order
    Serialize,
}

/// Read and write sets of a transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessSets {
    /// Accounts whose pre-transaction value influences the outcome
    pub reads: BTreeSet<AccountId>,
    /// Accounts the transaction modifies
    pub writes: BTreeSet<AccountId>,
}

impl AccessSets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reads(mut self, reads: impl IntoIterator<Item = AccountId>) -> Self {
        self.reads.extend(reads);
        self
    }

    pub fn with_writes(mut self, writes: impl IntoIterator<Item = AccountId>) -> Self {
        self.writes.extend(writes);
        self
    }

    /// Every account the transaction touches
    pub fn touched(&self) -> BTreeSet<AccountId> {
        self.reads.union(&self.writes).copied().collect()
    }

    /// Strongest conflict with a later transaction, and the lowest contended account.
    ///
    /// Priority is WAW, then RAW, then WAR. Read/read overlap is not a conflict.
    pub fn conflict_with_later(&self, later: &AccessSets) -> Option<(DependencyKind, AccountId)> {
        if let Some(account) = self.writes.intersection(&later.writes).next() {
            return Some((DependencyKind::WriteAfterWrite, *account));
        }
        if let Some(account) = self.writes.intersection(&later.reads).next() {
            return Some((DependencyKind::ReadAfterWrite, *account));
        }
        if let Some(account) = self.reads.intersection(&later.writes).next() {
            return Some((DependencyKind::WriteAfterRead, *account));
        }
        None
    }

    /// Whether the two transactions touch no common account
    pub fn is_disjoint(&self, other: &AccessSets) -> bool {
        self.touched().is_disjoint(&other.touched())
    }
}

/// Sum of balances, `None` on overflow.
pub fn total_value<'a>(balances: impl IntoIterator<Item = &'a Balance>) -> Option<Balance> {
    balances
        .into_iter()
        .try_fold(0u128, |acc, value| acc.checked_add(*value))
}
