//! In-memory State Store
//!
//! Implements `StateStore` over a single map guarded by an async lock.
//! Commits are all-or-nothing and checked against the batch snapshot.

use crate::domain::errors::StoreError;
use crate::domain::value_objects::{total_value, AccountId, AccountState, Balance};
use crate::ports::outbound::StateStore;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    accounts: RwLock<AccountState>,
    fail_next_commit: AtomicBool,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_balances(balances: impl IntoIterator<Item = (AccountId, Balance)>) -> Self {
        Self {
            accounts: RwLock::new(balances.into_iter().collect()),
            fail_next_commit: AtomicBool::new(false),
        }
    }

    pub async fn snapshot(&self) -> AccountState {
        self.accounts.read().await.clone()
    }

    /// Zero for unknown accounts
    pub async fn balance(&self, account: &AccountId) -> Balance {
        self.accounts.read().await.get(account).copied().unwrap_or(0)
    }

    /// Sum of all balances, `None` on overflow
    pub async fn total(&self) -> Option<Balance> {
        total_value(self.accounts.read().await.values())
    }

    pub async fn set_balance(&self, account: AccountId, value: Balance) {
        self.accounts.write().await.insert(account, value);
    }

    /// Make the next commit fail with a write error.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn load(&self, accounts: &BTreeSet<AccountId>) -> Result<AccountState, StoreError> {
        let state = self.accounts.read().await;
        Ok(accounts
            .iter()
            .filter_map(|a| state.get(a).map(|v| (*a, *v)))
            .collect())
    }

    async fn commit(
        &self,
        batch_id: Uuid,
        expected: &AccountState,
        updates: &AccountState,
    ) -> Result<(), StoreError> {
        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(StoreError::WriteFailed(format!("injected failure for {batch_id}")));
        }

        let mut state = self.accounts.write().await;
        for (account, value) in expected {
            let found = state.get(account).copied().unwrap_or(0);
            if found != *value {
                return Err(StoreError::StaleSnapshot {
                    account: *account,
                    expected: *value,
                    found,
                });
            }
        }
        state.extend(updates.iter().map(|(a, v)| (*a, *v)));
        debug!(%batch_id, accounts = updates.len(), "Applied batch updates");
        Ok(())
    }
}
