//! Outbound Ports (Driven Ports / SPI)

use crate::domain::entities::OracleProof;
use crate::domain::errors::{OracleError, StoreError};
use crate::domain::value_objects::{AccountId, AccountState, TxId};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::time::Duration;
use uuid::Uuid;

/// Durable account state.
///
/// The engine loads one snapshot per batch and writes back at most once.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Current balances of `accounts`. Unknown accounts are omitted.
    async fn load(&self, accounts: &BTreeSet<AccountId>) -> Result<AccountState, StoreError>;

    /// Apply `updates` atomically.
    ///
    /// Fails with [`StoreError::StaleSnapshot`] without writing anything if
    /// any account in `expected` no longer holds the expected value.
    async fn commit(
        &self,
        batch_id: Uuid,
        expected: &AccountState,
        updates: &AccountState,
    ) -> Result<(), StoreError>;
}

/// Validates external attestations attached to transactions.
#[async_trait]
pub trait OracleValidator: Send + Sync {
    async fn validate(&self, tx: TxId, proofs: &[OracleProof]) -> Result<(), OracleError>;
}

/// Summary of one finished batch.
#[derive(Clone, Debug)]
pub struct BatchTelemetry {
    pub batch_id: Uuid,
    /// `committed`, `serial_fallback`, `rolled_back` or `rejected`
    pub outcome: &'static str,
    pub transactions: usize,
    pub parallel_transactions: usize,
    pub levels: usize,
    pub conflicts: usize,
    pub worker_count: usize,
    pub duration: Duration,
    pub execution_duration: Duration,
    pub proof_duration: Duration,
    pub throughput_ratio: f64,
}

/// Receives one record per batch.
pub trait TelemetrySink: Send + Sync {
    fn record_batch(&self, telemetry: &BatchTelemetry);
}
