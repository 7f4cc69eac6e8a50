//! Shared fixtures for scenarios, properties and benchmarks

use pl_batch_engine::adapters::attest;
use pl_batch_engine::ports::outbound::{BatchTelemetry, OracleValidator, TelemetrySink};
use pl_batch_engine::{
    AccountState, AttestationOracleValidator, BatchProcessor, EngineConfig, InMemoryStateStore,
    OracleProof, Transaction,
};
use primitive_types::{H160, H256};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use parking_lot::Mutex;
use std::sync::Arc;

/// Oracle every fixture trusts
pub const TRUSTED_ORACLE: &str = "fx-feed";

pub fn make_hash(val: u64) -> H256 {
    H256::from_low_u64_be(val)
}

pub fn make_addr(val: u64) -> H160 {
    H160::from_low_u64_be(val)
}

/// Sink that keeps every record for inspection
#[derive(Default)]
pub struct CollectingSink {
    records: Mutex<Vec<BatchTelemetry>>,
}

impl CollectingSink {
    pub fn outcomes(&self) -> Vec<&'static str> {
        self.records.lock().iter().map(|t| t.outcome).collect()
    }
}

impl TelemetrySink for CollectingSink {
    fn record_batch(&self, telemetry: &BatchTelemetry) {
        self.records.lock().push(telemetry.clone());
    }
}

pub struct Engine {
    pub processor: BatchProcessor,
    pub store: Arc<InMemoryStateStore>,
    pub sink: Arc<CollectingSink>,
}

/// Processor over a fresh store holding `balances[i]` in `make_addr(i)`.
pub fn engine(config: EngineConfig, balances: &[u128]) -> Engine {
    let store = Arc::new(InMemoryStateStore::with_balances(
        balances
            .iter()
            .enumerate()
            .map(|(i, v)| (make_addr(i as u64), *v)),
    ));
    let sink = Arc::new(CollectingSink::default());
    let oracle: Arc<dyn OracleValidator> = Arc::new(AttestationOracleValidator::new([TRUSTED_ORACLE]));
    let processor = BatchProcessor::new(config, store.clone(), oracle, sink.clone())
        .unwrap_or_else(|e| panic!("fixture config rejected: {e}"));
    Engine {
        processor,
        store,
        sink,
    }
}

pub fn default_config() -> EngineConfig {
    EngineConfig {
        worker_count: 4,
        ..Default::default()
    }
}

/// `count` transfers between random pairs of `accounts` accounts.
///
/// Amounts stay small enough that every transfer succeeds when each account
/// starts with at least `count` units.
pub fn random_transfers(seed: u64, count: usize, accounts: u64) -> Vec<Transaction> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|i| {
            let from = rng.gen_range(0..accounts);
            let mut to = rng.gen_range(0..accounts);
            if to == from {
                to = (from + 1) % accounts;
            }
            Transaction::transfer(make_hash(i as u64 + 1), make_addr(from), make_addr(to), 1)
        })
        .collect()
}

/// Disjoint transfers `2i -> 2i+1`.
pub fn independent_transfers(count: usize, amount: u128) -> Vec<Transaction> {
    (0..count as u64)
        .map(|i| Transaction::transfer(make_hash(i + 1), make_addr(2 * i), make_addr(2 * i + 1), amount))
        .collect()
}

pub fn attested(claim: &str) -> OracleProof {
    OracleProof::new(TRUSTED_ORACLE, claim, attest(TRUSTED_ORACLE, claim))
}

pub fn total(state: &AccountState) -> u128 {
    state.values().sum()
}
