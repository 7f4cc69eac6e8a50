//! Atomic-batch construct and its lowering to transactions
//!
//! The parser hands over an `atomic` block as a list of labelled steps that
//! share one set of account bindings. Lowering produces one [`Transaction`]
//! per step, in step order, so both entry points feed the same pipeline.

use super::entities::{Guard, OracleProof, Operation, Transaction};
use super::errors::BatchError;
use super::value_objects::{AccountId, TxId};
use primitive_types::H256;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

/// One step of an atomic batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtomicStep {
    pub label: String,
    pub operations: Vec<Operation>,
    #[serde(default)]
    pub guards: Vec<Guard>,
}

impl AtomicStep {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            operations: Vec::new(),
            guards: Vec::new(),
        }
    }

    pub fn operation(mut self, op: Operation) -> Self {
        self.operations.push(op);
        self
    }

    pub fn guard(mut self, guard: Guard) -> Self {
        self.guards.push(guard);
        self
    }

    fn account_names(&self) -> BTreeSet<&str> {
        let mut names = BTreeSet::new();
        for op in &self.operations {
            let (reads, writes) = op.access_names();
            names.extend(reads);
            names.extend(writes);
        }
        names.extend(self.guards.iter().map(Guard::account_name));
        names
    }
}

/// Pre-parsed `atomic` construct.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtomicBatch {
    pub name: String,
    /// Bindings shared by every step
    pub accounts: BTreeMap<String, AccountId>,
    pub steps: Vec<AtomicStep>,
    /// Attestations the whole batch depends on
    #[serde(default)]
    pub oracle_proofs: Vec<OracleProof>,
}

impl AtomicBatch {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            accounts: BTreeMap::new(),
            steps: Vec::new(),
            oracle_proofs: Vec::new(),
        }
    }

    pub fn bind(mut self, name: impl Into<String>, account: AccountId) -> Self {
        self.accounts.insert(name.into(), account);
        self
    }

    pub fn step(mut self, step: AtomicStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn oracle_proof(mut self, proof: OracleProof) -> Self {
        self.oracle_proofs.push(proof);
        self
    }

    /// Deterministic id of the step at `index`
    pub fn step_id(&self, index: usize) -> TxId {
        let mut hasher = Sha256::new();
        hasher.update(self.name.as_bytes());
        hasher.update([0u8]);
        hasher.update((index as u64).to_be_bytes());
        H256::from_slice(&hasher.finalize())
    }

    /// Lower to one transaction per step.
    ///
    /// Each transaction binds only the names its step uses. Batch-level oracle
    /// proofs are attached to the first step.
    pub fn lower(&self) -> Result<Vec<Transaction>, BatchError> {
        self.steps
            .iter()
            .enumerate()
            .map(|(index, step)| {
                let id = self.step_id(index);
                let intent = format!("{}::{}", self.name, step.label);
                let mut builder = Transaction::builder(id, intent);

                for name in step.account_names() {
                    let account = self.accounts.get(name).copied().ok_or_else(|| {
                        BatchError::InvalidTransaction {
                            tx: id,
                            reason: format!("step `{}` uses unbound account `{}`", step.label, name),
                        }
                    })?;
                    builder = builder.bind(name, account);
                }
                for guard in &step.guards {
                    builder = builder.guard(guard.clone());
                }
                for op in &step.operations {
                    builder = builder.operation(op.clone());
                }
                if index == 0 {
                    for proof in &self.oracle_proofs {
                        builder = builder.oracle_proof(proof.clone());
                    }
                }
                Ok(builder.build())
            })
            .collect()
    }
}
