//! Conservation Validator
//!
//! Two independent checks must agree before a batch may commit:
//!
//! 1. Direct: total value of the final state equals total value of the
//!    initial state.
//! 2. Symbolic: every transaction's net effect is a constant that does not
//!    depend on pre-state values, and the constants sum to zero. This holds
//!    for every input state, so it proves the batch conserves value in any
//!    serial order, not only the one that ran.

use super::encoding::{symbolic_effect, Constraint, NetChange};
use crate::domain::entities::Transaction;
use crate::domain::errors::BatchError;
use crate::domain::results::{
    Counterexample, ExecutionResult, ProofArtifact, ProofProperty, ProofResult,
};
use crate::domain::value_objects::{AccountState, TxId};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{info, warn};

pub const CONSERVATION_FORMAT: &str = "pl-conservation/v1";

/// Result of both checks, plus what the error path needs.
#[derive(Clone, Debug)]
pub struct ConservationReport {
    pub proof: ProofResult,
    pub expected: u128,
    pub actual: u128,
    pub implicated: Vec<TxId>,
    pub reason: Option<String>,
}

impl ConservationReport {
    pub fn is_valid(&self) -> bool {
        self.proof.valid
    }

    /// The error to report when the batch must not commit.
    pub fn into_error(self) -> Option<BatchError> {
        let reason = self.reason?;
        Some(BatchError::ConservationViolation {
            expected: self.expected,
            actual: self.actual,
            implicated: self.implicated,
            reason,
        })
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ConservationValidator;

impl ConservationValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate(&self, transactions: &[Transaction], execution: &ExecutionResult) -> ConservationReport {
        let started = Instant::now();
        let before = total(&execution.initial_state);
        let after = total(&execution.final_state);

        let mut nets: BTreeMap<usize, i128> = BTreeMap::new();
        let mut overflowing = Vec::new();
        let mut unprovable = Vec::new();
        let mut symbolic_sum: Option<i128> = Some(0);

        for (i, tx) in transactions.iter().enumerate() {
            match net_effect(tx) {
                TxNet::Constant(net) => {
                    nets.insert(i, net);
                    symbolic_sum = symbolic_sum.and_then(|s| s.checked_add(net));
                }
                TxNet::Overflow => {
                    overflowing.push(tx.id());
                    symbolic_sum = None;
                }
                TxNet::DependsOnPrior => unprovable.push(tx.id()),
            }
        }

        let reason = match (before, after) {
            (Some(b), Some(a)) if b != a => Some(format!("total value changed from {b} to {a}")),
            (None, _) | (_, None) => Some("total value overflows u128".to_string()),
            _ if !unprovable.is_empty() => Some(format!(
                "net effect of {} transaction(s) depends on pre-state values",
                unprovable.len()
            )),
            _ => match symbolic_sum {
                Some(0) => None,
                Some(s) => Some(format!("transaction net effects sum to {s}, not zero")),
                None => Some("symbolic net effect overflows".to_string()),
            },
        };

        let implicated = if reason.is_none() {
            Vec::new()
        } else if !overflowing.is_empty() {
            overflowing
        } else if !unprovable.is_empty() {
            unprovable
        } else {
            let excess = match (before, after) {
                (Some(b), Some(a)) if b != a => signed_difference(a, b),
                _ => symbolic_sum,
            };
            excess
                .map(|excess| blame(transactions, &nets, excess))
                .unwrap_or_default()
        };

        let expected = before.unwrap_or(u128::MAX);
        let actual = after.unwrap_or(u128::MAX);
        let duration = started.elapsed();

        let proof = match &reason {
            None => {
                info!(total = expected, "Conservation proven");
                ProofResult::proven(
                    ProofProperty::Conservation,
                    None,
                    artifact(transactions.len(), expected, actual, &nets),
                    duration,
                )
            }
            Some(reason) => {
                warn!(expected, actual, %reason, "Conservation violated");
                let mut assignment: BTreeMap<String, String> = nets
                    .iter()
                    .map(|(i, net)| (format!("net[T{i}]"), net.to_string()))
                    .collect();
                assignment.insert("total_before".into(), expected.to_string());
                assignment.insert("total_after".into(), actual.to_string());
                ProofResult::disproven(
                    ProofProperty::Conservation,
                    Counterexample {
                        summary: reason.clone(),
                        order: Vec::new(),
                        violated: vec![Constraint::SumInvariant.to_string()],
                        assignment,
                        implicated: implicated.clone(),
                    },
                    duration,
                )
            }
        };

        ConservationReport {
            proof,
            expected,
            actual,
            implicated,
            reason,
        }
    }
}

enum TxNet {
    Constant(i128),
    Overflow,
    DependsOnPrior,
}

fn net_effect(tx: &Transaction) -> TxNet {
    let Ok(effect) = symbolic_effect(tx) else {
        return TxNet::Overflow;
    };
    let mut sum = 0i128;
    for affine in effect.values() {
        match affine.net() {
            NetChange::Constant(c) => match sum.checked_add(c) {
                Some(next) => sum = next,
                None => return TxNet::Overflow,
            },
            NetChange::DependsOnPrior { .. } => return TxNet::DependsOnPrior,
        }
    }
    TxNet::Constant(sum)
}

/// Fewest transactions whose net effects push the total in the direction of
/// `excess` and together account for all of it, largest contribution first.
///
/// Transactions whose effects cancel out, like a matched mint and burn, are
/// only named when the excess cannot be covered without them.
fn blame(transactions: &[Transaction], nets: &BTreeMap<usize, i128>, excess: i128) -> Vec<TxId> {
    let mut candidates: Vec<(usize, u128)> = nets
        .iter()
        .filter(|(_, net)| **net != 0 && net.signum() == excess.signum())
        .map(|(i, net)| (*i, net.unsigned_abs()))
        .collect();
    candidates.sort_by(|(ia, a), (ib, b)| b.cmp(a).then(ia.cmp(ib)));

    let target = excess.unsigned_abs();
    let mut covered = 0u128;
    let mut implicated = Vec::new();
    for (i, contribution) in candidates {
        if covered >= target {
            break;
        }
        covered = covered.saturating_add(contribution);
        implicated.push(transactions[i].id());
    }
    implicated
}

fn signed_difference(after: u128, before: u128) -> Option<i128> {
    if after >= before {
        i128::try_from(after - before).ok()
    } else {
        i128::try_from(before - after).ok().map(|d| -d)
    }
}

fn total(state: &AccountState) -> Option<u128> {
    state.values().try_fold(0u128, |acc, v| acc.checked_add(*v))
}

fn artifact(count: usize, before: u128, after: u128, nets: &BTreeMap<usize, i128>) -> ProofArtifact {
    let mut assignment: BTreeMap<String, String> = nets
        .iter()
        .map(|(i, net)| (format!("net[T{i}]"), net.to_string()))
        .collect();
    assignment.insert("total_before".into(), before.to_string());
    assignment.insert("total_after".into(), after.to_string());

    ProofArtifact::new(
        CONSERVATION_FORMAT,
        format!("sum of net effects over {count} transactions is zero for every pre-state"),
        count + 1,
        count + 2,
        assignment,
    )
}
