//! Linearizability Prover
//!
//! Proves that a parallel execution is equivalent to some serial order of the
//! batch that respects the dependency graph. The witness order is returned
//! with the proof; a failed search returns the deepest partial order and the
//! constraints it broke.

use super::encoding::{Constraint, ConstraintSystem};
use super::solver::{check_order, solve, Mismatch, SolveOutcome, SolverSession, UnsatCore, Witness};
use crate::domain::entities::{DependencyGraph, Transaction};
use crate::domain::errors::BatchError;
use crate::domain::results::{
    Counterexample, ExecutionResult, ProofArtifact, ProofProperty, ProofResult,
};
use crate::domain::value_objects::TxId;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const LINEARIZABILITY_FORMAT: &str = "pl-linearizability/v1";

#[derive(Clone, Debug)]
pub struct LinearizabilityProver {
    budget: Duration,
}

impl LinearizabilityProver {
    pub fn new(budget: Duration) -> Self {
        Self { budget }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Prove `execution` linearizable against `graph`.
    ///
    /// Returns `Unproven` when the budget runs out, never an error; errors
    /// mean the inputs do not describe a completed execution of this batch.
    pub fn prove(
        &self,
        transactions: &[Transaction],
        graph: &DependencyGraph,
        execution: &ExecutionResult,
    ) -> Result<ProofResult, BatchError> {
        let started = Instant::now();
        let system = ConstraintSystem::encode(transactions, graph, execution)?;
        let mut session = SolverSession::new(self.budget);

        debug!(
            transactions = system.len(),
            constraints = system.constraints.len(),
            variables = system.variable_count(),
            "Encoded linearizability constraints"
        );

        let result = match solve(&system, &mut session) {
            SolveOutcome::Sat(witness) => {
                let order: Vec<TxId> = witness.order.iter().map(|i| system.tx_id(*i)).collect();
                info!(steps = session.steps(), "Linearizability proven");
                ProofResult::proven(
                    ProofProperty::Linearizability,
                    Some(order),
                    artifact(&system, &witness),
                    started.elapsed(),
                )
            }
            SolveOutcome::Unsat(core) => {
                warn!(
                    steps = session.steps(),
                    violated = core.violated.len(),
                    "Execution is not linearizable"
                );
                ProofResult::disproven(
                    ProofProperty::Linearizability,
                    counterexample(&system, &core),
                    started.elapsed(),
                )
            }
            SolveOutcome::Unknown { steps } => {
                warn!(steps, budget = ?self.budget, "Linearizability budget exhausted");
                ProofResult::unproven(ProofProperty::Linearizability, started.elapsed())
            }
        };
        Ok(result)
    }

    /// Certify that `execution` matches the given serial `order`.
    ///
    /// Checks one order only, so it never exhausts the budget. Used for
    /// executions that already ran serially.
    pub fn certify(
        &self,
        transactions: &[Transaction],
        graph: &DependencyGraph,
        execution: &ExecutionResult,
        order: &[TxId],
    ) -> Result<ProofResult, BatchError> {
        let started = Instant::now();
        let system = ConstraintSystem::encode(transactions, graph, execution)?;
        let index: HashMap<TxId, usize> = transactions
            .iter()
            .enumerate()
            .map(|(i, tx)| (tx.id(), i))
            .collect();
        let order = order
            .iter()
            .map(|id| {
                index
                    .get(id)
                    .copied()
                    .ok_or_else(|| BatchError::Internal(format!("{id:?} is not in the batch")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(match check_order(&system, &order) {
            Ok(witness) => ProofResult::proven(
                ProofProperty::Linearizability,
                Some(witness.order.iter().map(|i| system.tx_id(*i)).collect()),
                artifact(&system, &witness),
                started.elapsed(),
            ),
            Err(core) => ProofResult::disproven(
                ProofProperty::Linearizability,
                counterexample(&system, &core),
                started.elapsed(),
            ),
        })
    }
}

fn artifact(system: &ConstraintSystem<'_>, witness: &Witness) -> ProofArtifact {
    let mut assignment = BTreeMap::new();
    for (pos, index) in witness.order.iter().enumerate() {
        assignment.insert(format!("tx[T{index}]"), format!("{:?}", system.tx_id(*index)));
        assignment.insert(format!("start[T{index}]"), (2 * pos).to_string());
        assignment.insert(format!("end[T{index}]"), (2 * pos + 1).to_string());
        for (account, value) in &witness.before[*index] {
            assignment.insert(format!("before[T{index}][{account:?}]"), value.to_string());
        }
        for (account, value) in &witness.after[*index] {
            assignment.insert(format!("after[T{index}][{account:?}]"), value.to_string());
        }
    }

    ProofArtifact::new(
        LINEARIZABILITY_FORMAT,
        format!(
            "parallel execution of {} transactions equals the serial order given by start[]",
            system.len()
        ),
        system.constraints.len(),
        system.variable_count(),
        assignment,
    )
}

fn counterexample(system: &ConstraintSystem<'_>, core: &UnsatCore) -> Counterexample {
    let mut implicated = BTreeSet::new();
    for constraint in &core.violated {
        match constraint {
            Constraint::Observed { tx, .. }
            | Constraint::Transform { tx }
            | Constraint::Precedes { to: tx, .. } => {
                implicated.insert(*tx);
            }
            Constraint::FinalState { account, .. } => {
                // Last writer in the deepest order
                if let Some(tx) = core
                    .deepest
                    .iter()
                    .rev()
                    .find(|i| system.touched[**i].contains(account))
                {
                    implicated.insert(*tx);
                }
            }
            _ => {}
        }
    }

    let mut assignment: BTreeMap<String, String> = core
        .partial
        .iter()
        .map(|(account, value)| (format!("state[{account:?}]"), value.to_string()))
        .collect();
    for Mismatch {
        account,
        expected,
        actual,
    } in &core.mismatches
    {
        assignment.insert(format!("final[{account:?}]"), expected.to_string());
        assignment.insert(format!("serial[{account:?}]"), actual.to_string());
    }

    let summary = match core.mismatches.first() {
        Some(m) => format!(
            "no serial order reproduces final state: {:?} reported {} but serial replay gives {}",
            m.account, m.expected, m.actual
        ),
        None => format!(
            "no serial order is consistent with the observed reads ({} of {} transactions placed)",
            core.deepest.len().saturating_sub(1),
            system.len()
        ),
    };

    Counterexample {
        summary,
        order: core.deepest.iter().map(|i| system.tx_id(*i)).collect(),
        violated: core.violated.iter().map(ToString::to_string).collect(),
        assignment,
        implicated: implicated.into_iter().map(|i| system.tx_id(i)).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::{build_dependency_graph, compute_levels};
    use crate::domain::entities::Operation;
    use crate::domain::results::{ProofStatus, TraceEventKind};
    use crate::domain::value_objects::AccountState;
    use crate::execution::{execute_serial, Cancellation, ParallelExecutor, RayonWorkerPool};
    use primitive_types::{H160, H256};

    fn make_hash(val: u64) -> H256 {
        H256::from_low_u64_be(val)
    }

    fn make_addr(val: u64) -> H160 {
        H160::from_low_u64_be(val)
    }

    fn prover() -> LinearizabilityProver {
        LinearizabilityProver::new(Duration::from_secs(10))
    }

    fn run(txs: &[Transaction], initial: AccountState) -> (DependencyGraph, ExecutionResult) {
        let graph = build_dependency_graph(txs).unwrap();
        let levels = compute_levels(&graph).unwrap();
        let pool = RayonWorkerPool::new(4).unwrap();
        let execution = ParallelExecutor::new(&pool).execute(txs, &levels, initial, &Cancellation::never());
        (graph, execution)
    }

    fn diamond() -> (Vec<Transaction>, AccountState) {
        let txs = vec![
            Transaction::transfer(make_hash(1), make_addr(1), make_addr(2), 10),
            Transaction::transfer(make_hash(2), make_addr(2), make_addr(3), 4),
            Transaction::transfer(make_hash(3), make_addr(2), make_addr(4), 3),
            Transaction::transfer(make_hash(4), make_addr(5), make_addr(6), 1),
        ];
        let initial = (1..=6).map(|i| (make_addr(i), 10)).collect();
        (txs, initial)
    }

    #[test]
    fn test_parallel_execution_is_proven() {
        let (txs, initial) = diamond();
        let (graph, execution) = run(&txs, initial);

        let proof = prover().prove(&txs, &graph, &execution).unwrap();

        assert_eq!(proof.status, ProofStatus::Proven);
        assert!(proof.valid);
        let order = proof.serial_order.clone().unwrap();
        assert_eq!(order.len(), 4);
        let pos = |id: u64| order.iter().position(|t| *t == make_hash(id)).unwrap();
        assert!(pos(1) < pos(2));
        assert!(pos(2) < pos(3));

        let artifact = proof.artifact.unwrap();
        assert_eq!(artifact.format, LINEARIZABILITY_FORMAT);
        assert!(artifact.verify_digest());
        assert_eq!(artifact.assignment["start[T0]"], "0");
    }

    #[test]
    fn test_tampered_final_state_is_disproven() {
        let (txs, initial) = diamond();
        let (graph, mut execution) = run(&txs, initial);
        execution.final_state.insert(make_addr(3), 1_000);

        let proof = prover().prove(&txs, &graph, &execution).unwrap();

        assert_eq!(proof.status, ProofStatus::Disproven);
        let cx = proof.counterexample.unwrap();
        assert!(cx.summary.contains("final state"));
        assert_eq!(cx.implicated, vec![make_hash(2)]);
        assert_eq!(cx.assignment[&format!("final[{:?}]", make_addr(3))], "1000");
    }

    #[test]
    fn test_stale_read_is_disproven() {
        let txs = vec![
            Transaction::builder(make_hash(1), "set")
                .bind("a", make_addr(1))
                .operation(Operation::SetBalance {
                    account: "a".into(),
                    value: 7,
                })
                .build(),
            Transaction::builder(make_hash(2), "observe")
                .bind("a", make_addr(1))
                .operation(Operation::Read {
                    account: "a".into(),
                })
                .build(),
        ];
        let (graph, mut execution) = run(&txs, AccountState::from([(make_addr(1), 0)]));

        // Pretend the reader saw the value from before the write
        for event in execution.trace.events.iter_mut() {
            if event.tx == make_hash(2) {
                if let TraceEventKind::Read { value, .. } = &mut event.kind {
                    *value = 0;
                }
            }
        }

        let proof = prover().prove(&txs, &graph, &execution).unwrap();

        assert_eq!(proof.status, ProofStatus::Disproven);
        let cx = proof.counterexample.unwrap();
        assert_eq!(cx.implicated, vec![make_hash(2)]);
        assert_eq!(cx.order, vec![make_hash(1), make_hash(2)]);
    }

    #[test]
    fn test_certify_serial_order() {
        let (txs, initial) = diamond();
        let graph = build_dependency_graph(&txs).unwrap();
        let order = vec![make_hash(1), make_hash(2), make_hash(3), make_hash(4)];
        let execution = execute_serial(&txs, &order, initial, &Cancellation::never()).unwrap();

        let proof = LinearizabilityProver::new(Duration::ZERO)
            .certify(&txs, &graph, &execution, &order)
            .unwrap();

        assert_eq!(proof.status, ProofStatus::Proven);
        assert_eq!(proof.serial_order, Some(order));
    }

    #[test]
    fn test_zero_budget_is_unproven() {
        let (txs, initial) = diamond();
        let (graph, execution) = run(&txs, initial);

        let proof = LinearizabilityProver::new(Duration::ZERO)
            .prove(&txs, &graph, &execution)
            .unwrap();

        assert_eq!(proof.status, ProofStatus::Unproven);
        assert!(!proof.valid);
        assert!(proof.counterexample.is_none());
    }
}
