//! Bounded constraint solver
//!
//! Searches for an assignment of start/end instants (a serial order) and
//! before/after values satisfying a [`ConstraintSystem`]. Values are forced
//! once the order is fixed, so the search is over topological orders only.
//!
//! Orders that differ by swapping adjacent independent transactions reach the
//! same states; the search only explores the one where the lower index comes
//! first. Every [`SolverSession`] is created for a single call and dropped
//! with it.

use super::encoding::{Constraint, ConstraintSystem};
use crate::domain::value_objects::{AccountId, AccountState, Balance};
use std::collections::BTreeSet;
use std::time::{Duration, Instant};

/// Distinct violated constraints kept for the core
const MAX_CORE: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BudgetExhausted;

/// Per-call solving context with a wall-clock budget.
#[derive(Debug)]
pub struct SolverSession {
    deadline: Option<Instant>,
    steps: u64,
}

impl SolverSession {
    /// A zero budget is exhausted before the first step; a budget too large
    /// to represent as an instant never runs out.
    pub fn new(budget: Duration) -> Self {
        let now = Instant::now();
        let deadline = if budget.is_zero() {
            Some(now)
        } else {
            now.checked_add(budget)
        };
        Self { deadline, steps: 0 }
    }

    /// Account for one search step.
    pub fn tick(&mut self) -> Result<(), BudgetExhausted> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(BudgetExhausted),
            _ => {
                self.steps += 1;
                Ok(())
            }
        }
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }
}

/// Satisfying assignment
#[derive(Clone, Debug)]
pub struct Witness {
    /// Submission indices in serial order; position k has start 2k, end 2k+1
    pub order: Vec<usize>,
    /// Indexed by submission index
    pub before: Vec<AccountState>,
    pub after: Vec<AccountState>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mismatch {
    pub account: AccountId,
    pub expected: Balance,
    pub actual: Balance,
}

/// Evidence that no order satisfies the system
#[derive(Clone, Debug, Default)]
pub struct UnsatCore {
    pub violated: Vec<Constraint>,
    /// Longest prefix the search reached
    pub deepest: Vec<usize>,
    /// Final-state mismatches of the first complete order tried
    pub mismatches: Vec<Mismatch>,
    /// State after `deepest`
    pub partial: AccountState,
}

#[derive(Clone, Debug)]
pub enum SolveOutcome {
    Sat(Witness),
    Unsat(UnsatCore),
    Unknown { steps: u64 },
}

struct Frame {
    cursor: usize,
    placed: Option<Placed>,
}

struct Placed {
    tx: usize,
    undo: Vec<(AccountId, Option<Balance>)>,
    newly_ready: Vec<usize>,
}

struct Search<'s, 'a> {
    system: &'s ConstraintSystem<'a>,
    state: AccountState,
    order: Vec<usize>,
    ready: BTreeSet<usize>,
    remaining: Vec<usize>,
    before: Vec<AccountState>,
    after: Vec<AccountState>,
    core: BTreeSet<Constraint>,
    deepest: Vec<usize>,
    partial: AccountState,
    deepest_len: usize,
    /// The current order is the deepest prefix and has not been copied yet
    deepest_live: bool,
    mismatches: Option<Vec<Mismatch>>,
}

/// Search for a serial order satisfying `system`.
pub fn solve(system: &ConstraintSystem<'_>, session: &mut SolverSession) -> SolveOutcome {
    if session.tick().is_err() {
        return SolveOutcome::Unknown {
            steps: session.steps(),
        };
    }

    let mut search = Search::new(system);

    match search.run(session) {
        Ok(Some(witness)) => SolveOutcome::Sat(witness),
        Ok(None) => SolveOutcome::Unsat(search.into_core()),
        Err(BudgetExhausted) => SolveOutcome::Unknown {
            steps: session.steps(),
        },
    }
}

/// Check a single given order without searching or spending budget.
pub fn check_order(system: &ConstraintSystem<'_>, order: &[usize]) -> Result<Witness, UnsatCore> {
    let mut search = Search::new(system);

    for &tx in order {
        if !search.ready.contains(&tx) {
            let broken = system.constraints.iter().find(|c| {
                matches!(c, Constraint::Precedes { from, to, .. }
                    if *to == tx && !search.order.contains(from))
            });
            if let Some(constraint) = broken.cloned() {
                search.violation(tx, constraint);
            } else {
                search.violation(tx, Constraint::Interval { tx });
            }
            return Err(search.into_core());
        }
        if search.place(tx).is_none() {
            return Err(search.into_core());
        }
    }

    if search.order.len() == system.len() && search.check_final() {
        Ok(search.witness())
    } else {
        Err(search.into_core())
    }
}

impl<'s, 'a> Search<'s, 'a> {
    fn new(system: &'s ConstraintSystem<'a>) -> Self {
        let n = system.len();
        let remaining: Vec<usize> = system.predecessors.iter().map(Vec::len).collect();
        let ready = (0..n).filter(|i| remaining[*i] == 0).collect();
        Self {
            system,
            state: system.initial.clone(),
            order: Vec::with_capacity(n),
            ready,
            remaining,
            before: vec![AccountState::new(); n],
            after: vec![AccountState::new(); n],
            core: BTreeSet::new(),
            deepest: Vec::new(),
            partial: system.initial.clone(),
            deepest_len: 0,
            deepest_live: false,
            mismatches: None,
        }
    }

    fn run(&mut self, session: &mut SolverSession) -> Result<Option<Witness>, BudgetExhausted> {
        let n = self.system.len();
        if n == 0 {
            return Ok(self.check_final().then(|| self.witness()));
        }

        let mut stack = vec![Frame {
            cursor: 0,
            placed: None,
        }];

        while let Some(top) = stack.len().checked_sub(1) {
            if let Some(placed) = stack[top].placed.take() {
                self.unplace(placed);
            }

            let Some(candidate) = self.next_candidate(stack[top].cursor) else {
                stack.pop();
                continue;
            };
            stack[top].cursor = candidate + 1;
            session.tick()?;

            let Some(placed) = self.place(candidate) else {
                continue;
            };
            stack[top].placed = Some(placed);

            if self.order.len() == n {
                if self.check_final() {
                    return Ok(Some(self.witness()));
                }
            } else {
                stack.push(Frame {
                    cursor: 0,
                    placed: None,
                });
            }
        }
        Ok(None)
    }

    /// Lowest ready index at or after `cursor` that is not a redundant swap.
    fn next_candidate(&self, cursor: usize) -> Option<usize> {
        let last = self.order.last().copied();
        self.ready.range(cursor..).copied().find(|c| match last {
            Some(last) => !(*c < last && self.system.independent(*c, last)),
            None => true,
        })
    }

    /// Chain, observe and transform `tx` on top of the current state.
    fn place(&mut self, tx: usize) -> Option<Placed> {
        let system = self.system;
        let before: AccountState = system.touched[tx]
            .iter()
            .map(|a| (*a, self.state.get(a).copied().unwrap_or(0)))
            .collect();

        if let Some((account, value)) = system.observed[tx]
            .iter()
            .find(|(account, value)| before.get(account) != Some(value))
        {
            self.violation(
                tx,
                Constraint::Observed {
                    tx,
                    account: *account,
                    value: *value,
                },
            );
            return None;
        }

        let mut after = before.clone();
        if system.transactions[tx].execute(&mut after).is_err() {
            self.violation(tx, Constraint::Transform { tx });
            return None;
        }

        let undo = after
            .iter()
            .map(|(account, value)| (*account, self.state.insert(*account, *value)))
            .collect();

        self.ready.remove(&tx);
        let mut newly_ready = Vec::new();
        for succ in &system.successors[tx] {
            self.remaining[*succ] -= 1;
            if self.remaining[*succ] == 0 {
                self.ready.insert(*succ);
                newly_ready.push(*succ);
            }
        }

        self.before[tx] = before;
        self.after[tx] = after;
        self.order.push(tx);
        if self.order.len() > self.deepest_len {
            self.deepest_len = self.order.len();
            self.deepest_live = true;
        }

        Some(Placed {
            tx,
            undo,
            newly_ready,
        })
    }

    fn unplace(&mut self, placed: Placed) {
        if self.deepest_live {
            self.keep_deepest();
        }
        self.order.pop();
        for (account, prior) in placed.undo.into_iter().rev() {
            match prior {
                Some(value) => self.state.insert(account, value),
                None => self.state.remove(&account),
            };
        }
        for succ in &self.system.successors[placed.tx] {
            self.remaining[*succ] += 1;
        }
        for succ in placed.newly_ready {
            self.ready.remove(&succ);
        }
        self.ready.insert(placed.tx);
    }

    fn check_final(&mut self) -> bool {
        let mismatches: Vec<Mismatch> = self
            .system
            .final_state
            .iter()
            .filter_map(|(account, expected)| {
                let actual = self.state.get(account).copied().unwrap_or(0);
                (actual != *expected).then_some(Mismatch {
                    account: *account,
                    expected: *expected,
                    actual,
                })
            })
            .collect();

        if mismatches.is_empty() {
            return true;
        }
        for m in &mismatches {
            self.record(Constraint::FinalState {
                account: m.account,
                value: m.expected,
            });
        }
        self.mismatches.get_or_insert(mismatches);
        false
    }

    fn violation(&mut self, tx: usize, constraint: Constraint) {
        if self.order.len() + 1 > self.deepest_len {
            self.keep_deepest();
            self.deepest.push(tx);
            self.deepest_len = self.deepest.len();
        }
        self.record(constraint);
    }

    /// Copy the current order and state out as the deepest prefix.
    fn keep_deepest(&mut self) {
        self.deepest.clone_from(&self.order);
        self.partial.clone_from(&self.state);
        self.deepest_len = self.order.len();
        self.deepest_live = false;
    }

    fn record(&mut self, constraint: Constraint) {
        if self.core.len() < MAX_CORE {
            self.core.insert(constraint);
        }
    }

    fn witness(&self) -> Witness {
        Witness {
            order: self.order.clone(),
            before: self.before.clone(),
            after: self.after.clone(),
        }
    }

    fn into_core(mut self) -> UnsatCore {
        if self.deepest_live {
            self.keep_deepest();
        }
        UnsatCore {
            violated: self.core.into_iter().collect(),
            deepest: self.deepest,
            mismatches: self.mismatches.unwrap_or_default(),
            partial: self.partial,
        }
    }
}
