//! Schedule invariants
//!
//! Pure checks over a dependency graph and its level decomposition. The
//! processor asserts them in debug builds; tests assert them directly.

use super::entities::DependencyGraph;
use super::value_objects::TxId;
use std::collections::{HashMap, HashSet};

/// Every edge `a -> b` places `a` in a strictly earlier level than `b`.
pub fn invariant_topological_order(levels: &[Vec<TxId>], graph: &DependencyGraph) -> bool {
    let level_of: HashMap<TxId, usize> = levels
        .iter()
        .enumerate()
        .flat_map(|(k, level)| level.iter().map(move |id| (*id, k)))
        .collect();

    graph.edges.iter().all(|edge| {
        match (level_of.get(&edge.from), level_of.get(&edge.to)) {
            (Some(from), Some(to)) => from < to,
            _ => false,
        }
    })
}

/// The graph is a DAG.
pub fn invariant_no_cycles(graph: &DependencyGraph) -> bool {
    let mut done: HashSet<TxId> = HashSet::new();
    let mut on_path: HashSet<TxId> = HashSet::new();

    for root in &graph.nodes {
        if done.contains(root) {
            continue;
        }
        on_path.insert(*root);
        let mut stack: Vec<(TxId, usize)> = vec![(*root, 0)];

        while let Some((node, cursor)) = stack.last_mut() {
            match graph.successors(node).get(*cursor).copied() {
                Some(next) => {
                    *cursor += 1;
                    if on_path.contains(&next) {
                        return false;
                    }
                    if !done.contains(&next) {
                        on_path.insert(next);
                        stack.push((next, 0));
                    }
                }
                None => {
                    let node = *node;
                    on_path.remove(&node);
                    done.insert(node);
                    stack.pop();
                }
            }
        }
    }
    true
}

/// No edge connects two members of the same level.
pub fn invariant_parallel_safety(level: &[TxId], graph: &DependencyGraph) -> bool {
    let members: HashSet<&TxId> = level.iter().collect();
    level
        .iter()
        .all(|a| !graph.successors(a).iter().any(|b| members.contains(b)))
}

/// Every node is scheduled exactly once.
pub fn invariant_completeness(levels: &[Vec<TxId>], graph: &DependencyGraph) -> bool {
    let scheduled: Vec<TxId> = levels.iter().flatten().copied().collect();
    let unique: HashSet<TxId> = scheduled.iter().copied().collect();
    let all: HashSet<TxId> = graph.nodes.iter().copied().collect();

    scheduled.len() == unique.len() && unique == all
}

/// All four schedule invariants at once
pub fn schedule_is_valid(levels: &[Vec<TxId>], graph: &DependencyGraph) -> bool {
    invariant_no_cycles(graph)
        && invariant_completeness(levels, graph)
        && invariant_topological_order(levels, graph)
        && levels
            .iter()
            .all(|level| invariant_parallel_safety(level, graph))
}
