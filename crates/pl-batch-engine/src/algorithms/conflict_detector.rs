//! Conflict Detector
//!
//! Classifies every pair of transactions whose access sets intersect with at
//! least one write. Classification depends only on submission order and
//! account ids, so re-running it on an unchanged batch reproduces the same
//! list byte for byte.

use crate::domain::entities::{Conflict, Dependency, DependencyGraph, Transaction};
use crate::domain::value_objects::{AccountId, DependencyKind, Resolution};
use std::collections::{BTreeMap, BTreeSet};

/// Submission-index pairs `(i, j)`, `i < j`, that share an account written by
/// at least one of them.
///
/// Returns `Err(count)` as soon as more than `limit` pairs are found.
pub fn overlapping_pairs(
    transactions: &[Transaction],
    limit: usize,
) -> Result<BTreeSet<(usize, usize)>, usize> {
    // account -> (readers, writers), each in submission order
    let mut index: BTreeMap<AccountId, (Vec<usize>, Vec<usize>)> = BTreeMap::new();
    for (i, tx) in transactions.iter().enumerate() {
        let sets = tx.access_sets();
        for account in &sets.reads {
            index.entry(*account).or_default().0.push(i);
        }
        for account in &sets.writes {
            index.entry(*account).or_default().1.push(i);
        }
    }

    let mut pairs = BTreeSet::new();
    for (readers, writers) in index.values() {
        for w in writers {
            for other in readers.iter().chain(writers) {
                if other == w {
                    continue;
                }
                pairs.insert((*w.min(other), *w.max(other)));
                if pairs.len() > limit {
                    return Err(pairs.len());
                }
            }
        }
    }
    Ok(pairs)
}

/// Detect all conflicts between a set of transactions.
///
/// Returns one conflict per conflicting pair, ordered by submission index of
/// the earlier then the later transaction. A pair is `EnforceOrder` when the
/// graph orders it in either direction, `Serialize` otherwise.
pub fn detect_conflicts(transactions: &[Transaction], graph: &DependencyGraph) -> Vec<Conflict> {
    overlapping_pairs(transactions, usize::MAX)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(i, j)| {
            let first = &transactions[i];
            let second = &transactions[j];
            let (kind, account) = first
                .access_sets()
                .conflict_with_later(second.access_sets())?;

            Some(Conflict {
                kind,
                first: first.id(),
                second: second.id(),
                account,
                resolution: resolve(graph, first, second),
            })
        })
        .collect()
}

/// Graphs from [`build_dependency_graph`](super::build_dependency_graph) carry a
/// direct edge for every overlapping pair, so the reachability search only runs
/// on hand-built graphs.
fn resolve(graph: &DependencyGraph, first: &Transaction, second: &Transaction) -> Resolution {
    let (a, b) = (first.id(), second.id());
    if graph.has_edge(&a, &b) || graph.has_edge(&b, &a) || graph.orders(&a, &b) {
        Resolution::EnforceOrder
    } else {
        Resolution::Serialize
    }
}

/// Add a submission-order edge for every `Serialize` conflict still unordered.
///
/// An edge is only added when the later transaction cannot reach the earlier
/// one, so the graph stays acyclic. Returns the number of edges added.
pub fn apply_serialize_edges(graph: &mut DependencyGraph, conflicts: &[Conflict]) -> usize {
    let mut added = 0;
    for conflict in conflicts
        .iter()
        .filter(|c| c.resolution == Resolution::Serialize)
    {
        if graph.orders(&conflict.first, &conflict.second) {
            continue;
        }
        let edge = Dependency::new(conflict.first, conflict.second, DependencyKind::Serialized)
            .with_account(conflict.account);
        if graph.add_edge(edge) {
            added += 1;
        }
    }
    added
}
