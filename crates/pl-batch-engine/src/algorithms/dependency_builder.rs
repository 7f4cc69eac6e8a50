//! Dependency Graph Builder
//!
//! Builds the dependency graph from resolved transactions. Two kinds of edge:
//! 1. Data edges (RAW / WAW / WAR) between every conflicting pair, earlier to later
//! 2. Declared edges from each `depends_on` id to the declaring transaction
//!
//! The builder rejects the whole batch on a cycle; no partial graph escapes.

use super::conflict_detector::overlapping_pairs;
use super::kahns::{find_minimal_cycle, kahns_levels};
use crate::domain::entities::{Dependency, DependencyGraph, Transaction};
use crate::domain::errors::BatchError;
use crate::domain::value_objects::DependencyKind;

/// Build a dependency graph with no edge limit.
pub fn build_dependency_graph(transactions: &[Transaction]) -> Result<DependencyGraph, BatchError> {
    build_dependency_graph_bounded(transactions, usize::MAX)
}

/// Build a dependency graph, rejecting batches with more than `max_edges` edges.
pub fn build_dependency_graph_bounded(
    transactions: &[Transaction],
    max_edges: usize,
) -> Result<DependencyGraph, BatchError> {
    let mut graph = DependencyGraph::new();
    for tx in transactions {
        graph.add_node(tx.id());
    }

    // Data dependencies
    let pairs = overlapping_pairs(transactions, max_edges).map_err(|count| {
        BatchError::TooManyEdges {
            count,
            max: max_edges,
        }
    })?;
    for (i, j) in pairs {
        let (first, second) = (&transactions[i], &transactions[j]);
        if let Some((kind, account)) = first
            .access_sets()
            .conflict_with_later(second.access_sets())
        {
            graph.add_edge(Dependency::new(first.id(), second.id(), kind).with_account(account));
        }
    }

    // Declared dependencies
    for tx in transactions {
        for dep in tx.depends_on() {
            if graph.position(dep).is_none() {
                return Err(BatchError::InvalidTransaction {
                    tx: tx.id(),
                    reason: format!("depends on {dep:?}, which is not in the batch"),
                });
            }
            graph.add_edge(Dependency::new(*dep, tx.id(), DependencyKind::Declared));
        }
    }

    if graph.edge_count() > max_edges {
        return Err(BatchError::TooManyEdges {
            count: graph.edge_count(),
            max: max_edges,
        });
    }

    let unscheduled = kahns_levels(&graph).unscheduled;
    if !unscheduled.is_empty() {
        let cycle = find_minimal_cycle(&graph, &unscheduled)
            .ok_or_else(|| BatchError::Internal("unscheduled nodes without a cycle".into()))?;
        return Err(BatchError::CircularDependency { cycle });
    }

    Ok(graph)
}
