//! Kahn's Topological Sort Algorithm
//!
//! Level decomposition of the dependency graph. O(V + E); every level is
//! kept in submission order so scheduling never depends on hash layout.

use crate::domain::entities::DependencyGraph;
use crate::domain::errors::BatchError;
use crate::domain::value_objects::TxId;
use std::collections::{HashMap, HashSet, VecDeque};

/// Output of Kahn's algorithm before cycle handling.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LevelDecomposition {
    /// Level k holds nodes whose predecessors all sit in levels < k
    pub levels: Vec<Vec<TxId>>,
    /// Nodes left with non-zero in-degree, in submission order
    pub unscheduled: Vec<TxId>,
}

/// Perform Kahn's topological sort, grouping nodes into levels.
pub fn kahns_levels(graph: &DependencyGraph) -> LevelDecomposition {
    let mut in_degree: HashMap<TxId, usize> = graph.in_degree.clone();
    let by_position = |id: &TxId| graph.position(id).unwrap_or(usize::MAX);

    let mut levels: Vec<Vec<TxId>> = Vec::new();
    let mut current = graph.get_zero_degree_nodes();
    let mut scheduled: HashSet<TxId> = HashSet::new();

    while !current.is_empty() {
        let mut next: Vec<TxId> = Vec::new();
        for node in &current {
            scheduled.insert(*node);
            for neighbor in graph.successors(node) {
                let Some(degree) = in_degree.get_mut(neighbor) else {
                    continue;
                };
                *degree = degree.saturating_sub(1);
                if *degree == 0 {
                    next.push(*neighbor);
                }
            }
        }
        next.sort_by_key(by_position);
        levels.push(std::mem::replace(&mut current, next));
    }

    let unscheduled = graph
        .nodes
        .iter()
        .filter(|id| !scheduled.contains(id))
        .copied()
        .collect();

    LevelDecomposition {
        levels,
        unscheduled,
    }
}

/// Level decomposition, or `CircularDependency` carrying the shortest cycle.
pub fn compute_levels(graph: &DependencyGraph) -> Result<Vec<Vec<TxId>>, BatchError> {
    let decomposition = kahns_levels(graph);
    if decomposition.unscheduled.is_empty() {
        return Ok(decomposition.levels);
    }

    let cycle = find_minimal_cycle(graph, &decomposition.unscheduled)
        .ok_or_else(|| BatchError::Internal("unscheduled nodes without a cycle".into()))?;
    Err(BatchError::CircularDependency { cycle })
}

/// Shortest cycle among `candidates`.
///
/// Ties go to the cycle through the earliest-submitted node, and the cycle is
/// listed starting from that node.
pub fn find_minimal_cycle(graph: &DependencyGraph, candidates: &[TxId]) -> Option<Vec<TxId>> {
    let allowed: HashSet<TxId> = candidates.iter().copied().collect();
    let mut ordered: Vec<TxId> = candidates.to_vec();
    ordered.sort_by_key(|id| graph.position(id).unwrap_or(usize::MAX));

    let mut best: Option<Vec<TxId>> = None;
    for start in ordered {
        let Some(cycle) = shortest_cycle_through(graph, start, &allowed) else {
            continue;
        };
        if best.as_ref().map_or(true, |b| cycle.len() < b.len()) {
            best = Some(cycle);
        }
        if best.as_ref().map_or(false, |b| b.len() == 1) {
            break;
        }
    }
    best
}

/// BFS from `start` back to itself inside `allowed`.
fn shortest_cycle_through(
    graph: &DependencyGraph,
    start: TxId,
    allowed: &HashSet<TxId>,
) -> Option<Vec<TxId>> {
    let mut parent: HashMap<TxId, TxId> = HashMap::new();
    let mut queue = VecDeque::from([start]);

    while let Some(node) = queue.pop_front() {
        for next in graph.successors(&node) {
            if *next == start {
                let mut path = vec![node];
                let mut cursor = node;
                while cursor != start {
                    cursor = *parent.get(&cursor)?;
                    path.push(cursor);
                }
                path.reverse();
                return Some(path);
            }
            if allowed.contains(next) && !parent.contains_key(next) {
                parent.insert(*next, node);
                queue.push_back(*next);
            }
        }
    }
    None
}

/// Flatten levels into one topological order.
pub fn topological_order(levels: &[Vec<TxId>]) -> Vec<TxId> {
    levels.iter().flatten().copied().collect()
}
