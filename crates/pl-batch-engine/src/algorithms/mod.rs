//! Algorithms module for batch analysis
//!
//! Contains:
//! - Dependency graph builder (with minimal-cycle rejection)
//! - Conflict detector
//! - Kahn's level decomposition

pub mod conflict_detector;
pub mod dependency_builder;
pub mod kahns;

pub use conflict_detector::{apply_serialize_edges, detect_conflicts};
pub use dependency_builder::{build_dependency_graph, build_dependency_graph_bounded};
pub use kahns::{compute_levels, topological_order};
