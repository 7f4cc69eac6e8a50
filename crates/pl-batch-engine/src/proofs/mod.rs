//! Linearizability and conservation proofs

pub mod conservation;
pub mod encoding;
pub mod linearizability;
pub mod solver;

pub use conservation::{ConservationReport, ConservationValidator, CONSERVATION_FORMAT};
pub use encoding::{Constraint, ConstraintSystem};
pub use linearizability::{LinearizabilityProver, LINEARIZABILITY_FORMAT};
pub use solver::{SolverSession, SolveOutcome};
