//! Domain module for batch execution
//!
//! Contains core entities, value objects, errors, invariants, result types
//! and atomic-batch lowering.

pub mod atomic_batch;
pub mod entities;
pub mod errors;
pub mod invariants;
pub mod results;
pub mod value_objects;

pub use atomic_batch::*;
pub use entities::*;
pub use errors::*;
pub use results::*;
pub use value_objects::*;
