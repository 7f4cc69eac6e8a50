//! Execution layer
//!
//! - Cooperative cancellation
//! - Worker pools (rayon-backed and inline)
//! - Copy-on-write per-transaction views
//! - Level-parallel and serial executors

pub mod cancellation;
pub mod parallel;
pub mod pool;
pub mod serial;
pub mod view;

pub use cancellation::Cancellation;
pub use parallel::ParallelExecutor;
pub use pool::{InlineWorkerPool, LevelTask, RayonWorkerPool, WorkerPool};
pub use serial::{execute_serial, replay_serial};
pub use view::{BatchClock, TxOutcome};
