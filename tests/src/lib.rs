//! # Parallel-Ledger Test Suite
//!
//! Unified test crate containing:
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── benchmarks/       # Criterion benchmark bodies
//! │   └── batch_engine.rs
//! │
//! └── integration/      # End-to-end batch scenarios and properties
//!     ├── fixtures.rs
//!     ├── scenarios.rs
//!     ├── properties.rs
//!     └── telemetry.rs
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p pl-tests
//!
//! # By category
//! cargo test -p pl-tests integration::scenarios::
//! cargo test -p pl-tests integration::properties::
//!
//! # Benchmarks
//! cargo bench -p pl-tests
//! ```

pub mod benchmarks;
pub mod integration;
