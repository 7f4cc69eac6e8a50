//! Atomic commit and rollback

pub mod commit_manager;

pub use commit_manager::CommitManager;
