//! Configuration for the batch engine

use crate::domain::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Worker pool bounds
pub const MIN_WORKERS: usize = 2;
pub const MAX_WORKERS: usize = 16;

/// Engine configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Worker threads per batch
    pub worker_count: usize,
    /// Wall-clock bound on the parallel phase
    pub batch_timeout: Duration,
    /// Time budget for the linearizability search
    pub proof_budget: Duration,
    /// Maximum transactions per batch
    pub max_batch_size: usize,
    /// Maximum edges in dependency graph (anti-DoS)
    pub max_edge_count: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_count: 8,
            batch_timeout: Duration::from_secs(300),
            proof_budget: Duration::from_secs(30),
            max_batch_size: 10_000,
            max_edge_count: 1_000_000,
        }
    }
}

impl EngineConfig {
    /// Read configuration from the environment, falling back to defaults.
    ///
    /// # Environment Variables
    ///
    /// - `PL_WORKER_COUNT`: worker pool size (default: 8, 2..=16)
    /// - `PL_BATCH_TIMEOUT_SECS`: parallel phase timeout (default: 300)
    /// - `PL_PROOF_BUDGET_SECS`: proof search budget (default: 30)
    /// - `PL_MAX_BATCH_SIZE`: transactions per batch (default: 10000)
    /// - `PL_MAX_EDGE_COUNT`: dependency edges per batch (default: 1000000)
    ///
    /// Unparseable values keep the default; range checks happen in [`validate`](Self::validate).
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            worker_count: env_parse("PL_WORKER_COUNT").unwrap_or(defaults.worker_count),
            batch_timeout: env_parse("PL_BATCH_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.batch_timeout),
            proof_budget: env_parse("PL_PROOF_BUDGET_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.proof_budget),
            max_batch_size: env_parse("PL_MAX_BATCH_SIZE").unwrap_or(defaults.max_batch_size),
            max_edge_count: env_parse("PL_MAX_EDGE_COUNT").unwrap_or(defaults.max_edge_count),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_WORKERS..=MAX_WORKERS).contains(&self.worker_count) {
            return Err(ConfigError::OutOfRange {
                name: "worker_count",
                value: self.worker_count as u64,
                min: MIN_WORKERS as u64,
                max: MAX_WORKERS as u64,
            });
        }
        if self.batch_timeout.is_zero() {
            return Err(ConfigError::Zero("batch_timeout"));
        }
        if self.max_batch_size == 0 {
            return Err(ConfigError::Zero("max_batch_size"));
        }
        if self.max_edge_count == 0 {
            return Err(ConfigError::Zero("max_edge_count"));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
