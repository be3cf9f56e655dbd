//! Engine configuration that downstream crates can serialize/deserialize.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Hard memory cap (in bytes) for buffers handed out by chain pools.
    pub mem_cap_bytes: usize,

    /// Rows per batch emitted by source operators and re-batching filters.
    pub batch_size: usize,

    /// Default segment count when the caller does not pick one.
    pub num_segments: usize,

    /// Worker threads used to run segment chains.
    pub max_parallel_tasks: usize,

    /// Upper bound on optimizer passes per stage before giving up on a fixpoint.
    pub max_optimizer_passes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mem_cap_bytes: 512 * 1024 * 1024, // 512 MiB default
            batch_size: 1024,
            num_segments: 4,
            max_parallel_tasks: 4,
            max_optimizer_passes: 64,
        }
    }
}

impl EngineConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `COLFLOW_MEM_CAP_BYTES`: memory cap in bytes
    /// - `COLFLOW_BATCH_SIZE`: rows per batch
    /// - `COLFLOW_NUM_SEGMENTS`: default segment count
    /// - `COLFLOW_MAX_PARALLEL_TASKS`: worker threads
    /// - `COLFLOW_MAX_OPTIMIZER_PASSES`: per-stage pass limit
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Some(v) = env_usize("COLFLOW_MEM_CAP_BYTES") {
            cfg.mem_cap_bytes = v;
        }
        if let Some(v) = env_usize("COLFLOW_BATCH_SIZE") {
            cfg.batch_size = v;
        }
        if let Some(v) = env_usize("COLFLOW_NUM_SEGMENTS") {
            cfg.num_segments = v;
        }
        if let Some(v) = env_usize("COLFLOW_MAX_PARALLEL_TASKS") {
            cfg.max_parallel_tasks = v;
        }
        if let Some(v) = env_usize("COLFLOW_MAX_OPTIMIZER_PASSES") {
            cfg.max_optimizer_passes = v;
        }

        cfg
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be > 0".into()));
        }
        if self.num_segments == 0 {
            return Err(Error::Config("num_segments must be > 0".into()));
        }
        if self.max_parallel_tasks == 0 {
            return Err(Error::Config("max_parallel_tasks must be > 0".into()));
        }
        if self.max_optimizer_passes == 0 {
            return Err(Error::Config("max_optimizer_passes must be > 0".into()));
        }
        Ok(())
    }
}

fn env_usize(name: &str) -> Option<usize> {
    std::env::var(name).ok().and_then(|s| s.parse::<usize>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let cfg = EngineConfig {
            batch_size: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn round_trips_through_json() {
        let cfg = EngineConfig {
            num_segments: 7,
            ..EngineConfig::default()
        };
        let text = serde_json::to_string(&cfg).unwrap();
        let back: EngineConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(cfg, back);
    }
}
