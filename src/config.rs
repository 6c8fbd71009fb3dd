//! Runtime configuration (§6 "RuntimeConfig"): tuning knobs constructed
//! programmatically or from the environment variables named in §6.

use crate::error::{Error, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Recognized options, one field per §6 bullet. Unknown environment
/// variables are ignored; invalid values for a recognized variable fall
/// back to its documented default rather than failing `from_env`.
#[derive(Clone, Debug, PartialEq)]
pub struct RuntimeConfig {
    pub worker_threads: usize,
    pub step_interval_ms: u32,
    pub channel_capacity: usize,
    pub enable_checkpointing: bool,
    pub storage_path: Option<PathBuf>,

    pub flush_size: usize,
    pub flush_time_ms: u64,
    pub level_fanout: usize,
    pub compact_budget_ms: u64,
    pub smallset_n: usize,
    pub cancel_ewma: f64,
    pub spill_threshold: f64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            worker_threads: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
            step_interval_ms: 0,
            channel_capacity: 1024,
            enable_checkpointing: false,
            storage_path: None,
            flush_size: 64 * 1024,
            flush_time_ms: 20,
            level_fanout: 4,
            compact_budget_ms: 2,
            smallset_n: 512,
            cancel_ewma: 0.25,
            spill_threshold: 0.8,
        }
    }
}

impl RuntimeConfig {
    /// Reads the environment variables named in §6 (`ZSET_FLUSH_SIZE`,
    /// `ZSET_FLUSH_TIME_MS`, `ZSET_LEVEL_FANOUT`, `ZSET_COMPACT_BUDGET_MS`,
    /// `ZSET_SMALLSET_N`, `ZSET_CANCEL_EWMA`, `ZSET_SPILL_THRESHOLD`,
    /// `DELTAVIEW_WORKER_THREADS`, `DELTAVIEW_STEP_INTERVAL_MS`,
    /// `DELTAVIEW_CHANNEL_CAPACITY`, `DELTAVIEW_ENABLE_CHECKPOINTING`,
    /// `DELTAVIEW_STORAGE_PATH`), falling back to [`Default`] on any
    /// parse failure.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            worker_threads: env_usize("DELTAVIEW_WORKER_THREADS", defaults.worker_threads),
            step_interval_ms: env_u32("DELTAVIEW_STEP_INTERVAL_MS", defaults.step_interval_ms),
            channel_capacity: env_usize("DELTAVIEW_CHANNEL_CAPACITY", defaults.channel_capacity),
            enable_checkpointing: env_bool("DELTAVIEW_ENABLE_CHECKPOINTING", defaults.enable_checkpointing),
            storage_path: std::env::var("DELTAVIEW_STORAGE_PATH").ok().map(PathBuf::from).or(defaults.storage_path),
            flush_size: env_usize("ZSET_FLUSH_SIZE", defaults.flush_size),
            flush_time_ms: env_u64("ZSET_FLUSH_TIME_MS", defaults.flush_time_ms),
            level_fanout: env_usize("ZSET_LEVEL_FANOUT", defaults.level_fanout),
            compact_budget_ms: env_u64("ZSET_COMPACT_BUDGET_MS", defaults.compact_budget_ms),
            smallset_n: env_usize("ZSET_SMALLSET_N", defaults.smallset_n),
            cancel_ewma: env_f64("ZSET_CANCEL_EWMA", defaults.cancel_ewma),
            spill_threshold: env_f64("ZSET_SPILL_THRESHOLD", defaults.spill_threshold),
        }
    }

    pub fn flush_time(&self) -> Duration {
        Duration::from_millis(self.flush_time_ms)
    }

    pub fn compact_budget(&self) -> Duration {
        Duration::from_millis(self.compact_budget_ms)
    }

    /// Fatal at runtime creation per §7 `InvalidConfig`: bounds that
    /// would make the runtime unable to make progress.
    pub fn validate(&self) -> Result<()> {
        if self.worker_threads == 0 {
            return Err(Error::InvalidConfig("worker_threads must be >= 1".into()));
        }
        if self.channel_capacity == 0 {
            return Err(Error::InvalidConfig("channel_capacity must be >= 1".into()));
        }
        if !(0.0..=1.0).contains(&self.cancel_ewma) {
            return Err(Error::InvalidConfig("cancel_ewma must be in [0, 1]".into()));
        }
        if !(0.0..=1.0).contains(&self.spill_threshold) {
            return Err(Error::InvalidConfig("spill_threshold must be in [0, 1]".into()));
        }
        if self.enable_checkpointing && self.storage_path.is_none() {
            return Err(Error::InvalidConfig("enable_checkpointing requires storage_path".into()));
        }
        Ok(())
    }
}

fn env_usize(name: &str, default: usize) -> usize {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u32(name: &str, default: u32) -> u32 {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_f64(name: &str, default: f64) -> f64 {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_bool(name: &str, default: bool) -> bool {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(RuntimeConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_worker_threads_is_invalid() {
        let mut config = RuntimeConfig::default();
        config.worker_threads = 0;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn checkpointing_without_storage_path_is_invalid() {
        let mut config = RuntimeConfig::default();
        config.enable_checkpointing = true;
        config.storage_path = None;
        assert!(config.validate().is_err());
    }

    #[test]
    fn out_of_range_ewma_is_invalid() {
        let mut config = RuntimeConfig::default();
        config.cancel_ewma = 1.5;
        assert!(config.validate().is_err());
    }
}
