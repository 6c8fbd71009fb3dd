//! Thresholds that drive the adaptive backend's layout transitions
//! (§4.1.1). Defaults are overridable per-instance and, failing that,
//! read once from the environment (§6, "Environment variables").

use once_cell::sync::Lazy;
use std::{env, time::Duration};

/// Tuning knobs for one Z-set's adaptive backend.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Policy {
    /// SmallVec -> Memtable promotion threshold (`N` in §4.1.1).
    pub smallset_n: usize,
    /// Memtable -> Trace flush size threshold (`S`).
    pub flush_size: usize,
    /// Memtable -> Trace flush time threshold (`T`).
    pub flush_time: Duration,
    /// Cancellation-rate EWMA threshold that forces a flush (`C`).
    pub cancel_ewma: f64,
    /// Trace level fan-out before compaction kicks in (`R`).
    pub level_fanout: usize,
    /// Per-step compaction time budget (`B`).
    pub compact_budget: Duration,
}

impl Default for Policy {
    fn default() -> Self {
        *DEFAULT_POLICY
    }
}

/// EWMA smoothing factor for insert-rate and cancellation-rate tracking.
pub const EWMA_ALPHA: f64 = 0.2;

static DEFAULT_POLICY: Lazy<Policy> = Lazy::new(|| Policy {
    smallset_n: env_usize("ZSET_SMALLSET_N", 512),
    flush_size: env_usize("ZSET_FLUSH_SIZE", 64 * 1024),
    flush_time: Duration::from_millis(env_u64("ZSET_FLUSH_TIME_MS", 20)),
    cancel_ewma: env_f64("ZSET_CANCEL_EWMA", 0.25),
    level_fanout: env_usize("ZSET_LEVEL_FANOUT", 4),
    compact_budget: Duration::from_millis(env_u64("ZSET_COMPACT_BUDGET_MS", 2)),
});

fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_f64(name: &str, default: f64) -> f64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Runtime statistics tracked per Z-set, used by the adaptive backend to
/// decide layout transitions (§4.1.1).
#[derive(Clone, Copy, Debug)]
pub struct Stats {
    pub insert_rate_ewma: f64,
    pub cancel_rate_ewma: f64,
    pub last_flush: Option<std::time::Instant>,
    pub arranged_subscribers: usize,
}

impl Default for Stats {
    fn default() -> Self {
        Self {
            insert_rate_ewma: 0.0,
            cancel_rate_ewma: 0.0,
            last_flush: None,
            arranged_subscribers: 0,
        }
    }
}

impl Stats {
    pub fn record_inserts(&mut self, n: usize, cancellations: usize) {
        let rate = n as f64;
        self.insert_rate_ewma = EWMA_ALPHA * rate + (1.0 - EWMA_ALPHA) * self.insert_rate_ewma;
        if n > 0 {
            let cancel_fraction = cancellations as f64 / n as f64;
            self.cancel_rate_ewma =
                EWMA_ALPHA * cancel_fraction + (1.0 - EWMA_ALPHA) * self.cancel_rate_ewma;
        }
    }

    /// Time elapsed since the last flush, treating "never flushed" as
    /// infinitely long ago so a fresh memtable is not flushed prematurely.
    pub fn since_last_flush(&self) -> Duration {
        match self.last_flush {
            Some(t) => t.elapsed(),
            None => Duration::MAX,
        }
    }
}
