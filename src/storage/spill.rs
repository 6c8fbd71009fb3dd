//! Spill coordination (§4.9 "Spill coordination"): a process-wide memory
//! pressure monitor and a coordinator operators consult before growing
//! in-memory state further.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Where a spilling operator should place new state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpillDestination {
    Memory,
    OnDisk,
    /// Adaptive: stay in memory until `threshold_bytes` estimated size,
    /// then spill.
    Adaptive { threshold_bytes: usize },
}

/// Samples available/used bytes and derives a pressure ratio in `[0,
/// 1]`. Backed by an explicit byte budget rather than OS-level RSS
/// sampling, since the latter has no portable stdlib API; callers that
/// want real RSS can feed `record_used` from their own measurement.
pub struct PressureMonitor {
    budget_bytes: usize,
    used_bytes: AtomicUsize,
}

impl PressureMonitor {
    pub fn new(budget_bytes: usize) -> Self {
        Self {
            budget_bytes,
            used_bytes: AtomicUsize::new(0),
        }
    }

    pub fn record_used(&self, bytes: usize) {
        self.used_bytes.store(bytes, Ordering::Relaxed);
    }

    /// Fraction of the budget currently in use, clamped to `[0, 1]`.
    pub fn pressure_ratio(&self) -> f64 {
        if self.budget_bytes == 0 {
            return 1.0;
        }
        let used = self.used_bytes.load(Ordering::Relaxed) as f64;
        (used / self.budget_bytes as f64).min(1.0)
    }
}

/// Decides whether and where an operator with an estimated `bytes` of
/// new state should spill, based on the monitor's pressure ratio
/// crossing `threshold`.
pub struct SpillCoordinator {
    monitor: PressureMonitor,
    threshold: f64,
}

impl SpillCoordinator {
    pub fn new(monitor: PressureMonitor, threshold: f64) -> Self {
        Self { monitor, threshold }
    }

    pub fn monitor(&self) -> &PressureMonitor {
        &self.monitor
    }

    /// `true` once the pressure ratio exceeds `threshold`, regardless of
    /// `estimated_bytes` — the estimate only feeds the destination
    /// picked by [`Self::destination_for`].
    pub fn should_spill(&self, _estimated_bytes: usize) -> bool {
        let ratio = self.monitor.pressure_ratio();
        let spill = ratio > self.threshold;
        if spill {
            log::debug!("spill pressure {:.2} exceeds threshold {:.2}", ratio, self.threshold);
        }
        spill
    }

    pub fn destination_for(&self, estimated_bytes: usize) -> SpillDestination {
        if self.should_spill(estimated_bytes) {
            SpillDestination::OnDisk
        } else {
            SpillDestination::Adaptive {
                threshold_bytes: estimated_bytes,
            }
        }
    }
}
