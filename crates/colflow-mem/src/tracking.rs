//! Lightweight peak and pool-usage tracking.

use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

#[derive(Default)]
pub struct PeakTracker {
    peak_bytes: AtomicUsize,
}

impl PeakTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new "used bytes" value; updates peak if higher.
    pub fn record_used(&self, used_bytes: usize) {
        let prev = self.peak_bytes.fetch_max(used_bytes, Ordering::AcqRel);
        #[cfg(feature = "tracing")]
        tracing::trace!(used_bytes, new_peak = used_bytes > prev, "mem usage");
        #[cfg(not(feature = "tracing"))]
        let _ = prev;
    }

    pub fn peak(&self) -> usize {
        self.peak_bytes.load(Ordering::Relaxed)
    }
}

/// Per-chain buffer counters. Chains are single-threaded, so plain integers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Buffers created because no recycled one fit.
    pub allocated: u64,
    /// Buffers handed out again after a `recycle`.
    pub reused: u64,
    /// Buffers returned to the pool.
    pub recycled: u64,
    /// Returned buffers dropped because the pool was full or over budget.
    pub discarded: u64,
}

impl PoolStats {
    pub fn merge(&mut self, other: &PoolStats) {
        self.allocated += other.allocated;
        self.reused += other.reused;
        self.recycled += other.recycled;
        self.discarded += other.discarded;
    }
}
