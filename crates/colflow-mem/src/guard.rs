//! MemoryBudget + RAII guard implementations.
//!
//! One budget is shared by every chain of a materialization. Guards return
//! their bytes on drop, so a chain that fails mid-flight releases everything
//! it held when its buffers are dropped.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use colflow_core::budget::{BudgetGuard, MemoryBudget};

use crate::error::{Error, Result};
use crate::tracking::PeakTracker;

struct BudgetInner {
    capacity: usize,
    used: AtomicUsize,
    peak: PeakTracker,
}

impl BudgetInner {
    fn try_acquire(&self, bytes: usize) -> bool {
        loop {
            let cur = self.used.load(Ordering::Relaxed);
            let next = cur.saturating_add(bytes);
            if next > self.capacity {
                return false;
            }
            if self
                .used
                .compare_exchange(cur, next, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                self.peak.record_used(next);
                return true;
            }
        }
    }

    fn release(&self, bytes: usize) {
        self.used.fetch_sub(bytes, Ordering::AcqRel);
    }
}

/// Lock-free byte budget shared across worker threads.
#[derive(Clone)]
pub struct MemoryBudgetImpl {
    inner: Arc<BudgetInner>,
}

impl std::fmt::Debug for MemoryBudgetImpl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBudgetImpl")
            .field("capacity", &self.inner.capacity)
            .field("used", &self.used_bytes())
            .field("peak", &self.peak_bytes())
            .finish()
    }
}

impl MemoryBudgetImpl {
    pub fn new(capacity_bytes: usize) -> Self {
        Self {
            inner: Arc::new(BudgetInner {
                capacity: capacity_bytes,
                used: AtomicUsize::new(0),
                peak: PeakTracker::new(),
            }),
        }
    }

    /// Highest `used_bytes` observed so far.
    pub fn peak_bytes(&self) -> usize {
        self.inner.peak.peak()
    }

    /// Like `try_acquire`, but reports the shortfall as an error.
    pub fn acquire(&self, bytes: usize, tag: &'static str) -> Result<BudgetGuardImpl> {
        self.try_acquire(bytes, tag)
            .ok_or_else(|| Error::BudgetExceeded {
                tag,
                requested: bytes,
                capacity: self.inner.capacity,
                used: self.used_bytes(),
            })
    }

    /// Empty guard that can later grow with `try_resize`.
    pub fn empty_guard(&self, tag: &'static str) -> BudgetGuardImpl {
        BudgetGuardImpl {
            inner: Arc::clone(&self.inner),
            bytes: 0,
            tag,
        }
    }
}

/// RAII guard that accounts for a number of bytes.
pub struct BudgetGuardImpl {
    inner: Arc<BudgetInner>,
    bytes: usize,
    tag: &'static str,
}

impl std::fmt::Debug for BudgetGuardImpl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BudgetGuard({} bytes, '{}')", self.bytes, self.tag)
    }
}

impl Drop for BudgetGuardImpl {
    fn drop(&mut self) {
        if self.bytes > 0 {
            self.inner.release(self.bytes);
            self.bytes = 0;
        }
    }
}

impl BudgetGuard for BudgetGuardImpl {
    fn bytes(&self) -> usize {
        self.bytes
    }
    fn tag(&self) -> &'static str {
        self.tag
    }
}

impl BudgetGuardImpl {
    /// Resize to `new_bytes`. Shrinking always succeeds; growing fails
    /// (leaving the guard unchanged) when it would exceed capacity.
    pub fn try_resize(&mut self, new_bytes: usize) -> bool {
        if new_bytes <= self.bytes {
            self.inner.release(self.bytes - new_bytes);
            self.bytes = new_bytes;
            return true;
        }
        if self.inner.try_acquire(new_bytes - self.bytes) {
            self.bytes = new_bytes;
            true
        } else {
            false
        }
    }

    /// Like `try_resize`, but reports the shortfall as an error.
    pub fn resize(&mut self, new_bytes: usize) -> Result<()> {
        if self.try_resize(new_bytes) {
            return Ok(());
        }
        Err(Error::BudgetExceeded {
            tag: self.tag,
            requested: new_bytes - self.bytes,
            capacity: self.inner.capacity,
            used: self.inner.used.load(Ordering::Relaxed),
        })
    }
}

impl MemoryBudget for MemoryBudgetImpl {
    type Guard = BudgetGuardImpl;

    fn try_acquire(&self, bytes: usize, tag: &'static str) -> Option<Self::Guard> {
        if bytes > 0 && !self.inner.try_acquire(bytes) {
            return None;
        }
        Some(BudgetGuardImpl {
            inner: Arc::clone(&self.inner),
            bytes,
            tag,
        })
    }

    fn capacity_bytes(&self) -> usize {
        self.inner.capacity
    }

    fn used_bytes(&self) -> usize {
        self.inner.used.load(Ordering::Relaxed)
    }
}
