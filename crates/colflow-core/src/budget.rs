//! Abstract memory budget interfaces.
//!
//! The concrete implementation lives in `colflow-mem`; chain buffer pools
//! charge every output buffer against it.

/// Bytes held against a budget. Released on drop.
pub trait BudgetGuard: Send {
    fn bytes(&self) -> usize;

    fn tag(&self) -> &'static str {
        "guard"
    }
}

/// A memory-cap enforcer shared by all chains of one run.
///
/// `try_acquire` returning `None` means the cap would be exceeded; callers
/// surface that as an error rather than allocating anyway.
pub trait MemoryBudget: Send + Sync + 'static {
    type Guard: BudgetGuard;

    fn try_acquire(&self, bytes: usize, tag: &'static str) -> Option<Self::Guard>;

    fn capacity_bytes(&self) -> usize;

    /// Approximate currently used bytes (advisory).
    fn used_bytes(&self) -> usize;
}
