#![forbid(unsafe_code)]
//! colflow-mem: hard memory budgeting and per-chain batch pools.
//!
//! Concrete implementations of the interfaces in `colflow-core::budget`.
//! Every output buffer an operator obtains comes from a `BatchPool`, and every
//! batch in flight between two operators is charged against the shared
//! `MemoryBudgetImpl` until its consumer takes it.

pub mod error;
pub mod guard;
pub mod pool;
pub mod tracking;

pub use error::{Error, Result};
pub use guard::{BudgetGuardImpl, MemoryBudgetImpl};
pub use pool::{batch_bytes, BatchPool};
pub use tracking::{PeakTracker, PoolStats};
