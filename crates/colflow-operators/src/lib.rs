#![forbid(unsafe_code)]
//! colflow-operators: runtime operators driven through the pull protocol.
//!
//! Design intent:
//! - One closed `Operator` enum with a single `execute` dispatch point.
//! - Each operator is an explicit state machine; `execute` resumes where the
//!   previous call stopped and returns after handing one batch downstream.
//! - Operators only see data through `ExecutionContext`; buffers come from the
//!   chain's pool (`colflow-mem`), never from ad hoc allocation.

pub mod append;
pub mod filter;
pub mod operator;
pub mod project;
pub mod source;
pub mod ternary;
pub mod transform;
pub mod traits;

#[cfg(test)]
mod mock;

pub use operator::Operator;
pub use ternary::Selection;
pub use traits::{ExecutionContext, OpError, Segment, Step};
