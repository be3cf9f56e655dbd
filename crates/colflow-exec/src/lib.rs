#![forbid(unsafe_code)]
//! colflow-exec: execution chains, segment scheduling and run manifests.
//!
//! `Engine::materialize` optimizes a plan, pre-executes the sub-plans that
//! cannot stream in lockstep, then runs one chain per segment on a worker
//! pool and concatenates the segment outputs in order.

pub mod chain;
pub mod metrics;
pub mod runtime;
pub mod scheduler;

pub use chain::{Chain, ChainPlan, NodeStats};
pub use runtime::{Engine, ExecError, Materialized};
pub use scheduler::Scheduler;
