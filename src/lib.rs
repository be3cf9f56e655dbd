#![forbid(unsafe_code)]
//! colflow: out-of-core columnar query execution.
//!
//! Facade over the workspace crates:
//! - `colflow_core`: plan DAG, factories, inference, batches, config
//! - `colflow_mem`: memory budget and per-chain buffer pools
//! - `colflow_operators`: pull-protocol operators
//! - `colflow_planner`: staged rewrite optimizer
//! - `colflow_exec`: chains, scheduler, `Engine::materialize`

pub use colflow_core;
pub use colflow_exec;
pub use colflow_mem;
pub use colflow_operators;
pub use colflow_planner;

pub use colflow_core::config::EngineConfig;
pub use colflow_core::dag::{make_plan_node, PNode};
pub use colflow_core::explain::repr;
pub use colflow_core::infer::{infer_output_length, infer_output_types};
pub use colflow_core::make;
pub use colflow_exec::{Engine, ExecError, Materialized};
pub use colflow_planner::MaterializeOptions;
