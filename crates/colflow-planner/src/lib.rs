#![forbid(unsafe_code)]
//! colflow-planner: staged rewrite-rule optimizer over the plan DAG.
//!
//! - `rules`: the rule trait and the rule library
//! - `registry`: rules grouped into stages `0..=MAX_STAGE`
//! - `engine`: the fixpoint stage driver
//! - `options`: `MaterializeOptions`, which decide the stages to run
//! - `analysis`: whether a plan can stream without partial materialization
//!
//! Stages, in order of increasing invasiveness: normalize, simplify,
//! exchange, split (may leave the plan non-materializable), consolidate, tag.

pub mod analysis;
pub mod engine;
pub mod options;
pub mod registry;
pub mod rules;

pub use analysis::{is_directly_materializable, LinearityCache};
pub use engine::{OptimizationEngine, OptimizationReport, StageReport};
pub use options::MaterializeOptions;
pub use registry::{stage_name, RuleRegistry, MAX_STAGE};
pub use rules::{OptimizationRule, RuleRef};
