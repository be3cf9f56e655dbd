#![forbid(unsafe_code)]
//! colflow-core: shared types for the colflow query engine.
//!
//! - `dag`: the immutable, `Arc`-shared plan-node DAG and `make_plan_node`
//! - `make`: typed factories per operator kind
//! - `infer`: type and length inference (never touches data)
//! - `explain`: `repr` for diagnostics
//! - `slice`: row slicing of whole plans
//! - `types`/`schema`: scalar values, columns, batches, data types
//! - `source`: the boundary to the storage/reader layer
//! - `config`, `manifest`, `hash`, `budget`: ambient engine plumbing
//!
//! No threads, no I/O and no execution logic live here.

pub mod budget;
pub mod config;
pub mod dag;
pub mod error;
pub mod explain;
pub mod hash;
pub mod id;
pub mod infer;
pub mod make;
pub mod manifest;
pub mod prelude;
pub mod schema;
pub mod slice;
pub mod source;
pub mod types;

pub use prelude::*;

/// Engine version recorded in run manifests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
