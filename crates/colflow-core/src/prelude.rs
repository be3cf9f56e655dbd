//! Convenient re-exports for downstream crates.

pub use crate::config::EngineConfig;
pub use crate::dag::{
    make_plan_node, BinaryOp, Literal, OpaqueValue, OperatorAttributes, OperatorKind, PNode,
    PlanNode,
};
pub use crate::error::{Error, Result};
pub use crate::explain::repr;
pub use crate::hash::{fingerprint, Hash256};
pub use crate::id::SegmentId;
pub use crate::infer::{infer_output_length, infer_output_types};
pub use crate::manifest::{ManifestId, RunManifest};
pub use crate::schema::DataType;
pub use crate::slice::slice;
pub use crate::source::{BatchSource, MemorySource};
pub use crate::types::{Column, ColumnBatch, Scalar};
