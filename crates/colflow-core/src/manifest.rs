//! Run manifest recorded for every materialization.
//!
//! Captures which plan ran (by fingerprint), how it was split into segments,
//! how many rows each segment produced and when the run started and finished.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::hash::Hash256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ManifestId(pub Uuid);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub id: ManifestId,

    /// Fingerprint of the plan as submitted.
    pub input_plan_hash: Hash256,

    /// Fingerprint of the plan after optimization.
    pub plan_hash: Hash256,

    /// Engine version string for provenance.
    pub engine_version: String,

    /// Optimizer stages that ran, in order.
    pub stages: Vec<usize>,

    /// Rows produced per segment, in segment order.
    pub segment_rows: Vec<u64>,

    /// Intermediate sub-plans executed ahead of the main plan.
    pub partial_materializations: usize,

    /// Milliseconds since Unix epoch (UTC).
    pub started_ms: u64,
    pub finished_ms: u64,
}

impl RunManifest {
    pub fn new(input_plan_hash: Hash256, started_ms: u64) -> Self {
        Self {
            id: ManifestId(Uuid::new_v4()),
            input_plan_hash,
            plan_hash: input_plan_hash,
            engine_version: crate::VERSION.to_string(),
            stages: Vec::new(),
            segment_rows: Vec::new(),
            partial_materializations: 0,
            started_ms,
            finished_ms: started_ms,
        }
    }

    pub fn finish(mut self, finished_ms: u64, segment_rows: Vec<u64>) -> Self {
        self.finished_ms = finished_ms;
        self.segment_rows = segment_rows;
        self
    }

    pub fn total_rows(&self) -> u64 {
        self.segment_rows.iter().sum()
    }
}
