//! Caller-facing knobs for a materialization.

use serde::{Deserialize, Serialize};

use crate::registry::{FIRST_PASS_STAGES, MAX_STAGE};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterializeOptions {
    /// Execute the plan exactly as built.
    pub disable_optimization: bool,

    /// Run only the cheap planning-time stages.
    pub only_first_pass_optimizations: bool,

    /// Materialize every non-source node on its own, bottom-up. Slow; used
    /// as a reference when checking the streaming path. Combines with any
    /// optimizer setting.
    pub naive_mode: bool,

    /// Segment count; the engine config decides when `None`.
    pub num_segments: Option<usize>,

    /// Pre-execute inputs that cannot stream in lockstep with their siblings.
    pub partial_materialize: bool,
}

impl Default for MaterializeOptions {
    fn default() -> Self {
        Self {
            disable_optimization: false,
            only_first_pass_optimizations: false,
            naive_mode: false,
            num_segments: None,
            partial_materialize: true,
        }
    }
}

impl MaterializeOptions {
    /// Optimizer stages to run, in order.
    pub fn stages(&self) -> Vec<usize> {
        if self.disable_optimization {
            Vec::new()
        } else if self.only_first_pass_optimizations {
            FIRST_PASS_STAGES.collect()
        } else {
            (0..=MAX_STAGE).collect()
        }
    }

    pub fn unoptimized() -> Self {
        Self {
            disable_optimization: true,
            ..Self::default()
        }
    }

    /// Optimized plan, every node materialized on its own.
    pub fn naive() -> Self {
        Self {
            naive_mode: true,
            ..Self::default()
        }
    }

    pub fn with_segments(mut self, n: usize) -> Self {
        self.num_segments = Some(n);
        self
    }
}
