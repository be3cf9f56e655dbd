//! Runtime: optimize a plan, make it streamable, run it per segment and
//! emit a `RunManifest`.
//!
//! - Optimizer stages are chosen by `MaterializeOptions`.
//! - Inputs that cannot stream in lockstep with their siblings are executed
//!   ahead of time into in-memory sources (partial materialization).
//! - Appends never split by segment: their inputs are executed first and
//!   then concatenated by a single chain.
//! - One chain per segment runs on the scheduler's worker pool; segment
//!   outputs are concatenated in segment order.
//! - Every in-flight batch is charged to the engine's `MemoryBudgetImpl`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tracing::{debug, info};

use colflow_core::config::EngineConfig;
use colflow_core::dag::{node_addr, OperatorKind, PNode};
use colflow_core::hash::fingerprint;
use colflow_core::infer::{infer_output_types, InferenceCache};
use colflow_core::make;
use colflow_core::manifest::RunManifest;
use colflow_core::source::MemorySource;
use colflow_core::types::{Column, ColumnBatch};

use colflow_mem::{MemoryBudgetImpl, PoolStats};
use colflow_operators::OpError;

use colflow_planner::{
    is_directly_materializable, LinearityCache, MaterializeOptions, OptimizationEngine,
    OptimizationReport, RuleRegistry,
};

use crate::chain::ChainPlan;
use crate::metrics;
use crate::scheduler::Scheduler;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("operator exec: {0}")]
    Operator(#[from] OpError),
    #[error("invalid plan: {0}")]
    Invalid(String),
    #[error(transparent)]
    Core(#[from] colflow_core::Error),
    #[error("worker thread panicked")]
    WorkerPanic,
    #[error("manifest encoding: {0}")]
    Manifest(#[from] serde_json::Error),
}

/// Result of one `Engine::materialize` call.
#[derive(Debug)]
pub struct Materialized {
    pub batch: ColumnBatch,
    pub manifest: RunManifest,
    pub report: OptimizationReport,
    /// Buffer pool counters summed over every chain that ran.
    pub pool: PoolStats,
}

impl Materialized {
    pub fn manifest_json(&self) -> Result<String, ExecError> {
        Ok(serde_json::to_string_pretty(&self.manifest)?)
    }
}

/// Engine owns the configuration, the shared memory budget and the optimizer.
pub struct Engine {
    cfg: EngineConfig,
    budget: MemoryBudgetImpl,
    optimizer: OptimizationEngine,
}

impl Engine {
    pub fn new(cfg: EngineConfig) -> Self {
        Self::with_registry(cfg, RuleRegistry::default())
    }

    pub fn with_registry(cfg: EngineConfig, registry: RuleRegistry) -> Self {
        let budget = MemoryBudgetImpl::new(cfg.mem_cap_bytes);
        let optimizer = OptimizationEngine::new(registry, cfg.max_optimizer_passes);
        Self {
            cfg,
            budget,
            optimizer,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    pub fn budget(&self) -> &MemoryBudgetImpl {
        &self.budget
    }

    pub fn optimizer(&self) -> &OptimizationEngine {
        &self.optimizer
    }

    /// Run the optimizer stages selected by `opts`.
    pub fn optimize(&self, plan: &PNode, opts: &MaterializeOptions) -> (PNode, OptimizationReport) {
        self.optimizer.optimize(plan, &opts.stages())
    }

    /// Evaluate `plan` into a single batch.
    pub fn materialize(
        &self,
        plan: &PNode,
        opts: &MaterializeOptions,
    ) -> Result<Materialized, ExecError> {
        self.cfg.validate()?;
        let segments = opts.num_segments.unwrap_or(self.cfg.num_segments);
        if segments == 0 {
            return Err(ExecError::Invalid("num_segments must be > 0".into()));
        }

        let mut manifest = RunManifest::new(fingerprint(plan), now_millis());
        manifest.stages = opts.stages();
        let (optimized, report) = self.optimize(plan, opts);
        info!(
            plan = %manifest.input_plan_hash,
            segments,
            rewrites = report.total_rewrites(),
            naive = opts.naive_mode,
            "materialize"
        );

        let mut pool = PoolStats::default();
        let mut pre = Materializer {
            engine: self,
            segments,
            memo: HashMap::new(),
            sources: HashMap::new(),
            linearity: LinearityCache::default(),
            executed: 0,
            pool: &mut pool,
        };
        let runnable = if opts.naive_mode {
            pre.naive(&optimized)?
        } else if opts.partial_materialize {
            pre.partial(&optimized)?
        } else if is_directly_materializable(&optimized) {
            optimized
        } else {
            return Err(ExecError::Invalid(
                "plan needs partial materialization, which is disabled".into(),
            ));
        };
        manifest.partial_materializations = pre.executed;
        manifest.plan_hash = fingerprint(&runnable);

        let (batch, segment_rows) = self.run_plan(&runnable, segments, &mut pool)?;
        let manifest = manifest.finish(now_millis(), segment_rows);
        info!(
            manifest = %manifest.id.0,
            rows = manifest.total_rows(),
            partial = manifest.partial_materializations,
            "materialized"
        );
        Ok(Materialized {
            batch,
            manifest,
            report,
            pool,
        })
    }

    /// Run a directly materializable plan as-is, one chain per segment.
    /// Returns the concatenated output and the per-segment row counts.
    pub fn execute(
        &self,
        plan: &PNode,
        segments: usize,
    ) -> Result<(ColumnBatch, Vec<u64>), ExecError> {
        if segments > 1 && !is_directly_materializable(plan) {
            return Err(ExecError::Invalid(format!(
                "{} plan cannot run as {segments} independent segments",
                plan.kind()
            )));
        }
        let mut pool = PoolStats::default();
        self.run_plan(plan, segments, &mut pool)
    }

    fn run_plan(
        &self,
        plan: &PNode,
        segments: usize,
        pool: &mut PoolStats,
    ) -> Result<(ColumnBatch, Vec<u64>), ExecError> {
        let chain_plan = ChainPlan::new(plan);
        let scheduler = Scheduler::new(self.cfg.max_parallel_tasks);
        debug!(nodes = chain_plan.len(), segments, "running plan");

        let outputs = scheduler.run_segments(segments, |segment| {
            let mut chain =
                chain_plan.instantiate(segment, self.cfg.batch_size, self.budget.clone());
            let batch = chain.run_to_batch()?;
            let stats = chain.pool_stats();
            metrics::chain_finished(segment, batch.num_rows(), stats, self.budget.peak_bytes());
            Ok((batch, stats))
        })?;

        let mut result = ColumnBatch::new(
            chain_plan
                .output_types()
                .iter()
                .map(|t| Column::new(*t, Vec::new()))
                .collect(),
        );
        let mut segment_rows = Vec::with_capacity(outputs.len());
        for (batch, stats) in &outputs {
            result.append_rows(batch)?;
            segment_rows.push(batch.num_rows() as u64);
            pool.merge(stats);
        }
        Ok((result, segment_rows))
    }

    /// Execute `plan` and wrap the result in an in-memory source node.
    fn execute_to_source(
        &self,
        plan: &PNode,
        segments: usize,
        pool: &mut PoolStats,
    ) -> Result<PNode, ExecError> {
        let (batch, _) = self.run_plan(plan, segments, pool)?;
        let source = MemorySource::from_batches(&infer_output_types(plan), [&batch])?;
        Ok(make::source(Arc::new(source)))
    }
}

/// Bottom-up rewriting of a plan into one that streams in lockstep.
struct Materializer<'a> {
    engine: &'a Engine,
    segments: usize,
    /// Original node address -> (original, replacement).
    memo: HashMap<usize, (PNode, PNode)>,
    /// Executed sub-plan address -> (sub-plan, source over its result).
    sources: HashMap<usize, (PNode, PNode)>,
    linearity: LinearityCache,
    executed: usize,
    pool: &'a mut PoolStats,
}

impl Materializer<'_> {
    /// Replace every non-LINEAR sub-plan feeding a multi-input node, and every
    /// append, with its materialized result.
    fn partial(&mut self, node: &PNode) -> Result<PNode, ExecError> {
        if let Some((_, done)) = self.memo.get(&node_addr(node)) {
            return Ok(done.clone());
        }
        let mut inputs = node
            .inputs()
            .iter()
            .map(|i| self.partial(i))
            .collect::<Result<Vec<_>, _>>()?;
        if node.kind() == OperatorKind::Append {
            for input in &mut inputs {
                if !input.attributes().source {
                    *input = self.execute(input)?;
                }
            }
            let appended = self.rebuild(node, inputs)?;
            let out = self.execute(&appended)?;
            self.memo.insert(node_addr(node), (node.clone(), out.clone()));
            return Ok(out);
        }
        if inputs.len() > 1 {
            for input in &mut inputs {
                if !self.linearity.is_linear_subtree(input) {
                    *input = self.execute(input)?;
                }
            }
        }
        let out = self.rebuild(node, inputs)?;
        self.memo.insert(node_addr(node), (node.clone(), out.clone()));
        Ok(out)
    }

    /// Materialize every non-source node on its own.
    fn naive(&mut self, node: &PNode) -> Result<PNode, ExecError> {
        if let Some((_, done)) = self.memo.get(&node_addr(node)) {
            return Ok(done.clone());
        }
        let inputs = node
            .inputs()
            .iter()
            .map(|i| self.naive(i))
            .collect::<Result<Vec<_>, _>>()?;
        let rebuilt = self.rebuild(node, inputs)?;
        let out = if node.attributes().source {
            rebuilt
        } else {
            self.execute(&rebuilt)?
        };
        self.memo.insert(node_addr(node), (node.clone(), out.clone()));
        Ok(out)
    }

    fn execute(&mut self, plan: &PNode) -> Result<PNode, ExecError> {
        if let Some((_, source)) = self.sources.get(&node_addr(plan)) {
            return Ok(source.clone());
        }
        self.executed += 1;
        // an append concatenates whole inputs, so it runs as one segment
        let segments = if plan.kind() == OperatorKind::Append {
            1
        } else {
            self.segments
        };
        debug!(kind = %plan.kind(), segments, "materializing sub-plan");
        let source = self
            .engine
            .execute_to_source(plan, segments, &mut *self.pool)?;
        self.sources
            .insert(node_addr(plan), (plan.clone(), source.clone()));
        Ok(source)
    }

    /// `node` over `inputs`, after checking that aligned multi-input nodes
    /// still see inputs of one length.
    fn rebuild(&self, node: &PNode, inputs: Vec<PNode>) -> Result<PNode, ExecError> {
        if inputs.iter().zip(node.inputs()).all(|(a, b)| Arc::ptr_eq(a, b)) {
            return Ok(node.clone());
        }
        if inputs.len() > 1 && node.kind() != OperatorKind::Append {
            let mut lengths = InferenceCache::default();
            let known: Vec<u64> =
                inputs.iter().filter_map(|i| lengths.output_length(i)).collect();
            if let Some(bad) = known.iter().find(|&&l| l != known[0]) {
                return Err(ExecError::Invalid(format!(
                    "inputs of {} have different lengths after materialization: {} vs {bad}",
                    node.kind(),
                    known[0]
                )));
            }
        }
        Ok(node.with_inputs(inputs))
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
