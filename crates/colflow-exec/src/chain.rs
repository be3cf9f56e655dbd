//! Execution chain: one segment's worth of operators wired into an arena.
//!
//! Every plan node reachable from the root becomes one `ExecNode`. Edges are
//! `(producer, queue)` pairs: a producer keeps one output queue per consuming
//! edge (plus one for the driver at the root), so shared sub-plans run once
//! per chain and every consumer sees every batch.
//!
//! Pulling is plain recursion: a consumer asking for input resumes the
//! producer through a `NodeContext` borrowing the chain mutably. The
//! producer's operator is taken out of its slot for the duration of the call,
//! which keeps the borrow of the arena free for the producer's own pulls.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use serde::Serialize;

use colflow_core::dag::{node_addr, OperatorKind, PNode};
use colflow_core::infer::InferenceCache;
use colflow_core::schema::DataType;
use colflow_core::types::{Column, ColumnBatch};
use colflow_mem::{BatchPool, BudgetGuardImpl, MemoryBudgetImpl, PoolStats};
use colflow_operators::{ExecutionContext, OpError, Operator, Segment, Step};

/// Recycled buffers kept per chain.
const POOL_IDLE_BATCHES: usize = 16;

#[derive(Debug, Clone, Copy)]
struct Edge {
    producer: usize,
    queue: usize,
}

/// Template node, shared by every chain built from the same plan.
#[derive(Debug, Clone)]
struct Slot {
    operator: Operator,
    linear: bool,
    inputs: Vec<Edge>,
    queues: usize,
    output_types: Arc<[DataType]>,
}

/// Arena layout of a plan, built once and instantiated per segment.
pub struct ChainPlan {
    slots: Vec<Slot>,
    root: usize,
    root_queue: usize,
    /// Node address -> slot. Holds the nodes so their addresses stay valid.
    index: Arc<HashMap<usize, (PNode, usize)>>,
}

impl ChainPlan {
    pub fn new(root: &PNode) -> Self {
        let mut builder = Builder::default();
        let root_idx = builder.visit(root);
        let root_queue = builder.slots[root_idx].queues;
        builder.slots[root_idx].queues += 1;
        Self {
            slots: builder.slots,
            root: root_idx,
            root_queue,
            index: Arc::new(builder.index),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn output_types(&self) -> &[DataType] {
        &self.slots[self.root].output_types
    }

    /// Fresh chain for one segment. Operators are cloned from the template,
    /// so each starts at the beginning of its stream.
    pub fn instantiate(
        &self,
        segment: Segment,
        batch_size: usize,
        budget: MemoryBudgetImpl,
    ) -> Chain {
        let nodes = self
            .slots
            .iter()
            .map(|slot| ExecNode {
                operator: Some(slot.operator.clone()),
                kind: slot.operator.kind(),
                linear: slot.linear,
                inputs: slot.inputs.clone(),
                queues: (0..slot.queues).map(|_| VecDeque::new()).collect(),
                output_types: slot.output_types.clone(),
                finished: false,
                skip_mode: false,
                produced: 0,
                stats: NodeStats::default(),
            })
            .collect();
        Chain {
            nodes,
            root: self.root,
            root_queue: self.root_queue,
            index: self.index.clone(),
            segment,
            batch_size: batch_size.max(1),
            pool: BatchPool::new(budget, POOL_IDLE_BATCHES),
        }
    }
}

#[derive(Default)]
struct Builder {
    slots: Vec<Slot>,
    index: HashMap<usize, (PNode, usize)>,
    types: InferenceCache,
}

impl Builder {
    /// Post-order: producers always get lower slot numbers than consumers.
    fn visit(&mut self, node: &PNode) -> usize {
        if let Some((_, idx)) = self.index.get(&node_addr(node)) {
            return *idx;
        }
        let mut inputs = Vec::with_capacity(node.inputs().len());
        for input in node.inputs() {
            let producer = self.visit(input);
            let queue = self.slots[producer].queues;
            self.slots[producer].queues += 1;
            inputs.push(Edge { producer, queue });
        }
        let idx = self.slots.len();
        self.slots.push(Slot {
            operator: Operator::from_plan_node(node),
            linear: node.attributes().linear,
            inputs,
            queues: 0,
            output_types: self.types.output_types(node).into(),
        });
        self.index.insert(node_addr(node), (node.clone(), idx));
        idx
    }
}

/// Per-node counters of one chain run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NodeStats {
    /// Times the operator was resumed.
    pub resumes: u64,
    /// Batches handed downstream (emitted or forwarded).
    pub batches: u64,
    /// Skip markers answered instead of batches.
    pub skipped: u64,
    pub rows: u64,
}

/// Queue entry. The guard keeps an emitted batch charged to the budget
/// until every consumer has taken it.
#[derive(Clone)]
enum Emitted {
    Batch(Arc<ColumnBatch>, Option<Arc<BudgetGuardImpl>>),
    Skipped,
}

struct ExecNode {
    /// `None` while the operator is running.
    operator: Option<Operator>,
    kind: OperatorKind,
    linear: bool,
    inputs: Vec<Edge>,
    queues: Vec<VecDeque<Emitted>>,
    output_types: Arc<[DataType]>,
    finished: bool,
    skip_mode: bool,
    /// Outputs handed downstream during the current resume.
    produced: usize,
    stats: NodeStats,
}

/// One segment's operators, their pending output and the chain's buffer pool.
pub struct Chain {
    nodes: Vec<ExecNode>,
    root: usize,
    root_queue: usize,
    index: Arc<HashMap<usize, (PNode, usize)>>,
    segment: Segment,
    batch_size: usize,
    pool: BatchPool,
}

impl Chain {
    pub fn segment(&self) -> Segment {
        self.segment
    }

    /// Next batch of the root's output, `None` at end of stream.
    pub fn next_batch(&mut self) -> Result<Option<Arc<ColumnBatch>>, OpError> {
        match self.pull(self.root, self.root_queue, false)? {
            Some(Emitted::Batch(batch, _guard)) => Ok(Some(batch)),
            Some(Emitted::Skipped) => Err(unexpected_skip(self.nodes[self.root].kind)),
            None => Ok(None),
        }
    }

    /// Drain the root into one batch, rows in stream order.
    pub fn run_to_batch(&mut self) -> Result<ColumnBatch, OpError> {
        let types = self.nodes[self.root].output_types.clone();
        let mut out = ColumnBatch::new(types.iter().map(|t| Column::new(*t, Vec::new())).collect());
        while let Some(batch) = self.next_batch()? {
            out.append_rows(&batch)?;
            self.recycle_batch(batch);
        }
        Ok(out)
    }

    /// Slot of `node` in this chain, if the node is part of the plan.
    pub fn node_index(&self, node: &PNode) -> Option<usize> {
        self.index.get(&node_addr(node)).map(|(_, idx)| *idx)
    }

    pub fn stats(&self, idx: usize) -> NodeStats {
        self.nodes[idx].stats
    }

    pub fn stats_for(&self, node: &PNode) -> Option<NodeStats> {
        self.node_index(node).map(|idx| self.stats(idx))
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    fn recycle_batch(&mut self, batch: Arc<ColumnBatch>) {
        if let Ok(batch) = Arc::try_unwrap(batch) {
            self.pool.recycle(batch);
        }
    }

    /// Next entry of `producer`'s output `queue`, resuming the producer as
    /// needed. With `skip`, a single-consumer LINEAR producer is resumed in
    /// skip mode; any other producer computes the batch and it is dropped by
    /// the caller.
    fn pull(
        &mut self,
        producer: usize,
        queue: usize,
        skip: bool,
    ) -> Result<Option<Emitted>, OpError> {
        loop {
            let node = &mut self.nodes[producer];
            if let Some(entry) = node.queues[queue].pop_front() {
                return Ok(Some(entry));
            }
            if node.finished {
                return Ok(None);
            }
            let skip_mode = skip && node.linear && node.queues.len() == 1;
            self.resume(producer, skip_mode)?;
        }
    }

    fn resume(&mut self, idx: usize, skip_mode: bool) -> Result<(), OpError> {
        let kind = self.nodes[idx].kind;
        let mut op = self.nodes[idx]
            .operator
            .take()
            .ok_or_else(|| OpError::Exec(format!("{kind} resumed while already running")))?;
        {
            let node = &mut self.nodes[idx];
            node.skip_mode = skip_mode;
            node.produced = 0;
            node.stats.resumes += 1;
        }
        let step = op.execute(&mut NodeContext {
            chain: &mut *self,
            node: idx,
        });
        let node = &mut self.nodes[idx];
        node.operator = Some(op);
        node.skip_mode = false;
        match step? {
            Step::Yield if node.produced == 1 => Ok(()),
            Step::Yield => Err(OpError::Exec(format!(
                "{kind} yielded after handing {} outputs downstream, expected exactly one",
                node.produced
            ))),
            Step::Done if node.produced == 0 => {
                node.finished = true;
                Ok(())
            }
            Step::Done => Err(OpError::Exec(format!(
                "{kind} finished after handing a batch downstream without yielding"
            ))),
        }
    }

    fn push_output(&mut self, idx: usize, entry: Emitted) {
        let node = &mut self.nodes[idx];
        node.produced += 1;
        if let Some((last, rest)) = node.queues.split_last_mut() {
            for q in rest {
                q.push_back(entry.clone());
            }
            last.push_back(entry);
        }
    }

    fn check_types(&self, idx: usize, batch: &ColumnBatch) -> Result<(), OpError> {
        let node = &self.nodes[idx];
        if batch.num_columns() != node.output_types.len()
            || batch.columns.iter().zip(node.output_types.iter()).any(|(c, t)| c.data_type != *t)
        {
            return Err(OpError::Type {
                op: node.kind.name(),
                msg: format!(
                    "batch columns {:?} do not match inferred types {:?}",
                    batch.types(),
                    node.output_types
                ),
            });
        }
        Ok(())
    }
}

fn unexpected_skip(kind: OperatorKind) -> OpError {
    OpError::Exec(format!("{kind} answered a pull with a skip marker"))
}

/// The context one operator sees while it is being resumed.
struct NodeContext<'a> {
    chain: &'a mut Chain,
    node: usize,
}

impl NodeContext<'_> {
    fn edge(&self, input: usize) -> Result<Edge, OpError> {
        let node = &self.chain.nodes[self.node];
        node.inputs.get(input).copied().ok_or_else(|| {
            OpError::Exec(format!("{} has no input {input}", node.kind))
        })
    }
}

impl ExecutionContext for NodeContext<'_> {
    fn get_next(&mut self, input: usize) -> Result<Option<Arc<ColumnBatch>>, OpError> {
        let edge = self.edge(input)?;
        match self.chain.pull(edge.producer, edge.queue, false)? {
            Some(Emitted::Batch(batch, _guard)) => Ok(Some(batch)),
            Some(Emitted::Skipped) => Err(unexpected_skip(self.chain.nodes[edge.producer].kind)),
            None => Ok(None),
        }
    }

    fn skip_next(&mut self, input: usize) -> Result<bool, OpError> {
        let edge = self.edge(input)?;
        match self.chain.pull(edge.producer, edge.queue, true)? {
            Some(Emitted::Batch(batch, guard)) => {
                drop(guard);
                self.chain.recycle_batch(batch);
                Ok(true)
            }
            Some(Emitted::Skipped) => Ok(true),
            None => Ok(false),
        }
    }

    fn get_output_buffer(&mut self) -> ColumnBatch {
        let types = self.chain.nodes[self.node].output_types.clone();
        self.chain.pool.acquire(&types, self.chain.batch_size)
    }

    fn emit(&mut self, batch: ColumnBatch) -> Result<(), OpError> {
        self.chain.check_types(self.node, &batch)?;
        batch.validate()?;
        let guard = self.chain.pool.charge(&batch, "in_flight")?;
        let stats = &mut self.chain.nodes[self.node].stats;
        stats.batches += 1;
        stats.rows += batch.num_rows() as u64;
        self.chain
            .push_output(self.node, Emitted::Batch(Arc::new(batch), Some(Arc::new(guard))));
        Ok(())
    }

    fn forward(&mut self, batch: Arc<ColumnBatch>) -> Result<(), OpError> {
        self.chain.check_types(self.node, &batch)?;
        let stats = &mut self.chain.nodes[self.node].stats;
        stats.batches += 1;
        stats.rows += batch.num_rows() as u64;
        self.chain.push_output(self.node, Emitted::Batch(batch, None));
        Ok(())
    }

    fn should_skip(&self) -> bool {
        self.chain.nodes[self.node].skip_mode
    }

    fn emit_skipped(&mut self) {
        self.chain.nodes[self.node].stats.skipped += 1;
        self.chain.push_output(self.node, Emitted::Skipped);
    }

    fn recycle(&mut self, batch: Arc<ColumnBatch>) {
        self.chain.recycle_batch(batch);
    }

    fn budget_guard(&self, tag: &'static str) -> BudgetGuardImpl {
        self.chain.pool.budget().empty_guard(tag)
    }

    fn segment(&self) -> Segment {
        self.chain.segment
    }

    fn batch_size(&self) -> usize {
        self.chain.batch_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use colflow_core::dag::Literal;
    use colflow_core::make;
    use colflow_core::types::Scalar;

    fn run(root: &PNode, batch_size: usize) -> (ColumnBatch, Chain) {
        let plan = ChainPlan::new(root);
        let budget = MemoryBudgetImpl::new(1 << 24);
        let mut chain = plan.instantiate(Segment::single(), batch_size, budget);
        let out = chain.run_to_batch().unwrap();
        (out, chain)
    }

    fn ints(batch: &ColumnBatch, col: usize) -> Vec<i64> {
        batch.columns[col]
            .values
            .iter()
            .map(|v| match v {
                Scalar::I64(x) => *x,
                other => panic!("not an integer: {other:?}"),
            })
            .collect()
    }

    #[test]
    fn shared_inputs_run_once_per_chain() {
        let r = make::range(0, 10);
        let root = make::union(&r, &r);
        let (out, chain) = run(&root, 4);
        assert_eq!(ints(&out, 0), ints(&out, 1));
        assert_eq!(out.num_rows(), 10);
        let stats = chain.stats_for(&r).unwrap();
        assert_eq!(stats.batches, 3);
        assert_eq!(stats.rows, 10);
    }

    #[test]
    fn builder_orders_producers_first() {
        let r = make::range(0, 3);
        let p = make::project(&make::union(&r, &r), &[1]);
        let plan = ChainPlan::new(&p);
        assert_eq!(plan.len(), 3);
        assert_eq!(plan.root, 2);
        assert_eq!(plan.slots[0].queues, 2);
        assert_eq!(plan.slots[2].queues, 1);
    }

    #[test]
    fn skipped_single_consumer_sources_do_not_read() {
        let c = make::constant(Literal::Int(0), 6);
        let t = make::range(0, 6);
        let f = make::range(100, 106);
        let root = make::ternary(&c, &t, &f);
        let (out, chain) = run(&root, 4);
        assert_eq!(ints(&out, 0), (100..106).collect::<Vec<_>>());
        let skipped = chain.stats_for(&t).unwrap();
        assert_eq!(skipped.batches, 0);
        assert_eq!(skipped.skipped, 2);
    }

    #[test]
    fn emit_is_charged_against_the_budget() {
        let root = make::range(0, 100);
        let plan = ChainPlan::new(&root);
        let mut chain = plan.instantiate(Segment::single(), 64, MemoryBudgetImpl::new(16));
        assert!(matches!(chain.run_to_batch(), Err(OpError::Mem(_))));
    }

    #[test]
    fn append_of_a_shared_input_reads_it_once() {
        let r = make::range(0, 5);
        let root = make::append(&r, &r);
        let (out, chain) = run(&root, 2);
        assert_eq!(ints(&out, 0), vec![0, 1, 2, 3, 4, 0, 1, 2, 3, 4]);
        let stats = chain.stats_for(&r).unwrap();
        assert_eq!(stats.rows, 5);
        assert_eq!(chain.stats_for(&root).unwrap().batches, 6);
    }
}
