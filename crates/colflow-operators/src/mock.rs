//! Scripted execution context shared by the operator unit tests.

use std::collections::VecDeque;
use std::sync::Arc;

use colflow_core::schema::DataType;
use colflow_core::types::{Column, ColumnBatch, Scalar};
use colflow_mem::{BudgetGuardImpl, MemoryBudgetImpl};

use crate::traits::{ExecutionContext, OpError, Segment, Step};
use crate::Operator;

pub(crate) enum Out {
    Batch(ColumnBatch),
    Skipped,
}

pub(crate) struct MockContext {
    inputs: Vec<VecDeque<Arc<ColumnBatch>>>,
    pub pulled: Vec<usize>,
    pub skipped: Vec<usize>,
    output_types: Vec<DataType>,
    batch_size: usize,
    skip_mode: bool,
    budget: MemoryBudgetImpl,
    pub out: Vec<Out>,
}

impl MockContext {
    pub fn new(inputs: Vec<Vec<ColumnBatch>>, output_types: Vec<DataType>) -> Self {
        let n = inputs.len();
        Self {
            inputs: inputs
                .into_iter()
                .map(|bs| bs.into_iter().map(Arc::new).collect())
                .collect(),
            pulled: vec![0; n],
            skipped: vec![0; n],
            output_types,
            batch_size: 4,
            skip_mode: false,
            budget: MemoryBudgetImpl::new(1 << 24),
            out: Vec::new(),
        }
    }

    pub fn with_batch_size(mut self, n: usize) -> Self {
        self.batch_size = n;
        self
    }

    pub fn skipping(mut self) -> Self {
        self.skip_mode = true;
        self
    }

    pub fn with_budget(mut self, bytes: usize) -> Self {
        self.budget = MemoryBudgetImpl::new(bytes);
        self
    }

    pub fn budget(&self) -> &MemoryBudgetImpl {
        &self.budget
    }

    /// Run `op` to completion, returning every emitted batch.
    pub fn drain(&mut self, op: &mut Operator) -> Result<Vec<ColumnBatch>, OpError> {
        while op.execute(self)? == Step::Yield {}
        Ok(self
            .out
            .drain(..)
            .filter_map(|o| match o {
                Out::Batch(b) => Some(b),
                Out::Skipped => None,
            })
            .collect())
    }
}

impl ExecutionContext for MockContext {
    fn get_next(&mut self, input: usize) -> Result<Option<Arc<ColumnBatch>>, OpError> {
        self.pulled[input] += 1;
        Ok(self.inputs[input].pop_front())
    }

    fn skip_next(&mut self, input: usize) -> Result<bool, OpError> {
        self.skipped[input] += 1;
        Ok(self.inputs[input].pop_front().is_some())
    }

    fn get_output_buffer(&mut self) -> ColumnBatch {
        ColumnBatch::new(
            self.output_types
                .iter()
                .map(|t| Column::with_capacity(*t, self.batch_size))
                .collect(),
        )
    }

    fn emit(&mut self, batch: ColumnBatch) -> Result<(), OpError> {
        self.out.push(Out::Batch(batch));
        Ok(())
    }

    fn forward(&mut self, batch: Arc<ColumnBatch>) -> Result<(), OpError> {
        self.out.push(Out::Batch((*batch).clone()));
        Ok(())
    }

    fn should_skip(&self) -> bool {
        self.skip_mode
    }

    fn emit_skipped(&mut self) {
        self.out.push(Out::Skipped);
    }

    fn recycle(&mut self, _batch: Arc<ColumnBatch>) {}

    fn budget_guard(&self, tag: &'static str) -> BudgetGuardImpl {
        self.budget.empty_guard(tag)
    }

    fn segment(&self) -> Segment {
        Segment::single()
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }
}

pub(crate) fn ints(vals: &[i64]) -> ColumnBatch {
    ColumnBatch::new(vec![Column::new(
        DataType::Int64,
        vals.iter().map(|v| Scalar::I64(*v)).collect(),
    )])
}

pub(crate) fn values(batch: &ColumnBatch, col: usize) -> Vec<i64> {
    batch.columns[col]
        .values
        .iter()
        .map(|v| match v {
            Scalar::I64(x) => *x,
            other => panic!("not an integer: {other:?}"),
        })
        .collect()
}
