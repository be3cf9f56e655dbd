//! Execution protocol shared by operators and the chain that drives them.
//!
//! An operator never talks to another operator directly. It pulls input
//! batches, asks for output buffers and hands results downstream through an
//! [`ExecutionContext`]. Each call to `Operator::execute` runs until the
//! operator has handed exactly one batch downstream (`Step::Yield`) or has
//! nothing left to produce (`Step::Done`).

use std::ops::Range;
use std::sync::Arc;

use colflow_core::id::SegmentId;
use colflow_core::types::ColumnBatch;
use colflow_mem::BudgetGuardImpl;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OpError {
    #[error("user function failed in {op}: {msg}")]
    Callback { op: &'static str, msg: String },

    #[error("type check failed in {op}: {msg}")]
    Type { op: &'static str, msg: String },

    #[error("misaligned inputs in {op}: {msg}")]
    Misaligned { op: &'static str, msg: String },

    #[error("execution error: {0}")]
    Exec(String),

    #[error(transparent)]
    Core(#[from] colflow_core::Error),

    #[error(transparent)]
    Mem(#[from] colflow_mem::Error),
}

/// Outcome of one `execute` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// One batch (or one skip marker) was handed downstream.
    Yield,
    /// End of stream. Further calls keep returning `Done`.
    Done,
}

/// The slice of the data set one chain is responsible for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub id: SegmentId,
    pub count: usize,
}

impl Segment {
    pub fn single() -> Self {
        Self {
            id: SegmentId::new(0),
            count: 1,
        }
    }

    /// Rows of `total` owned by this segment: `[s*L/N, (s+1)*L/N)` offset by
    /// `total.start`. Sources of equal length therefore split identically.
    pub fn rows(&self, total: Range<u64>) -> Range<u64> {
        let len = (total.end - total.start) as u128;
        let n = self.count.max(1) as u128;
        let s = self.id.get() as u128;
        let lo = (s * len / n) as u64;
        let hi = ((s + 1) * len / n) as u64;
        total.start + lo..total.start + hi
    }
}

/// What an operator may do while it runs.
pub trait ExecutionContext {
    /// Next batch of input `input`, or `None` at end of stream.
    fn get_next(&mut self, input: usize) -> Result<Option<Arc<ColumnBatch>>, OpError>;

    /// Drop the next batch of input `input` without materializing it when
    /// possible. Returns `false` at end of stream.
    fn skip_next(&mut self, input: usize) -> Result<bool, OpError>;

    /// Empty buffer shaped for this operator's output (column types and
    /// batch-size capacity).
    fn get_output_buffer(&mut self) -> ColumnBatch;

    /// Hand a finished batch downstream. The operator must return
    /// `Step::Yield` right after.
    fn emit(&mut self, batch: ColumnBatch) -> Result<(), OpError>;

    /// Hand an input batch downstream unchanged.
    fn forward(&mut self, batch: Arc<ColumnBatch>) -> Result<(), OpError>;

    /// True when the consumer only wants the next batch skipped.
    fn should_skip(&self) -> bool;

    /// Answer a skip request without producing data.
    fn emit_skipped(&mut self);

    /// Give a consumed input batch back to the buffer pool.
    fn recycle(&mut self, batch: Arc<ColumnBatch>);

    /// Empty guard on the chain's memory budget, for rows an operator
    /// holds across calls.
    fn budget_guard(&self, tag: &'static str) -> BudgetGuardImpl;

    fn segment(&self) -> Segment;

    /// Rows per batch produced by sources.
    fn batch_size(&self) -> usize;
}

/// Suspension state of an operator. Cloning yields the initial state, so a
/// cloned operator starts from the beginning of its stream.
#[derive(Debug, Default)]
pub struct Resume<S: Default>(pub S);

impl<S: Default> Clone for Resume<S> {
    fn clone(&self) -> Self {
        Self(S::default())
    }
}

/// Shared skip-mode handling for LINEAR operators: skip one batch on every
/// input and answer the skip. Returns `Done` when the inputs are exhausted.
pub(crate) fn skip_linear(
    ctx: &mut dyn ExecutionContext,
    op: &'static str,
    arity: usize,
) -> Result<Step, OpError> {
    let mut live = 0;
    for input in 0..arity {
        if ctx.skip_next(input)? {
            live += 1;
        }
    }
    if live == 0 {
        return Ok(Step::Done);
    }
    if live != arity {
        return Err(OpError::Misaligned {
            op,
            msg: "inputs ended at different batches".into(),
        });
    }
    ctx.emit_skipped();
    Ok(Step::Yield)
}

/// Pull one batch from each of `arity` aligned inputs.
///
/// `None` when every input is exhausted; an error when only some are or when
/// the batches disagree in row count.
pub(crate) fn pull_aligned(
    ctx: &mut dyn ExecutionContext,
    op: &'static str,
    arity: usize,
) -> Result<Option<Vec<Arc<ColumnBatch>>>, OpError> {
    let mut batches = Vec::with_capacity(arity);
    for input in 0..arity {
        if let Some(b) = ctx.get_next(input)? {
            batches.push(b);
        }
    }
    if batches.is_empty() {
        return Ok(None);
    }
    if batches.len() != arity {
        return Err(OpError::Misaligned {
            op,
            msg: "inputs ended at different batches".into(),
        });
    }
    check_rows(op, &batches)?;
    Ok(Some(batches))
}

pub(crate) fn check_rows(op: &'static str, batches: &[Arc<ColumnBatch>]) -> Result<(), OpError> {
    let rows = batches[0].num_rows();
    if let Some(b) = batches.iter().find(|b| b.num_rows() != rows) {
        return Err(OpError::Misaligned {
            op,
            msg: format!("batch row counts differ: {rows} vs {}", b.num_rows()),
        });
    }
    Ok(())
}
