//! Mask-based row filter.
//!
//! Keeps the rows of the data input whose mask value passes the non-zero
//! test. Surviving rows are gathered into full `batch_size` batches, so this
//! operator is not LINEAR: the output batch count and row count both depend
//! on the data. Rows waiting in the pending buffer are charged to the chain's
//! memory budget.

use colflow_core::types::ColumnBatch;
use colflow_mem::{batch_bytes, BudgetGuardImpl};

use crate::traits::{pull_aligned, ExecutionContext, OpError, Resume, Step};

#[derive(Debug, Default)]
enum FilterState {
    /// Pulling input pairs into the pending buffer.
    #[default]
    Pulling,
    /// Inputs exhausted; flushing what is left in the pending buffer.
    Draining,
    Exhausted,
}

#[derive(Debug, Clone, Default)]
pub struct LogicalFilterOp {
    state: Resume<FilterState>,
    pending: Resume<Option<ColumnBatch>>,
    /// Accounts for `pending`.
    held: Resume<Option<BudgetGuardImpl>>,
}

impl LogicalFilterOp {
    pub(crate) fn execute(&mut self, ctx: &mut dyn ExecutionContext) -> Result<Step, OpError> {
        let batch_size = ctx.batch_size();
        loop {
            match self.state.0 {
                FilterState::Pulling => {
                    if self.pending_rows() >= batch_size {
                        self.flush(ctx, batch_size)?;
                        return Ok(Step::Yield);
                    }
                    let Some(batches) = pull_aligned(ctx, "logical_filter", 2)? else {
                        self.state.0 = FilterState::Draining;
                        continue;
                    };
                    if self.pending.0.is_none() {
                        self.pending.0 = Some(ctx.get_output_buffer());
                    }
                    let (data, mask) = (&batches[0], &batches[1]);
                    if let Some(pending) = self.pending.0.as_mut() {
                        let keep: Vec<bool> =
                            mask.columns[0].values.iter().map(|v| v.is_truthy()).collect();
                        for (dst, src) in pending.columns.iter_mut().zip(&data.columns) {
                            let kept = src.values.iter().zip(&keep).filter(|(_, k)| **k);
                            dst.values.extend(kept.map(|(v, _)| v.clone()));
                        }
                    }
                    for b in batches {
                        ctx.recycle(b);
                    }
                    self.charge_pending(ctx)?;
                }
                FilterState::Draining => {
                    if self.pending_rows() == 0 {
                        self.pending.0 = None;
                        self.held.0 = None;
                        self.state.0 = FilterState::Exhausted;
                        continue;
                    }
                    self.flush(ctx, batch_size)?;
                    return Ok(Step::Yield);
                }
                FilterState::Exhausted => return Ok(Step::Done),
            }
        }
    }

    fn pending_rows(&self) -> usize {
        self.pending.0.as_ref().map_or(0, |b| b.num_rows())
    }

    /// Resize the pending buffer's guard to its current size.
    fn charge_pending(&mut self, ctx: &mut dyn ExecutionContext) -> Result<(), OpError> {
        let bytes = self.pending.0.as_ref().map_or(0, batch_bytes);
        let guard = self
            .held
            .0
            .get_or_insert_with(|| ctx.budget_guard("filter_pending"));
        guard.resize(bytes)?;
        Ok(())
    }

    /// Emit up to `batch_size` rows from the front of the pending buffer.
    fn flush(&mut self, ctx: &mut dyn ExecutionContext, batch_size: usize) -> Result<(), OpError> {
        let Some(pending) = self.pending.0.as_mut() else {
            return Ok(());
        };
        let take = batch_size.min(pending.num_rows());
        let mut out = ctx.get_output_buffer();
        for (dst, src) in out.columns.iter_mut().zip(pending.columns.iter_mut()) {
            dst.values.extend(src.values.drain(..take));
        }
        ctx.emit(out)
    }
}
