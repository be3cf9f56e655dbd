//! Per-row selection between two branches.
//!
//! The condition batch decides how much of each branch is needed. When it is
//! uniformly true (or uniformly false) the unused branch batch is skipped,
//! so nothing upstream of it computes that batch.

use crate::traits::{check_rows, skip_linear, ExecutionContext, OpError, Step};

const COND: usize = 0;
const IS_TRUE: usize = 1;
const IS_FALSE: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Selection {
    /// Condition non-zero everywhere (also used for empty batches).
    #[default]
    AllTrue,
    AllFalse,
    Mixed,
}

#[derive(Debug, Clone, Default)]
pub struct TernaryOp {
    last: Selection,
}

impl TernaryOp {
    /// Selection taken for the most recent batch.
    pub fn last_selection(&self) -> Selection {
        self.last
    }

    pub(crate) fn execute(&mut self, ctx: &mut dyn ExecutionContext) -> Result<Step, OpError> {
        if ctx.should_skip() {
            return skip_linear(ctx, "ternary", 3);
        }
        let Some(cond) = ctx.get_next(COND)? else {
            return Ok(Step::Done);
        };
        let rows = cond.num_rows();
        let truthy = cond.columns[0].values.iter().filter(|v| v.is_truthy()).count();
        self.last = if truthy == rows {
            Selection::AllTrue
        } else if truthy == 0 {
            Selection::AllFalse
        } else {
            Selection::Mixed
        };

        match self.last {
            Selection::AllTrue | Selection::AllFalse => {
                let (used, unused) = if self.last == Selection::AllTrue {
                    (IS_TRUE, IS_FALSE)
                } else {
                    (IS_FALSE, IS_TRUE)
                };
                let skipped = ctx.skip_next(unused)?;
                let branch = ctx.get_next(used)?;
                let Some(branch) = branch.filter(|_| skipped) else {
                    return Err(misaligned());
                };
                check_rows("ternary", &[cond.clone(), branch.clone()])?;
                ctx.recycle(cond);
                ctx.forward(branch)?;
            }
            Selection::Mixed => {
                let (Some(t), Some(f)) = (ctx.get_next(IS_TRUE)?, ctx.get_next(IS_FALSE)?) else {
                    return Err(misaligned());
                };
                check_rows("ternary", &[cond.clone(), t.clone(), f.clone()])?;
                let mut out = ctx.get_output_buffer();
                let picks = cond.columns[0].values.iter().map(|c| c.is_truthy());
                for (row, pick_true) in picks.enumerate() {
                    let src = if pick_true { &t } else { &f };
                    out.columns[0].values.push(src.columns[0].values[row].clone());
                }
                for b in [cond, t, f] {
                    ctx.recycle(b);
                }
                ctx.emit(out)?;
            }
        }
        Ok(Step::Yield)
    }
}

fn misaligned() -> OpError {
    OpError::Misaligned {
        op: "ternary",
        msg: "branch ended before the condition".into(),
    }
}
