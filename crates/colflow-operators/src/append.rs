//! Vertical append: every row of the first input, then every row of the
//! second.
//!
//! Batches pass through untouched, so the output batch boundaries are those
//! of the inputs. Not LINEAR: output row `i` is not input row `i` of any one
//! input, which also means the chain never asks an append to skip.

use crate::traits::{ExecutionContext, OpError, Resume, Step};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum AppendState {
    #[default]
    First,
    Second,
    Exhausted,
}

#[derive(Debug, Clone, Default)]
pub struct AppendOp {
    state: Resume<AppendState>,
}

impl AppendOp {
    pub(crate) fn execute(&mut self, ctx: &mut dyn ExecutionContext) -> Result<Step, OpError> {
        loop {
            let input = match self.state.0 {
                AppendState::First => 0,
                AppendState::Second => 1,
                AppendState::Exhausted => return Ok(Step::Done),
            };
            match ctx.get_next(input)? {
                Some(batch) => {
                    ctx.forward(batch)?;
                    return Ok(Step::Yield);
                }
                None if input == 0 => self.state.0 = AppendState::Second,
                None => self.state.0 = AppendState::Exhausted,
            }
        }
    }
}
