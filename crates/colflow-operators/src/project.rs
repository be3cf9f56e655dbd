//! Column reshaping: projection and horizontal union.

use colflow_core::dag::PNode;

use crate::traits::{pull_aligned, skip_linear, ExecutionContext, OpError, Step};

#[derive(Debug, Clone)]
pub struct ProjectOp {
    indices: Vec<usize>,
    /// Selects every input column in order; batches pass through untouched.
    identity: bool,
}

impl ProjectOp {
    pub(crate) fn from_node(node: &PNode) -> Self {
        let indices = node.indices_param("indices");
        let input_width = colflow_core::infer::infer_output_types(node.input(0)).len();
        let identity =
            indices.len() == input_width && indices.iter().enumerate().all(|(i, &c)| i == c);
        Self { indices, identity }
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub(crate) fn execute(&mut self, ctx: &mut dyn ExecutionContext) -> Result<Step, OpError> {
        if ctx.should_skip() {
            return skip_linear(ctx, "project", 1);
        }
        let Some(batch) = ctx.get_next(0)? else {
            return Ok(Step::Done);
        };
        if self.identity {
            ctx.forward(batch)?;
            return Ok(Step::Yield);
        }
        let mut out = ctx.get_output_buffer();
        for (dst, &idx) in out.columns.iter_mut().zip(&self.indices) {
            dst.values.extend(batch.columns[idx].values.iter().cloned());
        }
        ctx.recycle(batch);
        ctx.emit(out)?;
        Ok(Step::Yield)
    }
}

#[derive(Debug, Clone, Default)]
pub struct UnionOp;

impl UnionOp {
    pub(crate) fn execute(&mut self, ctx: &mut dyn ExecutionContext) -> Result<Step, OpError> {
        if ctx.should_skip() {
            return skip_linear(ctx, "union", 2);
        }
        let Some(batches) = pull_aligned(ctx, "union", 2)? else {
            return Ok(Step::Done);
        };
        let mut out = ctx.get_output_buffer();
        let sources = batches.iter().flat_map(|b| b.columns.iter());
        for (dst, src) in out.columns.iter_mut().zip(sources) {
            dst.values.extend(src.values.iter().cloned());
        }
        for b in batches {
            ctx.recycle(b);
        }
        ctx.emit(out)?;
        Ok(Step::Yield)
    }
}

#[cfg(test)]
mod tests {
    use colflow_core::make;
    use colflow_core::schema::DataType;
    use colflow_core::types::ColumnBatch;

    use crate::mock::{ints, values, MockContext};
    use crate::Operator;

    #[test]
    fn project_reorders_columns() {
        let r = make::range(0, 3);
        let input = make::union(&make::union(&r, &r), &r);
        let mut op = Operator::from_plan_node(&make::project(&input, &[2, 0]));

        let mut columns = ints(&[1, 2, 3]).columns;
        columns.extend(ints(&[4, 5, 6]).columns);
        columns.extend(ints(&[7, 8, 9]).columns);
        let batch = ColumnBatch::new(columns);
        let mut ctx = MockContext::new(vec![vec![batch]], vec![DataType::Int64; 2]);
        let out = ctx.drain(&mut op).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(values(&out[0], 0), vec![7, 8, 9]);
        assert_eq!(values(&out[0], 1), vec![1, 2, 3]);
    }

    #[test]
    fn union_places_columns_side_by_side() {
        let r = make::range(0, 2);
        let mut op = Operator::from_plan_node(&make::union(&r, &r));
        let mut ctx = MockContext::new(
            vec![vec![ints(&[1, 2])], vec![ints(&[3, 4])]],
            vec![DataType::Int64; 2],
        );
        let out = ctx.drain(&mut op).unwrap();
        assert_eq!(values(&out[0], 0), vec![1, 2]);
        assert_eq!(values(&out[0], 1), vec![3, 4]);
    }

    #[test]
    fn union_rejects_inputs_of_different_batch_counts() {
        let r = make::range(0, 2);
        let mut op = Operator::from_plan_node(&make::union(&r, &r));
        let mut ctx = MockContext::new(
            vec![vec![ints(&[1, 2])], vec![]],
            vec![DataType::Int64; 2],
        );
        assert!(matches!(
            ctx.drain(&mut op),
            Err(crate::OpError::Misaligned { op: "union", .. })
        ));
    }
}
