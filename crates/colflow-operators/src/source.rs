//! Leaf operators: reader-backed sources, integer ranges and constants.
//!
//! Each leaf owns a row range; a chain reads only its segment's share of it,
//! `batch_size` rows at a time. In skip mode a leaf advances its cursor
//! without reading.

use std::ops::Range;
use std::sync::Arc;

use colflow_core::dag::PNode;
use colflow_core::source::BatchSource;
use colflow_core::types::Scalar;

use crate::traits::{ExecutionContext, OpError, Resume, Step};

/// Cursor over the segment's rows. `None` until the first call.
type Cursor = Resume<Option<Range<u64>>>;

/// Next batch-sized slice of the cursor, or `None` when exhausted.
fn advance(
    cursor: &mut Cursor,
    total: Range<u64>,
    ctx: &dyn ExecutionContext,
) -> Option<Range<u64>> {
    let segment = ctx.segment();
    let range = cursor.0.get_or_insert_with(|| segment.rows(total));
    if range.start >= range.end {
        return None;
    }
    let take = (ctx.batch_size() as u64).min(range.end - range.start);
    let rows = range.start..range.start + take;
    range.start += take;
    Some(rows)
}

#[derive(Debug, Clone)]
pub struct SourceOp {
    source: Arc<dyn BatchSource>,
    columns: Vec<usize>,
    rows: Range<u64>,
    cursor: Cursor,
}

impl SourceOp {
    pub(crate) fn from_node(node: &PNode) -> Self {
        let source = node
            .batch_source()
            .cloned()
            .unwrap_or_else(|| panic!("source node without a batch source"));
        Self {
            source,
            columns: node.indices_param("columns"),
            rows: node.int_param("begin") as u64..node.int_param("end") as u64,
            cursor: Resume::default(),
        }
    }

    pub(crate) fn execute(&mut self, ctx: &mut dyn ExecutionContext) -> Result<Step, OpError> {
        let Some(rows) = advance(&mut self.cursor, self.rows.clone(), ctx) else {
            return Ok(Step::Done);
        };
        if ctx.should_skip() {
            ctx.emit_skipped();
            return Ok(Step::Yield);
        }
        let mut out = ctx.get_output_buffer();
        let read = self.source.read(&self.columns, rows)?;
        for (dst, src) in out.columns.iter_mut().zip(read) {
            dst.values.extend(src.values);
        }
        ctx.emit(out)?;
        Ok(Step::Yield)
    }
}

#[derive(Debug, Clone)]
pub struct RangeOp {
    start: i64,
    end: i64,
    cursor: Cursor,
}

impl RangeOp {
    pub(crate) fn from_node(node: &PNode) -> Self {
        Self {
            start: node.int_param("start"),
            end: node.int_param("end"),
            cursor: Resume::default(),
        }
    }

    pub(crate) fn execute(&mut self, ctx: &mut dyn ExecutionContext) -> Result<Step, OpError> {
        // the width of an i64 range always fits in u64
        let total = 0..self.end.abs_diff(self.start);
        let Some(rows) = advance(&mut self.cursor, total, ctx) else {
            return Ok(Step::Done);
        };
        if ctx.should_skip() {
            ctx.emit_skipped();
            return Ok(Step::Yield);
        }
        let mut out = ctx.get_output_buffer();
        out.columns[0]
            .values
            .extend(rows.map(|r| Scalar::I64(self.start.wrapping_add(r as i64))));
        ctx.emit(out)?;
        Ok(Step::Yield)
    }
}

#[derive(Debug, Clone)]
pub struct ConstantOp {
    value: Scalar,
    length: u64,
    cursor: Cursor,
}

impl ConstantOp {
    pub(crate) fn from_node(node: &PNode) -> Self {
        let value = node
            .scalar("value")
            .and_then(|l| l.to_scalar())
            .unwrap_or(Scalar::Null);
        Self {
            value,
            length: node.int_param("length") as u64,
            cursor: Resume::default(),
        }
    }

    pub(crate) fn execute(&mut self, ctx: &mut dyn ExecutionContext) -> Result<Step, OpError> {
        let Some(rows) = advance(&mut self.cursor, 0..self.length, ctx) else {
            return Ok(Step::Done);
        };
        if ctx.should_skip() {
            ctx.emit_skipped();
            return Ok(Step::Yield);
        }
        let mut out = ctx.get_output_buffer();
        out.columns[0]
            .values
            .resize((rows.end - rows.start) as usize, self.value.clone());
        ctx.emit(out)?;
        Ok(Step::Yield)
    }
}

#[cfg(test)]
mod tests {
    use colflow_core::dag::Literal;
    use colflow_core::make;
    use colflow_core::schema::DataType;
    use colflow_core::types::Scalar;

    use crate::mock::{values, MockContext, Out};
    use crate::traits::Step;
    use crate::Operator;

    #[test]
    fn clone_restarts_the_stream() {
        let mut op = Operator::from_plan_node(&make::range(5, 8));
        let mut ctx = MockContext::new(vec![], vec![DataType::Int64]).with_batch_size(2);
        assert_eq!(op.execute(&mut ctx).unwrap(), Step::Yield);
        let mut fresh = op.clone();
        let rest = ctx.drain(&mut op).unwrap();
        assert_eq!(rest.iter().map(|b| b.num_rows()).sum::<usize>(), 3);

        let mut ctx2 = MockContext::new(vec![], vec![DataType::Int64]).with_batch_size(2);
        let all = ctx2.drain(&mut fresh).unwrap();
        assert_eq!(values(&all[0], 0), vec![5, 6]);
        assert_eq!(values(&all[1], 0), vec![7]);
    }

    #[test]
    fn ranges_at_the_edges_of_i64() {
        let mut low = Operator::from_plan_node(&make::range(i64::MIN, i64::MIN + 2));
        let mut ctx = MockContext::new(vec![], vec![DataType::Int64]);
        let out = ctx.drain(&mut low).unwrap();
        assert_eq!(values(&out[0], 0), vec![i64::MIN, i64::MIN + 1]);

        let mut high = Operator::from_plan_node(&make::range(i64::MAX - 2, i64::MAX));
        let out = ctx.drain(&mut high).unwrap();
        assert_eq!(values(&out[0], 0), vec![i64::MAX - 2, i64::MAX - 1]);
    }

    #[test]
    fn skipped_leaves_emit_markers_only() {
        let node = make::constant(Literal::Str("x".into()), 5);
        let mut op = Operator::from_plan_node(&node);
        let mut ctx = MockContext::new(vec![], vec![DataType::Utf8])
            .with_batch_size(2)
            .skipping();
        while op.execute(&mut ctx).unwrap() == Step::Yield {}
        assert_eq!(ctx.out.len(), 3);
        assert!(ctx.out.iter().all(|o| matches!(o, Out::Skipped)));

        let mut op = Operator::from_plan_node(&node);
        let mut ctx = MockContext::new(vec![], vec![DataType::Utf8]).with_batch_size(2);
        let out = ctx.drain(&mut op).unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out[2].columns[0].values, vec![Scalar::Str("x".into())]);
    }
}
