//! Row-wise computation: user transforms and element-wise binary operators.
//!
//! User callbacks never run in skip mode. Every produced value is checked
//! against the node's declared output type before the batch is emitted.

use colflow_core::dag::{BinaryOp, GeneralizedFn, PNode, RowFn};
use colflow_core::schema::DataType;
use colflow_core::types::{scalar_cmp, ColumnBatch, Scalar};

use crate::traits::{pull_aligned, skip_linear, ExecutionContext, OpError, Step};

#[derive(Clone)]
pub struct TransformOp {
    function: RowFn,
    output_type: DataType,
}

impl std::fmt::Debug for TransformOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TransformOp(-> {})", self.output_type)
    }
}

impl TransformOp {
    pub(crate) fn from_node(node: &PNode, output_type: DataType) -> Self {
        let function = node
            .row_fn()
            .cloned()
            .unwrap_or_else(|| panic!("transform node without a row function"));
        Self {
            function,
            output_type,
        }
    }

    pub(crate) fn execute(&mut self, ctx: &mut dyn ExecutionContext) -> Result<Step, OpError> {
        if ctx.should_skip() {
            return skip_linear(ctx, "transform", 1);
        }
        let Some(batch) = ctx.get_next(0)? else {
            return Ok(Step::Done);
        };
        let mut out = ctx.get_output_buffer();
        for row in 0..batch.num_rows() {
            let value = (self.function)(&batch.row(row))
                .map_err(|msg| OpError::Callback { op: "transform", msg })?;
            if !value.conforms_to(self.output_type) {
                return Err(OpError::Type {
                    op: "transform",
                    msg: format!("row {row}: {value:?} is not {}", self.output_type),
                });
            }
            out.columns[0].values.push(value);
        }
        ctx.recycle(batch);
        ctx.emit(out)?;
        Ok(Step::Yield)
    }
}

#[derive(Debug, Clone)]
pub struct BinaryTransformOp {
    op: BinaryOp,
    output_type: DataType,
}

impl BinaryTransformOp {
    pub(crate) fn from_node(node: &PNode, output_type: DataType) -> Self {
        Self {
            op: node.binary_op(),
            output_type,
        }
    }

    pub(crate) fn execute(&mut self, ctx: &mut dyn ExecutionContext) -> Result<Step, OpError> {
        if ctx.should_skip() {
            return skip_linear(ctx, "binary_transform", 2);
        }
        let Some(batches) = pull_aligned(ctx, "binary_transform", 2)? else {
            return Ok(Step::Done);
        };
        let mut out = ctx.get_output_buffer();
        let (left, right) = (&batches[0].columns[0].values, &batches[1].columns[0].values);
        for (l, r) in left.iter().zip(right) {
            out.columns[0].values.push(self.apply(l, r)?);
        }
        for b in batches {
            ctx.recycle(b);
        }
        ctx.emit(out)?;
        Ok(Step::Yield)
    }

    fn apply(&self, l: &Scalar, r: &Scalar) -> Result<Scalar, OpError> {
        use std::cmp::Ordering::*;

        if self.op.is_comparison() {
            let ord = scalar_cmp(l, r);
            let hit = match self.op {
                BinaryOp::Eq => ord == Equal,
                BinaryOp::Ne => ord != Equal,
                BinaryOp::Lt => ord == Less,
                BinaryOp::Le => ord != Greater,
                BinaryOp::Gt => ord == Greater,
                _ => ord != Less,
            };
            return Ok(Scalar::I64(hit as i64));
        }
        if matches!(l, Scalar::Null) || matches!(r, Scalar::Null) {
            return Ok(Scalar::Null);
        }
        if self.output_type == DataType::Float64 {
            let (Some(a), Some(b)) = (l.as_f64(), r.as_f64()) else {
                return Err(self.type_error(l, r));
            };
            return Ok(Scalar::F64(match self.op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                _ => a * b,
            }));
        }
        let (Scalar::I64(a), Scalar::I64(b)) = (l, r) else {
            return Err(self.type_error(l, r));
        };
        let v = match self.op {
            BinaryOp::Add => a.checked_add(*b),
            BinaryOp::Sub => a.checked_sub(*b),
            _ => a.checked_mul(*b),
        };
        v.map(Scalar::I64).ok_or_else(|| {
            OpError::Exec(format!("integer overflow in {a} {} {b}", self.op.as_str()))
        })
    }

    fn type_error(&self, l: &Scalar, r: &Scalar) -> OpError {
        OpError::Type {
            op: "binary_transform",
            msg: format!("cannot apply '{}' to {l:?} and {r:?}", self.op.as_str()),
        }
    }
}

#[derive(Clone)]
pub struct GeneralizedTransformOp {
    function: GeneralizedFn,
    output_types: Vec<DataType>,
}

impl std::fmt::Debug for GeneralizedTransformOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "GeneralizedTransformOp(-> {:?})", self.output_types)
    }
}

impl GeneralizedTransformOp {
    pub(crate) fn from_node(node: &PNode, output_types: Vec<DataType>) -> Self {
        let function = node
            .generalized_fn()
            .cloned()
            .unwrap_or_else(|| panic!("generalized_transform node without a function"));
        Self {
            function,
            output_types,
        }
    }

    pub(crate) fn execute(&mut self, ctx: &mut dyn ExecutionContext) -> Result<Step, OpError> {
        if ctx.should_skip() {
            return skip_linear(ctx, "generalized_transform", 1);
        }
        let Some(batch) = ctx.get_next(0)? else {
            return Ok(Step::Done);
        };
        let mut out = ctx.get_output_buffer();
        let mut row_out = vec![Scalar::Null; self.output_types.len()];
        for row in 0..batch.num_rows() {
            row_out.fill(Scalar::Null);
            (self.function)(&batch.row(row), &mut row_out).map_err(|msg| OpError::Callback {
                op: "generalized_transform",
                msg,
            })?;
            for (dst, v) in out.columns.iter_mut().zip(row_out.iter_mut()) {
                dst.values.push(std::mem::replace(v, Scalar::Null));
            }
        }
        ctx.recycle(batch);
        type_check(&out)?;
        ctx.emit(out)?;
        Ok(Step::Yield)
    }
}

fn type_check(batch: &ColumnBatch) -> Result<(), OpError> {
    batch.validate().map_err(|e| OpError::Type {
        op: "generalized_transform",
        msg: e.to_string(),
    })
}
