//! The closed set of runtime operators and their single dispatch point.

use colflow_core::dag::{OperatorKind, PNode};
use colflow_core::infer::infer_output_types;

use crate::append::AppendOp;
use crate::filter::LogicalFilterOp;
use crate::project::{ProjectOp, UnionOp};
use crate::source::{ConstantOp, RangeOp, SourceOp};
use crate::ternary::TernaryOp;
use crate::traits::{ExecutionContext, OpError, Step};
use crate::transform::{BinaryTransformOp, GeneralizedTransformOp, TransformOp};

/// Runtime counterpart of a plan node.
///
/// Holds the node's static configuration plus its suspension state. `clone()`
/// copies the configuration only; the clone starts from the beginning of its
/// stream, which is how the scheduler builds one fresh chain per segment.
#[derive(Debug, Clone)]
pub enum Operator {
    Source(SourceOp),
    Range(RangeOp),
    Constant(ConstantOp),
    Project(ProjectOp),
    Union(UnionOp),
    Transform(TransformOp),
    BinaryTransform(BinaryTransformOp),
    GeneralizedTransform(GeneralizedTransformOp),
    Ternary(TernaryOp),
    LogicalFilter(LogicalFilterOp),
    Append(AppendOp),
}

impl Operator {
    pub fn from_plan_node(node: &PNode) -> Operator {
        match node.kind() {
            OperatorKind::Source => Operator::Source(SourceOp::from_node(node)),
            OperatorKind::Range => Operator::Range(RangeOp::from_node(node)),
            OperatorKind::Constant => Operator::Constant(ConstantOp::from_node(node)),
            OperatorKind::Project => Operator::Project(ProjectOp::from_node(node)),
            OperatorKind::Union => Operator::Union(UnionOp),
            OperatorKind::Transform => {
                let out = infer_output_types(node)[0];
                Operator::Transform(TransformOp::from_node(node, out))
            }
            OperatorKind::BinaryTransform => {
                let out = infer_output_types(node)[0];
                Operator::BinaryTransform(BinaryTransformOp::from_node(node, out))
            }
            OperatorKind::GeneralizedTransform => Operator::GeneralizedTransform(
                GeneralizedTransformOp::from_node(node, infer_output_types(node)),
            ),
            OperatorKind::Ternary => Operator::Ternary(TernaryOp::default()),
            OperatorKind::LogicalFilter => Operator::LogicalFilter(LogicalFilterOp::default()),
            OperatorKind::Append => Operator::Append(AppendOp::default()),
        }
    }

    pub fn kind(&self) -> OperatorKind {
        match self {
            Operator::Source(_) => OperatorKind::Source,
            Operator::Range(_) => OperatorKind::Range,
            Operator::Constant(_) => OperatorKind::Constant,
            Operator::Project(_) => OperatorKind::Project,
            Operator::Union(_) => OperatorKind::Union,
            Operator::Transform(_) => OperatorKind::Transform,
            Operator::BinaryTransform(_) => OperatorKind::BinaryTransform,
            Operator::GeneralizedTransform(_) => OperatorKind::GeneralizedTransform,
            Operator::Ternary(_) => OperatorKind::Ternary,
            Operator::LogicalFilter(_) => OperatorKind::LogicalFilter,
            Operator::Append(_) => OperatorKind::Append,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// Resume the operator until it yields one batch or reaches end of stream.
    pub fn execute(&mut self, ctx: &mut dyn ExecutionContext) -> Result<Step, OpError> {
        match self {
            Operator::Source(op) => op.execute(ctx),
            Operator::Range(op) => op.execute(ctx),
            Operator::Constant(op) => op.execute(ctx),
            Operator::Project(op) => op.execute(ctx),
            Operator::Union(op) => op.execute(ctx),
            Operator::Transform(op) => op.execute(ctx),
            Operator::BinaryTransform(op) => op.execute(ctx),
            Operator::GeneralizedTransform(op) => op.execute(ctx),
            Operator::Ternary(op) => op.execute(ctx),
            Operator::LogicalFilter(op) => op.execute(ctx),
            Operator::Append(op) => op.execute(ctx),
        }
    }
}
