//! Typed plan-node factories.
//!
//! Thin wrappers over [`make_plan_node`] that fill in the parameter maps for
//! each operator kind. They panic on malformed input like the generic factory.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::dag::{
    make_plan_node, BinaryOp, Literal, OpaqueValue, OperatorKind, PNode,
};
use crate::schema::DataType;
use crate::source::BatchSource;
use crate::types::Scalar;

fn params<const N: usize>(items: [(&str, Literal); N]) -> BTreeMap<String, Literal> {
    items
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

fn opaque(name: &str, value: OpaqueValue) -> BTreeMap<String, OpaqueValue> {
    BTreeMap::from([(name.to_string(), value)])
}

/// All columns and all rows of `src`.
pub fn source(src: Arc<dyn BatchSource>) -> PNode {
    let ncols = src.column_types().len();
    let rows = src.num_rows();
    source_slice(src, &(0..ncols).collect::<Vec<_>>(), 0, rows)
}

/// Selected `columns` of `src` over rows `begin..end`.
pub fn source_slice(src: Arc<dyn BatchSource>, columns: &[usize], begin: u64, end: u64) -> PNode {
    make_plan_node(
        OperatorKind::Source,
        vec![],
        params([
            ("columns", Literal::ints(columns.iter().copied())),
            ("begin", Literal::Int(begin as i64)),
            ("end", Literal::Int(end as i64)),
        ]),
        opaque("source", OpaqueValue::Source(src)),
    )
}

/// Integers `start..end` as a single Int64 column.
pub fn range(start: i64, end: i64) -> PNode {
    make_plan_node(
        OperatorKind::Range,
        vec![],
        params([("start", Literal::Int(start)), ("end", Literal::Int(end))]),
        BTreeMap::new(),
    )
}

/// `length` copies of `value`.
pub fn constant(value: Literal, length: u64) -> PNode {
    make_plan_node(
        OperatorKind::Constant,
        vec![],
        params([("value", value), ("length", Literal::Int(length as i64))]),
        BTreeMap::new(),
    )
}

pub fn project(input: &PNode, indices: &[usize]) -> PNode {
    make_plan_node(
        OperatorKind::Project,
        vec![input.clone()],
        params([("indices", Literal::ints(indices.iter().copied()))]),
        BTreeMap::new(),
    )
}

/// Columns of `left` followed by the columns of `right`.
pub fn union(left: &PNode, right: &PNode) -> PNode {
    make_plan_node(
        OperatorKind::Union,
        vec![left.clone(), right.clone()],
        BTreeMap::new(),
        BTreeMap::new(),
    )
}

pub fn transform<F>(input: &PNode, output_type: DataType, f: F) -> PNode
where
    F: Fn(&[Scalar]) -> Result<Scalar, String> + Send + Sync + 'static,
{
    make_plan_node(
        OperatorKind::Transform,
        vec![input.clone()],
        params([("output_type", Literal::Str(output_type.to_string()))]),
        opaque("function", OpaqueValue::RowFn(Arc::new(f))),
    )
}

pub fn binary_transform(left: &PNode, right: &PNode, op: BinaryOp) -> PNode {
    make_plan_node(
        OperatorKind::BinaryTransform,
        vec![left.clone(), right.clone()],
        params([("op", Literal::Str(op.as_str().to_string()))]),
        BTreeMap::new(),
    )
}

pub fn generalized_transform<F>(input: &PNode, output_types: &[DataType], f: F) -> PNode
where
    F: Fn(&[Scalar], &mut [Scalar]) -> Result<(), String> + Send + Sync + 'static,
{
    let types = output_types
        .iter()
        .map(|t| Literal::Str(t.to_string()))
        .collect();
    make_plan_node(
        OperatorKind::GeneralizedTransform,
        vec![input.clone()],
        params([("output_types", Literal::List(types))]),
        opaque("function", OpaqueValue::GeneralizedFn(Arc::new(f))),
    )
}

pub fn ternary(condition: &PNode, is_true: &PNode, is_false: &PNode) -> PNode {
    make_plan_node(
        OperatorKind::Ternary,
        vec![condition.clone(), is_true.clone(), is_false.clone()],
        BTreeMap::new(),
        BTreeMap::new(),
    )
}

/// Rows of `data` whose `mask` value is non-zero.
pub fn logical_filter(data: &PNode, mask: &PNode) -> PNode {
    make_plan_node(
        OperatorKind::LogicalFilter,
        vec![data.clone(), mask.clone()],
        BTreeMap::new(),
        BTreeMap::new(),
    )
}

/// Rows of `first` followed by the rows of `second`; column types must match.
pub fn append(first: &PNode, second: &PNode) -> PNode {
    make_plan_node(
        OperatorKind::Append,
        vec![first.clone(), second.clone()],
        BTreeMap::new(),
        BTreeMap::new(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use crate::types::Column;

    fn abc() -> Arc<dyn BatchSource> {
        Arc::new(
            MemorySource::new(vec![
                Column::new(DataType::Int64, vec![Scalar::I64(1), Scalar::I64(2)]),
                Column::new(DataType::Utf8, vec![Scalar::Str("a".into()), Scalar::Str("b".into())]),
            ])
            .unwrap(),
        )
    }

    #[test]
    fn factories_record_parameters() {
        let s = source(abc());
        assert_eq!(s.kind(), OperatorKind::Source);
        assert_eq!(s.indices_param("columns"), vec![0, 1]);
        assert_eq!(s.int_param("end"), 2);

        let p = project(&s, &[1, 1]);
        assert_eq!(p.indices_param("indices"), vec![1, 1]);
        assert!(Arc::ptr_eq(p.input(0), &s));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn project_index_out_of_range_panics() {
        project(&source(abc()), &[2]);
    }

    #[test]
    #[should_panic(expected = "must not be empty")]
    fn empty_projection_panics() {
        project(&range(0, 3), &[]);
    }

    #[test]
    #[should_panic(expected = "different lengths")]
    fn misaligned_union_panics() {
        union(&range(0, 3), &range(0, 4));
    }

    #[test]
    #[should_panic(expected = "expects 1 inputs")]
    fn wrong_arity_panics() {
        make_plan_node(
            OperatorKind::Project,
            vec![],
            params([("indices", Literal::ints([0]))]),
            BTreeMap::new(),
        );
    }

    #[test]
    #[should_panic(expected = "missing scalar parameter 'op'")]
    fn missing_parameter_panics() {
        let r = range(0, 1);
        make_plan_node(
            OperatorKind::BinaryTransform,
            vec![r.clone(), r],
            BTreeMap::new(),
            BTreeMap::new(),
        );
    }

    #[test]
    #[should_panic(expected = "branch types differ")]
    fn ternary_branch_types_must_match() {
        let c = range(0, 2);
        ternary(&c, &range(0, 2), &constant(Literal::Str("x".into()), 2));
    }
}
