//! Exchanges of commuting operators: projections move toward the leaves,
//! filters sharing a mask are grouped, and filters over unions are split.

use std::sync::Arc;

use colflow_core::dag::{OperatorKind, PNode};
use colflow_core::make;

use super::{as_view, is_kind, width, OptimizationRule};

/// Push a projection through a union, keeping only the columns it uses.
///
/// `P_a(U(X, Y))` becomes `P_a(X)` or `P_{a-|X|}(Y)` when only one side is
/// referenced, and otherwise `P_c(U(P_l X, P_r Y))` where `l` and `r` are the
/// sorted distinct columns used from each side. Declines when every column
/// of both sides is used, so it cannot fire twice on its own output.
pub struct ProjectThroughUnion;

impl OptimizationRule for ProjectThroughUnion {
    fn name(&self) -> &'static str {
        "project_through_union"
    }

    fn stages(&self) -> &'static [usize] {
        &[2]
    }

    fn rewrite(&self, node: &PNode) -> Option<PNode> {
        if !is_kind(node, OperatorKind::Project) {
            return None;
        }
        let union = node.input(0);
        if !is_kind(union, OperatorKind::Union) {
            return None;
        }
        let (left, right) = (union.input(0), union.input(1));
        let split = width(left);
        let indices = node.indices_param("indices");

        let mut used_left: Vec<usize> = indices.iter().copied().filter(|&i| i < split).collect();
        let mut used_right: Vec<usize> = indices
            .iter()
            .filter(|&&i| i >= split)
            .map(|&i| i - split)
            .collect();
        used_left.sort_unstable();
        used_left.dedup();
        used_right.sort_unstable();
        used_right.dedup();

        if used_right.is_empty() {
            return Some(make::project(left, &indices));
        }
        if used_left.is_empty() {
            let shifted: Vec<usize> = indices.iter().map(|&i| i - split).collect();
            return Some(make::project(right, &shifted));
        }
        if used_left.len() == split && used_right.len() == width(right) {
            return None;
        }

        let narrowed = make::union(
            &make::project(left, &used_left),
            &make::project(right, &used_right),
        );
        let remapped: Vec<usize> = indices
            .iter()
            .map(|&i| {
                if i < split {
                    position(&used_left, i)
                } else {
                    used_left.len() + position(&used_right, i - split)
                }
            })
            .collect();
        Some(make::project(&narrowed, &remapped))
    }
}

fn position(sorted: &[usize], value: usize) -> usize {
    sorted.binary_search(&value).unwrap_or(0)
}

/// `P_a(F(X, m))` becomes `F(P_a X, m)`.
pub struct ProjectThroughFilter;

impl OptimizationRule for ProjectThroughFilter {
    fn name(&self) -> &'static str {
        "project_through_filter"
    }

    fn stages(&self) -> &'static [usize] {
        &[2]
    }

    fn rewrite(&self, node: &PNode) -> Option<PNode> {
        if !is_kind(node, OperatorKind::Project) {
            return None;
        }
        let filter = node.input(0);
        if !is_kind(filter, OperatorKind::LogicalFilter) {
            return None;
        }
        let projected = make::project(filter.input(0), &node.indices_param("indices"));
        Some(make::logical_filter(&projected, filter.input(1)))
    }
}

/// `P_a(A(X, Y))` becomes `A(P_a X, P_a Y)`; an input appended to itself
/// keeps a single projection.
pub struct ProjectThroughAppend;

impl OptimizationRule for ProjectThroughAppend {
    fn name(&self) -> &'static str {
        "project_through_append"
    }

    fn stages(&self) -> &'static [usize] {
        &[2]
    }

    fn rewrite(&self, node: &PNode) -> Option<PNode> {
        if !is_kind(node, OperatorKind::Project) {
            return None;
        }
        let append = node.input(0);
        if !is_kind(append, OperatorKind::Append) {
            return None;
        }
        let indices = node.indices_param("indices");
        let (first, second) = (append.input(0), append.input(1));
        let projected = make::project(first, &indices);
        let other = if Arc::ptr_eq(first, second) {
            projected.clone()
        } else {
            make::project(second, &indices)
        };
        Some(make::append(&projected, &other))
    }
}

/// A union of two column selections over the same node is one selection:
/// `U(P_a X, P_b X)` becomes `P_{a++b}(X)` (either side may be `X` itself).
pub struct UnionOfProjects;

impl OptimizationRule for UnionOfProjects {
    fn name(&self) -> &'static str {
        "union_of_projects"
    }

    fn stages(&self) -> &'static [usize] {
        &[2, 4]
    }

    fn rewrite(&self, node: &PNode) -> Option<PNode> {
        if !is_kind(node, OperatorKind::Union) {
            return None;
        }
        let (base_l, mut cols) = as_view(node.input(0));
        let (base_r, cols_r) = as_view(node.input(1));
        if !Arc::ptr_eq(&base_l, &base_r) {
            return None;
        }
        cols.extend(cols_r);
        Some(make::project(&base_l, &cols))
    }
}

/// `U(F(A, m), F(B, m))` becomes `F(U(A, B), m)` for a shared mask `m`.
pub struct UnionOfFilters;

impl OptimizationRule for UnionOfFilters {
    fn name(&self) -> &'static str {
        "union_of_filters"
    }

    fn stages(&self) -> &'static [usize] {
        &[2, 4]
    }

    fn rewrite(&self, node: &PNode) -> Option<PNode> {
        if !is_kind(node, OperatorKind::Union) {
            return None;
        }
        let (l, r) = (node.input(0), node.input(1));
        if !is_kind(l, OperatorKind::LogicalFilter) || !is_kind(r, OperatorKind::LogicalFilter) {
            return None;
        }
        if !Arc::ptr_eq(l.input(1), r.input(1)) {
            return None;
        }
        let data = make::union(l.input(0), r.input(0));
        Some(make::logical_filter(&data, l.input(1)))
    }
}

/// `F(U(A, B), m)` becomes `U(F(A, m), F(B, m))`.
///
/// The result is not directly materializable (a union over filtered inputs);
/// the consolidation stage folds it back.
pub struct SplitFilterOverUnion;

impl OptimizationRule for SplitFilterOverUnion {
    fn name(&self) -> &'static str {
        "split_filter_over_union"
    }

    fn stages(&self) -> &'static [usize] {
        &[3]
    }

    fn rewrite(&self, node: &PNode) -> Option<PNode> {
        if !is_kind(node, OperatorKind::LogicalFilter) {
            return None;
        }
        let union = node.input(0);
        if !is_kind(union, OperatorKind::Union) {
            return None;
        }
        let mask = node.input(1);
        Some(make::union(
            &make::logical_filter(union.input(0), mask),
            &make::logical_filter(union.input(1), mask),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use colflow_core::dag::{BinaryOp, Literal};
    use colflow_core::infer::infer_output_types;
    use colflow_core::schema::DataType;

    fn two_cols() -> PNode {
        make::union(&make::range(0, 4), &make::constant(Literal::Str("s".into()), 4))
    }

    #[test]
    fn projection_narrows_both_union_sides() {
        let x = two_cols();
        let y = two_cols();
        let p = make::project(&make::union(&x, &y), &[3, 1, 3]);
        // only column 1 of x and column 1 of y are used
        let out = ProjectThroughUnion.rewrite(&p).unwrap();
        assert_eq!(out.kind(), OperatorKind::Project);
        assert_eq!(out.indices_param("indices"), vec![1, 0, 1]);
        let u = out.input(0);
        assert_eq!(u.input(0).indices_param("indices"), vec![1]);
        assert_eq!(u.input(1).indices_param("indices"), vec![1]);
        assert_eq!(infer_output_types(&out), infer_output_types(&p));

        // all columns used on both sides: nothing to narrow
        assert!(ProjectThroughUnion.rewrite(&out).is_none());
    }

    #[test]
    fn projection_of_one_side_drops_the_union() {
        let x = two_cols();
        let y = make::range(0, 4);
        let p = make::project(&make::union(&x, &y), &[2, 2]);
        let out = ProjectThroughUnion.rewrite(&p).unwrap();
        assert!(Arc::ptr_eq(out.input(0), &y));
        assert_eq!(out.indices_param("indices"), vec![0, 0]);
    }

    #[test]
    fn projection_moves_below_filter() {
        let x = two_cols();
        let two = make::constant(Literal::Int(2), 4);
        let mask = make::binary_transform(&make::range(0, 4), &two, BinaryOp::Lt);
        let p = make::project(&make::logical_filter(&x, &mask), &[1]);
        let out = ProjectThroughFilter.rewrite(&p).unwrap();
        assert_eq!(out.kind(), OperatorKind::LogicalFilter);
        assert!(Arc::ptr_eq(out.input(1), &mask));
        assert_eq!(infer_output_types(&out), vec![DataType::Utf8]);
    }

    #[test]
    fn union_of_views_over_one_node() {
        let x = two_cols();
        let u = make::union(&make::project(&x, &[1]), &x);
        let out = UnionOfProjects.rewrite(&u).unwrap();
        assert!(Arc::ptr_eq(out.input(0), &x));
        assert_eq!(out.indices_param("indices"), vec![1, 0, 1]);

        let other = make::union(&make::project(&x, &[1]), &two_cols());
        assert!(UnionOfProjects.rewrite(&other).is_none());
    }

    #[test]
    fn filters_split_and_regroup() {
        let (a, b) = (make::range(0, 4), make::range(4, 8));
        let mask = make::constant(Literal::Int(1), 4);
        let f = make::logical_filter(&make::union(&a, &b), &mask);

        let split = SplitFilterOverUnion.rewrite(&f).unwrap();
        assert_eq!(split.kind(), OperatorKind::Union);
        assert_eq!(split.input(0).kind(), OperatorKind::LogicalFilter);

        let back = UnionOfFilters.rewrite(&split).unwrap();
        assert_eq!(back.kind(), OperatorKind::LogicalFilter);
        assert!(Arc::ptr_eq(back.input(0).input(0), &a));
        assert!(Arc::ptr_eq(back.input(1), &mask));
    }

    #[test]
    fn projection_moves_into_both_appended_inputs() {
        let (x, y) = (two_cols(), two_cols());
        let p = make::project(&make::append(&x, &y), &[1, 0, 1]);
        let out = ProjectThroughAppend.rewrite(&p).unwrap();
        assert_eq!(out.kind(), OperatorKind::Append);
        assert!(Arc::ptr_eq(out.input(0).input(0), &x));
        assert!(Arc::ptr_eq(out.input(1).input(0), &y));
        assert_eq!(out.input(1).indices_param("indices"), vec![1, 0, 1]);
        assert_eq!(infer_output_types(&out), infer_output_types(&p));
        assert!(ProjectThroughAppend.rewrite(&out).is_none());

        let same = ProjectThroughAppend
            .rewrite(&make::project(&make::append(&x, &x), &[0]))
            .unwrap();
        assert!(Arc::ptr_eq(same.input(0), same.input(1)));
    }
}
