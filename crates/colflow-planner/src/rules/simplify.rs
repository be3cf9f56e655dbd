//! Cheap local simplifications that never change materializability.

use colflow_core::dag::{OperatorKind, PNode};
use colflow_core::infer::infer_output_length;
use colflow_core::make;

use super::{compose, is_kind, width, OptimizationRule};

/// `P[0, 1, .., n-1](X)` over an `n`-column `X` is `X`.
pub struct EliminateIdentityProject;

impl OptimizationRule for EliminateIdentityProject {
    fn name(&self) -> &'static str {
        "eliminate_identity_project"
    }

    fn stages(&self) -> &'static [usize] {
        &[1, 2, 3, 4]
    }

    fn rewrite(&self, node: &PNode) -> Option<PNode> {
        if !is_kind(node, OperatorKind::Project) {
            return None;
        }
        let input = node.input(0);
        let indices = node.indices_param("indices");
        let identity =
            indices.len() == width(input) && indices.iter().enumerate().all(|(i, &c)| i == c);
        identity.then(|| input.clone())
    }
}

/// `P_a(P_b(X))` is `P_{b∘a}(X)`.
pub struct MergeProjects;

impl OptimizationRule for MergeProjects {
    fn name(&self) -> &'static str {
        "merge_projects"
    }

    fn stages(&self) -> &'static [usize] {
        &[1, 2, 3, 4]
    }

    fn rewrite(&self, node: &PNode) -> Option<PNode> {
        if !is_kind(node, OperatorKind::Project) {
            return None;
        }
        let inner = node.input(0);
        if !is_kind(inner, OperatorKind::Project) {
            return None;
        }
        let merged = compose(
            &inner.indices_param("indices"),
            &node.indices_param("indices"),
        );
        Some(make::project(inner.input(0), &merged))
    }
}

/// A ternary whose condition is a constant, or whose branches are the same
/// node, is one of its branches.
pub struct FoldConstantTernary;

impl OptimizationRule for FoldConstantTernary {
    fn name(&self) -> &'static str {
        "fold_constant_ternary"
    }

    fn stages(&self) -> &'static [usize] {
        &[1]
    }

    fn rewrite(&self, node: &PNode) -> Option<PNode> {
        if !is_kind(node, OperatorKind::Ternary) {
            return None;
        }
        let (cond, is_true, is_false) = (node.input(0), node.input(1), node.input(2));
        if std::sync::Arc::ptr_eq(is_true, is_false) {
            return Some(is_true.clone());
        }
        if !is_kind(cond, OperatorKind::Constant) {
            return None;
        }
        let truthy = cond
            .scalar("value")
            .and_then(|v| v.to_scalar())
            .is_some_and(|v| v.is_truthy());
        Some(if truthy { is_true } else { is_false }.clone())
    }
}

/// Appending an empty input changes nothing: `A(X, Y)` is `X` when `Y`
/// has no rows and `Y` when `X` has none.
pub struct CollapseEmptyAppend;

impl OptimizationRule for CollapseEmptyAppend {
    fn name(&self) -> &'static str {
        "collapse_empty_append"
    }

    fn stages(&self) -> &'static [usize] {
        &[1]
    }

    fn rewrite(&self, node: &PNode) -> Option<PNode> {
        if !is_kind(node, OperatorKind::Append) {
            return None;
        }
        let (first, second) = (node.input(0), node.input(1));
        if infer_output_length(second) == Some(0) {
            Some(first.clone())
        } else if infer_output_length(first) == Some(0) {
            Some(second.clone())
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use colflow_core::dag::Literal;
    use std::sync::Arc;

    #[test]
    fn identity_projection_is_removed() {
        let r = make::union(&make::range(0, 3), &make::range(0, 3));
        assert!(Arc::ptr_eq(
            &EliminateIdentityProject.rewrite(&make::project(&r, &[0, 1])).unwrap(),
            &r
        ));
        assert!(EliminateIdentityProject
            .rewrite(&make::project(&r, &[1, 0]))
            .is_none());
        assert!(EliminateIdentityProject
            .rewrite(&make::project(&r, &[0]))
            .is_none());
    }

    #[test]
    fn nested_projections_merge() {
        let r = make::union(&make::range(0, 3), &make::constant(Literal::Int(1), 3));
        let inner = make::project(&r, &[1, 0, 1]);
        let outer = make::project(&inner, &[2, 1]);
        let merged = MergeProjects.rewrite(&outer).unwrap();
        assert_eq!(merged.indices_param("indices"), vec![1, 0]);
        assert!(Arc::ptr_eq(merged.input(0), &r));
    }

    #[test]
    fn constant_condition_picks_a_branch() {
        let t = make::range(0, 3);
        let f = make::range(10, 13);
        let yes = make::ternary(&make::constant(Literal::Int(7), 3), &t, &f);
        let no = make::ternary(&make::constant(Literal::Int(0), 3), &t, &f);
        assert!(Arc::ptr_eq(&FoldConstantTernary.rewrite(&yes).unwrap(), &t));
        assert!(Arc::ptr_eq(&FoldConstantTernary.rewrite(&no).unwrap(), &f));

        let data_dependent = make::ternary(&make::range(0, 3), &t, &f);
        assert!(FoldConstantTernary.rewrite(&data_dependent).is_none());
    }

    #[test]
    fn empty_appends_collapse() {
        let r = make::range(0, 3);
        let empty = make::range(5, 5);
        assert!(Arc::ptr_eq(&CollapseEmptyAppend.rewrite(&make::append(&r, &empty)).unwrap(), &r));
        assert!(Arc::ptr_eq(&CollapseEmptyAppend.rewrite(&make::append(&empty, &r)).unwrap(), &r));
        assert!(CollapseEmptyAppend.rewrite(&make::append(&r, &r)).is_none());

        // data-dependent lengths are left alone
        let f = make::logical_filter(&empty, &empty);
        assert!(CollapseEmptyAppend.rewrite(&make::append(&r, &f)).is_none());
    }
}
