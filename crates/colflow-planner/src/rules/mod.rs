//! Rewrite rules over a node and its immediate inputs.
//!
//! A rule looks at one node. When its precondition holds it returns the
//! replacement node; otherwise it returns `None` and the DAG is left alone.
//! Rules never fail and never mutate: replacements are new nodes that may
//! share any untouched sub-plans with the original.

use std::sync::Arc;

use colflow_core::dag::{OperatorKind, PNode};
use colflow_core::infer::infer_output_types;

pub mod exchange;
pub mod simplify;
pub mod source;

pub use exchange::{
    ProjectThroughAppend, ProjectThroughFilter, ProjectThroughUnion, SplitFilterOverUnion,
    UnionOfFilters, UnionOfProjects,
};
pub use simplify::{
    CollapseEmptyAppend, EliminateIdentityProject, FoldConstantTernary, MergeProjects,
};
pub use source::{
    MergeAppendedSources, MergeSources, ProjectIntoSource, SplitSourceColumns, TagDirectSource,
};

pub trait OptimizationRule: Send + Sync {
    /// Stable rule name used in logs and reports.
    fn name(&self) -> &'static str;

    /// Stages in which the rule may run.
    fn stages(&self) -> &'static [usize];

    /// Replacement for `node`, or `None` when the rule does not apply.
    fn rewrite(&self, node: &PNode) -> Option<PNode>;
}

pub type RuleRef = Arc<dyn OptimizationRule>;

pub(crate) fn width(node: &PNode) -> usize {
    infer_output_types(node).len()
}

/// A node seen as a column selection over a base node: a projection is its
/// input plus its index list, anything else is itself with all columns.
pub(crate) fn as_view(node: &PNode) -> (PNode, Vec<usize>) {
    if node.kind() == OperatorKind::Project {
        (node.input(0).clone(), node.indices_param("indices"))
    } else {
        (node.clone(), (0..width(node)).collect())
    }
}

pub(crate) fn is_kind(node: &PNode, kind: OperatorKind) -> bool {
    node.kind() == kind
}

/// `outer` applied after `inner`: `result[i] = inner[outer[i]]`.
pub(crate) fn compose(inner: &[usize], outer: &[usize]) -> Vec<usize> {
    outer.iter().map(|&i| inner[i]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compose_follows_outer_indices() {
        assert_eq!(compose(&[2, 0, 1], &[1, 1, 2]), vec![0, 0, 1]);
    }
}
