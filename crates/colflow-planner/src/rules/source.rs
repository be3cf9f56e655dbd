//! Rules about source leaves: normalization into single-column sources,
//! consolidation back into multi-column reads, and provenance tagging.

use colflow_core::dag::{Literal, OperatorKind, PNode};
use colflow_core::make;

use super::{compose, is_kind, OptimizationRule};

fn source_parts(node: &PNode) -> Option<(Vec<usize>, u64, u64)> {
    if !is_kind(node, OperatorKind::Source) {
        return None;
    }
    Some((
        node.indices_param("columns"),
        node.int_param("begin") as u64,
        node.int_param("end") as u64,
    ))
}

/// Multi-column source becomes a left-deep union of single-column sources.
pub struct SplitSourceColumns;

impl OptimizationRule for SplitSourceColumns {
    fn name(&self) -> &'static str {
        "split_source_columns"
    }

    fn stages(&self) -> &'static [usize] {
        &[0]
    }

    fn rewrite(&self, node: &PNode) -> Option<PNode> {
        let (columns, begin, end) = source_parts(node)?;
        if columns.len() < 2 {
            return None;
        }
        let src = node.batch_source()?.clone();
        columns
            .iter()
            .map(|&c| make::source_slice(src.clone(), &[c], begin, end))
            .reduce(|acc, next| make::union(&acc, &next))
    }
}

/// Union of two sources over the same data and row range is one source.
pub struct MergeSources;

impl OptimizationRule for MergeSources {
    fn name(&self) -> &'static str {
        "merge_sources"
    }

    fn stages(&self) -> &'static [usize] {
        &[4]
    }

    fn rewrite(&self, node: &PNode) -> Option<PNode> {
        if !is_kind(node, OperatorKind::Union) {
            return None;
        }
        let (l, r) = (node.input(0), node.input(1));
        let (mut cols, begin, end) = source_parts(l)?;
        let (cols_r, begin_r, end_r) = source_parts(r)?;
        let src = l.opaque("source")?;
        if !src.same_as(r.opaque("source")?) || (begin, end) != (begin_r, end_r) {
            return None;
        }
        cols.extend(cols_r);
        Some(make::source_slice(l.batch_source()?.clone(), &cols, begin, end))
    }
}

/// Appending two adjacent row windows of the same columns of one source
/// reads the joined window: `A(S[c, b..m], S[c, m..e])` is `S[c, b..e]`.
pub struct MergeAppendedSources;

impl OptimizationRule for MergeAppendedSources {
    fn name(&self) -> &'static str {
        "merge_appended_sources"
    }

    fn stages(&self) -> &'static [usize] {
        &[4]
    }

    fn rewrite(&self, node: &PNode) -> Option<PNode> {
        if !is_kind(node, OperatorKind::Append) {
            return None;
        }
        let (first, second) = (node.input(0), node.input(1));
        let (cols, begin, mid) = source_parts(first)?;
        let (cols_second, mid_second, end) = source_parts(second)?;
        let src = first.opaque("source")?;
        if !src.same_as(second.opaque("source")?) || cols != cols_second || mid != mid_second {
            return None;
        }
        Some(make::source_slice(first.batch_source()?.clone(), &cols, begin, end))
    }
}

/// `P_a(S[cols])` reads `cols∘a` directly.
pub struct ProjectIntoSource;

impl OptimizationRule for ProjectIntoSource {
    fn name(&self) -> &'static str {
        "project_into_source"
    }

    fn stages(&self) -> &'static [usize] {
        &[4]
    }

    fn rewrite(&self, node: &PNode) -> Option<PNode> {
        if !is_kind(node, OperatorKind::Project) {
            return None;
        }
        let source = node.input(0);
        let (cols, begin, end) = source_parts(source)?;
        let selected = compose(&cols, &node.indices_param("indices"));
        Some(make::source_slice(
            source.batch_source()?.clone(),
            &selected,
            begin,
            end,
        ))
    }
}

/// Mark nodes that are plain column views of source data: sources, and
/// projections/unions whose inputs are all marked.
pub struct TagDirectSource;

impl OptimizationRule for TagDirectSource {
    fn name(&self) -> &'static str {
        "tag_direct_source"
    }

    fn stages(&self) -> &'static [usize] {
        &[5]
    }

    fn rewrite(&self, node: &PNode) -> Option<PNode> {
        if node.is_direct_source() {
            return None;
        }
        let eligible = match node.kind() {
            OperatorKind::Source => true,
            OperatorKind::Project | OperatorKind::Union => {
                node.inputs().iter().all(|i| i.is_direct_source())
            }
            _ => false,
        };
        eligible.then(|| node.with_scalar_param("direct_source", Literal::Int(1)))
    }
}
