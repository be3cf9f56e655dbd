//! Row slicing of whole plans.
//!
//! `slice(node, begin, end)` builds a plan producing rows `begin..end` of
//! `node` by pushing the row range down to the leaves: sources narrow their
//! row window, ranges shift, constants shorten and linear nodes re-slice
//! their inputs with the same range. Appends split the range at the length
//! of their first input. Shared sub-plans sliced with the same range stay
//! shared.

use std::collections::HashMap;

use crate::dag::{make_plan_node, node_addr, Literal, OperatorKind, PNode};
use crate::infer::InferenceCache;

/// Rows `begin..end` of `node`.
///
/// # Panics
///
/// Panics when the range does not fit inside the node's output or when the
/// plan contains a node whose row positions depend on the data (a filter).
pub fn slice(node: &PNode, begin: u64, end: u64) -> PNode {
    SliceCache::default().slice(node, begin, end)
}

/// Memo of already-sliced nodes, keyed by node identity and row range.
#[derive(Default)]
pub struct SliceCache {
    sliced: HashMap<(usize, u64, u64), (PNode, PNode)>,
    lengths: InferenceCache,
}

impl SliceCache {
    pub fn slice(&mut self, node: &PNode, begin: u64, end: u64) -> PNode {
        let key = (node_addr(node), begin, end);
        if let Some((_, out)) = self.sliced.get(&key) {
            return out.clone();
        }
        let kind = node.kind();
        let len = self.lengths.output_length(node).unwrap_or_else(|| {
            panic!("malformed plan: cannot slice {kind}: its length depends on the data")
        });
        assert!(
            begin <= end && end <= len,
            "malformed plan: slice {begin}..{end} outside 0..{len} of {kind}"
        );

        let out = if begin == 0 && end == len {
            node.clone()
        } else {
            match kind {
                OperatorKind::Source => {
                    let first = node.int_param("begin");
                    let mut params = node.scalar_params().clone();
                    params.insert("begin".into(), Literal::Int(first + begin as i64));
                    params.insert("end".into(), Literal::Int(first + end as i64));
                    make_plan_node(kind, vec![], params, node.opaque_params().clone())
                }
                OperatorKind::Range => {
                    let start = node.int_param("start");
                    let mut params = node.scalar_params().clone();
                    params.insert("start".into(), Literal::Int(start.wrapping_add(begin as i64)));
                    params.insert("end".into(), Literal::Int(start.wrapping_add(end as i64)));
                    make_plan_node(kind, vec![], params, node.opaque_params().clone())
                }
                OperatorKind::Constant => {
                    node.with_scalar_param("length", Literal::Int((end - begin) as i64))
                }
                OperatorKind::Append => {
                    let first = node.input(0);
                    let second = node.input(1);
                    let split = self.lengths.output_length(first).unwrap_or(0);
                    if end <= split {
                        self.slice(first, begin, end)
                    } else if begin >= split {
                        self.slice(second, begin - split, end - split)
                    } else {
                        let head = self.slice(first, begin, split);
                        let tail = self.slice(second, 0, end - split);
                        node.with_inputs(vec![head, tail])
                    }
                }
                _ => {
                    let inputs = node
                        .inputs()
                        .iter()
                        .map(|i| self.slice(i, begin, end))
                        .collect();
                    node.with_inputs(inputs)
                }
            }
        };
        self.sliced.insert(key, (node.clone(), out.clone()));
        out
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::infer::{infer_output_length, infer_output_types};
    use crate::make;

    #[test]
    fn ranges_and_constants_narrow() {
        let r = slice(&make::range(10, 20), 2, 5);
        assert_eq!((r.int_param("start"), r.int_param("end")), (12, 15));

        let c = slice(&make::constant(Literal::Int(7), 9), 3, 9);
        assert_eq!(c.int_param("length"), 6);
        assert_eq!(c.scalar("value"), Some(&Literal::Int(7)));
    }

    #[test]
    fn full_range_returns_the_same_node() {
        let r = make::range(0, 4);
        assert!(Arc::ptr_eq(&slice(&r, 0, 4), &r));
    }

    #[test]
    fn append_splits_at_the_first_length() {
        let a = make::append(&make::range(0, 4), &make::range(100, 106));

        let head = slice(&a, 1, 3);
        assert_eq!(head.kind(), OperatorKind::Range);
        assert_eq!(head.int_param("start"), 1);

        let tail = slice(&a, 5, 8);
        assert_eq!(tail.kind(), OperatorKind::Range);
        assert_eq!((tail.int_param("start"), tail.int_param("end")), (101, 104));

        let both = slice(&a, 2, 7);
        assert_eq!(both.kind(), OperatorKind::Append);
        assert_eq!(infer_output_length(&both), Some(5));
    }

    #[test]
    fn linear_nodes_keep_sharing() {
        let r = make::range(0, 8);
        let u = make::union(&r, &r);
        let p = make::project(&u, &[1, 0]);
        let out = slice(&p, 2, 6);
        assert_eq!(infer_output_types(&out), infer_output_types(&p));
        assert_eq!(infer_output_length(&out), Some(4));
        let u2 = out.input(0);
        assert!(Arc::ptr_eq(u2.input(0), u2.input(1)));
    }

    #[test]
    #[should_panic(expected = "cannot slice")]
    fn filters_cannot_be_sliced() {
        let r = make::range(0, 4);
        slice(&make::logical_filter(&r, &r), 0, 2);
    }

    #[test]
    #[should_panic(expected = "outside")]
    fn slice_past_the_end_panics() {
        slice(&make::range(0, 4), 2, 5);
    }
}
