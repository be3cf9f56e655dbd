//! Materializability analysis.
//!
//! A chain streams all inputs of a multi-input node in lockstep, batch by
//! batch. That only works when each input produces its rows at positions
//! fixed by the segment split, i.e. when no non-LINEAR node (a filter) sits
//! anywhere below that input.
//!
//! An append stacks two whole streams, so its rows never split by segment:
//! any plan containing one needs materialization first.

use std::collections::HashMap;

use colflow_core::dag::{node_addr, OperatorKind, PNode};

/// Memo of "every node in this sub-plan is LINEAR".
#[derive(Default)]
pub struct LinearityCache {
    memo: HashMap<usize, (PNode, bool)>,
}

impl LinearityCache {
    pub fn is_linear_subtree(&mut self, node: &PNode) -> bool {
        if let Some((_, v)) = self.memo.get(&node_addr(node)) {
            return *v;
        }
        let v = node.attributes().linear
            && node.inputs().iter().all(|i| self.is_linear_subtree(i));
        self.memo.insert(node_addr(node), (node.clone(), v));
        v
    }
}

/// True when the plan can run as one chain per segment without
/// pre-executing any sub-plan.
pub fn is_directly_materializable(root: &PNode) -> bool {
    let mut cache = LinearityCache::default();
    let mut seen = HashMap::new();
    check(root, &mut cache, &mut seen)
}

fn check(node: &PNode, cache: &mut LinearityCache, seen: &mut HashMap<usize, PNode>) -> bool {
    if seen.insert(node_addr(node), node.clone()).is_some() {
        return true;
    }
    if node.kind() == OperatorKind::Append {
        return false;
    }
    if node.inputs().len() > 1 && !node.inputs().iter().all(|i| cache.is_linear_subtree(i)) {
        return false;
    }
    node.inputs().iter().all(|i| check(i, cache, seen))
}
