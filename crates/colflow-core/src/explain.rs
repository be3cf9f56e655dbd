//! Human-readable plan rendering.

use std::collections::HashMap;
use std::fmt::Write as _;

use crate::dag::{node_addr, PNode};
use crate::infer::InferenceCache;

/// Render `node` and its inputs as an indented tree.
///
/// Every node gets a `#n` label; a node reached a second time through
/// another parent is printed as a back-reference `-> #n` instead of being
/// expanded again.
///
/// ```text
/// #0 project indices=[2, 0] :: [Int64, Int64] len=3
///   #1 source begin=0 columns=[0, 1, 2] end=3 source=<batch_source ..> :: [..] len=3
/// ```
pub fn repr(node: &PNode) -> String {
    let mut out = String::new();
    let mut labels = HashMap::new();
    let mut cache = InferenceCache::default();
    render(node, 0, &mut labels, &mut cache, &mut out);
    out
}

fn render(
    node: &PNode,
    depth: usize,
    labels: &mut HashMap<usize, usize>,
    cache: &mut InferenceCache,
    out: &mut String,
) {
    let indent = "  ".repeat(depth);
    if let Some(label) = labels.get(&node_addr(node)) {
        let _ = writeln!(out, "{indent}-> #{label}");
        return;
    }
    let label = labels.len();
    labels.insert(node_addr(node), label);

    let _ = write!(out, "{indent}#{label} {}", node.kind());
    for (name, value) in node.scalar_params() {
        let _ = write!(out, " {name}={value}");
    }
    for (name, value) in node.opaque_params() {
        let _ = write!(out, " {name}={value:?}");
    }
    let types = cache.output_types(node);
    let len = cache
        .output_length(node)
        .map_or_else(|| "?".to_string(), |l| l.to_string());
    let _ = writeln!(out, " :: {types:?} len={len}");

    for input in node.inputs() {
        render(input, depth + 1, labels, cache, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::Literal;
    use crate::make;

    #[test]
    fn shared_nodes_render_once() {
        let r = make::range(0, 3);
        let u = make::union(&r, &r);
        let text = repr(&u);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("#0 union"));
        assert!(lines[1].contains("#1 range end=3 start=0 :: [Int64] len=3"));
        assert_eq!(lines[2].trim(), "-> #1");
    }

    #[test]
    fn unknown_lengths_print_as_question_mark() {
        let r = make::range(0, 3);
        let m = make::constant(Literal::Int(1), 3);
        let text = repr(&make::logical_filter(&r, &m));
        assert!(text.lines().next().unwrap().ends_with("len=?"));
    }
}
