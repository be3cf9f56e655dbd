//! Stable hashing helpers for plans and manifests.

use std::collections::HashMap;

use blake3::Hasher;

use crate::dag::{node_addr, PNode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    pub fn to_hex(&self) -> String {
        // blake3 hex(32b) is 64 hex chars
        let mut s = String::with_capacity(64);
        for b in &self.0 {
            use std::fmt::Write as _;
            let _ = write!(&mut s, "{:02x}", b);
        }
        s
    }
}

impl std::fmt::Display for Hash256 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

pub fn hash_bytes(bytes: &[u8]) -> Hash256 {
    let mut h = Hasher::new();
    h.update(bytes);
    let out = h.finalize();
    Hash256(out.into())
}

/// Structural fingerprint of a plan.
///
/// Two plans have the same fingerprint when they have the same shape, the
/// same scalar parameters and share the same opaque values (user functions
/// and sources compare by identity). Sharing itself is not visible: a DAG
/// and its tree expansion hash alike. Valid within one process only.
pub fn fingerprint(node: &PNode) -> Hash256 {
    let mut memo = HashMap::new();
    fingerprint_memo(node, &mut memo)
}

fn fingerprint_memo(node: &PNode, memo: &mut HashMap<usize, (PNode, Hash256)>) -> Hash256 {
    if let Some((_, h)) = memo.get(&node_addr(node)) {
        return *h;
    }
    let children: Vec<Hash256> = node
        .inputs()
        .iter()
        .map(|i| fingerprint_memo(i, memo))
        .collect();

    let mut h = Hasher::new();
    h.update(node.kind().name().as_bytes());
    for (name, value) in node.scalar_params() {
        h.update(name.as_bytes());
        // Literal serialization cannot fail
        if let Ok(bytes) = serde_json::to_vec(value) {
            h.update(&bytes);
        }
    }
    for (name, value) in node.opaque_params() {
        h.update(name.as_bytes());
        h.update(value.kind_name().as_bytes());
        h.update(&value.addr().to_le_bytes());
    }
    h.update(&(children.len() as u64).to_le_bytes());
    for child in &children {
        h.update(&child.0);
    }
    let out = Hash256(h.finalize().into());
    memo.insert(node_addr(node), (node.clone(), out));
    out
}
