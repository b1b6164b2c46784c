//! ENS-style namehash for external names.

use crate::derive::keccak256;
use crate::types::NameNode;

/// Namehash of a dot-separated name. The empty name hashes to the zero node.
pub fn namehash(name: &str) -> NameNode {
    let mut node = [0u8; 32];
    if name.is_empty() {
        return NameNode::new(node);
    }

    for label in name.rsplit('.') {
        let mut buf = [0u8; 64];
        buf[..32].copy_from_slice(&node);
        buf[32..].copy_from_slice(&keccak256(label.as_bytes()));
        node = keccak256(&buf);
    }

    NameNode::new(node)
}

/// Node of `label` registered directly under `parent`.
pub fn subname_node(label: &str, parent: &str) -> NameNode {
    if parent.is_empty() {
        namehash(label)
    } else {
        namehash(&format!("{label}.{parent}"))
    }
}
