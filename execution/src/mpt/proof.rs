use std::collections::HashMap;

use alloy::primitives::{keccak256, B256};
use alloy_trie::EMPTY_ROOT_HASH;

use super::node::{key_nibbles, ChildRef, Node};
use super::MptError;

/// Verifies a Merkle proof for `key` against `root`.
///
/// Walks the hexary trie formed by the proof nodes, checking that every
/// resolved node hashes to the reference its parent committed to. Returns
/// the RLP payload stored at the key on inclusion, `None` on a valid
/// exclusion proof (empty branch slot, or a leaf/extension whose path
/// diverges from the key), and an error for anything else.
pub fn verify_proof(
    root: B256,
    key: B256,
    proof: &[impl AsRef<[u8]>],
) -> Result<Option<Vec<u8>>, MptError> {
    if root == EMPTY_ROOT_HASH {
        return Ok(None);
    }

    let nodes: HashMap<B256, &[u8]> = proof
        .iter()
        .map(|node| (keccak256(node.as_ref()), node.as_ref()))
        .collect();

    let path = key_nibbles(key);
    let mut offset = 0;
    let mut current = resolve(&nodes, ChildRef::Hash(root))?;

    loop {
        match Node::decode(&current)? {
            Node::Leaf { path: leaf_path, value } => {
                // A leaf with a diverging remainder is a valid exclusion
                // witness for the key.
                return Ok((leaf_path == path[offset..]).then_some(value));
            }
            Node::Extension { path: ext_path, child } => {
                if !path[offset..].starts_with(&ext_path) {
                    return Ok(None);
                }
                offset += ext_path.len();
                current = resolve(&nodes, child)?;
            }
            Node::Branch { mut children, value } => {
                if offset == path.len() {
                    return Ok(value);
                }
                let nibble = path[offset] as usize;
                match children[nibble].take() {
                    None => return Ok(None),
                    Some(child) => {
                        offset += 1;
                        current = resolve(&nodes, child)?;
                    }
                }
            }
        }
    }
}

fn resolve(nodes: &HashMap<B256, &[u8]>, child: ChildRef) -> Result<Vec<u8>, MptError> {
    match child {
        ChildRef::Hash(hash) => nodes
            .get(&hash)
            .map(|raw| raw.to_vec())
            .ok_or(MptError::MissingNode(hash)),
        ChildRef::Inline(raw) => Ok(raw),
    }
}
