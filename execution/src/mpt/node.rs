use alloy::primitives::B256;
use alloy_rlp::Header as RlpHeader;

use super::MptError;

/// A decoded trie node. Paths are stored as expanded nibble sequences.
#[derive(Debug)]
pub(crate) enum Node {
    Branch {
        children: [Option<ChildRef>; 16],
        value: Option<Vec<u8>>,
    },
    Extension {
        path: Vec<u8>,
        child: ChildRef,
    },
    Leaf {
        path: Vec<u8>,
        value: Vec<u8>,
    },
}

/// Reference to a child node: a 32-byte hash, or the raw RLP of a node
/// shorter than 32 bytes embedded directly in its parent.
#[derive(Debug, Clone)]
pub(crate) enum ChildRef {
    Hash(B256),
    Inline(Vec<u8>),
}

// One RLP item inside a node list: its payload and the raw encoding
// including the item header (needed for embedded child nodes).
struct Item<'a> {
    list: bool,
    payload: &'a [u8],
    raw: &'a [u8],
}

fn decode_item<'a>(buf: &mut &'a [u8]) -> Result<Item<'a>, MptError> {
    let orig = *buf;
    let header = RlpHeader::decode(buf)?;
    if header.payload_length > buf.len() {
        return Err(MptError::Malformed("item payload exceeds node"));
    }

    let payload = &buf[..header.payload_length];
    *buf = &buf[header.payload_length..];
    let consumed = orig.len() - buf.len();

    Ok(Item {
        list: header.list,
        payload,
        raw: &orig[..consumed],
    })
}

fn child_ref(item: &Item<'_>) -> Result<Option<ChildRef>, MptError> {
    if item.list {
        // Nodes shorter than 32 bytes are embedded by value.
        return Ok(Some(ChildRef::Inline(item.raw.to_vec())));
    }
    match item.payload.len() {
        0 => Ok(None),
        32 => Ok(Some(ChildRef::Hash(B256::from_slice(item.payload)))),
        _ => Err(MptError::Malformed("child reference is neither empty nor a hash")),
    }
}

// Expands a hex-prefix encoded path into nibbles, reporting whether the
// node is a leaf.
fn decode_path(encoded: &[u8]) -> Result<(Vec<u8>, bool), MptError> {
    let Some(&first) = encoded.first() else {
        return Err(MptError::Malformed("empty path"));
    };

    let flags = first >> 4;
    if flags > 3 {
        return Err(MptError::Malformed("invalid path flags"));
    }
    let is_leaf = flags & 0x2 != 0;
    let is_odd = flags & 0x1 != 0;

    let mut nibbles = Vec::with_capacity(encoded.len() * 2);
    if is_odd {
        nibbles.push(first & 0x0f);
    } else if first & 0x0f != 0 {
        return Err(MptError::Malformed("non-zero padding nibble"));
    }
    for byte in &encoded[1..] {
        nibbles.push(byte >> 4);
        nibbles.push(byte & 0x0f);
    }

    Ok((nibbles, is_leaf))
}

impl Node {
    /// Decodes a single trie node from its RLP encoding.
    pub(crate) fn decode(buf: &[u8]) -> Result<Self, MptError> {
        let mut cursor = buf;
        let header = RlpHeader::decode(&mut cursor)?;
        if !header.list {
            return Err(MptError::Malformed("node is not a list"));
        }
        if cursor.len() != header.payload_length {
            return Err(MptError::Malformed("trailing bytes after node"));
        }

        let mut items = Vec::with_capacity(17);
        while !cursor.is_empty() {
            items.push(decode_item(&mut cursor)?);
        }

        match items.len() {
            17 => {
                let mut children: [Option<ChildRef>; 16] = Default::default();
                for (i, item) in items[..16].iter().enumerate() {
                    children[i] = child_ref(item)?;
                }

                let value_item = &items[16];
                if value_item.list {
                    return Err(MptError::Malformed("branch value is a list"));
                }
                let value =
                    (!value_item.payload.is_empty()).then(|| value_item.payload.to_vec());

                Ok(Node::Branch { children, value })
            }
            2 => {
                if items[0].list {
                    return Err(MptError::Malformed("path is a list"));
                }
                let (path, is_leaf) = decode_path(items[0].payload)?;

                if is_leaf {
                    if items[1].list {
                        return Err(MptError::Malformed("leaf value is a list"));
                    }
                    Ok(Node::Leaf {
                        path,
                        value: items[1].payload.to_vec(),
                    })
                } else {
                    let child = child_ref(&items[1])?
                        .ok_or(MptError::Malformed("extension without child"))?;
                    Ok(Node::Extension { path, child })
                }
            }
            _ => Err(MptError::Malformed("node is neither branch nor short node")),
        }
    }
}

/// Expands a 32-byte key into its nibble path.
pub(crate) fn key_nibbles(key: B256) -> Vec<u8> {
    key.iter().flat_map(|b| [b >> 4, b & 0x0f]).collect()
}
