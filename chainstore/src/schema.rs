//! Key schema for everything the node stores directly.
//!
//! All keys live under the reserved `sp:` prefix:
//!
//! | entity           | key                                        |
//! |------------------|--------------------------------------------|
//! | log              | `sp:log:<tx_hash:32>:<log_index:u64 BE>`   |
//! | header by hash   | `sp:header:<hash:32>`                      |
//! | header by number | `sp:header::<num:u64 BE>`                  |
//! | event chain head | `sp:head:<address:20>`                     |
//! | state snapshot   | `sp:state:<root:32>`                       |

use alloy::primitives::{Address, B256};

const LOG_PREFIX: &[u8] = b"sp:log:";
const HEADER_PREFIX: &[u8] = b"sp:header:";
const CHAIN_HEAD_PREFIX: &[u8] = b"sp:head:";
const STATE_PREFIX: &[u8] = b"sp:state:";

/// log_key = sp:log:<tx_hash>:<log_index>
pub(crate) fn log_key(tx_hash: B256, log_index: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(LOG_PREFIX.len() + 32 + 1 + 8);
    key.extend_from_slice(LOG_PREFIX);
    key.extend_from_slice(tx_hash.as_slice());
    key.push(b':');
    key.extend_from_slice(&log_index.to_be_bytes());
    key
}

/// header_hash_key = sp:header:<hash>
pub(crate) fn header_hash_key(hash: B256) -> Vec<u8> {
    let mut key = Vec::with_capacity(HEADER_PREFIX.len() + 32);
    key.extend_from_slice(HEADER_PREFIX);
    key.extend_from_slice(hash.as_slice());
    key
}

/// header_number_key = sp:header::<num>
pub(crate) fn header_number_key(num: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(HEADER_PREFIX.len() + 1 + 8);
    key.extend_from_slice(HEADER_PREFIX);
    key.push(b':');
    key.extend_from_slice(&num.to_be_bytes());
    key
}

/// chain_head_key = sp:head:<address>
pub(crate) fn chain_head_key(address: Address) -> Vec<u8> {
    let mut key = Vec::with_capacity(CHAIN_HEAD_PREFIX.len() + 20);
    key.extend_from_slice(CHAIN_HEAD_PREFIX);
    key.extend_from_slice(address.as_slice());
    key
}

/// state_key = sp:state:<root>
pub(crate) fn state_key(root: B256) -> Vec<u8> {
    let mut key = Vec::with_capacity(STATE_PREFIX.len() + 32);
    key.extend_from_slice(STATE_PREFIX);
    key.extend_from_slice(root.as_slice());
    key
}
