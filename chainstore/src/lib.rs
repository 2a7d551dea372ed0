//! Typed views over the key-value store for chain data.
//!
//! Everything the node persists lives under the `sp:` prefix so that a
//! backend shared with other writers never sees key collisions.

mod events;
mod headers;
mod schema;
mod state;

pub use events::{EventStore, StoredLog};
pub use headers::HeaderStore;
pub use state::StateStore;

use sparseth_storage::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChainStoreError {
    #[error("header not found")]
    HeaderNotFound,
    #[error("log not found")]
    LogNotFound,
    #[error("state snapshot not found")]
    StateNotFound,
    /// An index entry resolved to a missing record. Fatal: the store no
    /// longer describes a consistent chain.
    #[error("store corrupted: {0}")]
    Corrupted(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to decode stored value: {0}")]
    Rlp(#[from] alloy_rlp::Error),
}
