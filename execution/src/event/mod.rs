//! Event-mode verification: an application-level hash chain over emitted
//! logs makes omitted or tampered logs detectable.

mod processor;
mod verifier;

pub use processor::LogProcessor;
pub use verifier::LogVerifier;

use alloy::primitives::B256;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventError {
    #[error("log carries no signature topic")]
    MissingSignature,
    #[error("unknown event signature {0}")]
    UnknownEvent(B256),
    #[error("failed to decode log: {0}")]
    Decode(#[from] alloy::dyn_abi::Error),
    #[error("event argument count mismatch")]
    ArgumentMismatch,
    #[error("hash chain head mismatch: expected {expected}, computed {computed}")]
    HeadMismatch { expected: B256, computed: B256 },
}
