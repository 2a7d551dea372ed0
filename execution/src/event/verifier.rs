use alloy::dyn_abi::{DynSolValue, EventExt};
use alloy::json_abi::JsonAbi;
use alloy::primitives::{keccak256, B256};
use alloy::rpc::types::Log;

use super::EventError;

/// Verifies completeness and integrity of event logs via a hash chain.
///
/// The monitored contract maintains a rolling head `H_n =
/// keccak256(abi.encode(H_{n-1}, arg_1, ..., arg_k))` in a known storage
/// slot, updating it on every tracked event. Folding the same function over
/// the delivered logs must land on the on-chain head; any omitted,
/// reordered or altered log diverges.
///
/// All tracked events must be non-anonymous.
pub struct LogVerifier {
    abi: JsonAbi,
    head: B256,
}

impl LogVerifier {
    /// Creates a verifier for the given contract ABI, seeded with the
    /// current chain head. The ABI must define every event that will be
    /// verified.
    pub fn new(abi: JsonAbi, head: B256) -> Self {
        Self { abi, head }
    }

    /// The current head of the hash chain.
    pub fn head(&self) -> B256 {
        self.head
    }

    /// Validates the ordered slice of logs against the expected chain
    /// head. On success the internal head advances; on failure it is left
    /// untouched and the block must be rejected.
    pub fn verify_logs(&mut self, logs: &[Log], expected: B256) -> Result<(), EventError> {
        let mut current = self.head;
        for log in logs {
            current = self.fold(current, log)?;
        }

        if current != expected {
            return Err(EventError::HeadMismatch {
                expected,
                computed: current,
            });
        }

        self.head = current;
        Ok(())
    }

    // Computes the next head after a single log: decode the event by its
    // signature topic, re-assemble the arguments in declared order with the
    // previous head prepended as a bytes32, ABI-encode and hash.
    fn fold(&self, prev: B256, log: &Log) -> Result<B256, EventError> {
        let topics = log.inner.data.topics();
        let Some(selector) = topics.first() else {
            return Err(EventError::MissingSignature);
        };

        let event = self
            .abi
            .events()
            .find(|event| !event.anonymous && event.selector() == *selector)
            .ok_or(EventError::UnknownEvent(*selector))?;

        let decoded =
            event.decode_log_parts(topics.iter().copied(), &log.inner.data.data)?;
        if decoded.indexed.len() + decoded.body.len() != event.inputs.len() {
            return Err(EventError::ArgumentMismatch);
        }

        let mut values = Vec::with_capacity(event.inputs.len() + 1);
        values.push(DynSolValue::FixedBytes(prev, 32));

        let mut indexed = decoded.indexed.into_iter();
        let mut body = decoded.body.into_iter();
        for input in &event.inputs {
            let value = if input.indexed {
                indexed.next()
            } else {
                body.next()
            }
            .ok_or(EventError::ArgumentMismatch)?;
            values.push(value);
        }

        Ok(keccak256(DynSolValue::Tuple(values).abi_encode_params()))
    }
}
