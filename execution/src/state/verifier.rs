use alloy::consensus::Header;
use alloy::primitives::B256;
use sparseth_chainstore::HeaderStore;
use sparseth_config::AccountConfig;
use tracing::{debug, info};

use crate::provider::Provider;
use crate::rpc::ExecutionRpc;

use super::{RevertingDb, TracingDb, VerifyError};

/// Verifies the two completeness conditions of a re-executed block: no
/// uninitialized read hides a missed dependency, and every monitored
/// account agrees with its canonical counterpart.
pub struct StateVerifier<R: ExecutionRpc> {
    headers: HeaderStore,
    provider: Provider<R>,
}

impl<R: ExecutionRpc> StateVerifier<R> {
    pub fn new(headers: HeaderStore, provider: Provider<R>) -> Self {
        Self { headers, provider }
    }

    /// Checks every uninitialized read the execution performed against the
    /// state before the block.
    ///
    /// A read of an account that existed, or of a non-default slot, means
    /// the preparer failed to load a dependency the execution needed; the
    /// block must be rejected.
    pub async fn verify_uninitialized_reads(
        &self,
        header: &Header,
        transient: &TracingDb,
    ) -> Result<(), VerifyError> {
        let prev_num = header.number.saturating_sub(1);
        let prev = self.headers.get_by_number(prev_num)?;

        for address in transient.uninitialized_account_reads() {
            if self
                .provider
                .get_account_at_block(address, &prev)
                .await?
                .is_some()
            {
                return Err(VerifyError::UninitializedAccountRead(address));
            }
        }

        for (address, slots) in transient.uninitialized_storage_reads() {
            // Slots of an account absent before the block are zero by
            // definition, so the read was sound.
            if self
                .provider
                .get_account_at_block(address, &prev)
                .await?
                .is_none()
            {
                continue;
            }

            for slot in slots {
                let value = self
                    .provider
                    .get_storage_at_block(address, slot, &prev)
                    .await?;
                if value.is_some_and(|value| value != B256::ZERO) {
                    return Err(VerifyError::UninitializedStorageRead { address, slot });
                }
            }
        }

        Ok(())
    }

    /// Checks that the locally tracked state of a monitored account is
    /// complete at the given canonical header.
    ///
    /// For any account the basic fields and the storage root must match;
    /// contract accounts with an interaction-counter slot additionally
    /// compare the local counter with the verified on-chain value.
    pub async fn verify_completeness(
        &self,
        account: &AccountConfig,
        header: &Header,
        world: &RevertingDb,
    ) -> Result<(), VerifyError> {
        let address = account.address;
        debug!(
            target: "sparseth::verifier",
            %address,
            num = header.number,
            "verify state completeness"
        );

        let Some(expected) = self.provider.get_account_at_block(address, header).await? else {
            info!(
                target: "sparseth::verifier",
                %address,
                num = header.number,
                "account does not exist on-chain"
            );
            return Ok(());
        };

        if !world.exist(address) {
            return Err(VerifyError::AccountMissing(address));
        }

        let nonce = world.nonce(address);
        if expected.nonce != nonce {
            return Err(VerifyError::NonceMismatch {
                address,
                expected: expected.nonce,
                actual: nonce,
            });
        }

        if expected.balance != world.balance(address) {
            return Err(VerifyError::BalanceMismatch { address });
        }

        if expected.code_hash != world.code_hash(address) {
            return Err(VerifyError::CodeHashMismatch { address });
        }

        // Checked before the storage root so a withheld state-changing
        // call surfaces as a counter mismatch.
        if let Some(sparse) = &account.sparse {
            let counter = self
                .provider
                .get_storage_at_block(address, sparse.count_slot, header)
                .await?
                .unwrap_or_default();
            let actual = world.storage(address, sparse.count_slot);
            if counter != actual {
                return Err(VerifyError::CounterMismatch {
                    address,
                    expected: counter,
                    actual,
                });
            }
        }

        let storage_root = world.storage_root(address);
        if expected.storage_root != storage_root {
            return Err(VerifyError::StorageRootMismatch {
                address,
                expected: expected.storage_root,
                actual: storage_root,
            });
        }

        Ok(())
    }
}
