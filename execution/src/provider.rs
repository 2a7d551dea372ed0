use std::sync::Arc;

use alloy::consensus::proofs::calculate_transaction_root;
use alloy::consensus::{Header, Transaction as _, TxEnvelope};
use alloy::eips::eip2930::AccessList;
use alloy::primitives::{keccak256, Address, Bytes, B256};
use alloy::rpc::types::trace::geth::PreStateFrame;
use alloy::rpc::types::{Filter, Log, TransactionInput, TransactionRequest};
use tracing::debug;

use crate::errors::ExecutionError;
use crate::mpt;
use crate::rpc::ExecutionRpc;
use crate::types::{Account, TxWithIndex};

/// Verified access to on-chain data.
///
/// Every method either returns data that has been proof-checked against an
/// already-trusted header, or fails. The exceptions are explicitly
/// documented: logs (checked downstream by the event verifier) and the
/// access-list / prestate hints, which the sparse verifier re-checks
/// independently.
pub struct Provider<R: ExecutionRpc> {
    rpc: Arc<R>,
}

impl<R: ExecutionRpc> Clone for Provider<R> {
    fn clone(&self) -> Self {
        Self {
            rpc: self.rpc.clone(),
        }
    }
}

impl<R: ExecutionRpc> Provider<R> {
    pub fn new(rpc: Arc<R>) -> Self {
        Self { rpc }
    }

    /// Fetches the logs emitted by `address` in the given block.
    ///
    /// Not verified here: event mode establishes log integrity through the
    /// hash chain, and sparse mode does not consume logs.
    pub async fn get_logs_at_block(
        &self,
        address: Address,
        block: u64,
    ) -> Result<Vec<Log>, ExecutionError> {
        let filter = Filter::new()
            .address(address)
            .from_block(block)
            .to_block(block);
        Ok(self.rpc.get_logs(&filter).await?)
    }

    /// Fetches the complete, ordered transaction list of the block and
    /// verifies it against the header's transaction root.
    pub async fn get_txs_at_block(
        &self,
        header: &Header,
    ) -> Result<Vec<TxWithIndex>, ExecutionError> {
        let txs = self
            .rpc
            .get_block_txs(header.number)
            .await?
            .ok_or(ExecutionError::BlockNotFound(header.number))?;

        let computed = calculate_transaction_root(&txs);
        if computed != header.transactions_root {
            return Err(ExecutionError::TxRootMismatch {
                block: header.number,
                expected: header.transactions_root,
                computed,
            });
        }

        Ok(txs
            .into_iter()
            .enumerate()
            .map(|(index, tx)| TxWithIndex {
                tx,
                index: index as u64,
            })
            .collect())
    }

    /// Fetches and verifies the account at the given trusted header, or
    /// `None` if the account provably does not exist.
    pub async fn get_account_at_block(
        &self,
        address: Address,
        header: &Header,
    ) -> Result<Option<Account>, ExecutionError> {
        let proof = self.rpc.get_proof(address, &[], header.number).await?;

        mpt::verify_account_proof(header.state_root, address, &proof.account_proof)
            .map_err(|err| ExecutionError::InvalidAccountProof(address, err))
    }

    /// Fetches and verifies the value of a storage slot at the given
    /// trusted header. The account must exist at that header.
    pub async fn get_storage_at_block(
        &self,
        address: Address,
        slot: B256,
        header: &Header,
    ) -> Result<Option<B256>, ExecutionError> {
        let proof = self.rpc.get_proof(address, &[slot], header.number).await?;

        let account = mpt::verify_account_proof(header.state_root, address, &proof.account_proof)
            .map_err(|err| ExecutionError::InvalidAccountProof(address, err))?
            .ok_or(ExecutionError::AccountNotFound(address, header.number))?;

        let entry = proof
            .storage_proof
            .first()
            .ok_or(ExecutionError::MissingStorageProof(slot))?;

        let slot_hash = keccak256(slot);
        let value = mpt::verify_storage_proof(account.storage_root, slot_hash, &entry.proof)
            .map_err(|err| ExecutionError::InvalidStorageProof(address, slot, err))?;

        Ok(value.map(|bytes| B256::left_padding_from(&bytes)))
    }

    /// Fetches the account code at the given trusted header and checks it
    /// against the verified account's code hash.
    pub async fn get_code_at_block(
        &self,
        address: Address,
        header: &Header,
    ) -> Result<Bytes, ExecutionError> {
        let code = self.rpc.get_code(address, header.number).await?;

        let account = self
            .get_account_at_block(address, header)
            .await?
            .ok_or(ExecutionError::AccountNotFound(address, header.number))?;

        let computed = keccak256(&code);
        if computed != account.code_hash {
            return Err(ExecutionError::CodeHashMismatch {
                address,
                expected: account.code_hash,
                computed,
            });
        }

        Ok(code)
    }

    /// Asks the endpoint which accounts and slots the transaction touches.
    ///
    /// The result is a hint for state loading only; the sparse verifier
    /// independently checks every read the execution performs.
    pub async fn create_access_list(
        &self,
        tx: &TxEnvelope,
        from: Address,
        block: u64,
    ) -> Result<AccessList, ExecutionError> {
        let request = TransactionRequest {
            from: Some(from),
            to: Some(tx.kind()),
            value: Some(tx.value()),
            gas: Some(tx.gas_limit()),
            nonce: Some(tx.nonce()),
            input: TransactionInput::new(tx.input().clone()),
            ..Default::default()
        };

        debug!(target: "sparseth::provider", tx = %tx.tx_hash(), "request access list hint");
        Ok(self.rpc.create_access_list(&request, block).await?)
    }

    /// Fetches the prestate trace of a transaction: the minimal account set
    /// needed to re-execute it. Hint only.
    pub async fn get_tx_trace(&self, tx_hash: B256) -> Result<PreStateFrame, ExecutionError> {
        Ok(self.rpc.trace_prestate(tx_hash).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::mock_rpc::MockRpc;
    use crate::test_util::{proof_response, StateTrie};
    use alloy::primitives::U256;

    fn provider_with(rpc: MockRpc) -> Provider<MockRpc> {
        Provider::new(Arc::new(rpc))
    }

    #[tokio::test]
    async fn verified_account_read() {
        let address = Address::repeat_byte(0x11);
        let mut trie = StateTrie::default();
        trie.insert_account(address, 3, U256::from(1000), &[]);
        trie.insert_account(Address::repeat_byte(0x22), 1, U256::from(5), &[]);

        let header = Header {
            number: 9,
            state_root: trie.root(),
            ..Default::default()
        };

        let rpc = MockRpc::new(1);
        rpc.add_proof(address, 9, proof_response(&trie, address, &[]));
        let provider = provider_with(rpc);

        let account = provider
            .get_account_at_block(address, &header)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(account.nonce, 3);
        assert_eq!(account.balance, U256::from(1000));
    }

    #[tokio::test]
    async fn absent_account_reads_as_none() {
        let absent = Address::repeat_byte(0x99);
        let mut trie = StateTrie::default();
        trie.insert_account(Address::repeat_byte(0x11), 3, U256::from(1000), &[]);

        let header = Header {
            number: 9,
            state_root: trie.root(),
            ..Default::default()
        };

        let rpc = MockRpc::new(1);
        rpc.add_proof(absent, 9, proof_response(&trie, absent, &[]));
        let provider = provider_with(rpc);

        assert!(provider
            .get_account_at_block(absent, &header)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn account_proof_against_wrong_root_fails() {
        let address = Address::repeat_byte(0x11);
        let mut trie = StateTrie::default();
        trie.insert_account(address, 3, U256::from(1000), &[]);

        let header = Header {
            number: 9,
            state_root: B256::repeat_byte(0x42),
            ..Default::default()
        };

        let rpc = MockRpc::new(1);
        rpc.add_proof(address, 9, proof_response(&trie, address, &[]));
        let provider = provider_with(rpc);

        assert!(matches!(
            provider.get_account_at_block(address, &header).await,
            Err(ExecutionError::InvalidAccountProof(..))
        ));
    }

    #[tokio::test]
    async fn verified_storage_read() {
        let address = Address::repeat_byte(0x11);
        let slot = B256::with_last_byte(1);
        let value = B256::with_last_byte(0x2a);

        let mut trie = StateTrie::default();
        trie.insert_account(address, 1, U256::from(0), &[(slot, value)]);

        let header = Header {
            number: 4,
            state_root: trie.root(),
            ..Default::default()
        };

        let rpc = MockRpc::new(1);
        rpc.add_proof(address, 4, proof_response(&trie, address, &[slot]));
        let provider = provider_with(rpc);

        let read = provider
            .get_storage_at_block(address, slot, &header)
            .await
            .unwrap();
        assert_eq!(read, Some(value));

        // A never-written slot reads as absent.
        let empty_slot = B256::with_last_byte(0x77);
        let rpc = MockRpc::new(1);
        rpc.add_proof(address, 4, proof_response(&trie, address, &[empty_slot]));
        let provider = provider_with(rpc);

        let read = provider
            .get_storage_at_block(address, empty_slot, &header)
            .await
            .unwrap();
        assert_eq!(read, None);
    }

    #[tokio::test]
    async fn code_hash_mismatch_is_rejected() {
        let address = Address::repeat_byte(0x11);
        let code = Bytes::from(vec![0x60, 0x00]);

        let mut trie = StateTrie::default();
        trie.insert_contract(address, 1, U256::ZERO, &code, &[]);

        let header = Header {
            number: 2,
            state_root: trie.root(),
            ..Default::default()
        };

        let rpc = MockRpc::new(1);
        rpc.add_proof(address, 2, proof_response(&trie, address, &[]));
        rpc.add_code(address, 2, Bytes::from(vec![0xde, 0xad]));
        let provider = provider_with(rpc);

        assert!(matches!(
            provider.get_code_at_block(address, &header).await,
            Err(ExecutionError::CodeHashMismatch { .. })
        ));

        let rpc = MockRpc::new(1);
        rpc.add_proof(address, 2, proof_response(&trie, address, &[]));
        rpc.add_code(address, 2, code.clone());
        let provider = provider_with(rpc);

        assert_eq!(
            provider.get_code_at_block(address, &header).await.unwrap(),
            code
        );
    }

    #[tokio::test]
    async fn prestate_trace_hint_passes_through() {
        use alloy::rpc::types::trace::geth::{AccountState, PreStateFrame, PreStateMode};
        use std::collections::BTreeMap;

        let tx_hash = B256::repeat_byte(0x31);
        let touched = Address::repeat_byte(0x12);

        let mut accounts = BTreeMap::new();
        accounts.insert(
            touched,
            AccountState {
                balance: Some(U256::from(7)),
                ..Default::default()
            },
        );

        let rpc = MockRpc::new(1);
        rpc.add_prestate(tx_hash, PreStateFrame::Default(PreStateMode(accounts)));
        let provider = provider_with(rpc);

        match provider.get_tx_trace(tx_hash).await.unwrap() {
            PreStateFrame::Default(mode) => {
                assert_eq!(mode.0[&touched].balance, Some(U256::from(7)));
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[tokio::test]
    async fn tx_root_mismatch_is_rejected() {
        let header = Header {
            number: 5,
            transactions_root: alloy_trie::EMPTY_ROOT_HASH,
            ..Default::default()
        };

        // An empty list matches the empty root.
        let rpc = MockRpc::new(1);
        rpc.add_block_txs(5, vec![]);
        let provider = provider_with(rpc);
        assert!(provider.get_txs_at_block(&header).await.unwrap().is_empty());

        // A header committing to a different root rejects the list.
        let header = Header {
            number: 5,
            transactions_root: B256::repeat_byte(0x01),
            ..Default::default()
        };
        let rpc = MockRpc::new(1);
        rpc.add_block_txs(5, vec![]);
        let provider = provider_with(rpc);
        assert!(matches!(
            provider.get_txs_at_block(&header).await,
            Err(ExecutionError::TxRootMismatch { .. })
        ));
    }
}
