use std::sync::Arc;

use alloy::consensus::Header;
use async_trait::async_trait;
use sparseth_chainstore::{HeaderStore, StateStore};
use sparseth_config::{AccountsConfig, ChainSpec};
use sparseth_storage::KeyValueStore;
use tracing::{debug, warn};

use crate::monitor::Processor;
use crate::provider::Provider;
use crate::rpc::ExecutionRpc;

use super::{Preparer, RevertingDb, StateVerifier, TracingDb, TxExecutor, WorldState};

/// Sparse-mode block processor: downloads and re-executes the transactions
/// relevant to the monitored accounts and verifies the result against the
/// canonical chain.
///
/// Unlike the per-account event processors, a single instance serves all
/// monitored accounts and exclusively owns the persistent sparse state.
pub struct TxProcessor<R: ExecutionRpc> {
    provider: Provider<R>,
    preparer: Preparer<R>,
    executor: TxExecutor,
    verifier: StateVerifier<R>,
    world: RevertingDb,
    accounts: Arc<AccountsConfig>,
}

impl<R: ExecutionRpc> TxProcessor<R> {
    pub fn new(
        accounts: Arc<AccountsConfig>,
        chain: ChainSpec,
        db: Arc<dyn KeyValueStore>,
        rpc: Arc<R>,
    ) -> Self {
        let provider = Provider::new(rpc);
        let headers = HeaderStore::new(db.clone());

        let preparer = Preparer::new(provider.clone(), headers.clone(), accounts.clone());
        let executor = TxExecutor::new(chain);
        let verifier = StateVerifier::new(headers, provider.clone());

        // The verified and complete state of all monitored accounts.
        let world = RevertingDb::new(WorldState::new(StateStore::new(db)));

        Self {
            provider,
            preparer,
            executor,
            verifier,
            world,
            accounts,
        }
    }

    pub fn world(&self) -> &RevertingDb {
        &self.world
    }

    // Copies the changes relevant to monitored accounts from the transient
    // execution state into the persistent world state. Every write goes
    // through the journal so a failed verification can roll it back.
    fn merge(&mut self, from: &TracingDb) {
        for address in from.written_accounts() {
            if self.accounts.contains(address) {
                let world = from.world();
                self.world.set_nonce(address, world.nonce(address));
                self.world.set_balance(address, world.balance(address));
                self.world.set_code(address, world.code(address));
            }
        }

        for account in &self.accounts.accounts {
            for slot in from.written_storage_slots(account.address) {
                let value = from.world().storage(account.address, slot);
                self.world.set_state(account.address, slot, value);
            }
        }
    }
}

#[async_trait]
impl<R: ExecutionRpc> Processor for TxProcessor<R> {
    async fn process_block(&mut self, header: &Header) -> eyre::Result<()> {
        let num = header.number;

        debug!(target: "sparseth::sparse", num, "download txs for block");
        let txs = self.provider.get_txs_at_block(header).await?;

        debug!(target: "sparseth::sparse", num, "filter txs for block");
        let relevant = self.preparer.filter_txs(header, txs).await?;
        debug!(
            target: "sparseth::sparse",
            num,
            relevant = relevant.len(),
            "filtered transactions"
        );

        if relevant.is_empty() {
            debug!(target: "sparseth::sparse", num, "no txs to process, skip re-execution");
            return Ok(());
        }

        debug!(target: "sparseth::sparse", num, "prepare state for block");
        let mut transient = self.preparer.load_state(header, &relevant).await?;

        debug!(target: "sparseth::sparse", num, "re-execute transactions");
        self.executor.execute_txs(header, &relevant, &mut transient)?;

        debug!(target: "sparseth::sparse", num, "verify uninitialized reads");
        self.verifier
            .verify_uninitialized_reads(header, &transient)
            .await?;

        // From here on the persistent state is being mutated; any failure
        // must roll it back before surfacing.
        self.merge(&transient);

        for account in &self.accounts.accounts {
            if let Err(err) = self
                .verifier
                .verify_completeness(account, header, &self.world)
                .await
            {
                warn!(
                    target: "sparseth::sparse",
                    num,
                    account = %account.address,
                    %err,
                    "state verification failed, reverting block changes"
                );
                self.world.revert();
                return Err(err.into());
            }
        }

        let root = self.world.commit(num)?;
        self.world = self.world.with_root(root)?;

        debug!(target: "sparseth::sparse", num, %root, "block verified and committed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::mock_rpc::MockRpc;
    use crate::test_util::{proof_response, StateTrie};
    use alloy::consensus::{Header, SignableTransaction, TxLegacy};
    use alloy::network::TxSignerSync;
    use alloy::primitives::{Address, Bytes, TxKind, B256, U256};
    use alloy::signers::local::PrivateKeySigner;
    use sparseth_config::AccountConfig;
    use sparseth_storage::MemoryStore;

    const GAS_PRICE: u128 = 0;

    fn monitored(addresses: &[Address]) -> Arc<AccountsConfig> {
        Arc::new(AccountsConfig {
            accounts: addresses
                .iter()
                .map(|addr| AccountConfig {
                    address: *addr,
                    event: None,
                    sparse: None,
                })
                .collect(),
        })
    }

    fn transfer(signer: &PrivateKeySigner, nonce: u64, to: Address, value: u64) -> alloy::consensus::TxEnvelope {
        let mut tx = TxLegacy {
            chain_id: Some(ChainSpec::anvil().chain_id),
            nonce,
            gas_price: GAS_PRICE,
            gas_limit: 21_000,
            to: TxKind::Call(to),
            value: U256::from(value),
            input: Bytes::new(),
        };
        let signature = signer.sign_transaction_sync(&mut tx).unwrap();
        tx.into_signed(signature).into()
    }

    // One funded sender transfers 100 wei to the monitored account in
    // block 2. The mock endpoint serves consistent pre and post states.
    struct Scenario {
        rpc: MockRpc,
        db: Arc<MemoryStore>,
        head: Header,
        monitored_addr: Address,
    }

    fn scenario(tamper_txs: bool) -> Scenario {
        let signer = PrivateKeySigner::random();
        let sender = signer.address();
        let monitored_addr = Address::repeat_byte(0x55);
        let coinbase = Address::repeat_byte(0xc0);

        // State before block 2.
        let mut pre = StateTrie::default();
        pre.insert_account(sender, 0, U256::from(1_000_000), &[]);
        pre.insert_account(monitored_addr, 0, U256::from(10), &[]);

        let prev = Header {
            number: 1,
            state_root: pre.root(),
            gas_limit: 30_000_000,
            ..Default::default()
        };

        // State after block 2: 100 wei moved, sender nonce bumped.
        let mut post = StateTrie::default();
        post.insert_account(sender, 1, U256::from(999_900), &[]);
        post.insert_account(monitored_addr, 0, U256::from(110), &[]);

        let tx = transfer(&signer, 0, monitored_addr, 100);
        let txs = vec![tx.clone()];
        let tx_root = alloy::consensus::proofs::calculate_transaction_root(&txs);

        let head = Header {
            number: 2,
            parent_hash: prev.hash_slow(),
            state_root: post.root(),
            transactions_root: tx_root,
            gas_limit: 30_000_000,
            base_fee_per_gas: Some(0),
            beneficiary: coinbase,
            timestamp: 1_700_000_000,
            ..Default::default()
        };

        let rpc = MockRpc::new(ChainSpec::anvil().chain_id);
        rpc.add_header(prev.clone());
        rpc.add_header(head.clone());
        // The adversarial endpoint withholds the transaction.
        rpc.add_block_txs(2, if tamper_txs { vec![] } else { txs });

        // Proofs at the parent, for state loading and read verification.
        rpc.add_proof(sender, 1, proof_response(&pre, sender, &[]));
        rpc.add_proof(monitored_addr, 1, proof_response(&pre, monitored_addr, &[]));
        rpc.add_proof(coinbase, 1, proof_response(&pre, coinbase, &[]));
        // Proofs at the head, for completeness verification.
        rpc.add_proof(monitored_addr, 2, proof_response(&post, monitored_addr, &[]));

        let db = Arc::new(MemoryStore::new());
        let headers = HeaderStore::new(db.clone());
        headers.put(&prev).unwrap();
        headers.put(&head).unwrap();

        Scenario {
            rpc,
            db,
            head,
            monitored_addr,
        }
    }

    #[tokio::test]
    async fn verified_block_commits_monitored_state() {
        let scenario = scenario(false);
        let accounts = monitored(&[scenario.monitored_addr]);

        let mut processor = TxProcessor::new(
            accounts,
            ChainSpec::anvil(),
            scenario.db.clone(),
            Arc::new(scenario.rpc),
        );

        processor.process_block(&scenario.head).await.unwrap();

        assert_eq!(
            processor.world().balance(scenario.monitored_addr),
            U256::from(110)
        );
    }

    #[tokio::test]
    async fn withheld_tx_rejects_block_and_keeps_state() {
        let scenario = scenario(true);
        let accounts = monitored(&[scenario.monitored_addr]);

        let mut processor = TxProcessor::new(
            accounts,
            ChainSpec::anvil(),
            scenario.db.clone(),
            Arc::new(scenario.rpc),
        );

        let before = processor.world().state_root();
        assert!(processor.process_block(&scenario.head).await.is_err());

        // The persistent sparse state is bit-identical to before.
        assert_eq!(processor.world().state_root(), before);
        assert_eq!(
            processor.world().balance(scenario.monitored_addr),
            U256::ZERO
        );
    }

    #[tokio::test]
    async fn block_without_relevant_txs_is_skipped() {
        let scenario = scenario(false);
        // Nothing monitored: the transfer is filtered out entirely.
        let accounts = monitored(&[Address::repeat_byte(0x99)]);

        let mut processor = TxProcessor::new(
            accounts,
            ChainSpec::anvil(),
            scenario.db.clone(),
            Arc::new(scenario.rpc),
        );

        let before = processor.world().state_root();
        processor.process_block(&scenario.head).await.unwrap();
        assert_eq!(processor.world().state_root(), before);
    }
}
