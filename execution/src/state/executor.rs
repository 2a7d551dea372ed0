use alloy::consensus::{Header, Transaction as _, TxEnvelope};
use alloy::eips::eip4844::{calc_blob_gasprice, DATA_GAS_PER_BLOB};
use alloy::primitives::{Bloom, B256};
use revm::context::{BlockEnv, TxEnv};
use revm::context_interface::block::BlobExcessGasAndPrice;
use revm::primitives::hardfork::SpecId;
use revm::{Context, ExecuteCommitEvm, MainBuilder, MainContext};
use sparseth_config::{ChainSpec, Hardfork};
use thiserror::Error;
use tracing::debug;

use crate::types::{Receipt, TxWithContext};

use super::TracingDb;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("block gas pool exhausted at tx {0}")]
    GasPoolExhausted(u64),
    #[error("failed to apply tx at index {index}: {message}")]
    Apply { index: u64, message: String },
}

/// Receipts generated by re-executing the filtered transactions, aligned
/// one to one with the input.
pub struct ExecutionOutcome {
    pub receipts: Vec<Receipt>,
}

/// Re-executes filtered transactions in the context of their block.
///
/// The EVM sees only the configured chain parameters; ancestor headers are
/// not resolvable beyond the parent hash, so BLOCKHASH lookups are
/// best-effort.
pub struct TxExecutor {
    chain: ChainSpec,
}

impl TxExecutor {
    pub fn new(chain: ChainSpec) -> Self {
        Self { chain }
    }

    /// Executes the transactions against the given world state. The state
    /// must already contain the reconstructed pre-block data.
    pub fn execute_txs(
        &self,
        header: &Header,
        txs: &[TxWithContext],
        world: &mut TracingDb,
    ) -> Result<ExecutionOutcome, ExecutorError> {
        let block_hash = header.hash_slow();
        let block_env = self.block_env(header);
        let spec = spec_id(self.chain.fork);
        let chain_id = self.chain.chain_id;

        let blob_gas_price = header.excess_blob_gas.map(calc_blob_gasprice);

        let mut gas_pool = header.gas_limit;
        let mut cumulative_gas_used = 0u64;
        let mut receipts = Vec::with_capacity(txs.len());

        for tx in txs {
            if gas_pool < tx.tx.gas_limit() {
                return Err(ExecutorError::GasPoolExhausted(tx.index));
            }

            let tx_env = tx_env(&tx.tx, tx.sender, chain_id);

            // A failed construction or precheck (bad signature semantics,
            // nonce or fee mismatch) aborts the whole block; an internal
            // execution failure below becomes a failed receipt instead.
            let result = {
                let mut evm = Context::mainnet()
                    .with_db(&mut *world)
                    .with_block(block_env.clone())
                    .modify_cfg_chained(|cfg| {
                        cfg.chain_id = chain_id;
                        cfg.spec = spec;
                    })
                    .build_mainnet();

                evm.transact_commit(tx_env)
            }
            .map_err(|err| ExecutorError::Apply {
                index: tx.index,
                message: err.to_string(),
            })?;

            let gas_used = result.gas_used();
            gas_pool -= gas_used;
            cumulative_gas_used += gas_used;

            let status = result.is_success();
            let logs = result.into_logs();
            let mut bloom = Bloom::default();
            for log in &logs {
                bloom.accrue_log(log);
            }

            // Pre-Byzantium receipts commit to an intermediate root.
            let post_state = (!self.chain.fork.is_byzantium())
                .then(|| world.world().state_root());

            let blob_gas_used = tx
                .tx
                .blob_versioned_hashes()
                .map(|hashes| hashes.len() as u64 * DATA_GAS_PER_BLOB);
            receipts.push(Receipt {
                status,
                post_state,
                tx_type: tx.tx.tx_type() as u8,
                tx_hash: *tx.tx.tx_hash(),
                tx_index: tx.index,
                gas_used,
                cumulative_gas_used,
                block_hash,
                block_number: header.number,
                blob_gas_used,
                blob_gas_price: blob_gas_used.and(blob_gas_price),
                contract_address: Receipt::contract_address_for(&tx.tx, tx.sender),
                logs,
                bloom,
            });

            debug!(
                target: "sparseth::executor",
                block = header.number,
                index = tx.index,
                gas_used,
                status,
                "applied transaction"
            );
        }

        Ok(ExecutionOutcome { receipts })
    }

    fn block_env(&self, header: &Header) -> BlockEnv {
        let is_prague = self.chain.fork.is_prague();
        let blob_excess_gas_and_price = header
            .excess_blob_gas
            .map(|excess| BlobExcessGasAndPrice::new(excess, is_prague))
            .unwrap_or_else(|| BlobExcessGasAndPrice::new(0, is_prague));

        BlockEnv {
            number: header.number,
            beneficiary: header.beneficiary,
            timestamp: header.timestamp,
            gas_limit: header.gas_limit,
            basefee: header.base_fee_per_gas.unwrap_or_default(),
            difficulty: header.difficulty,
            prevrandao: Some(header.mix_hash),
            blob_excess_gas_and_price: Some(blob_excess_gas_and_price),
        }
    }
}

fn tx_env(tx: &TxEnvelope, sender: alloy::primitives::Address, chain_id: u64) -> TxEnv {
    TxEnv {
        tx_type: tx.tx_type() as u8,
        caller: sender,
        gas_limit: tx.gas_limit(),
        gas_price: tx.max_fee_per_gas(),
        kind: tx.kind(),
        value: tx.value(),
        data: tx.input().clone(),
        nonce: tx.nonce(),
        chain_id: tx.chain_id().or(Some(chain_id)),
        access_list: tx.access_list().cloned().unwrap_or_default(),
        gas_priority_fee: tx.max_priority_fee_per_gas(),
        blob_hashes: tx
            .blob_versioned_hashes()
            .map(|hashes| hashes.to_vec())
            .unwrap_or_default(),
        max_fee_per_blob_gas: tx.max_fee_per_blob_gas().unwrap_or_default(),
        authorization_list: vec![],
    }
}

fn spec_id(fork: Hardfork) -> SpecId {
    match fork {
        Hardfork::Frontier => SpecId::FRONTIER,
        Hardfork::Homestead => SpecId::HOMESTEAD,
        Hardfork::Byzantium => SpecId::BYZANTIUM,
        Hardfork::Berlin => SpecId::BERLIN,
        Hardfork::London => SpecId::LONDON,
        Hardfork::Paris => SpecId::MERGE,
        Hardfork::Shanghai => SpecId::SHANGHAI,
        Hardfork::Cancun => SpecId::CANCUN,
        Hardfork::Prague => SpecId::PRAGUE,
    }
}
