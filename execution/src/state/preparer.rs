use std::collections::HashSet;
use std::sync::Arc;

use alloy::consensus::{Header, Transaction as _};
use alloy::primitives::{Address, KECCAK256_EMPTY};
use sparseth_chainstore::{ChainStoreError, HeaderStore};
use sparseth_config::AccountsConfig;
use thiserror::Error;
use tracing::debug;

use crate::errors::ExecutionError;
use crate::provider::Provider;
use crate::rpc::ExecutionRpc;
use crate::types::{TxWithContext, TxWithIndex};

use super::{TracingDb, WorldState};

#[derive(Debug, Error)]
pub enum PrepareError {
    #[error("failed to recover sender of tx at index {index}: {source}")]
    Recovery {
        index: u64,
        #[source]
        source: alloy::consensus::crypto::RecoveryError,
    },
    #[error("block {0} has no parent")]
    NoParent(u64),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error(transparent)]
    Store(#[from] ChainStoreError),
}

/// Selects the transactions that can affect monitored accounts and
/// reconstructs the partial pre-block state they execute against.
pub struct Preparer<R: ExecutionRpc> {
    provider: Provider<R>,
    headers: HeaderStore,
    accounts: Arc<AccountsConfig>,
}

impl<R: ExecutionRpc> Preparer<R> {
    pub fn new(
        provider: Provider<R>,
        headers: HeaderStore,
        accounts: Arc<AccountsConfig>,
    ) -> Self {
        Self {
            provider,
            headers,
            accounts,
        }
    }

    /// Filters the block's transactions down to the ones that may touch a
    /// monitored account, directly or transitively.
    ///
    /// The scan runs in reverse block order: admitting a transaction adds
    /// its sender, recipient and access-list members to the tracked set,
    /// so earlier transactions that fed state into an admitted one are
    /// admitted as well. A single forward scan would miss them.
    pub async fn filter_txs(
        &self,
        header: &Header,
        txs: Vec<TxWithIndex>,
    ) -> Result<Vec<TxWithContext>, PrepareError> {
        let mut with_context = Vec::with_capacity(txs.len());
        for tx in txs {
            let sender = tx
                .recover_sender()
                .map_err(|source| PrepareError::Recovery {
                    index: tx.index,
                    source,
                })?;
            let access_list = self
                .provider
                .create_access_list(&tx.tx, sender, header.number)
                .await?;

            with_context.push(TxWithContext {
                tx: tx.tx,
                index: tx.index,
                sender,
                access_list,
            });
        }

        let mut tracked: HashSet<Address> = self
            .accounts
            .accounts
            .iter()
            .map(|acc| acc.address)
            .collect();

        let mut relevant = Vec::new();
        for ctx in with_context.into_iter().rev() {
            let recipient = ctx.tx.to();
            let is_relevant = recipient.is_none()
                || tracked.contains(&ctx.sender)
                || recipient.map(|to| tracked.contains(&to)).unwrap_or(false)
                || ctx
                    .access_list
                    .iter()
                    .any(|item| tracked.contains(&item.address));

            if is_relevant {
                tracked.insert(ctx.sender);
                if let Some(to) = recipient {
                    tracked.insert(to);
                }
                for item in ctx.access_list.iter() {
                    tracked.insert(item.address);
                }
                relevant.push(ctx);
            }
        }

        relevant.reverse();
        Ok(relevant)
    }

    /// Reconstructs, in a fresh in-memory state, the pre-block state for
    /// exactly the accounts and slots the filtered transactions touch.
    ///
    /// Every load is a verified read at the previous block and goes
    /// through the tracing write path; the execution's reads of anything
    /// not loaded here surface as uninitialized reads.
    pub async fn load_state(
        &self,
        header: &Header,
        txs: &[TxWithContext],
    ) -> Result<TracingDb, PrepareError> {
        let prev_num = header
            .number
            .checked_sub(1)
            .ok_or(PrepareError::NoParent(header.number))?;
        let prev = self.headers.get_by_number(prev_num)?;

        let mut db = TracingDb::new(WorldState::in_memory());
        db.insert_block_hash(prev_num, header.parent_hash);

        // The fee recipient is touched by every block.
        self.create_account(&prev, header.beneficiary, &mut db)
            .await?;

        for tx in txs {
            self.create_account(&prev, tx.sender, &mut db).await?;

            // A missing recipient is a contract creation.
            if let Some(to) = tx.tx.to() {
                self.create_account(&prev, to, &mut db).await?;
            }

            for item in tx.access_list.iter() {
                self.create_account(&prev, item.address, &mut db).await?;

                for slot in &item.storage_keys {
                    if !db.exist(item.address) {
                        continue;
                    }
                    if let Some(value) = self
                        .provider
                        .get_storage_at_block(item.address, *slot, &prev)
                        .await?
                    {
                        db.set_state(item.address, *slot, value);
                    }
                }
            }
        }

        debug!(
            target: "sparseth::state",
            block = header.number,
            accounts = db.written_accounts().len(),
            "loaded partial pre-block state"
        );
        Ok(db)
    }

    // Creates the account in the transient state from its verified
    // snapshot at `at`, if it exists there. Storage is not initialized.
    async fn create_account(
        &self,
        at: &Header,
        address: Address,
        db: &mut TracingDb,
    ) -> Result<(), PrepareError> {
        if db.exist(address) {
            return Ok(());
        }

        let Some(account) = self.provider.get_account_at_block(address, at).await? else {
            return Ok(());
        };

        db.create_account(address);
        db.set_nonce(address, account.nonce);
        db.set_balance(address, account.balance);

        if account.code_hash != KECCAK256_EMPTY {
            let code = self.provider.get_code_at_block(address, at).await?;
            db.set_code(address, code);
        }

        Ok(())
    }
}
