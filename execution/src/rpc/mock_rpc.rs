//! In-memory [`ExecutionRpc`] used by tests. Responses are seeded by the
//! test; anything not seeded behaves like an endpoint without the data.

use std::collections::HashMap;
use std::sync::Mutex;

use alloy::consensus::{Header, TxEnvelope};
use alloy::eips::eip2930::AccessList;
use alloy::primitives::{Address, Bytes, B256};
use alloy::rpc::types::trace::geth::PreStateFrame;
use alloy::rpc::types::{EIP1186AccountProofResponse, Filter, Log, TransactionRequest};
use async_trait::async_trait;
use eyre::eyre;
use futures::stream::BoxStream;
use futures::StreamExt;

use crate::errors::RpcError;

use super::ExecutionRpc;

#[derive(Default)]
struct MockState {
    chain_id: u64,
    latest: Option<Header>,
    headers_by_number: HashMap<u64, Header>,
    headers_by_hash: HashMap<B256, Header>,
    block_txs: HashMap<u64, Vec<TxEnvelope>>,
    logs: HashMap<u64, Vec<Log>>,
    proofs: HashMap<(Address, u64), EIP1186AccountProofResponse>,
    code: HashMap<(Address, u64), Bytes>,
    access_lists: HashMap<(Address, u64), AccessList>,
    prestate: HashMap<B256, PreStateFrame>,
    new_heads: Vec<Header>,
}

#[derive(Default)]
pub struct MockRpc {
    state: Mutex<MockState>,
}

impl MockRpc {
    pub fn new(chain_id: u64) -> Self {
        let rpc = Self::default();
        rpc.state.lock().unwrap().chain_id = chain_id;
        rpc
    }

    pub fn add_header(&self, header: Header) {
        let mut state = self.state.lock().unwrap();
        state.headers_by_hash.insert(header.hash_slow(), header.clone());
        match &state.latest {
            Some(latest) if latest.number >= header.number => {}
            _ => state.latest = Some(header.clone()),
        }
        state.headers_by_number.insert(header.number, header);
    }

    pub fn add_block_txs(&self, num: u64, txs: Vec<TxEnvelope>) {
        self.state.lock().unwrap().block_txs.insert(num, txs);
    }

    pub fn add_logs(&self, num: u64, logs: Vec<Log>) {
        self.state.lock().unwrap().logs.insert(num, logs);
    }

    pub fn add_proof(&self, address: Address, block: u64, proof: EIP1186AccountProofResponse) {
        self.state.lock().unwrap().proofs.insert((address, block), proof);
    }

    pub fn add_code(&self, address: Address, block: u64, code: Bytes) {
        self.state.lock().unwrap().code.insert((address, block), code);
    }

    pub fn add_access_list(&self, from: Address, nonce: u64, list: AccessList) {
        self.state
            .lock()
            .unwrap()
            .access_lists
            .insert((from, nonce), list);
    }

    pub fn add_new_head(&self, header: Header) {
        self.state.lock().unwrap().new_heads.push(header);
    }

    pub fn add_prestate(&self, tx_hash: B256, frame: PreStateFrame) {
        self.state.lock().unwrap().prestate.insert(tx_hash, frame);
    }
}

#[async_trait]
impl ExecutionRpc for MockRpc {
    async fn chain_id(&self) -> Result<u64, RpcError> {
        Ok(self.state.lock().unwrap().chain_id)
    }

    async fn get_latest_header(&self) -> Result<Header, RpcError> {
        self.state
            .lock()
            .unwrap()
            .latest
            .clone()
            .ok_or_else(|| RpcError::new("get_latest_header", eyre!("no blocks seeded")))
    }

    async fn get_header_by_number(&self, num: u64) -> Result<Header, RpcError> {
        self.state
            .lock()
            .unwrap()
            .headers_by_number
            .get(&num)
            .cloned()
            .ok_or_else(|| RpcError::new("get_header_by_number", eyre!("block {num} not found")))
    }

    async fn get_header_by_hash(&self, hash: B256) -> Result<Header, RpcError> {
        self.state
            .lock()
            .unwrap()
            .headers_by_hash
            .get(&hash)
            .cloned()
            .ok_or_else(|| RpcError::new("get_header_by_hash", eyre!("block {hash} not found")))
    }

    async fn get_block_txs(&self, num: u64) -> Result<Option<Vec<TxEnvelope>>, RpcError> {
        Ok(self.state.lock().unwrap().block_txs.get(&num).cloned())
    }

    async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>, RpcError> {
        let state = self.state.lock().unwrap();
        let from = filter
            .get_from_block()
            .ok_or_else(|| RpcError::new("get_logs", eyre!("mock requires a block filter")))?;

        let logs = state.logs.get(&from).cloned().unwrap_or_default();
        Ok(logs
            .into_iter()
            .filter(|log| filter.address.matches(&log.inner.address))
            .collect())
    }

    async fn get_proof(
        &self,
        address: Address,
        _slots: &[B256],
        block: u64,
    ) -> Result<EIP1186AccountProofResponse, RpcError> {
        self.state
            .lock()
            .unwrap()
            .proofs
            .get(&(address, block))
            .cloned()
            .ok_or_else(|| {
                RpcError::new("get_proof", eyre!("no proof seeded for {address} at {block}"))
            })
    }

    async fn get_code(&self, address: Address, block: u64) -> Result<Bytes, RpcError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .code
            .get(&(address, block))
            .cloned()
            .unwrap_or_default())
    }

    async fn create_access_list(
        &self,
        tx: &TransactionRequest,
        _block: u64,
    ) -> Result<AccessList, RpcError> {
        // Seeded per (sender, nonce); an unseeded tx gets an empty hint,
        // which is what plain value transfers produce in practice.
        let state = self.state.lock().unwrap();
        let key = (
            tx.from.unwrap_or_default(),
            tx.nonce.unwrap_or_default(),
        );
        Ok(state.access_lists.get(&key).cloned().unwrap_or_default())
    }

    async fn trace_prestate(&self, tx_hash: B256) -> Result<PreStateFrame, RpcError> {
        self.state
            .lock()
            .unwrap()
            .prestate
            .get(&tx_hash)
            .cloned()
            .ok_or_else(|| RpcError::new("trace_prestate", eyre!("no trace for {tx_hash}")))
    }

    async fn subscribe_headers(&self) -> Result<BoxStream<'static, Header>, RpcError> {
        let heads = self.state.lock().unwrap().new_heads.clone();
        Ok(futures::stream::iter(heads).chain(futures::stream::pending()).boxed())
    }
}
