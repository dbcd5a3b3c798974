//! Chain access seam
//!
//! `ChainClient` is everything the indexer reads from the network.
//! [`crate::rpc::RpcChain`] talks to Soroban RPC; `MemoryChain` backs tests.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{IndexerError, IndexerResult};
use crate::types::{
    ChainEvent, ContractId, ContractRecord, ContractState, EventKind, FeeRate, HistoryEntry,
    PublicVariables, ResellTerms, Stats, Terms,
};

/// Read interface to the factory, oracle and event log
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Most recent closed ledger
    async fn latest_ledger(&self) -> IndexerResult<u32>;

    /// Every position id the factory has issued
    async fn contract_ids(&self) -> IndexerResult<Vec<ContractId>>;

    async fn load_public_variables(&self, id: ContractId) -> IndexerResult<PublicVariables>;

    async fn load_history(
        &self,
        id: ContractId,
        offset: u32,
        limit: u32,
    ) -> IndexerResult<Vec<HistoryEntry>>;

    async fn load_stats(&self, id: ContractId) -> IndexerResult<Stats>;

    async fn load_resell_chain(&self, id: ContractId) -> IndexerResult<Vec<ResellTerms>>;

    async fn load_future_terms(&self, id: ContractId) -> IndexerResult<Option<Terms>>;

    /// Oracle rate; `StaleOracle` when a feed has expired
    async fn hashes_for_token(&self) -> IndexerResult<u128>;

    async fn fee_rate(&self) -> IndexerResult<FeeRate>;

    /// Events from `from_ledger` on. Factory-wide events and `ContractCreated`
    /// are always returned, per-position events only for `watched` ids.
    async fn get_events(
        &self,
        from_ledger: u32,
        watched: &BTreeSet<ContractId>,
    ) -> IndexerResult<Vec<ChainEvent>>;
}

struct MemoryState {
    ledger: u32,
    next_seq: u32,
    contracts: BTreeMap<ContractId, ContractRecord>,
    events: Vec<ChainEvent>,
    hashes_for_token: Option<u128>,
    fee_rate: FeeRate,
    failing: bool,
}

/// In-memory chain
///
/// Positions are edited directly and events are appended by hand, so tests
/// control exactly what the indexer observes.
pub struct MemoryChain {
    state: RwLock<MemoryState>,
    oracle_calls: AtomicUsize,
    future_terms_calls: AtomicUsize,
}

impl Default for MemoryChain {
    fn default() -> Self {
        Self::new()
    }
}

fn listing(id: ContractId, seller: &str, terms: Terms) -> ContractRecord {
    let head = ResellTerms {
        account: seller.to_string(),
        seller: seller.to_string(),
        validator: None,
        price: 0,
        fee: 0,
        start_time: 0,
        last_settlement_time: 0,
        encr_validator_url: String::new(),
        encr_dest_url: String::new(),
        resell_price: 0,
        resell_profit_target: terms.profit_target,
        is_resellable: true,
        is_resell_to_default_buyer: false,
    };
    ContractRecord {
        id,
        public: PublicVariables {
            state: ContractState::Available,
            terms,
            start_time: 0,
            seller: seller.to_string(),
            pubkey: String::new(),
            is_deleted: false,
            has_future_terms: false,
            purchases_count: 0,
            resell_chain_length: 1,
            balance: 0,
            fee_balance: 0,
        },
        future_terms: None,
        resell_chain: vec![head],
        history: Vec::new(),
        stats: Stats::default(),
    }
}

impl MemoryChain {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MemoryState {
                ledger: 1,
                next_seq: 0,
                contracts: BTreeMap::new(),
                events: Vec::new(),
                hashes_for_token: None,
                fee_rate: FeeRate { rate_scaled: 0, decimals: 0 },
                failing: false,
            }),
            oracle_calls: AtomicUsize::new(0),
            future_terms_calls: AtomicUsize::new(0),
        }
    }

    /// Closes the current ledger and returns the new one
    pub async fn advance_ledger(&self) -> u32 {
        let mut state = self.state.write().await;
        state.ledger += 1;
        state.next_seq = 0;
        state.ledger
    }

    pub async fn emit(&self, kind: EventKind) -> ChainEvent {
        let mut state = self.state.write().await;
        let event = ChainEvent { ledger: state.ledger, seq: state.next_seq, kind };
        state.next_seq += 1;
        state.events.push(event.clone());
        event
    }

    /// Lists a new position and emits its `ContractCreated` event
    pub async fn create_contract(&self, seller: &str, terms: Terms) -> ContractId {
        let id = {
            let mut state = self.state.write().await;
            let id = state.contracts.len() as ContractId + 1;
            state.contracts.insert(id, listing(id, seller, terms));
            id
        };
        self.emit(EventKind::ContractCreated { contract_id: id, seller: seller.to_string() })
            .await;
        id
    }

    /// Edits a stored position in place; keeps the chain length field in sync
    pub async fn update_contract<F>(&self, id: ContractId, f: F) -> IndexerResult<()>
    where
        F: FnOnce(&mut ContractRecord),
    {
        let mut state = self.state.write().await;
        let record = state.contracts.get_mut(&id).ok_or(IndexerError::UnknownContract(id))?;
        f(record);
        record.public.resell_chain_length = record.resell_chain.len() as u32;
        record.public.has_future_terms = record.future_terms.is_some();
        Ok(())
    }

    pub async fn set_hashes_for_token(&self, rate: Option<u128>) {
        self.state.write().await.hashes_for_token = rate;
    }

    pub async fn set_fee_rate(&self, fee_rate: FeeRate) {
        self.state.write().await.fee_rate = fee_rate;
    }

    /// Makes every subsequent read fail, as an unreachable RPC would
    pub async fn set_failing(&self, failing: bool) {
        self.state.write().await.failing = failing;
    }

    /// Number of oracle reads served so far
    pub fn oracle_calls(&self) -> usize {
        self.oracle_calls.load(Ordering::SeqCst)
    }

    /// Number of future terms reads served so far
    pub fn future_terms_calls(&self) -> usize {
        self.future_terms_calls.load(Ordering::SeqCst)
    }

    async fn record(&self, id: ContractId) -> IndexerResult<ContractRecord> {
        let state = self.state.read().await;
        if state.failing {
            return Err(IndexerError::Chain("rpc unavailable".to_string()));
        }
        state.contracts.get(&id).cloned().ok_or(IndexerError::UnknownContract(id))
    }

    async fn check(&self) -> IndexerResult<()> {
        if self.state.read().await.failing {
            return Err(IndexerError::Chain("rpc unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainClient for MemoryChain {
    async fn latest_ledger(&self) -> IndexerResult<u32> {
        self.check().await?;
        Ok(self.state.read().await.ledger)
    }

    async fn contract_ids(&self) -> IndexerResult<Vec<ContractId>> {
        self.check().await?;
        Ok(self.state.read().await.contracts.keys().copied().collect())
    }

    async fn load_public_variables(&self, id: ContractId) -> IndexerResult<PublicVariables> {
        Ok(self.record(id).await?.public)
    }

    async fn load_history(
        &self,
        id: ContractId,
        offset: u32,
        limit: u32,
    ) -> IndexerResult<Vec<HistoryEntry>> {
        let history = self.record(id).await?.history;
        Ok(history.into_iter().skip(offset as usize).take(limit as usize).collect())
    }

    async fn load_stats(&self, id: ContractId) -> IndexerResult<Stats> {
        Ok(self.record(id).await?.stats)
    }

    async fn load_resell_chain(&self, id: ContractId) -> IndexerResult<Vec<ResellTerms>> {
        Ok(self.record(id).await?.resell_chain)
    }

    async fn load_future_terms(&self, id: ContractId) -> IndexerResult<Option<Terms>> {
        self.future_terms_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.record(id).await?.future_terms)
    }

    async fn hashes_for_token(&self) -> IndexerResult<u128> {
        self.check().await?;
        self.oracle_calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.state.read().await.hashes_for_token.ok_or(IndexerError::StaleOracle)
    }

    async fn fee_rate(&self) -> IndexerResult<FeeRate> {
        self.check().await?;
        Ok(self.state.read().await.fee_rate)
    }

    async fn get_events(
        &self,
        from_ledger: u32,
        watched: &BTreeSet<ContractId>,
    ) -> IndexerResult<Vec<ChainEvent>> {
        self.check().await?;
        let state = self.state.read().await;
        Ok(state
            .events
            .iter()
            .filter(|event| event.ledger >= from_ledger)
            .filter(|event| match (&event.kind, event.kind.contract_id()) {
                (EventKind::ContractCreated { .. }, _) | (_, None) => true,
                (_, Some(id)) => watched.contains(&id),
            })
            .cloned()
            .collect())
    }
}
