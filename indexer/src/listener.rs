//! Event watcher
//!
//! Polls the factory's event log and keeps the cache current. A
//! `ContractCreated` event grows the watched set; the poll then restarts from
//! that event's ledger so events for the new position in the same range are
//! not missed. Events already applied are skipped by their (ledger, seq)
//! cursor.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;
use tracing::{debug, error, info};

use crate::cache::Cache;
use crate::chain::ChainClient;
use crate::error::IndexerResult;
use crate::loader::ContractsLoader;
use crate::types::{ChainEvent, ContractId, EventKind};

/// Where the watch is in the event log
#[derive(Debug, Clone, Default)]
pub struct WatchState {
    pub watched: BTreeSet<ContractId>,
    pub from_ledger: u32,
    /// Last applied event
    pub cursor: Option<(u32, u32)>,
}

enum Progress {
    Done,
    Rewatch(u32),
}

pub struct Listener {
    chain: Arc<dyn ChainClient>,
    loader: ContractsLoader,
    cache: Arc<RwLock<Cache>>,
    poll_interval: Duration,
}

impl Listener {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        loader: ContractsLoader,
        cache: Arc<RwLock<Cache>>,
        poll_interval: Duration,
    ) -> Self {
        Self { chain, loader, cache, poll_interval }
    }

    /// Watch state picking up right after the cache's last sync
    pub async fn resume_state(&self) -> WatchState {
        let cache = self.cache.read().await;
        WatchState {
            watched: cache.contract_ids().collect(),
            from_ledger: cache.last_synced_ledger() + 1,
            cursor: None,
        }
    }

    /// Runs until `shutdown` fires or a sync fails. A failure ends the watch
    /// and is returned so the caller can restart the process.
    pub async fn start_watch(self, mut shutdown: mpsc::Receiver<()>) -> IndexerResult<()> {
        let mut state = self.resume_state().await;
        let mut ticker = interval(self.poll_interval);
        info!(from_ledger = state.from_ledger, watched = state.watched.len(), "starting watch");

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("watch stopped");
                    return Ok(());
                }
                _ = ticker.tick() => {}
            }

            if let Err(e) = self.sync_once(&mut state).await {
                error!(error = %e, from_ledger = state.from_ledger, "watch failed");
                return Err(e);
            }
        }
    }

    /// Applies every pending event and advances `state` past the latest ledger.
    pub async fn sync_once(&self, state: &mut WatchState) -> IndexerResult<()> {
        loop {
            let latest = self.chain.latest_ledger().await?;
            let events = self.chain.get_events(state.from_ledger, &state.watched).await?;

            match self.apply(state, &events).await? {
                Progress::Rewatch(ledger) => {
                    debug!(ledger, watched = state.watched.len(), "rewatching");
                    state.from_ledger = ledger;
                }
                Progress::Done => {
                    let synced = events.last().map_or(latest, |e| e.ledger.max(latest));
                    self.cache.write().await.mark_synced(synced);
                    state.from_ledger = synced + 1;
                    return Ok(());
                }
            }
        }
    }

    async fn apply(&self, state: &mut WatchState, events: &[ChainEvent]) -> IndexerResult<Progress> {
        for event in events {
            if state.cursor.is_some_and(|cursor| event.cursor() <= cursor) {
                continue;
            }

            match &event.kind {
                EventKind::ContractCreated { contract_id, .. } => {
                    let is_new = state.watched.insert(*contract_id);
                    self.refresh(*contract_id).await?;
                    self.commit(state, event).await;
                    if is_new {
                        info!(contract_id, ledger = event.ledger, "watching new contract");
                        return Ok(Progress::Rewatch(event.ledger));
                    }
                }
                EventKind::ValidatorFeeRateUpdated { .. } => {
                    let fee_rate = self.chain.fee_rate().await?;
                    self.cache.write().await.set_fee_rate(fee_rate);
                    self.commit(state, event).await;
                }
                kind => {
                    if let Some(id) = kind.contract_id() {
                        self.refresh(id).await?;
                    }
                    self.commit(state, event).await;
                }
            }
        }
        Ok(Progress::Done)
    }

    async fn refresh(&self, id: ContractId) -> IndexerResult<()> {
        let record = self.loader.load_one(id).await?;
        self.cache.write().await.upsert(record);
        debug!(contract_id = id, "refreshed contract");
        Ok(())
    }

    async fn commit(&self, state: &mut WatchState, event: &ChainEvent) {
        self.cache.write().await.apply_event(event);
        state.cursor = Some(event.cursor());
    }
}
