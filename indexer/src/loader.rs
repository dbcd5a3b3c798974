//! Full and single-position loads from the chain

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::chain::ChainClient;
use crate::error::{IndexerError, IndexerResult};
use crate::projection::{self, Aggregates};
use crate::types::{ContractId, ContractRecord, FeeRate};

const HISTORY_PAGE: u32 = 100;

/// Everything a fresh cache needs, read as of `ledger`
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub records: Vec<ContractRecord>,
    pub fee_rate: FeeRate,
    /// Counters folded from every event up to and including `ledger`
    pub aggregates: Aggregates,
    pub ledger: u32,
}

/// Reads positions from the chain into `ContractRecord`s
#[derive(Clone)]
pub struct ContractsLoader {
    chain: Arc<dyn ChainClient>,
    batch_size: usize,
    start_ledger: u32,
}

impl ContractsLoader {
    pub fn new(chain: Arc<dyn ChainClient>, batch_size: usize) -> Self {
        Self { chain, batch_size: batch_size.max(1), start_ledger: 0 }
    }

    /// First ledger replayed into the aggregates, normally the factory's
    /// deployment ledger
    pub fn with_start_ledger(mut self, start_ledger: u32) -> Self {
        self.start_ledger = start_ledger;
        self
    }

    /// Positions plus the event-sourced counters, both as of the latest ledger.
    pub async fn load_snapshot(&self) -> IndexerResult<Snapshot> {
        let ledger = self.chain.latest_ledger().await?;
        let records = self.load_all().await?;
        let fee_rate = self.chain.fee_rate().await?;
        let aggregates = self.replay_aggregates(ledger).await?;
        Ok(Snapshot { records, fee_rate, aggregates, ledger })
    }

    /// Folds the factory's event log from the start ledger through `through`.
    pub async fn replay_aggregates(&self, through: u32) -> IndexerResult<Aggregates> {
        let ids: BTreeSet<ContractId> = self.chain.contract_ids().await?.into_iter().collect();
        let events = self.chain.get_events(self.start_ledger, &ids).await?;

        let replayed: Vec<_> = events.iter().filter(|event| event.ledger <= through).collect();
        info!(
            events = replayed.len(),
            from_ledger = self.start_ledger,
            through,
            "replayed event log"
        );
        Ok(replayed.into_iter().fold(Aggregates::default(), projection::reduce))
    }

    /// Loads every position the factory knows, `batch_size` at a time.
    /// Fails as a whole if any single load fails.
    pub async fn load_all(&self) -> IndexerResult<Vec<ContractRecord>> {
        let ids = self.chain.contract_ids().await?;
        let mut records = Vec::with_capacity(ids.len());

        for batch in ids.chunks(self.batch_size) {
            let mut tasks = JoinSet::new();
            for &id in batch {
                let loader = self.clone();
                tasks.spawn(async move { loader.load_one(id).await });
            }
            while let Some(joined) = tasks.join_next().await {
                let record = joined.map_err(|e| IndexerError::Task(e.to_string()))??;
                records.push(record);
            }
            debug!(loaded = records.len(), total = ids.len(), "loaded contract batch");
        }

        records.sort_by_key(|r| r.id);
        info!(count = records.len(), "loaded all contracts");
        Ok(records)
    }

    /// Future terms are only requested when the position reports having them.
    pub async fn load_one(&self, id: ContractId) -> IndexerResult<ContractRecord> {
        let public = self.chain.load_public_variables(id).await?;
        let future_terms = if public.has_future_terms {
            self.chain.load_future_terms(id).await?
        } else {
            None
        };

        let mut history = Vec::new();
        loop {
            let page = self
                .chain
                .load_history(id, history.len() as u32, HISTORY_PAGE)
                .await?;
            let done = (page.len() as u32) < HISTORY_PAGE;
            history.extend(page);
            if done {
                break;
            }
        }

        Ok(ContractRecord {
            id,
            public,
            future_terms,
            resell_chain: self.chain.load_resell_chain(id).await?,
            history,
            stats: self.chain.load_stats(id).await?,
        })
    }
}
