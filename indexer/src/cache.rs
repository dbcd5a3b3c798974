//! In-memory projection of chain state.
//!
//! `upsert` is the only way a position enters or changes; it always takes the
//! latest full read, so replays and out-of-order refreshes are harmless.

use std::collections::{BTreeMap, HashMap};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::loader::Snapshot;
use crate::projection::{self, Aggregates};
use crate::types::{ChainEvent, ContractId, ContractRecord, FeeRate, HistoryEntry};

/// A completed run checked by a validator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatorHistoryEntry {
    pub contract_id: ContractId,
    #[serde(flatten)]
    pub entry: HistoryEntry,
}

#[derive(Debug, Default)]
pub struct Cache {
    contracts: BTreeMap<ContractId, ContractRecord>,
    /// validator -> (contract, purchase_time) -> entry
    validator_history: HashMap<String, BTreeMap<(ContractId, u64), HistoryEntry>>,
    fee_rate: Option<FeeRate>,
    aggregates: Aggregates,
    /// Events at or before this cursor are already in `aggregates`
    projected_through: Option<(u32, u32)>,
    last_synced_ledger: u32,
    last_synced_at: u64,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&mut self, record: ContractRecord) {
        for entry in &record.history {
            if let Some(validator) = &entry.validator {
                self.validator_history
                    .entry(validator.clone())
                    .or_default()
                    .insert((record.id, entry.purchase_time), entry.clone());
            }
        }
        self.contracts.insert(record.id, record);
    }

    /// Replaces every position, e.g. after an admin reload
    pub fn replace_all(&mut self, records: Vec<ContractRecord>) {
        self.contracts.clear();
        self.validator_history.clear();
        for record in records {
            self.upsert(record);
        }
    }

    /// Swaps in a full snapshot. Counters then cover every event up to the
    /// snapshot ledger, so the listener's replays of those are not counted twice.
    pub fn restore(&mut self, snapshot: Snapshot) {
        self.replace_all(snapshot.records);
        self.set_fee_rate(snapshot.fee_rate);
        self.aggregates = snapshot.aggregates;
        self.projected_through = Some((snapshot.ledger, u32::MAX));
        self.mark_synced(snapshot.ledger);
    }

    pub fn get(&self, id: ContractId) -> Option<&ContractRecord> {
        self.contracts.get(&id)
    }

    pub fn contracts(&self) -> impl Iterator<Item = &ContractRecord> {
        self.contracts.values()
    }

    pub fn contract_ids(&self) -> impl Iterator<Item = ContractId> + '_ {
        self.contracts.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }

    pub fn validator_history(&self, validator: &str) -> Vec<ValidatorHistoryEntry> {
        self.validator_history
            .get(validator)
            .map(|entries| {
                entries
                    .iter()
                    .map(|(&(contract_id, _), entry)| ValidatorHistoryEntry {
                        contract_id,
                        entry: entry.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn set_fee_rate(&mut self, fee_rate: FeeRate) {
        self.fee_rate = Some(fee_rate);
    }

    pub fn fee_rate(&self) -> Option<FeeRate> {
        self.fee_rate
    }

    pub fn apply_event(&mut self, event: &ChainEvent) {
        if self.projected_through.is_some_and(|through| event.cursor() <= through) {
            return;
        }
        self.projected_through = Some(event.cursor());
        let state = std::mem::take(&mut self.aggregates);
        self.aggregates = projection::reduce(state, event);
    }

    pub fn aggregates(&self) -> &Aggregates {
        &self.aggregates
    }

    pub fn mark_synced(&mut self, ledger: u32) {
        self.last_synced_ledger = ledger;
        self.last_synced_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
    }

    pub fn last_synced_ledger(&self) -> u32 {
        self.last_synced_ledger
    }

    /// Unix seconds of the last sync, 0 before the first one
    pub fn last_synced_at(&self) -> u64 {
        self.last_synced_at
    }
}
