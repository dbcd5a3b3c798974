//! Off-chain mirrors of the clone factory's read types and events.
//!
//! Addresses are kept as strkey strings and token amounts as `i128`, matching
//! the on-chain representation.

use serde::{Deserialize, Serialize};

/// Sequential position id assigned by the factory
pub type ContractId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractState {
    Available,
    Running,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Terms {
    pub speed: u64,
    pub length: u64,
    pub version: u32,
    pub profit_target: i32,
}

/// One hop of a position's resell chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResellTerms {
    pub account: String,
    pub seller: String,
    pub validator: Option<String>,
    pub price: i128,
    pub fee: i128,
    pub start_time: u64,
    pub last_settlement_time: u64,
    pub encr_validator_url: String,
    pub encr_dest_url: String,
    pub resell_price: i128,
    pub resell_profit_target: i32,
    pub is_resellable: bool,
    pub is_resell_to_default_buyer: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub buyer: String,
    pub validator: Option<String>,
    pub price: i128,
    pub fee: i128,
    pub speed: u64,
    pub length: u64,
    pub purchase_time: u64,
    pub end_time: u64,
    pub is_good_closeout: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub success_count: u32,
    pub fail_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicVariables {
    pub state: ContractState,
    pub terms: Terms,
    pub start_time: u64,
    pub seller: String,
    /// Hex encoded
    pub pubkey: String,
    pub is_deleted: bool,
    pub has_future_terms: bool,
    pub purchases_count: u32,
    pub resell_chain_length: u32,
    pub balance: i128,
    pub fee_balance: i128,
}

/// Validator fee rate as configured on the factory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeRate {
    pub rate_scaled: i128,
    pub decimals: u32,
}

/// Everything the indexer knows about one position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractRecord {
    pub id: ContractId,
    pub public: PublicVariables,
    pub future_terms: Option<Terms>,
    pub resell_chain: Vec<ResellTerms>,
    pub history: Vec<HistoryEntry>,
    pub stats: Stats,
}

impl ContractRecord {
    pub fn end_time(&self) -> u64 {
        self.public.start_time + self.public.terms.length
    }

    /// Current holder, or the seller when nobody holds the position
    pub fn holder(&self) -> Option<&ResellTerms> {
        self.resell_chain.last()
    }
}

/// A decoded factory event. `seq` orders events within a ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainEvent {
    pub ledger: u32,
    pub seq: u32,
    pub kind: EventKind,
}

impl ChainEvent {
    pub fn cursor(&self) -> (u32, u32) {
        (self.ledger, self.seq)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    ContractCreated {
        contract_id: ContractId,
        seller: String,
    },
    ContractPurchased {
        contract_id: ContractId,
        buyer: String,
        /// Holder the hop was bought from: the listing seller or a reseller
        seller: String,
        validator: Option<String>,
        price: i128,
        fee: i128,
        speed: u64,
    },
    ClosedEarly {
        contract_id: ContractId,
        account: String,
        reason: u32,
    },
    TermsUpdated {
        contract_id: ContractId,
        version: u32,
        staged: bool,
    },
    DestinationUpdated {
        contract_id: ContractId,
        account: String,
    },
    FundsClaimed {
        contract_id: ContractId,
        caller: String,
    },
    DeleteUpdated {
        contract_id: ContractId,
        is_deleted: bool,
    },
    ValidatorFeeRateUpdated {
        rate_scaled: i128,
        decimals: u32,
    },
}

impl EventKind {
    /// Position the event refers to; `None` for factory-wide events
    pub fn contract_id(&self) -> Option<ContractId> {
        match self {
            EventKind::ContractCreated { contract_id, .. }
            | EventKind::ContractPurchased { contract_id, .. }
            | EventKind::ClosedEarly { contract_id, .. }
            | EventKind::TermsUpdated { contract_id, .. }
            | EventKind::DestinationUpdated { contract_id, .. }
            | EventKind::FundsClaimed { contract_id, .. }
            | EventKind::DeleteUpdated { contract_id, .. } => Some(*contract_id),
            EventKind::ValidatorFeeRateUpdated { .. } => None,
        }
    }
}
