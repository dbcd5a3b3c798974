//! Per-participant counters derived from the event log alone.
//!
//! `reduce` is pure: replaying the same events from `Aggregates::default()`
//! always yields the same projection.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::types::{ChainEvent, EventKind};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SellerAggregate {
    pub contracts: u32,
    pub purchases: u32,
    pub hashrate_sold: u64,
    pub gross_sales: i128,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyerAggregate {
    pub purchases: u32,
    pub early_closes: u32,
    pub hashrate_bought: u64,
    pub spent: i128,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatorAggregate {
    pub purchases: u32,
    pub fees: i128,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Aggregates {
    pub sellers: BTreeMap<String, SellerAggregate>,
    pub buyers: BTreeMap<String, BuyerAggregate>,
    pub validators: BTreeMap<String, ValidatorAggregate>,
}

pub fn reduce(mut state: Aggregates, event: &ChainEvent) -> Aggregates {
    match &event.kind {
        EventKind::ContractCreated { seller, .. } => {
            state.sellers.entry(seller.clone()).or_default().contracts += 1;
        }
        EventKind::ContractPurchased { buyer, seller, validator, price, fee, speed, .. } => {
            let buyer_agg = state.buyers.entry(buyer.clone()).or_default();
            buyer_agg.purchases += 1;
            buyer_agg.hashrate_bought += speed;
            buyer_agg.spent += price;

            let seller_agg = state.sellers.entry(seller.clone()).or_default();
            seller_agg.purchases += 1;
            seller_agg.hashrate_sold += speed;
            seller_agg.gross_sales += price;

            if let Some(validator) = validator {
                let validator_agg = state.validators.entry(validator.clone()).or_default();
                validator_agg.purchases += 1;
                validator_agg.fees += fee;
            }
        }
        EventKind::ClosedEarly { account, .. } => {
            state.buyers.entry(account.clone()).or_default().early_closes += 1;
        }
        EventKind::TermsUpdated { .. }
        | EventKind::DestinationUpdated { .. }
        | EventKind::FundsClaimed { .. }
        | EventKind::DeleteUpdated { .. }
        | EventKind::ValidatorFeeRateUpdated { .. } => {}
    }
    state
}
