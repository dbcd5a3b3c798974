//! Off-chain mirror of the factory's pricing.
//!
//! Formulas match the contract exactly so displayed quotes equal what a
//! purchase would charge at the same rate and time.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::chain::ChainClient;
use crate::error::IndexerResult;
use crate::types::{ContractRecord, ContractState, FeeRate, Terms};

const PERCENT: i128 = 100;

/// Token amount for `speed` H/s sustained over `secs` seconds.
pub fn base_price(speed: u64, secs: u64, hashes_for_token: u128) -> i128 {
    if hashes_for_token == 0 {
        return 0;
    }
    ((speed as u128 * secs as u128) / hashes_for_token) as i128
}

pub fn with_profit(price: i128, profit_target: i32) -> i128 {
    price + price * profit_target as i128 / PERCENT
}

pub fn fee(price: i128, fee_rate: FeeRate) -> i128 {
    price * fee_rate.rate_scaled / 10i128.pow(fee_rate.decimals)
}

/// State of a position at `now`, treating an elapsed run as finished
pub fn effective_state(record: &ContractRecord, now: u64) -> ContractState {
    match record.public.state {
        ContractState::Running if now >= record.end_time() => ContractState::Available,
        state => state,
    }
}

fn is_expired(record: &ContractRecord, now: u64) -> bool {
    record.public.state == ContractState::Running && now >= record.end_time()
}

/// Terms the next sale runs under. An expired run applies staged terms before
/// the next sale, so those are the ones a buyer must quote.
pub fn effective_terms(record: &ContractRecord, now: u64) -> &Terms {
    match &record.future_terms {
        Some(next) if is_expired(record, now) => next,
        _ => &record.public.terms,
    }
}

/// Terms still waiting for the current run to end
pub fn effective_future_terms(record: &ContractRecord, now: u64) -> Option<&Terms> {
    if is_expired(record, now) {
        None
    } else {
        record.future_terms.as_ref()
    }
}

/// Price the next buyer would pay at `now`, before the validator fee.
pub fn quote(record: &ContractRecord, now: u64, hashes_for_token: u128) -> i128 {
    let public = &record.public;
    match effective_state(record, now) {
        ContractState::Available => {
            let terms = effective_terms(record, now);
            with_profit(base_price(terms.speed, terms.length, hashes_for_token), terms.profit_target)
        }
        ContractState::Running => match record.holder() {
            Some(offer) if offer.resell_price > 0 => offer.resell_price,
            Some(offer) => {
                let remaining = record.end_time().saturating_sub(now);
                with_profit(
                    base_price(public.terms.speed, remaining, hashes_for_token),
                    offer.resell_profit_target,
                )
            }
            None => 0,
        },
    }
}

/// Oracle rate cache
///
/// One refresh runs per TTL window. Callers arriving during a refresh wait on
/// the same lock and reuse its result.
pub struct PriceCalculator {
    chain: Arc<dyn ChainClient>,
    ttl: Duration,
    cached: Mutex<Option<(u128, Instant)>>,
}

impl PriceCalculator {
    pub fn new(chain: Arc<dyn ChainClient>, ttl: Duration) -> Self {
        Self { chain, ttl, cached: Mutex::new(None) }
    }

    pub async fn hashes_for_token(&self) -> IndexerResult<u128> {
        let mut cached = self.cached.lock().await;
        if let Some((rate, fetched_at)) = *cached {
            if fetched_at.elapsed() < self.ttl {
                return Ok(rate);
            }
        }

        let rate = self.chain.hashes_for_token().await?;
        debug!(rate, "refreshed hashes_for_token");
        *cached = Some((rate, Instant::now()));
        Ok(rate)
    }

    pub async fn price_and_fee(
        &self,
        record: &ContractRecord,
        fee_rate: FeeRate,
        now: u64,
    ) -> IndexerResult<(i128, i128)> {
        let rate = self.hashes_for_token().await?;
        let price = quote(record, now, rate);
        Ok((price, fee(price, fee_rate)))
    }
}
