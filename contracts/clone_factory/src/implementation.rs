//! State machine of a single rental position.
//!
//! A position is Available until bought, then Running until its run reaches
//! `start_time + length` or every buyer has closed out early. While Running the
//! tail of the resell chain is the current holder; each purchase of the tail's
//! offer appends a hop. Every hop's payment and fee vest linearly to its seller
//! and validator over the remainder of the run and are paid out lazily.

use soroban_sdk::{token, Address, Bytes, Env, String, Vec};

use crate::events;
use crate::pricing::{self, base_price, vested, with_profit};
use crate::storage as st;
use crate::types::{
    ContractState, Error, HistoryEntry, MarketplaceConfig, Position, PublicVariables, ResellParams,
    ResellTerms, Stats, Terms,
};

pub struct Destination {
    pub encr_validator_url: String,
    pub encr_dest_url: String,
}

fn end_time(p: &Position) -> u64 {
    p.start_time + p.terms.length
}

fn is_expired(e: &Env, p: &Position) -> bool {
    p.state == ContractState::Running && e.ledger().timestamp() >= end_time(p)
}

/// State as observed now, without materializing an expired run.
pub fn effective_state(e: &Env, p: &Position) -> ContractState {
    if is_expired(e, p) {
        ContractState::Available
    } else {
        p.state
    }
}

/// Terms the next sale runs under. Staged terms count as applied once the run
/// has expired, even before the expiry is materialized.
pub fn effective_terms(e: &Env, p: &Position) -> Terms {
    match &p.future_terms {
        Some(next) if is_expired(e, p) => next.clone(),
        _ => p.terms.clone(),
    }
}

pub fn effective_future_terms(e: &Env, p: &Position) -> Option<Terms> {
    if is_expired(e, p) {
        None
    } else {
        p.future_terms.clone()
    }
}

fn head_entry(e: &Env, seller: &Address, profit_target: i32) -> ResellTerms {
    ResellTerms {
        account: seller.clone(),
        seller: seller.clone(),
        validator: None,
        price: 0,
        fee: 0,
        start_time: 0,
        last_settlement_time: 0,
        encr_validator_url: String::from_str(e, ""),
        encr_dest_url: String::from_str(e, ""),
        resell_price: 0,
        resell_profit_target: profit_target,
        is_resellable: true,
        is_resell_to_default_buyer: false,
    }
}

fn tail(chain: &Vec<ResellTerms>) -> Result<ResellTerms, Error> {
    chain.last().ok_or(Error::IndexOutOfRange)
}

pub fn create(e: &Env, id: u64, seller: &Address, speed: u64, length: u64, profit_target: i32, pubkey: Bytes) {
    let position = Position {
        id,
        seller: seller.clone(),
        pubkey,
        terms: Terms { speed, length, version: 0, profit_target },
        future_terms: None,
        state: ContractState::Available,
        start_time: 0,
        purchases_count: 0,
        is_deleted: false,
    };
    let mut chain = Vec::new(e);
    chain.push_back(head_entry(e, seller, profit_target));

    st::put_position(e, &position);
    st::put_chain(e, id, &chain);
    st::put_stats(e, id, &Stats::default());
}

/// Pays every hop what vested between its last settlement and `until`.
fn settle(e: &Env, config: &MarketplaceConfig, end: u64, chain: &mut Vec<ResellTerms>, until: u64) {
    let until = until.min(end);
    let me = e.current_contract_address();
    let payment = token::Client::new(e, &config.payment_token);
    let fee_token = token::Client::new(e, &config.fee_token);

    for i in 1..chain.len() {
        let Some(mut hop) = chain.get(i) else { continue };
        if until <= hop.last_settlement_time {
            continue;
        }

        let due = vested(hop.price, hop.start_time, end, until)
            - vested(hop.price, hop.start_time, end, hop.last_settlement_time);
        if due > 0 {
            payment.transfer(&me, &hop.seller, &due);
        }

        if let Some(validator) = &hop.validator {
            let fee_due = vested(hop.fee, hop.start_time, end, until)
                - vested(hop.fee, hop.start_time, end, hop.last_settlement_time);
            if fee_due > 0 {
                fee_token.transfer(&me, validator, &fee_due);
            }
        }

        hop.last_settlement_time = until;
        chain.set(i, hop);
    }
}

fn apply_future_terms(e: &Env, p: &mut Position, chain: &mut Vec<ResellTerms>) {
    if let Some(next) = p.future_terms.take() {
        p.terms = next;
        sync_head(chain, &p.terms);
        events::terms_updated(e, p.id, p.terms.version, false);
    }
}

fn sync_head(chain: &mut Vec<ResellTerms>, terms: &Terms) {
    if let Some(mut head) = chain.get(0) {
        head.resell_profit_target = terms.profit_target;
        chain.set(0, head);
    }
}

/// Finishes an expired run: final payouts, one successful history record per
/// hop, chain back to the head and staged terms applied.
fn complete_run(e: &Env, config: &MarketplaceConfig, p: &mut Position, chain: &mut Vec<ResellTerms>) {
    let end = end_time(p);
    settle(e, config, end, chain, end);

    let mut history = st::get_history(e, p.id);
    let mut stats = st::get_stats(e, p.id);
    for hop in chain.iter().skip(1) {
        history.push_back(HistoryEntry {
            buyer: hop.account.clone(),
            validator: hop.validator.clone(),
            price: hop.price,
            fee: hop.fee,
            speed: p.terms.speed,
            length: end - hop.start_time,
            purchase_time: hop.start_time,
            end_time: end,
            is_good_closeout: true,
        });
        stats.success_count += 1;
    }
    st::put_history(e, p.id, &history);
    st::put_stats(e, p.id, &stats);

    while chain.len() > 1 {
        chain.pop_back();
    }
    p.state = ContractState::Available;
    apply_future_terms(e, p, chain);
}

fn quote(p: &Position, terms: &Terms, offer: &ResellTerms, state: ContractState, now: u64, rate: u128) -> i128 {
    match state {
        ContractState::Available => {
            with_profit(base_price(terms.speed, terms.length, rate), terms.profit_target)
        }
        ContractState::Running if offer.resell_price > 0 => offer.resell_price,
        ContractState::Running => {
            let remaining = end_time(p).saturating_sub(now);
            with_profit(base_price(terms.speed, remaining, rate), offer.resell_profit_target)
        }
    }
}

fn validator_fee(config: &MarketplaceConfig, price: i128) -> i128 {
    pricing::fee(price, config.validator_fee_rate_scaled, config.fee_decimals)
}

#[allow(clippy::too_many_arguments)]
pub fn purchase(
    e: &Env,
    config: &MarketplaceConfig,
    id: u64,
    buyer: &Address,
    validator: Option<Address>,
    destination: Destination,
    terms_version: u32,
    resell: ResellParams,
) -> Result<(i128, i128), Error> {
    let mut p = st::get_position(e, id)?;
    if p.is_deleted {
        return Err(Error::ContractDeleted);
    }
    if resell.resell_profit_target <= -100 {
        return Err(Error::InvalidProfitTarget);
    }

    let now = e.ledger().timestamp();
    let mut chain = st::get_chain(e, id);
    if is_expired(e, &p) {
        complete_run(e, config, &mut p, &mut chain);
    }

    if terms_version != p.terms.version {
        return Err(Error::TermsVersionMismatch);
    }
    if let Some(v) = &validator {
        if !pricing::is_validator_active(e, &config.validator_registry, v) {
            return Err(Error::ValidatorNotActive);
        }
    }

    let offer = tail(&chain)?;
    if *buyer == offer.account {
        return Err(Error::CannotPurchaseOwnContract);
    }
    let rate = pricing::hashes_for_token(e, &config.oracle)?;

    let price = quote(&p, &p.terms, &offer, p.state, now, rate);
    match p.state {
        ContractState::Available => {
            p.state = ContractState::Running;
            p.start_time = now;
        }
        ContractState::Running => {
            if !offer.is_resellable {
                return Err(Error::NotResellable);
            }
            if offer.is_resell_to_default_buyer && config.default_buyer.as_ref() != Some(buyer) {
                return Err(Error::DefaultBuyerOnly);
            }
            settle(e, config, end_time(&p), &mut chain, now);
        }
    }
    let fee = if validator.is_some() { validator_fee(config, price) } else { 0 };

    events::contract_purchased(e, id, buyer, &offer.account, &validator, price, fee, p.terms.speed);

    let me = e.current_contract_address();
    let payment = token::Client::new(e, &config.payment_token);
    if price > 0 {
        payment.transfer(buyer, &me, &price);
    }
    if fee > 0 {
        token::Client::new(e, &config.fee_token).transfer(buyer, &me, &fee);
    }
    if config.marketplace_fee > 0 {
        payment.transfer(buyer, &config.fee_recipient, &config.marketplace_fee);
    }

    chain.push_back(ResellTerms {
        account: buyer.clone(),
        seller: offer.account,
        validator,
        price,
        fee,
        start_time: now,
        last_settlement_time: now,
        encr_validator_url: destination.encr_validator_url,
        encr_dest_url: destination.encr_dest_url,
        resell_price: resell.resell_price,
        resell_profit_target: resell.resell_profit_target,
        is_resellable: resell.is_resellable,
        is_resell_to_default_buyer: resell.is_resell_to_default_buyer,
    });
    p.purchases_count += 1;

    st::put_position(e, &p);
    st::put_chain(e, id, &chain);
    Ok((price, fee))
}

/// Ends the current holder's hop before the run is over. Only the tail account
/// or its validator may close. The tail is refunded whatever has not vested yet.
pub fn close_early(e: &Env, config: &MarketplaceConfig, id: u64, caller: &Address, reason: u32) -> Result<(), Error> {
    let mut p = st::get_position(e, id)?;
    if effective_state(e, &p) != ContractState::Running {
        return Err(Error::ContractNotRunning);
    }

    let now = e.ledger().timestamp();
    let end = end_time(&p);
    let mut chain = st::get_chain(e, id);
    let current = tail(&chain)?;
    if current.account != *caller && current.validator.as_ref() != Some(caller) {
        return Err(Error::Unauthorized);
    }

    settle(e, config, end, &mut chain, now);
    let closed = chain.pop_back().ok_or(Error::IndexOutOfRange)?;

    let me = e.current_contract_address();
    let refund = closed.price - vested(closed.price, closed.start_time, end, now);
    if refund > 0 {
        token::Client::new(e, &config.payment_token).transfer(&me, &closed.account, &refund);
    }
    if closed.validator.is_some() {
        let fee_refund = closed.fee - vested(closed.fee, closed.start_time, end, now);
        if fee_refund > 0 {
            token::Client::new(e, &config.fee_token).transfer(&me, &closed.account, &fee_refund);
        }
    }

    let mut history = st::get_history(e, id);
    history.push_back(HistoryEntry {
        buyer: closed.account.clone(),
        validator: closed.validator.clone(),
        price: closed.price,
        fee: closed.fee,
        speed: p.terms.speed,
        length: end - closed.start_time,
        purchase_time: closed.start_time,
        end_time: now,
        is_good_closeout: false,
    });
    st::put_history(e, id, &history);
    let mut stats = st::get_stats(e, id);
    stats.fail_count += 1;
    st::put_stats(e, id, &stats);

    if chain.len() == 1 {
        p.state = ContractState::Available;
        apply_future_terms(e, &mut p, &mut chain);
    }

    st::put_position(e, &p);
    st::put_chain(e, id, &chain);
    events::closed_early(e, id, &closed.account, reason);
    Ok(())
}

/// Pays out everything vested so far. Finishes the run if it has expired.
pub fn claim_funds(e: &Env, config: &MarketplaceConfig, id: u64, caller: &Address) -> Result<(), Error> {
    let mut p = st::get_position(e, id)?;
    let mut chain = st::get_chain(e, id);

    let is_party = p.seller == *caller
        || chain.iter().any(|hop| {
            hop.account == *caller || hop.seller == *caller || hop.validator.as_ref() == Some(caller)
        });
    if !is_party {
        return Err(Error::Unauthorized);
    }

    if is_expired(e, &p) {
        complete_run(e, config, &mut p, &mut chain);
    } else if p.state == ContractState::Running {
        settle(e, config, end_time(&p), &mut chain, e.ledger().timestamp());
    }

    st::put_position(e, &p);
    st::put_chain(e, id, &chain);
    events::funds_claimed(e, id, caller);
    Ok(())
}

pub fn set_destination(e: &Env, id: u64, caller: &Address, destination: Destination) -> Result<(), Error> {
    let p = st::get_position(e, id)?;
    if effective_state(e, &p) != ContractState::Running {
        return Err(Error::ContractNotRunning);
    }

    let mut chain = st::get_chain(e, id);
    let mut current = tail(&chain)?;
    if current.account != *caller {
        return Err(Error::Unauthorized);
    }
    current.encr_validator_url = destination.encr_validator_url;
    current.encr_dest_url = destination.encr_dest_url;
    chain.set(chain.len() - 1, current);

    st::put_chain(e, id, &chain);
    events::destination_updated(e, id, caller);
    Ok(())
}

/// Applies new terms right away when Available, otherwise stages them until the
/// current run ends. A later update replaces a staged one.
pub fn update_terms(
    e: &Env,
    config: &MarketplaceConfig,
    id: u64,
    caller: &Address,
    speed: u64,
    length: u64,
    profit_target: i32,
) -> Result<(), Error> {
    let mut p = st::get_position(e, id)?;
    if p.seller != *caller {
        return Err(Error::Unauthorized);
    }

    let mut chain = st::get_chain(e, id);
    if is_expired(e, &p) {
        complete_run(e, config, &mut p, &mut chain);
    }

    let next = Terms { speed, length, version: p.terms.version + 1, profit_target };
    match p.state {
        ContractState::Running => {
            events::terms_updated(e, id, next.version, true);
            p.future_terms = Some(next);
        }
        ContractState::Available => {
            p.terms = next;
            p.future_terms = None;
            sync_head(&mut chain, &p.terms);
            events::terms_updated(e, id, p.terms.version, false);
        }
    }

    st::put_position(e, &p);
    st::put_chain(e, id, &chain);
    Ok(())
}

pub fn set_deleted(e: &Env, id: u64, is_deleted: bool) -> Result<(), Error> {
    let mut p = st::get_position(e, id)?;
    p.is_deleted = is_deleted;
    st::put_position(e, &p);
    events::delete_updated(e, id, is_deleted);
    Ok(())
}

// ---- read accessors ----

/// Price and validator fee the next buyer would pay right now.
pub fn price_and_fee(e: &Env, config: &MarketplaceConfig, id: u64) -> Result<(i128, i128), Error> {
    let p = st::get_position(e, id)?;
    let rate = pricing::hashes_for_token(e, &config.oracle)?;
    let now = e.ledger().timestamp();

    let terms = effective_terms(e, &p);
    let offer = if is_expired(e, &p) {
        head_entry(e, &p.seller, terms.profit_target)
    } else {
        tail(&st::get_chain(e, id))?
    };

    let price = quote(&p, &terms, &offer, effective_state(e, &p), now, rate);
    Ok((price, validator_fee(config, price)))
}

pub fn public_variables(e: &Env, id: u64) -> Result<PublicVariables, Error> {
    let p = st::get_position(e, id)?;
    let chain = st::get_chain(e, id);
    let end = end_time(&p);

    let mut balance = 0;
    let mut fee_balance = 0;
    for hop in chain.iter().skip(1) {
        balance += hop.price - vested(hop.price, hop.start_time, end, hop.last_settlement_time);
        fee_balance += hop.fee - vested(hop.fee, hop.start_time, end, hop.last_settlement_time);
    }

    Ok(PublicVariables {
        state: effective_state(e, &p),
        terms: effective_terms(e, &p),
        start_time: p.start_time,
        seller: p.seller.clone(),
        pubkey: p.pubkey.clone(),
        is_deleted: p.is_deleted,
        has_future_terms: effective_future_terms(e, &p).is_some(),
        purchases_count: p.purchases_count,
        resell_chain_length: chain.len(),
        balance,
        fee_balance,
    })
}

pub fn resell_chain(e: &Env, id: u64, index: u32) -> Result<ResellTerms, Error> {
    st::get_position(e, id)?;
    st::get_chain(e, id).get(index).ok_or(Error::IndexOutOfRange)
}

pub fn latest_resell(e: &Env, id: u64) -> Result<ResellTerms, Error> {
    st::get_position(e, id)?;
    tail(&st::get_chain(e, id))
}

/// Clamps `offset` past the end to an empty page and `limit` to what remains.
pub fn history(e: &Env, id: u64, offset: u32, limit: u32) -> Result<Vec<HistoryEntry>, Error> {
    st::get_position(e, id)?;
    let all = st::get_history(e, id);
    let len = all.len();
    if offset >= len {
        return Ok(Vec::new(e));
    }
    let end = offset.saturating_add(limit).min(len);
    Ok(all.slice(offset..end))
}
