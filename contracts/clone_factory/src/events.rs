//! Events consumed by the off-chain indexer. Per-position events carry the
//! contract id as their second topic.

use soroban_sdk::{symbol_short, Address, Bytes, Env};

pub fn contract_created(e: &Env, id: u64, seller: &Address, pubkey: &Bytes) {
    e.events()
        .publish((symbol_short!("created"), id), (seller.clone(), pubkey.clone()));
}

/// `seller` is whoever sold this hop: the listing seller on a first sale,
/// otherwise the holder whose resell offer was taken.
#[allow(clippy::too_many_arguments)]
pub fn contract_purchased(
    e: &Env,
    id: u64,
    buyer: &Address,
    seller: &Address,
    validator: &Option<Address>,
    price: i128,
    fee: i128,
    speed: u64,
) {
    e.events().publish(
        (symbol_short!("purchased"), id),
        (buyer.clone(), seller.clone(), validator.clone(), price, fee, speed),
    );
}

pub fn closed_early(e: &Env, id: u64, account: &Address, reason: u32) {
    e.events()
        .publish((symbol_short!("closed"), id), (account.clone(), reason));
}

/// `staged` is true when the terms wait for the current run to finish.
pub fn terms_updated(e: &Env, id: u64, version: u32, staged: bool) {
    e.events()
        .publish((symbol_short!("terms_upd"), id), (version, staged));
}

pub fn destination_updated(e: &Env, id: u64, account: &Address) {
    e.events()
        .publish((symbol_short!("dest_upd"), id), account.clone());
}

pub fn funds_claimed(e: &Env, id: u64, caller: &Address) {
    e.events()
        .publish((symbol_short!("claimed"), id), caller.clone());
}

pub fn delete_updated(e: &Env, id: u64, is_deleted: bool) {
    e.events()
        .publish((symbol_short!("deleted"), id), is_deleted);
}

pub fn validator_fee_rate_updated(e: &Env, rate: i128, decimals: u32) {
    e.events()
        .publish((symbol_short!("fee_rate"),), (rate, decimals));
}

pub fn duration_interval_updated(e: &Env, min: u64, max: u64) {
    e.events()
        .publish((symbol_short!("duration"),), (min, max));
}

pub fn oracle_updated(e: &Env, oracle: &Address) {
    e.events()
        .publish((symbol_short!("oracle"),), oracle.clone());
}

pub fn marketplace_fee_updated(e: &Env, fee: i128, recipient: &Address) {
    e.events()
        .publish((symbol_short!("mkt_fee"),), (fee, recipient.clone()));
}

pub fn default_buyer_updated(e: &Env, default_buyer: &Option<Address>) {
    e.events()
        .publish((symbol_short!("dflt_buy"),), default_buyer.clone());
}

pub fn min_seller_stake_updated(e: &Env, min_seller_stake: i128) {
    e.events()
        .publish((symbol_short!("min_stake"),), min_seller_stake);
}

pub fn ownership_transferred(e: &Env, previous: &Address, owner: &Address) {
    e.events()
        .publish((symbol_short!("owner"),), (previous.clone(), owner.clone()));
}

pub fn seller_updated(e: &Env, seller: &Address, stake: i128, is_active: bool) {
    e.events()
        .publish((symbol_short!("seller"), seller.clone()), (stake, is_active));
}
