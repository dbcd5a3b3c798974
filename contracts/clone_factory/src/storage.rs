use soroban_sdk::{contracttype, Address, Env, Vec};

use crate::types::{Error, HistoryEntry, MarketplaceConfig, Position, ResellTerms, SellerInfo, Stats};

pub(crate) const DAY_IN_LEDGERS: u32 = 17280;
pub(crate) const INSTANCE_BUMP_AMOUNT: u32 = 7 * DAY_IN_LEDGERS;
pub(crate) const INSTANCE_LIFETIME_THRESHOLD: u32 = INSTANCE_BUMP_AMOUNT - DAY_IN_LEDGERS;
pub(crate) const POSITION_BUMP_AMOUNT: u32 = 30 * DAY_IN_LEDGERS;
pub(crate) const POSITION_LIFETIME_THRESHOLD: u32 = POSITION_BUMP_AMOUNT - DAY_IN_LEDGERS;

#[contracttype]
#[derive(Clone)]
pub enum DataKey {
    Owner,
    Config,
    ContractCount,
    Seller(Address),
    Position(u64),
    Chain(u64),
    History(u64),
    Stats(u64),
}

pub fn bump_instance(e: &Env) {
    e.storage()
        .instance()
        .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
}

fn bump(e: &Env, key: &DataKey) {
    e.storage()
        .persistent()
        .extend_ttl(key, POSITION_LIFETIME_THRESHOLD, POSITION_BUMP_AMOUNT);
}

pub fn is_initialized(e: &Env) -> bool {
    e.storage().instance().has(&DataKey::Owner)
}

pub fn get_owner(e: &Env) -> Result<Address, Error> {
    e.storage().instance().get(&DataKey::Owner).ok_or(Error::NotInitialized)
}

pub fn put_owner(e: &Env, owner: &Address) {
    e.storage().instance().set(&DataKey::Owner, owner);
}

pub fn get_config(e: &Env) -> Result<MarketplaceConfig, Error> {
    e.storage().instance().get(&DataKey::Config).ok_or(Error::NotInitialized)
}

pub fn put_config(e: &Env, config: &MarketplaceConfig) {
    e.storage().instance().set(&DataKey::Config, config);
}

pub fn contract_count(e: &Env) -> u64 {
    e.storage().instance().get(&DataKey::ContractCount).unwrap_or(0)
}

/// Ids are handed out sequentially from 1 and never reused.
pub fn next_id(e: &Env) -> u64 {
    let n = contract_count(e) + 1;
    e.storage().instance().set(&DataKey::ContractCount, &n);
    n
}

pub fn get_seller(e: &Env, seller: &Address) -> Option<SellerInfo> {
    e.storage().persistent().get(&DataKey::Seller(seller.clone()))
}

pub fn put_seller(e: &Env, seller: &Address, info: &SellerInfo) {
    let key = DataKey::Seller(seller.clone());
    e.storage().persistent().set(&key, info);
    bump(e, &key);
}

pub fn get_position(e: &Env, id: u64) -> Result<Position, Error> {
    let key = DataKey::Position(id);
    let position = e.storage().persistent().get(&key).ok_or(Error::UnknownContract)?;
    bump(e, &key);
    Ok(position)
}

pub fn put_position(e: &Env, position: &Position) {
    let key = DataKey::Position(position.id);
    e.storage().persistent().set(&key, position);
    bump(e, &key);
}

pub fn get_chain(e: &Env, id: u64) -> Vec<ResellTerms> {
    e.storage()
        .persistent()
        .get(&DataKey::Chain(id))
        .unwrap_or(Vec::new(e))
}

pub fn put_chain(e: &Env, id: u64, chain: &Vec<ResellTerms>) {
    let key = DataKey::Chain(id);
    e.storage().persistent().set(&key, chain);
    bump(e, &key);
}

pub fn get_history(e: &Env, id: u64) -> Vec<HistoryEntry> {
    e.storage()
        .persistent()
        .get(&DataKey::History(id))
        .unwrap_or(Vec::new(e))
}

pub fn put_history(e: &Env, id: u64, history: &Vec<HistoryEntry>) {
    let key = DataKey::History(id);
    e.storage().persistent().set(&key, history);
    bump(e, &key);
}

pub fn get_stats(e: &Env, id: u64) -> Stats {
    e.storage()
        .persistent()
        .get(&DataKey::Stats(id))
        .unwrap_or_default()
}

pub fn put_stats(e: &Env, id: u64, stats: &Stats) {
    let key = DataKey::Stats(id);
    e.storage().persistent().set(&key, stats);
    bump(e, &key);
}
