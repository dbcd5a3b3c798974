use soroban_sdk::{Address, Env, IntoVal, Val, Vec};

use crate::types::{DataKey, Error, RegistryConfig, Set, Validator};

pub(crate) const DAY_IN_LEDGERS: u32 = 17280;
pub(crate) const INSTANCE_BUMP_AMOUNT: u32 = 7 * DAY_IN_LEDGERS;
pub(crate) const INSTANCE_LIFETIME_THRESHOLD: u32 = INSTANCE_BUMP_AMOUNT - DAY_IN_LEDGERS;
pub(crate) const RECORD_BUMP_AMOUNT: u32 = 30 * DAY_IN_LEDGERS;
pub(crate) const RECORD_LIFETIME_THRESHOLD: u32 = RECORD_BUMP_AMOUNT - DAY_IN_LEDGERS;

pub fn bump_instance(e: &Env) {
    e.storage()
        .instance()
        .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
}

/// Persistent entries share one lifetime. The key must exist.
fn bump_record(e: &Env, key: &DataKey) {
    e.storage()
        .persistent()
        .extend_ttl(key, RECORD_LIFETIME_THRESHOLD, RECORD_BUMP_AMOUNT);
}

fn put_record<V: IntoVal<Env, Val>>(e: &Env, key: &DataKey, value: &V) {
    e.storage().persistent().set(key, value);
    bump_record(e, key);
}

pub fn get_admin(e: &Env) -> Result<Address, Error> {
    e.storage().instance().get(&DataKey::Admin).ok_or(Error::NotInitialized)
}

pub fn get_config(e: &Env) -> Result<RegistryConfig, Error> {
    e.storage().instance().get(&DataKey::Config).ok_or(Error::NotInitialized)
}

pub fn put_config(e: &Env, config: &RegistryConfig) {
    e.storage().instance().set(&DataKey::Config, config);
}

pub fn get_slashed(e: &Env) -> i128 {
    e.storage().instance().get(&DataKey::Slashed).unwrap_or(0)
}

pub fn add_slashed(e: &Env, amount: i128) {
    e.storage().instance().set(&DataKey::Slashed, &(get_slashed(e) + amount));
}

pub fn get_validator(e: &Env, addr: &Address) -> Option<Validator> {
    let key = DataKey::Validator(addr.clone());
    let v = e.storage().persistent().get(&key);
    if v.is_some() {
        bump_record(e, &key);
    }
    v
}

pub fn put_validator(e: &Env, v: &Validator) {
    put_record(e, &DataKey::Validator(v.addr.clone()), v);
}

pub fn remove_validator(e: &Env, addr: &Address) {
    e.storage().persistent().remove(&DataKey::Validator(addr.clone()));
}

pub fn members(e: &Env, set: Set) -> Vec<Address> {
    let key = DataKey::Members(set);
    match e.storage().persistent().get(&key) {
        Some(list) => {
            bump_record(e, &key);
            list
        }
        None => Vec::new(e),
    }
}

pub fn contains(e: &Env, set: Set, addr: &Address) -> bool {
    let key = DataKey::MemberIndex(set, addr.clone());
    let found = e.storage().persistent().has(&key);
    if found {
        bump_record(e, &key);
    }
    found
}

/// Returns false when `addr` already is a member.
pub fn set_add(e: &Env, set: Set, addr: &Address) -> bool {
    if contains(e, set, addr) {
        return false;
    }
    let mut list = members(e, set);
    put_record(e, &DataKey::MemberIndex(set, addr.clone()), &list.len());
    list.push_back(addr.clone());
    put_record(e, &DataKey::Members(set), &list);
    true
}

/// Swap-remove: the last member takes the removed member's slot.
pub fn set_remove(e: &Env, set: Set, addr: &Address) -> bool {
    let index_key = DataKey::MemberIndex(set, addr.clone());
    let idx: u32 = match e.storage().persistent().get(&index_key) {
        Some(i) => i,
        None => return false,
    };

    let mut list = members(e, set);
    let last_idx = list.len() - 1;
    if idx != last_idx {
        if let Some(last) = list.get(last_idx) {
            list.set(idx, last.clone());
            put_record(e, &DataKey::MemberIndex(set, last), &idx);
        }
    }
    list.pop_back();

    e.storage().persistent().remove(&index_key);
    put_record(e, &DataKey::Members(set), &list);
    true
}

pub fn has_complained(e: &Env, target: &Address, complainer: &Address) -> bool {
    let key = DataKey::Complaint(target.clone(), complainer.clone());
    let found = e.storage().persistent().has(&key);
    if found {
        bump_record(e, &key);
    }
    found
}

pub fn record_complaint(e: &Env, target: &Address, complainer: &Address) {
    put_record(e, &DataKey::Complaint(target.clone(), complainer.clone()), &true);

    let key = DataKey::Complainers(target.clone());
    let mut list: Vec<Address> = e.storage().persistent().get(&key).unwrap_or(Vec::new(e));
    list.push_back(complainer.clone());
    put_record(e, &key, &list);
}

pub fn clear_complaints(e: &Env, target: &Address) {
    let key = DataKey::Complainers(target.clone());
    let list: Vec<Address> = e.storage().persistent().get(&key).unwrap_or(Vec::new(e));
    for complainer in list.iter() {
        e.storage()
            .persistent()
            .remove(&DataKey::Complaint(target.clone(), complainer));
    }
    e.storage().persistent().remove(&key);
}

/// Clamps `offset` past the end to an empty page and `limit` to what remains.
pub fn page(e: &Env, list: &Vec<Address>, offset: u32, limit: u32) -> Vec<Address> {
    let len = list.len();
    if offset >= len {
        return Vec::new(e);
    }
    let end = offset.saturating_add(limit).min(len);
    list.slice(offset..end)
}
