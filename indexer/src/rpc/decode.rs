//! `ScVal` to indexer types
//!
//! Contract structs arrive as maps keyed by field-name symbols, unit enum
//! variants as a one-symbol vector, `Option::None` as `Void` and tuples as
//! vectors.

use stellar_xdr::curr::{Int128Parts, ScMapEntry, ScVal, UInt128Parts};

use crate::error::{IndexerError, IndexerResult};
use crate::types::{
    ContractId, ContractState, EventKind, FeeRate, HistoryEntry, PublicVariables, ResellTerms,
    Stats, Terms,
};

fn mismatch(expected: &str, found: &ScVal) -> IndexerError {
    IndexerError::Chain(format!("expected {}, found {:?}", expected, found))
}

pub fn u32_of(v: &ScVal) -> IndexerResult<u32> {
    match v {
        ScVal::U32(n) => Ok(*n),
        other => Err(mismatch("u32", other)),
    }
}

pub fn i32_of(v: &ScVal) -> IndexerResult<i32> {
    match v {
        ScVal::I32(n) => Ok(*n),
        other => Err(mismatch("i32", other)),
    }
}

pub fn u64_of(v: &ScVal) -> IndexerResult<u64> {
    match v {
        ScVal::U64(n) => Ok(*n),
        other => Err(mismatch("u64", other)),
    }
}

pub fn i128_of(v: &ScVal) -> IndexerResult<i128> {
    match v {
        ScVal::I128(Int128Parts { hi, lo }) => Ok(((*hi as i128) << 64) | *lo as i128),
        other => Err(mismatch("i128", other)),
    }
}

pub fn u128_of(v: &ScVal) -> IndexerResult<u128> {
    match v {
        ScVal::U128(UInt128Parts { hi, lo }) => Ok(((*hi as u128) << 64) | *lo as u128),
        other => Err(mismatch("u128", other)),
    }
}

pub fn bool_of(v: &ScVal) -> IndexerResult<bool> {
    match v {
        ScVal::Bool(b) => Ok(*b),
        other => Err(mismatch("bool", other)),
    }
}

/// Strkey form, `G...` for accounts and `C...` for contracts
pub fn address_of(v: &ScVal) -> IndexerResult<String> {
    match v {
        ScVal::Address(addr) => Ok(addr.to_string()),
        other => Err(mismatch("address", other)),
    }
}

pub fn opt_address_of(v: &ScVal) -> IndexerResult<Option<String>> {
    match v {
        ScVal::Void => Ok(None),
        other => address_of(other).map(Some),
    }
}

pub fn string_of(v: &ScVal) -> IndexerResult<String> {
    match v {
        ScVal::String(s) => Ok(s.0.to_utf8_string_lossy()),
        other => Err(mismatch("string", other)),
    }
}

pub fn hex_of(v: &ScVal) -> IndexerResult<String> {
    match v {
        ScVal::Bytes(b) => Ok(hex::encode(b.0.as_vec())),
        other => Err(mismatch("bytes", other)),
    }
}

pub fn symbol_of(v: &ScVal) -> IndexerResult<String> {
    match v {
        ScVal::Symbol(s) => Ok(s.0.to_utf8_string_lossy()),
        other => Err(mismatch("symbol", other)),
    }
}

pub fn vec_of(v: &ScVal) -> IndexerResult<&[ScVal]> {
    match v {
        ScVal::Vec(Some(items)) => Ok(items.0.as_vec().as_slice()),
        other => Err(mismatch("vec", other)),
    }
}

/// A vector of exactly `N` items, as a tuple is encoded
fn tuple_of<const N: usize>(v: &ScVal) -> IndexerResult<&[ScVal; N]> {
    vec_of(v)?
        .try_into()
        .map_err(|_| mismatch(&format!("{}-tuple", N), v))
}

fn option_of<T>(v: &ScVal, f: impl Fn(&ScVal) -> IndexerResult<T>) -> IndexerResult<Option<T>> {
    match v {
        ScVal::Void => Ok(None),
        other => f(other).map(Some),
    }
}

/// Field access on an encoded contract struct
struct Fields<'a>(&'a [ScMapEntry]);

impl<'a> Fields<'a> {
    fn of(v: &'a ScVal) -> IndexerResult<Self> {
        match v {
            ScVal::Map(Some(map)) => Ok(Fields(map.0.as_vec().as_slice())),
            other => Err(mismatch("struct", other)),
        }
    }

    fn get(&self, name: &str) -> IndexerResult<&'a ScVal> {
        self.0
            .iter()
            .find(|entry| match &entry.key {
                ScVal::Symbol(key) => key.0.as_vec().as_slice() == name.as_bytes(),
                _ => false,
            })
            .map(|entry| &entry.val)
            .ok_or_else(|| IndexerError::Chain(format!("missing field {}", name)))
    }
}

pub fn state_of(v: &ScVal) -> IndexerResult<ContractState> {
    let variant = vec_of(v)?.first().ok_or_else(|| mismatch("enum", v))?;
    match symbol_of(variant)?.as_str() {
        "Available" => Ok(ContractState::Available),
        "Running" => Ok(ContractState::Running),
        other => Err(IndexerError::Chain(format!("unknown contract state {}", other))),
    }
}

pub fn terms_of(v: &ScVal) -> IndexerResult<Terms> {
    let f = Fields::of(v)?;
    Ok(Terms {
        speed: u64_of(f.get("speed")?)?,
        length: u64_of(f.get("length")?)?,
        version: u32_of(f.get("version")?)?,
        profit_target: i32_of(f.get("profit_target")?)?,
    })
}

pub fn future_terms_of(v: &ScVal) -> IndexerResult<Option<Terms>> {
    option_of(v, terms_of)
}

pub fn public_variables_of(v: &ScVal) -> IndexerResult<PublicVariables> {
    let f = Fields::of(v)?;
    Ok(PublicVariables {
        state: state_of(f.get("state")?)?,
        terms: terms_of(f.get("terms")?)?,
        start_time: u64_of(f.get("start_time")?)?,
        seller: address_of(f.get("seller")?)?,
        pubkey: hex_of(f.get("pubkey")?)?,
        is_deleted: bool_of(f.get("is_deleted")?)?,
        has_future_terms: bool_of(f.get("has_future_terms")?)?,
        purchases_count: u32_of(f.get("purchases_count")?)?,
        resell_chain_length: u32_of(f.get("resell_chain_length")?)?,
        balance: i128_of(f.get("balance")?)?,
        fee_balance: i128_of(f.get("fee_balance")?)?,
    })
}

pub fn resell_terms_of(v: &ScVal) -> IndexerResult<ResellTerms> {
    let f = Fields::of(v)?;
    Ok(ResellTerms {
        account: address_of(f.get("account")?)?,
        seller: address_of(f.get("seller")?)?,
        validator: opt_address_of(f.get("validator")?)?,
        price: i128_of(f.get("price")?)?,
        fee: i128_of(f.get("fee")?)?,
        start_time: u64_of(f.get("start_time")?)?,
        last_settlement_time: u64_of(f.get("last_settlement_time")?)?,
        encr_validator_url: string_of(f.get("encr_validator_url")?)?,
        encr_dest_url: string_of(f.get("encr_dest_url")?)?,
        resell_price: i128_of(f.get("resell_price")?)?,
        resell_profit_target: i32_of(f.get("resell_profit_target")?)?,
        is_resellable: bool_of(f.get("is_resellable")?)?,
        is_resell_to_default_buyer: bool_of(f.get("is_resell_to_default_buyer")?)?,
    })
}

pub fn history_entry_of(v: &ScVal) -> IndexerResult<HistoryEntry> {
    let f = Fields::of(v)?;
    Ok(HistoryEntry {
        buyer: address_of(f.get("buyer")?)?,
        validator: opt_address_of(f.get("validator")?)?,
        price: i128_of(f.get("price")?)?,
        fee: i128_of(f.get("fee")?)?,
        speed: u64_of(f.get("speed")?)?,
        length: u64_of(f.get("length")?)?,
        purchase_time: u64_of(f.get("purchase_time")?)?,
        end_time: u64_of(f.get("end_time")?)?,
        is_good_closeout: bool_of(f.get("is_good_closeout")?)?,
    })
}

pub fn history_of(v: &ScVal) -> IndexerResult<Vec<HistoryEntry>> {
    vec_of(v)?.iter().map(history_entry_of).collect()
}

pub fn stats_of(v: &ScVal) -> IndexerResult<Stats> {
    let f = Fields::of(v)?;
    Ok(Stats {
        success_count: u32_of(f.get("success_count")?)?,
        fail_count: u32_of(f.get("fail_count")?)?,
    })
}

pub fn ids_of(v: &ScVal) -> IndexerResult<Vec<ContractId>> {
    vec_of(v)?.iter().map(u64_of).collect()
}

/// Fee rate out of a `MarketplaceConfig`
pub fn fee_rate_of(v: &ScVal) -> IndexerResult<FeeRate> {
    let f = Fields::of(v)?;
    Ok(FeeRate {
        rate_scaled: i128_of(f.get("validator_fee_rate_scaled")?)?,
        decimals: u32_of(f.get("fee_decimals")?)?,
    })
}

/// Decodes one factory event. Owner-side configuration topics the indexer
/// does not track decode to `None`.
pub fn event_of(topics: &[ScVal], data: &ScVal) -> IndexerResult<Option<EventKind>> {
    let name = match topics.first() {
        Some(topic) => symbol_of(topic)?,
        None => return Ok(None),
    };
    let contract_id = || -> IndexerResult<ContractId> {
        topics.get(1).ok_or_else(|| mismatch("contract id topic", data)).and_then(u64_of)
    };

    let kind = match name.as_str() {
        "created" => {
            let [seller, _pubkey] = tuple_of(data)?;
            EventKind::ContractCreated {
                contract_id: contract_id()?,
                seller: address_of(seller)?,
            }
        }
        "purchased" => {
            let [buyer, seller, validator, price, fee, speed] = tuple_of(data)?;
            EventKind::ContractPurchased {
                contract_id: contract_id()?,
                buyer: address_of(buyer)?,
                seller: address_of(seller)?,
                validator: opt_address_of(validator)?,
                price: i128_of(price)?,
                fee: i128_of(fee)?,
                speed: u64_of(speed)?,
            }
        }
        "closed" => {
            let [account, reason] = tuple_of(data)?;
            EventKind::ClosedEarly {
                contract_id: contract_id()?,
                account: address_of(account)?,
                reason: u32_of(reason)?,
            }
        }
        "terms_upd" => {
            let [version, staged] = tuple_of(data)?;
            EventKind::TermsUpdated {
                contract_id: contract_id()?,
                version: u32_of(version)?,
                staged: bool_of(staged)?,
            }
        }
        "dest_upd" => EventKind::DestinationUpdated {
            contract_id: contract_id()?,
            account: address_of(data)?,
        },
        "claimed" => EventKind::FundsClaimed {
            contract_id: contract_id()?,
            caller: address_of(data)?,
        },
        "deleted" => EventKind::DeleteUpdated {
            contract_id: contract_id()?,
            is_deleted: bool_of(data)?,
        },
        "fee_rate" => {
            let [rate, decimals] = tuple_of(data)?;
            EventKind::ValidatorFeeRateUpdated {
                rate_scaled: i128_of(rate)?,
                decimals: u32_of(decimals)?,
            }
        }
        _ => return Ok(None),
    };
    Ok(Some(kind))
}
