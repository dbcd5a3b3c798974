use soroban_sdk::{contractclient, Address, Env};

use crate::types::Error;

// HashrateOracle::Error::StaleData
const ORACLE_STALE_DATA: u32 = 3;
const PERCENT: i128 = 100;

#[contractclient(name = "OracleClient")]
pub trait HashrateOracleInterface {
    fn get_hashes_for_token(env: Env) -> u128;
}

#[contractclient(name = "RegistryClient")]
pub trait ValidatorRegistryInterface {
    fn is_active(env: Env, validator: Address) -> bool;
}

/// Reads the current rate from the oracle, translating its staleness failure.
pub fn hashes_for_token(e: &Env, oracle: &Address) -> Result<u128, Error> {
    let client = OracleClient::new(e, oracle);
    match client.try_get_hashes_for_token() {
        Ok(Ok(rate)) if rate > 0 => Ok(rate),
        Err(Ok(err)) if err == soroban_sdk::Error::from_contract_error(ORACLE_STALE_DATA) => {
            Err(Error::StaleData)
        }
        _ => Err(Error::OracleUnavailable),
    }
}

pub fn is_validator_active(e: &Env, registry: &Address, validator: &Address) -> bool {
    RegistryClient::new(e, registry).is_active(validator)
}

/// Token amount for `speed` H/s sustained over `secs` seconds.
pub fn base_price(speed: u64, secs: u64, hashes_for_token: u128) -> i128 {
    ((speed as u128 * secs as u128) / hashes_for_token) as i128
}

pub fn with_profit(price: i128, profit_target: i32) -> i128 {
    price + price * profit_target as i128 / PERCENT
}

pub fn fee(price: i128, fee_rate_scaled: i128, fee_decimals: u32) -> i128 {
    price * fee_rate_scaled / 10i128.pow(fee_decimals)
}

/// Portion of `amount` released linearly over `[start, end]` as of `at`.
/// The full amount is released once `at` reaches `end`.
pub fn vested(amount: i128, start: u64, end: u64, at: u64) -> i128 {
    if at >= end || end <= start {
        return amount;
    }
    if at <= start {
        return 0;
    }
    amount * (at - start) as i128 / (end - start) as i128
}
