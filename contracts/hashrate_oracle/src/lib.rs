#![no_std]
use soroban_sdk::{
    contract, contracterror, contractimpl, contracttype, symbol_short, Address, Env, Symbol,
};

pub const DEFAULT_BTC_PRICE_TTL: u64 = 60 * 60;
pub const DEFAULT_HASHES_FOR_BTC_TTL: u64 = 24 * 60 * 60;

#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum Error {
    NotInitialized = 1,
    AlreadyInitialized = 2,
    StaleData = 3,
    ValueOutOfRange = 4,
}

/// Latest BTC/USD reference price. `value` carries `decimals` fractional digits.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BtcPrice {
    pub value: i128,
    pub decimals: u32,
    pub updated_at: u64,
}

/// Expected number of hashes needed to mine one whole BTC.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HashesForBtc {
    pub value: u128,
    pub updated_at: u64,
}

#[contracttype]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Ttl {
    pub btc_price_ttl: u64,
    pub hashes_for_btc_ttl: u64,
}

fn k_admin() -> Symbol { symbol_short!("admin") }
fn k_decimals() -> Symbol { symbol_short!("decimals") }
fn k_price() -> Symbol { symbol_short!("price") }
fn k_hashes() -> Symbol { symbol_short!("hashes") }
fn k_ttl() -> Symbol { symbol_short!("ttl") }

fn admin(e: &Env) -> Result<Address, Error> {
    e.storage().instance().get(&k_admin()).ok_or(Error::NotInitialized)
}

fn is_stale(now: u64, updated_at: u64, ttl: u64) -> bool {
    now.saturating_sub(updated_at) > ttl
}

#[contract]
pub struct HashrateOracle;

#[contractimpl]
impl HashrateOracle {
    /// One-time initializer. `token_decimals` are the decimals of the payment
    /// token the hashrate is priced in.
    pub fn init(e: Env, admin: Address, token_decimals: u32) -> Result<(), Error> {
        if e.storage().instance().has(&k_admin()) {
            return Err(Error::AlreadyInitialized);
        }
        e.storage().instance().set(&k_admin(), &admin);
        e.storage().instance().set(&k_decimals(), &token_decimals);
        e.storage().instance().set(
            &k_ttl(),
            &Ttl {
                btc_price_ttl: DEFAULT_BTC_PRICE_TTL,
                hashes_for_btc_ttl: DEFAULT_HASHES_FOR_BTC_TTL,
            },
        );
        Ok(())
    }

    pub fn set_btc_price(e: Env, price: i128, decimals: u32) -> Result<(), Error> {
        admin(&e)?.require_auth();
        if price <= 0 {
            return Err(Error::ValueOutOfRange);
        }

        let reading = BtcPrice { value: price, decimals, updated_at: e.ledger().timestamp() };
        e.storage().instance().set(&k_price(), &reading);
        e.events().publish((symbol_short!("btc_price"),), (price, decimals));
        Ok(())
    }

    pub fn set_hashes_for_btc(e: Env, value: u128) -> Result<(), Error> {
        admin(&e)?.require_auth();
        if value == 0 {
            return Err(Error::ValueOutOfRange);
        }

        let reading = HashesForBtc { value, updated_at: e.ledger().timestamp() };
        e.storage().instance().set(&k_hashes(), &reading);
        e.events().publish((symbol_short!("hashes"),), value);
        Ok(())
    }

    pub fn set_ttl(e: Env, btc_price_ttl: u64, hashes_for_btc_ttl: u64) -> Result<(), Error> {
        admin(&e)?.require_auth();
        e.storage().instance().set(&k_ttl(), &Ttl { btc_price_ttl, hashes_for_btc_ttl });
        Ok(())
    }

    /// Hashes purchasable with one smallest unit of the payment token.
    ///
    /// `hashes_for_btc * 10^price_decimals / (btc_price * 10^token_decimals)`.
    /// Fails with `StaleData` when either input is older than its TTL.
    pub fn get_hashes_for_token(e: Env) -> Result<u128, Error> {
        let now = e.ledger().timestamp();
        let ttl = Self::get_ttl(e.clone())?;
        let price = Self::get_btc_price(e.clone())?;
        let hashes = Self::get_hashes_for_btc(e.clone())?;

        if is_stale(now, price.updated_at, ttl.btc_price_ttl)
            || is_stale(now, hashes.updated_at, ttl.hashes_for_btc_ttl)
        {
            return Err(Error::StaleData);
        }

        let token_decimals: u32 = e.storage().instance().get(&k_decimals()).ok_or(Error::NotInitialized)?;
        let numerator = 10u128
            .checked_pow(price.decimals)
            .and_then(|p| hashes.value.checked_mul(p))
            .ok_or(Error::ValueOutOfRange)?;
        let denominator = 10u128
            .checked_pow(token_decimals)
            .and_then(|d| (price.value as u128).checked_mul(d))
            .ok_or(Error::ValueOutOfRange)?;

        let result = numerator / denominator;
        if result == 0 {
            return Err(Error::ValueOutOfRange);
        }
        Ok(result)
    }

    pub fn get_btc_price(e: Env) -> Result<BtcPrice, Error> {
        e.storage().instance().get(&k_price()).ok_or(Error::NotInitialized)
    }

    pub fn get_hashes_for_btc(e: Env) -> Result<HashesForBtc, Error> {
        e.storage().instance().get(&k_hashes()).ok_or(Error::NotInitialized)
    }

    pub fn get_ttl(e: Env) -> Result<Ttl, Error> {
        e.storage().instance().get(&k_ttl()).ok_or(Error::NotInitialized)
    }
}
