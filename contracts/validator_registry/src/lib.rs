#![no_std]
use soroban_sdk::{contract, contractimpl, symbol_short, token, Address, BytesN, Env, String, Vec};

mod storage;
mod types;

pub use crate::types::{Error, RegistryConfig, Validator, MAX_HOST_LENGTH};
use crate::storage as st;
use crate::types::{DataKey, Set};

#[contract]
pub struct ValidatorRegistry;

#[contractimpl]
impl ValidatorRegistry {
    /// One-time initializer. `token` is the staking token.
    pub fn init(
        e: Env,
        admin: Address,
        token: Address,
        stake_minimum: i128,
        stake_register: i128,
        punish_amount: i128,
        punish_threshold: u32,
    ) -> Result<(), Error> {
        if e.storage().instance().has(&DataKey::Admin) {
            return Err(Error::AlreadyInitialized);
        }
        let config = RegistryConfig {
            token,
            stake_minimum,
            stake_register,
            punish_amount,
            punish_threshold,
        };
        validate_config(&config)?;

        e.storage().instance().set(&DataKey::Admin, &admin);
        st::put_config(&e, &config);
        st::bump_instance(&e);
        Ok(())
    }

    /// Registers a validator or, when already registered, tops up its stake and
    /// replaces its host and public key.
    pub fn validator_register(
        e: Env,
        validator: Address,
        stake: i128,
        pub_key_y_parity: bool,
        pub_key_x: BytesN<32>,
        host: String,
    ) -> Result<(), Error> {
        validator.require_auth();
        if host.len() > MAX_HOST_LENGTH {
            return Err(Error::HostTooLong);
        }
        if stake < 0 {
            return Err(Error::InsufficientStake);
        }

        let config = st::get_config(&e)?;
        let existing = st::get_validator(&e, &validator);
        let total = existing.as_ref().map(|v| v.stake).unwrap_or(0) + stake;
        if total < config.stake_register {
            return Err(Error::InsufficientStake);
        }

        if stake > 0 {
            let token = token::Client::new(&e, &config.token);
            token.transfer(&validator, &e.current_contract_address(), &stake);
        }

        let record = match existing {
            Some(mut v) => {
                v.stake = total;
                v.pub_key_y_parity = pub_key_y_parity;
                v.pub_key_x = pub_key_x;
                v.host = host;
                v
            }
            None => Validator {
                addr: validator.clone(),
                stake: total,
                pub_key_y_parity,
                pub_key_x,
                host,
                complains: 0,
                registered_at: e.ledger().timestamp(),
            },
        };
        st::put_validator(&e, &record);
        st::set_add(&e, Set::All, &validator);
        refresh_active(&e, &record, &config);
        st::bump_instance(&e);

        e.events().publish((symbol_short!("register"), validator), total);
        Ok(())
    }

    /// Removes the validator and refunds its full remaining stake.
    pub fn validator_deregister(e: Env, validator: Address) -> Result<(), Error> {
        validator.require_auth();
        let config = st::get_config(&e)?;
        let record = st::get_validator(&e, &validator).ok_or(Error::ValidatorNotFound)?;

        if record.stake > 0 {
            let token = token::Client::new(&e, &config.token);
            token.transfer(&e.current_contract_address(), &validator, &record.stake);
        }

        st::remove_validator(&e, &validator);
        st::set_remove(&e, Set::All, &validator);
        st::set_remove(&e, Set::Active, &validator);
        st::clear_complaints(&e, &validator);

        e.events().publish((symbol_short!("dereg"), validator), record.stake);
        Ok(())
    }

    /// Files a complaint against `target`. Once `punish_threshold` complaints
    /// accumulate the target loses `punish_amount` of its stake, floored at zero.
    pub fn validator_complain(e: Env, complainer: Address, target: Address) -> Result<(), Error> {
        complainer.require_auth();
        if complainer == target {
            return Err(Error::Unauthorized);
        }
        if !st::contains(&e, Set::Active, &complainer) {
            return Err(Error::Unauthorized);
        }

        let config = st::get_config(&e)?;
        let mut record = st::get_validator(&e, &target).ok_or(Error::ValidatorNotFound)?;
        if st::has_complained(&e, &target, &complainer) {
            return Err(Error::AlreadyComplained);
        }

        st::record_complaint(&e, &target, &complainer);
        record.complains += 1;

        if record.complains >= config.punish_threshold {
            let deducted = config.punish_amount.min(record.stake).max(0);
            record.stake -= deducted;
            record.complains = 0;
            st::add_slashed(&e, deducted);
            st::clear_complaints(&e, &target);
            e.events()
                .publish((symbol_short!("punished"), target.clone()), (deducted, record.stake));
        }

        st::put_validator(&e, &record);
        refresh_active(&e, &record, &config);

        e.events()
            .publish((symbol_short!("complain"), target), (complainer, record.complains));
        Ok(())
    }

    pub fn set_stake(e: Env, stake_minimum: i128, stake_register: i128) -> Result<(), Error> {
        st::get_admin(&e)?.require_auth();
        let mut config = st::get_config(&e)?;
        config.stake_minimum = stake_minimum;
        config.stake_register = stake_register;
        validate_config(&config)?;
        st::put_config(&e, &config);
        Ok(())
    }

    pub fn set_punish(e: Env, punish_amount: i128, punish_threshold: u32) -> Result<(), Error> {
        st::get_admin(&e)?.require_auth();
        let mut config = st::get_config(&e)?;
        config.punish_amount = punish_amount;
        config.punish_threshold = punish_threshold;
        validate_config(&config)?;
        st::put_config(&e, &config);
        Ok(())
    }

    pub fn get_config(e: Env) -> Result<RegistryConfig, Error> {
        st::get_config(&e)
    }

    pub fn get_validator(e: Env, validator: Address) -> Result<Validator, Error> {
        st::get_validator(&e, &validator).ok_or(Error::ValidatorNotFound)
    }

    pub fn is_active(e: Env, validator: Address) -> bool {
        st::contains(&e, Set::Active, &validator)
    }

    pub fn validators_count(e: Env) -> u32 {
        st::members(&e, Set::All).len()
    }

    pub fn active_validators_count(e: Env) -> u32 {
        st::members(&e, Set::Active).len()
    }

    pub fn get_validators(e: Env, offset: u32, limit: u32) -> Vec<Validator> {
        load_page(&e, Set::All, offset, limit)
    }

    pub fn get_active_validators(e: Env, offset: u32, limit: u32) -> Vec<Validator> {
        load_page(&e, Set::Active, offset, limit)
    }

    pub fn slashed_total(e: Env) -> i128 {
        st::get_slashed(&e)
    }
}

fn validate_config(config: &RegistryConfig) -> Result<(), Error> {
    if config.stake_minimum < 0
        || config.stake_register < config.stake_minimum
        || config.punish_amount < 0
        || config.punish_threshold == 0
    {
        return Err(Error::InvalidConfig);
    }
    Ok(())
}

fn refresh_active(e: &Env, record: &Validator, config: &RegistryConfig) {
    if record.stake >= config.stake_minimum {
        st::set_add(e, Set::Active, &record.addr);
    } else {
        st::set_remove(e, Set::Active, &record.addr);
    }
}

fn load_page(e: &Env, set: Set, offset: u32, limit: u32) -> Vec<Validator> {
    let members = st::members(e, set);
    let mut out = Vec::new(e);
    for addr in st::page(e, &members, offset, limit).iter() {
        if let Some(v) = st::get_validator(e, &addr) {
            out.push_back(v);
        }
    }
    out
}
