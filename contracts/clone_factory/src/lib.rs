#![no_std]
use soroban_sdk::{contract, contractimpl, token, Address, Bytes, Env, String, Vec};

mod events;
mod implementation;
mod pricing;
mod storage;
mod types;

pub use crate::types::{
    ContractState, Error, HistoryEntry, MarketplaceConfig, PublicVariables, ResellParams, ResellTerms,
    SellerInfo, Stats, Terms,
};
use crate::implementation::Destination;
use crate::storage as st;

const MAX_FEE_DECIMALS: u32 = 18;

#[contract]
pub struct CloneFactory;

fn require_owner(e: &Env) -> Result<Address, Error> {
    let owner = st::get_owner(e)?;
    owner.require_auth();
    Ok(owner)
}

fn validate_config(config: &MarketplaceConfig) -> Result<(), Error> {
    if config.min_contract_duration == 0
        || config.min_contract_duration > config.max_contract_duration
        || config.fee_decimals > MAX_FEE_DECIMALS
        || config.validator_fee_rate_scaled < 0
        || config.marketplace_fee < 0
        || config.min_seller_stake < 0
    {
        return Err(Error::InvalidConfig);
    }
    Ok(())
}

fn validate_terms(config: &MarketplaceConfig, speed: u64, length: u64, profit_target: i32) -> Result<(), Error> {
    if length < config.min_contract_duration || length > config.max_contract_duration {
        return Err(Error::DurationOutOfBounds);
    }
    if speed == 0 {
        return Err(Error::InvalidSpeed);
    }
    if profit_target <= -100 {
        return Err(Error::InvalidProfitTarget);
    }
    Ok(())
}

#[contractimpl]
impl CloneFactory {
    /// One-time initializer.
    pub fn init(e: Env, owner: Address, config: MarketplaceConfig) -> Result<(), Error> {
        if st::is_initialized(&e) {
            return Err(Error::AlreadyInitialized);
        }
        validate_config(&config)?;
        st::put_owner(&e, &owner);
        st::put_config(&e, &config);
        st::bump_instance(&e);
        Ok(())
    }

    // ---- sellers ----

    /// Stakes `stake` fee tokens. Repeated calls top up the existing stake.
    pub fn seller_register(e: Env, seller: Address, stake: i128) -> Result<SellerInfo, Error> {
        seller.require_auth();
        let config = st::get_config(&e)?;
        if stake < 0 {
            return Err(Error::InsufficientStake);
        }

        let existing = st::get_seller(&e, &seller).filter(|s| s.is_active);
        let total = existing.as_ref().map(|s| s.stake).unwrap_or(0) + stake;
        if total < config.min_seller_stake {
            return Err(Error::InsufficientStake);
        }
        if stake > 0 {
            token::Client::new(&e, &config.fee_token).transfer(&seller, &e.current_contract_address(), &stake);
        }

        let info = SellerInfo {
            stake: total,
            is_active: true,
            registered_at: existing
                .map(|s| s.registered_at)
                .unwrap_or(e.ledger().timestamp()),
        };
        st::put_seller(&e, &seller, &info);
        st::bump_instance(&e);
        events::seller_updated(&e, &seller, info.stake, true);
        Ok(info)
    }

    /// Refunds the stake. Existing positions keep running; new ones cannot be
    /// created until the seller registers again.
    pub fn seller_deregister(e: Env, seller: Address) -> Result<(), Error> {
        seller.require_auth();
        let config = st::get_config(&e)?;
        let info = st::get_seller(&e, &seller)
            .filter(|s| s.is_active)
            .ok_or(Error::SellerNotRegistered)?;

        if info.stake > 0 {
            token::Client::new(&e, &config.fee_token).transfer(&e.current_contract_address(), &seller, &info.stake);
        }
        st::put_seller(
            &e,
            &seller,
            &SellerInfo { stake: 0, is_active: false, registered_at: info.registered_at },
        );
        events::seller_updated(&e, &seller, 0, false);
        Ok(())
    }

    pub fn seller_info(e: Env, seller: Address) -> Option<SellerInfo> {
        st::get_seller(&e, &seller)
    }

    // ---- positions ----

    /// Creates a rental position and returns its contract id.
    pub fn create_rental_contract(
        e: Env,
        seller: Address,
        speed: u64,
        length: u64,
        profit_target: i32,
        pubkey: Bytes,
    ) -> Result<u64, Error> {
        seller.require_auth();
        let config = st::get_config(&e)?;

        let info = st::get_seller(&e, &seller)
            .filter(|s| s.is_active)
            .ok_or(Error::SellerNotRegistered)?;
        if info.stake < config.min_seller_stake {
            return Err(Error::InsufficientStake);
        }
        validate_terms(&config, speed, length, profit_target)?;

        let id = st::next_id(&e);
        implementation::create(&e, id, &seller, speed, length, profit_target, pubkey.clone());
        st::bump_instance(&e);

        events::contract_created(&e, id, &seller, &pubkey);
        Ok(id)
    }

    /// Buys the position, or the current holder's resell offer when it is
    /// already running. Returns the price and validator fee charged.
    #[allow(clippy::too_many_arguments)]
    pub fn purchase_rental_contract(
        e: Env,
        contract_id: u64,
        buyer: Address,
        validator: Option<Address>,
        encr_validator_url: String,
        encr_dest_url: String,
        terms_version: u32,
        resell: ResellParams,
    ) -> Result<(i128, i128), Error> {
        buyer.require_auth();
        let config = st::get_config(&e)?;
        implementation::purchase(
            &e,
            &config,
            contract_id,
            &buyer,
            validator,
            Destination { encr_validator_url, encr_dest_url },
            terms_version,
            resell,
        )
    }

    pub fn update_contract_information(
        e: Env,
        contract_id: u64,
        seller: Address,
        speed: u64,
        length: u64,
        profit_target: i32,
    ) -> Result<(), Error> {
        seller.require_auth();
        let config = st::get_config(&e)?;
        validate_terms(&config, speed, length, profit_target)?;
        implementation::update_terms(&e, &config, contract_id, &seller, speed, length, profit_target)
    }

    pub fn close_early(e: Env, contract_id: u64, caller: Address, reason: u32) -> Result<(), Error> {
        caller.require_auth();
        let config = st::get_config(&e)?;
        implementation::close_early(&e, &config, contract_id, &caller, reason)
    }

    pub fn claim_funds(e: Env, contract_id: u64, caller: Address) -> Result<(), Error> {
        caller.require_auth();
        let config = st::get_config(&e)?;
        implementation::claim_funds(&e, &config, contract_id, &caller)
    }

    pub fn set_destination(
        e: Env,
        contract_id: u64,
        caller: Address,
        encr_validator_url: String,
        encr_dest_url: String,
    ) -> Result<(), Error> {
        caller.require_auth();
        implementation::set_destination(
            &e,
            contract_id,
            &caller,
            Destination { encr_validator_url, encr_dest_url },
        )
    }

    /// Tombstones (or restores) a position. Allowed for its seller or the owner.
    pub fn set_contract_deleted(e: Env, contract_id: u64, caller: Address, is_deleted: bool) -> Result<(), Error> {
        caller.require_auth();
        let position = st::get_position(&e, contract_id)?;
        if position.seller != caller && st::get_owner(&e)? != caller {
            return Err(Error::Unauthorized);
        }
        implementation::set_deleted(&e, contract_id, is_deleted)
    }

    // ---- owner ----

    pub fn set_contract_duration_interval(e: Env, min: u64, max: u64) -> Result<(), Error> {
        require_owner(&e)?;
        let mut config = st::get_config(&e)?;
        config.min_contract_duration = min;
        config.max_contract_duration = max;
        validate_config(&config)?;
        st::put_config(&e, &config);
        events::duration_interval_updated(&e, min, max);
        Ok(())
    }

    pub fn set_hashrate_oracle(e: Env, oracle: Address) -> Result<(), Error> {
        require_owner(&e)?;
        let mut config = st::get_config(&e)?;
        config.oracle = oracle.clone();
        st::put_config(&e, &config);
        events::oracle_updated(&e, &oracle);
        Ok(())
    }

    pub fn set_validator_fee_rate(e: Env, rate_scaled: i128, decimals: u32) -> Result<(), Error> {
        require_owner(&e)?;
        let mut config = st::get_config(&e)?;
        config.validator_fee_rate_scaled = rate_scaled;
        config.fee_decimals = decimals;
        validate_config(&config)?;
        st::put_config(&e, &config);
        events::validator_fee_rate_updated(&e, rate_scaled, decimals);
        Ok(())
    }

    pub fn set_marketplace_fee(e: Env, fee: i128, recipient: Address) -> Result<(), Error> {
        require_owner(&e)?;
        let mut config = st::get_config(&e)?;
        config.marketplace_fee = fee;
        config.fee_recipient = recipient.clone();
        validate_config(&config)?;
        st::put_config(&e, &config);
        events::marketplace_fee_updated(&e, fee, &recipient);
        Ok(())
    }

    pub fn set_default_buyer(e: Env, default_buyer: Option<Address>) -> Result<(), Error> {
        require_owner(&e)?;
        let mut config = st::get_config(&e)?;
        config.default_buyer = default_buyer;
        st::put_config(&e, &config);
        events::default_buyer_updated(&e, &config.default_buyer);
        Ok(())
    }

    pub fn set_min_seller_stake(e: Env, min_seller_stake: i128) -> Result<(), Error> {
        require_owner(&e)?;
        let mut config = st::get_config(&e)?;
        config.min_seller_stake = min_seller_stake;
        validate_config(&config)?;
        st::put_config(&e, &config);
        events::min_seller_stake_updated(&e, min_seller_stake);
        Ok(())
    }

    pub fn transfer_ownership(e: Env, new_owner: Address) -> Result<(), Error> {
        let previous = require_owner(&e)?;
        st::put_owner(&e, &new_owner);
        events::ownership_transferred(&e, &previous, &new_owner);
        Ok(())
    }

    // ---- reads ----

    pub fn owner(e: Env) -> Result<Address, Error> {
        st::get_owner(&e)
    }

    pub fn get_marketplace_config(e: Env) -> Result<MarketplaceConfig, Error> {
        st::get_config(&e)
    }

    pub fn get_contract_count(e: Env) -> u64 {
        st::contract_count(&e)
    }

    /// Ids in creation order, deleted ones included so pages stay stable.
    pub fn get_contract_list(e: Env, offset: u64, limit: u64) -> Vec<u64> {
        let count = st::contract_count(&e);
        let mut ids = Vec::new(&e);
        if offset >= count {
            return ids;
        }
        let end = offset.saturating_add(limit).min(count);
        for id in (offset + 1)..=end {
            ids.push_back(id);
        }
        ids
    }

    /// Terms a purchase made now must name, staged ones included once the
    /// current run has expired.
    pub fn terms(e: Env, contract_id: u64) -> Result<Terms, Error> {
        let position = st::get_position(&e, contract_id)?;
        Ok(implementation::effective_terms(&e, &position))
    }

    pub fn future_terms(e: Env, contract_id: u64) -> Result<Option<Terms>, Error> {
        let position = st::get_position(&e, contract_id)?;
        Ok(implementation::effective_future_terms(&e, &position))
    }

    pub fn contract_state(e: Env, contract_id: u64) -> Result<ContractState, Error> {
        let position = st::get_position(&e, contract_id)?;
        Ok(implementation::effective_state(&e, &position))
    }

    pub fn seller(e: Env, contract_id: u64) -> Result<Address, Error> {
        Ok(st::get_position(&e, contract_id)?.seller)
    }

    pub fn resell_chain(e: Env, contract_id: u64, index: u32) -> Result<ResellTerms, Error> {
        implementation::resell_chain(&e, contract_id, index)
    }

    pub fn get_latest_resell(e: Env, contract_id: u64) -> Result<ResellTerms, Error> {
        implementation::latest_resell(&e, contract_id)
    }

    pub fn get_public_variables_v2(e: Env, contract_id: u64) -> Result<PublicVariables, Error> {
        implementation::public_variables(&e, contract_id)
    }

    pub fn get_history(e: Env, contract_id: u64, offset: u32, limit: u32) -> Result<Vec<HistoryEntry>, Error> {
        implementation::history(&e, contract_id, offset, limit)
    }

    pub fn get_stats(e: Env, contract_id: u64) -> Result<Stats, Error> {
        st::get_position(&e, contract_id)?;
        Ok(st::get_stats(&e, contract_id))
    }

    pub fn price_and_fee(e: Env, contract_id: u64) -> Result<(i128, i128), Error> {
        let config = st::get_config(&e)?;
        implementation::price_and_fee(&e, &config, contract_id)
    }
}

#[cfg(test)]
mod test;
