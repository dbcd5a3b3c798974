use super::*;
use soroban_sdk::testutils::{Address as _, Events, Ledger};
use soroban_sdk::token::{StellarAssetClient, TokenClient};
use soroban_sdk::{symbol_short, BytesN, IntoVal, Symbol, TryFromVal, Val};

use hashrate_oracle::{HashrateOracle, HashrateOracleClient};
use validator_registry::{ValidatorRegistry, ValidatorRegistryClient};

const SPEED: u64 = 1_000_000;
const LENGTH: u64 = 3_600;
const START: u64 = 1_000;

struct Setup<'a> {
    e: Env,
    factory: CloneFactoryClient<'a>,
    oracle: HashrateOracleClient<'a>,
    payment: TokenClient<'a>,
    fee_token: TokenClient<'a>,
    factory_id: Address,
    seller: Address,
    validator: Address,
}

fn at(e: &Env, timestamp: u64) {
    e.ledger().with_mut(|li| li.timestamp = timestamp);
}

fn mint(e: &Env, token: &TokenClient, to: &Address, amount: i128) {
    StellarAssetClient::new(e, &token.address).mint(to, &amount);
}

// One hashes_for_token of 1_000_000: a 1 MH/s hour costs 3_600 units.
// Validator fee is 10% (1_000 with 4 decimals).
fn setup<'a>() -> Setup<'a> {
    let e = Env::default();
    e.mock_all_auths();
    at(&e, START);

    let admin = Address::generate(&e);
    let payment = TokenClient::new(&e, &e.register_stellar_asset_contract_v2(admin.clone()).address());
    let fee_token = TokenClient::new(&e, &e.register_stellar_asset_contract_v2(admin.clone()).address());

    let oracle = HashrateOracleClient::new(&e, &e.register_contract(None, HashrateOracle));
    oracle.init(&admin, &6);
    oracle.set_ttl(&1_000_000, &1_000_000);
    oracle.set_btc_price(&10_000_000_000_000, &8);
    oracle.set_hashes_for_btc(&100_000_000_000_000_000);

    let registry = ValidatorRegistryClient::new(&e, &e.register_contract(None, ValidatorRegistry));
    registry.init(&admin, &fee_token.address, &50, &100, &80, &2);
    let validator = Address::generate(&e);
    mint(&e, &fee_token, &validator, 100);
    registry.validator_register(
        &validator,
        &100,
        &false,
        &BytesN::from_array(&e, &[7; 32]),
        &String::from_str(&e, "stratum+tcp://validator:3333"),
    );

    let factory_id = e.register_contract(None, CloneFactory);
    let factory = CloneFactoryClient::new(&e, &factory_id);
    factory.init(
        &admin,
        &MarketplaceConfig {
            payment_token: payment.address.clone(),
            fee_token: fee_token.address.clone(),
            oracle: oracle.address.clone(),
            validator_registry: registry.address.clone(),
            validator_fee_rate_scaled: 1_000,
            fee_decimals: 4,
            min_contract_duration: 60,
            max_contract_duration: 7 * 24 * 3_600,
            min_seller_stake: 1_000,
            marketplace_fee: 0,
            fee_recipient: admin.clone(),
            default_buyer: None,
        },
    );

    let seller = Address::generate(&e);
    mint(&e, &fee_token, &seller, 1_000);
    factory.seller_register(&seller, &1_000);

    Setup { e, factory, oracle, payment, fee_token, factory_id, seller, validator }
}

fn buyer(s: &Setup) -> Address {
    let addr = Address::generate(&s.e);
    mint(&s.e, &s.payment, &addr, 100_000);
    mint(&s.e, &s.fee_token, &addr, 10_000);
    addr
}

fn create(s: &Setup) -> u64 {
    s.factory
        .create_rental_contract(&s.seller, &SPEED, &LENGTH, &0, &Bytes::from_slice(&s.e, &[1, 2, 3]))
}

fn resell(is_resellable: bool, resell_price: i128, resell_profit_target: i32) -> ResellParams {
    ResellParams { is_resellable, is_resell_to_default_buyer: false, resell_price, resell_profit_target }
}

fn url(e: &Env, s: &str) -> String {
    String::from_str(e, s)
}

fn buy(s: &Setup, id: u64, who: &Address, validator: Option<Address>, params: ResellParams) -> (i128, i128) {
    let version = s.factory.terms(&id).version;
    s.factory.purchase_rental_contract(
        &id,
        who,
        &validator,
        &url(&s.e, "enc-validator"),
        &url(&s.e, "enc-dest"),
        &version,
        &params,
    )
}

fn try_buy(s: &Setup, id: u64, who: &Address, version: u32, params: ResellParams) -> Result<(i128, i128), Error> {
    match s.factory.try_purchase_rental_contract(
        &id,
        who,
        &None,
        &url(&s.e, "enc-validator"),
        &url(&s.e, "enc-dest"),
        &version,
        &params,
    ) {
        Ok(Ok(v)) => Ok(v),
        Err(Ok(err)) => Err(err),
        _ => panic!("unexpected invocation failure"),
    }
}

/// Data of the latest factory event published under `topics`.
fn last_event<T: TryFromVal<Env, Val>>(s: &Setup, topics: Vec<Val>) -> Option<T> {
    s.e.events()
        .all()
        .iter()
        .filter(|(contract, t, _)| *contract == s.factory_id && *t == topics)
        .last()
        .and_then(|(_, _, data)| T::try_from_val(&s.e, &data).ok())
}

fn topics(s: &Setup, name: Symbol, id: u64) -> Vec<Val> {
    (name, id).into_val(&s.e)
}

fn assert_chain_linked(s: &Setup, id: u64) {
    let len = s.factory.get_public_variables_v2(&id).resell_chain_length;
    for i in 0..len.saturating_sub(1) {
        let this = s.factory.resell_chain(&id, &i);
        let next = s.factory.resell_chain(&id, &(i + 1));
        assert_eq!(this.account, next.seller);
    }
}

#[test]
fn test_create_position() {
    let s = setup();
    let id = create(&s);

    assert_eq!(id, 1);
    assert_eq!(s.factory.get_contract_count(), 1);
    assert_eq!(s.factory.contract_state(&id), ContractState::Available);
    assert_eq!(s.factory.seller(&id), s.seller);
    assert_eq!(
        s.factory.terms(&id),
        Terms { speed: SPEED, length: LENGTH, version: 0, profit_target: 0 }
    );
    assert_eq!(s.factory.future_terms(&id), None);

    let head = s.factory.get_latest_resell(&id);
    assert_eq!(head.account, s.seller);
    assert_eq!(head.seller, s.seller);
    assert_eq!(head.price, 0);

    let vars = s.factory.get_public_variables_v2(&id);
    assert_eq!(vars.resell_chain_length, 1);
    assert_eq!(vars.purchases_count, 0);
    assert!(!vars.has_future_terms);
    assert_eq!(s.factory.get_history(&id, &0, &10).len(), 0);
    assert_eq!(s.factory.get_stats(&id), Stats { success_count: 0, fail_count: 0 });
}

#[test]
fn test_create_requires_staked_seller() {
    let s = setup();
    let stranger = Address::generate(&s.e);
    let pubkey = Bytes::from_slice(&s.e, &[1]);

    let res = s.factory.try_create_rental_contract(&stranger, &SPEED, &LENGTH, &0, &pubkey);
    assert_eq!(res, Err(Ok(Error::SellerNotRegistered)));

    mint(&s.e, &s.fee_token, &stranger, 500);
    assert_eq!(s.factory.try_seller_register(&stranger, &500), Err(Ok(Error::InsufficientStake)));
}

#[test]
fn test_duration_bounds() {
    let s = setup();
    let pubkey = Bytes::from_slice(&s.e, &[1]);

    let too_short = s.factory.try_create_rental_contract(&s.seller, &SPEED, &59, &0, &pubkey);
    assert_eq!(too_short, Err(Ok(Error::DurationOutOfBounds)));

    let too_long = s.factory.try_create_rental_contract(&s.seller, &SPEED, &(7 * 24 * 3_600 + 1), &0, &pubkey);
    assert_eq!(too_long, Err(Ok(Error::DurationOutOfBounds)));

    s.factory.set_contract_duration_interval(&10, &100);
    assert_eq!(
        s.factory.try_create_rental_contract(&s.seller, &SPEED, &LENGTH, &0, &pubkey),
        Err(Ok(Error::DurationOutOfBounds))
    );
    assert_eq!(s.factory.try_set_contract_duration_interval(&100, &10), Err(Ok(Error::InvalidConfig)));
}

#[test]
fn test_price_scales_linearly() {
    let s = setup();
    let id = create(&s);
    assert_eq!(s.factory.price_and_fee(&id), (3_600, 360));

    let pubkey = Bytes::from_slice(&s.e, &[1]);
    let double_speed = s.factory.create_rental_contract(&s.seller, &(2 * SPEED), &LENGTH, &0, &pubkey);
    assert_eq!(s.factory.price_and_fee(&double_speed), (7_200, 720));

    let marked_up = s.factory.create_rental_contract(&s.seller, &SPEED, &LENGTH, &10, &pubkey);
    assert_eq!(s.factory.price_and_fee(&marked_up), (3_960, 396));
}

#[test]
fn test_first_purchase_starts_run() {
    let s = setup();
    let id = create(&s);
    let a = buyer(&s);

    let (price, fee) = buy(&s, id, &a, Some(s.validator.clone()), resell(true, 0, 0));

    assert_eq!((price, fee), (3_600, 360));
    assert_eq!(s.payment.balance(&a), 100_000 - 3_600);
    assert_eq!(s.fee_token.balance(&a), 10_000 - 360);
    assert_eq!(s.payment.balance(&s.factory_id), 3_600);
    assert_eq!(s.fee_token.balance(&s.factory_id), 1_000 + 360);

    assert_eq!(s.factory.contract_state(&id), ContractState::Running);
    let vars = s.factory.get_public_variables_v2(&id);
    assert_eq!(vars.start_time, START);
    assert_eq!(vars.purchases_count, 1);
    assert_eq!(vars.resell_chain_length, 2);
    assert_eq!(vars.balance, 3_600);
    assert_eq!(vars.fee_balance, 360);

    let hop = s.factory.get_latest_resell(&id);
    assert_eq!(hop.account, a);
    assert_eq!(hop.seller, s.seller);
    assert_eq!(hop.validator, Some(s.validator.clone()));
    assert_eq!(hop.encr_dest_url, url(&s.e, "enc-dest"));
    assert_chain_linked(&s, id);

    assert_eq!(s.factory.get_history(&id, &0, &10).len(), 0);
}

#[test]
fn test_purchase_without_validator_has_no_fee() {
    let s = setup();
    let id = create(&s);
    let a = buyer(&s);

    assert_eq!(buy(&s, id, &a, None, resell(true, 0, 0)), (3_600, 0));
    assert_eq!(s.fee_token.balance(&a), 10_000);
}

#[test]
fn test_purchase_rejects_stale_terms_version() {
    let s = setup();
    let id = create(&s);
    let a = buyer(&s);

    assert_eq!(try_buy(&s, id, &a, 1, resell(true, 0, 0)), Err(Error::TermsVersionMismatch));
    assert_eq!(s.factory.contract_state(&id), ContractState::Available);
}

#[test]
fn test_purchase_rejects_stale_oracle() {
    let s = setup();
    let id = create(&s);
    let a = buyer(&s);

    s.oracle.set_ttl(&60, &60);
    s.oracle.set_btc_price(&10_000_000_000_000, &8);
    s.oracle.set_hashes_for_btc(&100_000_000_000_000_000);

    at(&s.e, START + 61);
    assert_eq!(try_buy(&s, id, &a, 0, resell(true, 0, 0)), Err(Error::StaleData));
    assert_eq!(s.factory.try_price_and_fee(&id), Err(Ok(Error::StaleData)));
    assert_eq!(s.payment.balance(&a), 100_000);
}

#[test]
fn test_purchase_rejections() {
    let s = setup();
    let id = create(&s);
    let a = buyer(&s);

    assert_eq!(try_buy(&s, 99, &a, 0, resell(true, 0, 0)), Err(Error::UnknownContract));
    assert_eq!(try_buy(&s, id, &s.seller, 0, resell(true, 0, 0)), Err(Error::CannotPurchaseOwnContract));
    assert_eq!(try_buy(&s, id, &a, 0, resell(true, 0, -100)), Err(Error::InvalidProfitTarget));

    let res = s.factory.try_purchase_rental_contract(
        &id,
        &a,
        &Some(Address::generate(&s.e)),
        &url(&s.e, "v"),
        &url(&s.e, "d"),
        &0,
        &resell(true, 0, 0),
    );
    assert_eq!(res, Err(Ok(Error::ValidatorNotActive)));

    buy(&s, id, &a, None, resell(true, 0, 0));
    assert_eq!(try_buy(&s, id, &a, 0, resell(true, 0, 0)), Err(Error::CannotPurchaseOwnContract));
}

#[test]
fn test_close_early_settles_pro_rata() {
    let s = setup();
    let id = create(&s);
    let a = buyer(&s);
    buy(&s, id, &a, Some(s.validator.clone()), resell(true, 0, 0));

    at(&s.e, START + 900);
    s.factory.close_early(&id, &a, &0);

    assert_eq!(s.payment.balance(&s.seller), 900);
    assert_eq!(s.fee_token.balance(&s.validator), 90);
    assert_eq!(s.payment.balance(&a), 100_000 - 900);
    assert_eq!(s.fee_token.balance(&a), 10_000 - 90);
    assert_eq!(s.payment.balance(&s.factory_id), 0);

    assert_eq!(s.factory.contract_state(&id), ContractState::Available);
    assert_eq!(s.factory.get_public_variables_v2(&id).resell_chain_length, 1);

    let history = s.factory.get_history(&id, &0, &10);
    assert_eq!(history.len(), 1);
    let entry = history.get(0).unwrap();
    assert_eq!(entry.buyer, a);
    assert_eq!(entry.purchase_time, START);
    assert_eq!(entry.end_time, START + 900);
    assert!(!entry.is_good_closeout);
    assert_eq!(s.factory.get_stats(&id), Stats { success_count: 0, fail_count: 1 });
}

#[test]
fn test_close_early_authorization() {
    let s = setup();
    let id = create(&s);
    let a = buyer(&s);
    let stranger = Address::generate(&s.e);

    assert_eq!(s.factory.try_close_early(&id, &a, &0), Err(Ok(Error::ContractNotRunning)));

    buy(&s, id, &a, Some(s.validator.clone()), resell(true, 0, 0));
    assert_eq!(s.factory.try_close_early(&id, &stranger, &0), Err(Ok(Error::Unauthorized)));
    assert_eq!(s.factory.try_close_early(&id, &s.seller, &0), Err(Ok(Error::Unauthorized)));

    // the validator may close on the buyer's behalf
    at(&s.e, START + 100);
    s.factory.close_early(&id, &s.validator, &1);
    assert_eq!(s.factory.contract_state(&id), ContractState::Available);

    at(&s.e, START + 200);
    buy(&s, id, &a, None, resell(true, 0, 0));
    at(&s.e, START + 200 + LENGTH);
    assert_eq!(s.factory.try_close_early(&id, &a, &0), Err(Ok(Error::ContractNotRunning)));
}

#[test]
fn test_natural_expiry_and_claim() {
    let s = setup();
    let id = create(&s);
    let a = buyer(&s);
    buy(&s, id, &a, Some(s.validator.clone()), resell(true, 0, 0));

    at(&s.e, START + 1_800);
    s.factory.claim_funds(&id, &s.seller);
    assert_eq!(s.payment.balance(&s.seller), 1_800);
    assert_eq!(s.factory.contract_state(&id), ContractState::Running);

    at(&s.e, START + LENGTH);
    // reported as available before anything is materialized
    assert_eq!(s.factory.contract_state(&id), ContractState::Available);
    assert_eq!(s.factory.get_history(&id, &0, &10).len(), 0);

    s.factory.claim_funds(&id, &s.seller);
    assert_eq!(s.payment.balance(&s.seller), 3_600);
    assert_eq!(s.fee_token.balance(&s.validator), 360);
    assert_eq!(s.payment.balance(&a), 100_000 - 3_600);

    let history = s.factory.get_history(&id, &0, &10);
    assert_eq!(history.len(), 1);
    let entry = history.get(0).unwrap();
    assert!(entry.is_good_closeout);
    assert_eq!(entry.purchase_time + entry.length, entry.end_time);
    assert_eq!(s.factory.get_stats(&id), Stats { success_count: 1, fail_count: 0 });
    assert_eq!(s.factory.get_public_variables_v2(&id).resell_chain_length, 1);
}

#[test]
fn test_claim_requires_chain_party() {
    let s = setup();
    let id = create(&s);
    let a = buyer(&s);
    let stranger = Address::generate(&s.e);
    buy(&s, id, &a, Some(s.validator.clone()), resell(true, 0, 0));

    assert_eq!(s.factory.try_claim_funds(&id, &stranger), Err(Ok(Error::Unauthorized)));
    s.factory.claim_funds(&id, &a);
    s.factory.claim_funds(&id, &s.validator);
}

#[test]
fn test_expired_run_completes_on_next_purchase() {
    let s = setup();
    let id = create(&s);
    let a = buyer(&s);
    let b = buyer(&s);
    buy(&s, id, &a, None, resell(false, 0, 0));

    at(&s.e, START + LENGTH + 10);
    // not resellable, but the run is over so this is a fresh purchase
    buy(&s, id, &b, None, resell(true, 0, 0));

    assert_eq!(s.payment.balance(&s.seller), 3_600);
    assert_eq!(s.factory.get_history(&id, &0, &10).len(), 1);
    let vars = s.factory.get_public_variables_v2(&id);
    assert_eq!(vars.start_time, START + LENGTH + 10);
    assert_eq!(vars.resell_chain_length, 2);
    assert_eq!(s.factory.get_latest_resell(&id).account, b);
}

#[test]
fn test_resell_reward_includes_profit_target() {
    let s = setup();
    let id = create(&s);
    let a = buyer(&s);
    let b = buyer(&s);
    buy(&s, id, &a, None, resell(true, 0, 10));

    at(&s.e, START + 1_800);
    // base for the remaining 1_800s plus A's 10% markup
    assert_eq!(s.factory.price_and_fee(&id), (1_980, 198));
    let (price, _) = buy(&s, id, &b, None, resell(true, 0, 0));
    assert_eq!(price, 1_980);

    // A's hop was settled up to the resell
    assert_eq!(s.payment.balance(&s.seller), 1_800);
    assert_eq!(s.factory.get_public_variables_v2(&id).resell_chain_length, 3);
    assert_eq!(s.factory.resell_chain(&id, &2).seller, a);
    assert_chain_linked(&s, id);
    assert_eq!(s.factory.get_latest_resell(&id).start_time, START + 1_800);
    assert_eq!(s.factory.get_public_variables_v2(&id).start_time, START);

    at(&s.e, START + LENGTH);
    s.factory.claim_funds(&id, &a);

    let base_price: i128 = 1_800;
    let expected_reward = base_price + base_price * 10 / 100;
    assert_eq!(s.payment.balance(&a), 100_000 - 3_600 + expected_reward);
    assert_eq!(s.payment.balance(&s.seller), 3_600);
    assert_eq!(s.payment.balance(&b), 100_000 - 1_980);
    assert_eq!(s.payment.balance(&s.factory_id), 0);

    let history = s.factory.get_history(&id, &0, &10);
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|h| h.is_good_closeout && h.purchase_time + h.length == h.end_time));
    assert_eq!(s.factory.get_stats(&id).success_count, 2);
}

#[test]
fn test_three_hop_chain_settles_every_hop() {
    let s = setup();
    let id = create(&s);
    let a = buyer(&s);
    let b = buyer(&s);
    let c = buyer(&s);
    buy(&s, id, &a, None, resell(true, 0, 0));

    at(&s.e, START + 1_200);
    buy(&s, id, &b, None, resell(true, 0, 50));
    at(&s.e, START + 2_400);
    let (price_c, _) = buy(&s, id, &c, None, resell(false, 0, 0));
    assert_eq!(price_c, 1_800);
    assert_chain_linked(&s, id);

    at(&s.e, START + LENGTH);
    s.factory.claim_funds(&id, &c);

    assert_eq!(s.payment.balance(&s.seller), 3_600);
    assert_eq!(s.payment.balance(&a), 100_000 - 3_600 + 2_400);
    assert_eq!(s.payment.balance(&b), 100_000 - 2_400 + 1_800);
    assert_eq!(s.payment.balance(&c), 100_000 - 1_800);
    assert_eq!(s.payment.balance(&s.factory_id), 0);
    assert_eq!(s.factory.get_history(&id, &0, &10).len(), 3);
}

#[test]
fn test_tail_close_returns_to_previous_holder() {
    let s = setup();
    let id = create(&s);
    let a = buyer(&s);
    let b = buyer(&s);
    buy(&s, id, &a, None, resell(true, 0, 10));

    at(&s.e, START + 1_800);
    buy(&s, id, &b, None, resell(true, 0, 0));

    at(&s.e, START + 2_700);
    s.factory.close_early(&id, &b, &0);

    // B used half of its remaining window
    assert_eq!(s.payment.balance(&b), 100_000 - 990);
    assert_eq!(s.payment.balance(&a), 100_000 - 3_600 + 990);
    assert_eq!(s.payment.balance(&s.seller), 2_700);

    assert_eq!(s.factory.contract_state(&id), ContractState::Running);
    assert_eq!(s.factory.get_latest_resell(&id).account, a);
    assert_eq!(s.factory.get_stats(&id).fail_count, 1);

    s.factory.close_early(&id, &a, &0);
    assert_eq!(s.factory.contract_state(&id), ContractState::Available);
    assert_eq!(s.payment.balance(&s.seller), 2_700);
    assert_eq!(s.payment.balance(&a), 100_000 - 2_700 + 990);
    assert_eq!(s.factory.get_stats(&id).fail_count, 2);
}

#[test]
fn test_resell_offer_rules() {
    let s = setup();
    let id = create(&s);
    let a = buyer(&s);
    let b = buyer(&s);
    let default_buyer = buyer(&s);
    buy(&s, id, &a, None, resell(false, 0, 0));

    assert_eq!(try_buy(&s, id, &b, 0, resell(true, 0, 0)), Err(Error::NotResellable));

    s.factory.close_early(&id, &a, &0);
    let to_default = ResellParams {
        is_resellable: true,
        is_resell_to_default_buyer: true,
        resell_price: 0,
        resell_profit_target: 0,
    };
    buy(&s, id, &a, None, to_default);

    assert_eq!(try_buy(&s, id, &b, 0, resell(true, 0, 0)), Err(Error::DefaultBuyerOnly));
    s.factory.set_default_buyer(&Some(default_buyer.clone()));
    assert_eq!(try_buy(&s, id, &b, 0, resell(true, 0, 0)), Err(Error::DefaultBuyerOnly));
    buy(&s, id, &default_buyer, None, resell(true, 0, 0));
    assert_eq!(s.factory.get_latest_resell(&id).seller, a);
}

#[test]
fn test_fixed_resell_price() {
    let s = setup();
    let id = create(&s);
    let a = buyer(&s);
    let b = buyer(&s);
    buy(&s, id, &a, None, resell(true, 5_000, 0));

    at(&s.e, START + 600);
    assert_eq!(buy(&s, id, &b, None, resell(true, 0, 0)).0, 5_000);
}

#[test]
fn test_terms_update_when_available() {
    let s = setup();
    let id = create(&s);
    let stranger = Address::generate(&s.e);

    assert_eq!(
        s.factory.try_update_contract_information(&id, &stranger, &SPEED, &LENGTH, &0),
        Err(Ok(Error::Unauthorized))
    );
    assert_eq!(
        s.factory.try_update_contract_information(&id, &s.seller, &SPEED, &10, &0),
        Err(Ok(Error::DurationOutOfBounds))
    );

    s.factory.update_contract_information(&id, &s.seller, &(2 * SPEED), &LENGTH, &5);
    let terms = s.factory.terms(&id);
    assert_eq!(terms.version, 1);
    assert_eq!(terms.speed, 2 * SPEED);
    assert_eq!(s.factory.future_terms(&id), None);
    assert_eq!(s.factory.get_latest_resell(&id).resell_profit_target, 5);

    s.factory.update_contract_information(&id, &s.seller, &SPEED, &LENGTH, &0);
    assert_eq!(s.factory.terms(&id).version, 2);
}

#[test]
fn test_future_terms_applied_once_on_close() {
    let s = setup();
    let id = create(&s);
    let a = buyer(&s);
    let b = buyer(&s);
    buy(&s, id, &a, None, resell(true, 0, 0));

    s.factory.update_contract_information(&id, &s.seller, &(2 * SPEED), &7_200, &5);
    assert_eq!(s.factory.terms(&id).version, 0);
    let staged = s.factory.future_terms(&id).unwrap();
    assert_eq!(staged.version, 1);
    assert_eq!(staged.length, 7_200);
    assert!(s.factory.get_public_variables_v2(&id).has_future_terms);

    // a second update replaces the staged one
    s.factory.update_contract_information(&id, &s.seller, &(3 * SPEED), &7_200, &5);
    assert_eq!(s.factory.future_terms(&id).unwrap().speed, 3 * SPEED);
    assert_eq!(s.factory.future_terms(&id).unwrap().version, 1);

    at(&s.e, START + 60);
    s.factory.close_early(&id, &a, &0);

    let terms = s.factory.terms(&id);
    assert_eq!(terms.version, 1);
    assert_eq!(terms.speed, 3 * SPEED);
    assert_eq!(s.factory.future_terms(&id), None);

    assert_eq!(try_buy(&s, id, &b, 0, resell(true, 0, 0)), Err(Error::TermsVersionMismatch));
    assert_eq!(try_buy(&s, id, &b, 1, resell(true, 0, 0)), Ok((3 * 7_200 + 3 * 7_200 * 5 / 100, 0)));
}

#[test]
fn test_future_terms_applied_on_expiry() {
    let s = setup();
    let id = create(&s);
    let a = buyer(&s);
    buy(&s, id, &a, None, resell(true, 0, 0));
    s.factory.update_contract_information(&id, &s.seller, &SPEED, &1_800, &0);

    at(&s.e, START + LENGTH);
    // quote already reflects the terms the next run will use
    assert_eq!(s.factory.price_and_fee(&id), (1_800, 180));

    s.factory.claim_funds(&id, &s.seller);
    assert_eq!(s.factory.terms(&id).version, 1);
    assert_eq!(s.factory.terms(&id).length, 1_800);
    assert_eq!(s.factory.future_terms(&id), None);

    s.factory.claim_funds(&id, &s.seller);
    assert_eq!(s.factory.terms(&id).version, 1);
}

#[test]
fn test_expired_run_advertises_staged_terms() {
    let s = setup();
    let id = create(&s);
    let a = buyer(&s);
    let b = buyer(&s);
    buy(&s, id, &a, None, resell(true, 0, 0));
    s.factory.update_contract_information(&id, &s.seller, &SPEED, &1_800, &0);

    at(&s.e, START + LENGTH);
    let vars = s.factory.get_public_variables_v2(&id);
    assert_eq!(vars.state, ContractState::Available);
    assert_eq!(vars.terms.version, 1);
    assert_eq!(vars.terms.length, 1_800);
    assert!(!vars.has_future_terms);
    assert_eq!(s.factory.terms(&id), vars.terms);
    assert_eq!(s.factory.future_terms(&id), None);

    // the advertised version is the one the purchase checks against
    assert_eq!(
        try_buy(&s, id, &b, vars.terms.version, resell(true, 0, 0)),
        Ok((1_800, 0))
    );
    assert_eq!(s.factory.get_history(&id, &0, &10).len(), 1);
}

#[test]
fn test_set_destination() {
    let s = setup();
    let id = create(&s);
    let a = buyer(&s);
    let stranger = Address::generate(&s.e);
    let new_url = url(&s.e, "enc-new-dest");

    assert_eq!(
        s.factory.try_set_destination(&id, &a, &new_url, &new_url),
        Err(Ok(Error::ContractNotRunning))
    );

    buy(&s, id, &a, None, resell(true, 0, 0));
    assert_eq!(
        s.factory.try_set_destination(&id, &stranger, &new_url, &new_url),
        Err(Ok(Error::Unauthorized))
    );

    s.factory.set_destination(&id, &a, &url(&s.e, "enc-new-validator"), &new_url);
    let hop = s.factory.get_latest_resell(&id);
    assert_eq!(hop.encr_dest_url, new_url);
    assert_eq!(hop.encr_validator_url, url(&s.e, "enc-new-validator"));
}

#[test]
fn test_deleted_positions() {
    let s = setup();
    let id = create(&s);
    let a = buyer(&s);
    let stranger = Address::generate(&s.e);

    assert_eq!(s.factory.try_set_contract_deleted(&id, &stranger, &true), Err(Ok(Error::Unauthorized)));
    s.factory.set_contract_deleted(&id, &s.seller, &true);
    assert!(s.factory.get_public_variables_v2(&id).is_deleted);
    assert_eq!(try_buy(&s, id, &a, 0, resell(true, 0, 0)), Err(Error::ContractDeleted));

    // tombstones keep ids stable
    assert_eq!(s.factory.get_contract_list(&0, &10).len(), 1);

    s.factory.set_contract_deleted(&id, &s.seller, &false);
    buy(&s, id, &a, None, resell(true, 0, 0));
}

#[test]
fn test_marketplace_fee_paid_to_recipient() {
    let s = setup();
    let id = create(&s);
    let a = buyer(&s);
    let recipient = Address::generate(&s.e);

    s.factory.set_marketplace_fee(&50, &recipient);
    buy(&s, id, &a, None, resell(true, 0, 0));

    assert_eq!(s.payment.balance(&recipient), 50);
    assert_eq!(s.payment.balance(&a), 100_000 - 3_600 - 50);
}

#[test]
fn test_history_pagination() {
    let s = setup();
    let id = create(&s);
    let a = buyer(&s);

    for round in 0..3u64 {
        at(&s.e, START + round * 100);
        buy(&s, id, &a, None, resell(true, 0, 0));
        at(&s.e, START + round * 100 + 50);
        s.factory.close_early(&id, &a, &0);
    }

    assert_eq!(s.factory.get_history(&id, &0, &2).len(), 2);
    assert_eq!(s.factory.get_history(&id, &2, &10).len(), 1);
    assert_eq!(s.factory.get_history(&id, &3, &10).len(), 0);
    assert_eq!(s.factory.get_history(&id, &5, &1).len(), 0);
    assert_eq!(s.factory.get_history(&id, &1, &1).get(0).unwrap().purchase_time, START + 100);
    assert_eq!(s.factory.try_get_history(&42, &0, &1), Err(Ok(Error::UnknownContract)));
}

#[test]
fn test_contract_list_pagination() {
    let s = setup();
    for _ in 0..5 {
        create(&s);
    }

    let page = s.factory.get_contract_list(&1, &2);
    assert_eq!(page.len(), 2);
    assert_eq!(page.get(0), Some(2));
    assert_eq!(page.get(1), Some(3));
    assert_eq!(s.factory.get_contract_list(&4, &10).len(), 1);
    assert_eq!(s.factory.get_contract_list(&5, &10).len(), 0);
    assert_eq!(s.factory.get_contract_list(&u64::MAX, &10).len(), 0);
    assert_eq!(s.factory.get_contract_list(&3, &u64::MAX).len(), 2);
}

#[test]
fn test_seller_deregister_refunds_stake() {
    let s = setup();
    create(&s);

    s.factory.seller_deregister(&s.seller);
    assert_eq!(s.fee_token.balance(&s.seller), 1_000);
    assert!(!s.factory.seller_info(&s.seller).unwrap().is_active);

    let pubkey = Bytes::from_slice(&s.e, &[1]);
    assert_eq!(
        s.factory.try_create_rental_contract(&s.seller, &SPEED, &LENGTH, &0, &pubkey),
        Err(Ok(Error::SellerNotRegistered))
    );
    assert_eq!(s.factory.try_seller_deregister(&s.seller), Err(Ok(Error::SellerNotRegistered)));
}

#[test]
fn test_owner_setters() {
    let s = setup();

    s.factory.set_validator_fee_rate(&500, &4);
    let config = s.factory.get_marketplace_config();
    assert_eq!(config.validator_fee_rate_scaled, 500);
    assert_eq!(s.factory.try_set_validator_fee_rate(&500, &40), Err(Ok(Error::InvalidConfig)));

    let id = create(&s);
    assert_eq!(s.factory.price_and_fee(&id), (3_600, 180));

    let other_oracle = s.e.register_contract(None, HashrateOracle);
    s.factory.set_hashrate_oracle(&other_oracle);
    assert_eq!(s.factory.get_marketplace_config().oracle, other_oracle);
    assert_eq!(s.factory.try_price_and_fee(&id), Err(Ok(Error::OracleUnavailable)));
}

#[test]
fn test_position_events() {
    let s = setup();
    let a = buyer(&s);
    let b = buyer(&s);
    let pubkey = Bytes::from_slice(&s.e, &[1, 2, 3]);

    let id = create(&s);
    assert_eq!(
        last_event::<(Address, Bytes)>(&s, topics(&s, symbol_short!("created"), id)),
        Some((s.seller.clone(), pubkey))
    );

    buy(&s, id, &a, Some(s.validator.clone()), resell(true, 0, 10));
    assert_eq!(
        last_event::<(Address, Address, Option<Address>, i128, i128, u64)>(
            &s,
            topics(&s, symbol_short!("purchased"), id)
        ),
        Some((a.clone(), s.seller.clone(), Some(s.validator.clone()), 3_600, 360, SPEED))
    );

    // a resell names the holder who sold, not the listing seller
    at(&s.e, START + 1_800);
    buy(&s, id, &b, None, resell(true, 0, 0));
    assert_eq!(
        last_event::<(Address, Address, Option<Address>, i128, i128, u64)>(
            &s,
            topics(&s, symbol_short!("purchased"), id)
        ),
        Some((b.clone(), a.clone(), None, 1_980, 0, SPEED))
    );

    s.factory.set_destination(&id, &b, &url(&s.e, "v2"), &url(&s.e, "d2"));
    assert_eq!(
        last_event::<Address>(&s, topics(&s, symbol_short!("dest_upd"), id)),
        Some(b.clone())
    );

    s.factory.update_contract_information(&id, &s.seller, &SPEED, &1_800, &0);
    assert_eq!(
        last_event::<(u32, bool)>(&s, topics(&s, symbol_short!("terms_upd"), id)),
        Some((1, true))
    );

    s.factory.claim_funds(&id, &a);
    assert_eq!(
        last_event::<Address>(&s, topics(&s, symbol_short!("claimed"), id)),
        Some(a.clone())
    );

    at(&s.e, START + 2_700);
    s.factory.close_early(&id, &b, &4);
    assert_eq!(
        last_event::<(Address, u32)>(&s, topics(&s, symbol_short!("closed"), id)),
        Some((b.clone(), 4))
    );

    s.factory.close_early(&id, &a, &0);
    // staged terms applied as the position returns to Available
    assert_eq!(
        last_event::<(u32, bool)>(&s, topics(&s, symbol_short!("terms_upd"), id)),
        Some((1, false))
    );

    s.factory.set_contract_deleted(&id, &s.seller, &true);
    assert_eq!(
        last_event::<bool>(&s, topics(&s, symbol_short!("deleted"), id)),
        Some(true)
    );
}

#[test]
fn test_fee_rate_event() {
    let s = setup();

    s.factory.set_validator_fee_rate(&500, &4);
    let fee_rate = last_event::<(i128, u32)>(&s, (symbol_short!("fee_rate"),).into_val(&s.e));
    assert_eq!(fee_rate, Some((500, 4)));
}
