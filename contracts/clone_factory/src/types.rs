use soroban_sdk::{contracterror, contracttype, Address, Bytes, String};

#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum Error {
    NotInitialized = 1,
    AlreadyInitialized = 2,
    Unauthorized = 3,
    UnknownContract = 4,
    ContractDeleted = 5,
    DurationOutOfBounds = 6,
    InvalidProfitTarget = 7,
    SellerNotRegistered = 8,
    InsufficientStake = 9,
    TermsVersionMismatch = 10,
    StaleData = 11,
    OracleUnavailable = 12,
    NotResellable = 13,
    DefaultBuyerOnly = 14,
    ContractNotRunning = 15,
    ValidatorNotActive = 16,
    CannotPurchaseOwnContract = 17,
    IndexOutOfRange = 18,
    InvalidConfig = 19,
    InvalidSpeed = 20,
}

#[contracttype]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ContractState {
    Available,
    Running,
}

/// Rental parameters governing pricing of a position.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Terms {
    pub speed: u64,
    pub length: u64,
    pub version: u32,
    pub profit_target: i32,
}

/// One hop of the resell chain. Index 0 is the seller's own listing.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResellTerms {
    pub account: Address,
    pub seller: Address,
    pub validator: Option<Address>,
    pub price: i128,
    pub fee: i128,
    pub start_time: u64,
    pub last_settlement_time: u64,
    pub encr_validator_url: String,
    pub encr_dest_url: String,
    pub resell_price: i128,
    pub resell_profit_target: i32,
    pub is_resellable: bool,
    pub is_resell_to_default_buyer: bool,
}

/// Buyer-chosen offer for whoever buys the position next.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResellParams {
    pub is_resellable: bool,
    pub is_resell_to_default_buyer: bool,
    pub resell_price: i128,
    pub resell_profit_target: i32,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HistoryEntry {
    pub buyer: Address,
    pub validator: Option<Address>,
    pub price: i128,
    pub fee: i128,
    pub speed: u64,
    pub length: u64,
    pub purchase_time: u64,
    pub end_time: u64,
    pub is_good_closeout: bool,
}

#[contracttype]
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Stats {
    pub success_count: u32,
    pub fail_count: u32,
}

/// Storage record of a rental position.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Position {
    pub id: u64,
    pub seller: Address,
    pub pubkey: Bytes,
    pub terms: Terms,
    pub future_terms: Option<Terms>,
    pub state: ContractState,
    pub start_time: u64,
    pub purchases_count: u32,
    pub is_deleted: bool,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PublicVariables {
    pub state: ContractState,
    pub terms: Terms,
    pub start_time: u64,
    pub seller: Address,
    pub pubkey: Bytes,
    pub is_deleted: bool,
    pub has_future_terms: bool,
    pub purchases_count: u32,
    pub resell_chain_length: u32,
    pub balance: i128,
    pub fee_balance: i128,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SellerInfo {
    pub stake: i128,
    pub is_active: bool,
    pub registered_at: u64,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MarketplaceConfig {
    pub payment_token: Address,
    pub fee_token: Address,
    pub oracle: Address,
    pub validator_registry: Address,
    pub validator_fee_rate_scaled: i128,
    pub fee_decimals: u32,
    pub min_contract_duration: u64,
    pub max_contract_duration: u64,
    pub min_seller_stake: i128,
    pub marketplace_fee: i128,
    pub fee_recipient: Address,
    pub default_buyer: Option<Address>,
}
