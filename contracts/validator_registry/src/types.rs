use soroban_sdk::{contracterror, contracttype, Address, BytesN, String};

pub const MAX_HOST_LENGTH: u32 = 256;

#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum Error {
    NotInitialized = 1,
    AlreadyInitialized = 2,
    InsufficientStake = 3,
    HostTooLong = 4,
    Unauthorized = 5,
    ValidatorNotFound = 6,
    AlreadyComplained = 7,
    InvalidConfig = 8,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Validator {
    pub addr: Address,
    pub stake: i128,
    pub pub_key_y_parity: bool,
    pub pub_key_x: BytesN<32>,
    pub host: String,
    pub complains: u32,
    pub registered_at: u64,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RegistryConfig {
    pub token: Address,
    pub stake_minimum: i128,
    pub stake_register: i128,
    pub punish_amount: i128,
    pub punish_threshold: u32,
}

#[contracttype]
#[derive(Clone)]
pub enum DataKey {
    Admin,
    Config,
    Slashed,
    Validator(Address),
    // enumerable sets: ordered members plus member -> position
    Members(Set),
    MemberIndex(Set, Address),
    // (target, complainer)
    Complaint(Address, Address),
    Complainers(Address),
}

#[contracttype]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Set {
    All,
    Active,
}
