//! Indexer error types

use thiserror::Error;

use crate::types::ContractId;

/// Errors raised while loading, projecting or serving chain state
#[derive(Error, Debug)]
pub enum IndexerError {
    /// RPC transport or decoding failure
    #[error("Chain RPC failed: {0}")]
    Chain(String),

    /// The oracle refused to quote because a feed is older than its TTL
    #[error("Oracle data is stale")]
    StaleOracle,

    /// Position id unknown to the factory
    #[error("Unknown contract: {0}")]
    UnknownContract(ContractId),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Background task failed or was cancelled
    #[error("Task failed: {0}")]
    Task(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Indexer result type
pub type IndexerResult<T> = Result<T, IndexerError>;
