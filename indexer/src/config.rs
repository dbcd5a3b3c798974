//! Indexer configuration

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{IndexerError, IndexerResult};

/// Process-wide settings, loaded once at start
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// Soroban RPC endpoint
    pub rpc_url: String,
    /// Clone factory contract id
    pub factory_id: String,
    /// Hashrate oracle contract id
    pub oracle_id: String,
    /// Validator fee token contract id
    pub fee_token_id: String,
    /// Account that read-only calls are simulated from
    pub source_account: String,
    /// Factory deployment ledger; the event log is replayed from here
    pub start_ledger: u32,
    /// Key required by the admin reload endpoint
    pub admin_api_key: String,
    /// Default tracing filter when RUST_LOG is unset
    pub log_level: String,
    pub host: String,
    pub port: u16,
    /// Event poll interval in seconds
    pub poll_interval_secs: u64,
    /// How long a fetched oracle rate is reused, in seconds
    pub price_ttl_secs: u64,
    /// Positions loaded concurrently per batch
    pub load_batch_size: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://localhost:8000/soroban/rpc".to_string(),
            factory_id: String::new(),
            oracle_id: String::new(),
            fee_token_id: String::new(),
            source_account: String::new(),
            start_ledger: 0,
            admin_api_key: String::new(),
            log_level: "info".to_string(),
            host: "0.0.0.0".to_string(),
            port: 3000,
            poll_interval_secs: 5,
            price_ttl_secs: 10,
            load_batch_size: 20,
        }
    }
}

fn parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

impl IndexerConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - INDEXER_RPC_URL: Soroban RPC endpoint
    /// - INDEXER_FACTORY_ID / INDEXER_ORACLE_ID / INDEXER_FEE_TOKEN_ID: contract ids
    /// - INDEXER_SOURCE_ACCOUNT: G... account used to simulate reads
    /// - INDEXER_START_LEDGER: first ledger of the factory's event log
    /// - INDEXER_ADMIN_API_KEY: key for `/api/admin/reloadContracts`
    /// - INDEXER_LOG_LEVEL: default log filter
    /// - INDEXER_HOST / INDEXER_PORT: HTTP bind address
    /// - INDEXER_POLL_INTERVAL: event poll interval in seconds
    /// - INDEXER_PRICE_TTL: oracle rate cache TTL in seconds
    /// - INDEXER_LOAD_BATCH_SIZE: positions loaded concurrently
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            rpc_url: env::var("INDEXER_RPC_URL").unwrap_or(defaults.rpc_url),
            factory_id: env::var("INDEXER_FACTORY_ID").unwrap_or_default(),
            oracle_id: env::var("INDEXER_ORACLE_ID").unwrap_or_default(),
            fee_token_id: env::var("INDEXER_FEE_TOKEN_ID").unwrap_or_default(),
            source_account: env::var("INDEXER_SOURCE_ACCOUNT").unwrap_or_default(),
            start_ledger: parsed("INDEXER_START_LEDGER", defaults.start_ledger),
            admin_api_key: env::var("INDEXER_ADMIN_API_KEY").unwrap_or_default(),
            log_level: env::var("INDEXER_LOG_LEVEL").unwrap_or(defaults.log_level),
            host: env::var("INDEXER_HOST").unwrap_or(defaults.host),
            port: parsed("INDEXER_PORT", defaults.port),
            poll_interval_secs: parsed("INDEXER_POLL_INTERVAL", defaults.poll_interval_secs),
            price_ttl_secs: parsed("INDEXER_PRICE_TTL", defaults.price_ttl_secs),
            load_batch_size: parsed("INDEXER_LOAD_BATCH_SIZE", defaults.load_batch_size),
        }
    }

    pub fn validate(&self) -> IndexerResult<()> {
        let required = [
            ("rpc_url", &self.rpc_url),
            ("factory_id", &self.factory_id),
            ("oracle_id", &self.oracle_id),
            ("fee_token_id", &self.fee_token_id),
            ("source_account", &self.source_account),
            ("admin_api_key", &self.admin_api_key),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(IndexerError::Configuration(format!("{} must be set", name)));
            }
        }
        if self.poll_interval_secs == 0 {
            return Err(IndexerError::Configuration(
                "poll_interval_secs must be positive".to_string(),
            ));
        }
        if self.load_batch_size == 0 {
            return Err(IndexerError::Configuration(
                "load_batch_size must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn price_ttl(&self) -> Duration {
        Duration::from_secs(self.price_ttl_secs)
    }

    pub fn socket_addr(&self) -> IndexerResult<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| IndexerError::Configuration(format!("invalid bind address: {}", e)))
    }
}
