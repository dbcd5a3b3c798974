//! Shared handler state

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::cache::Cache;
use crate::loader::ContractsLoader;
use crate::pricing::PriceCalculator;

#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<RwLock<Cache>>,
    pub loader: ContractsLoader,
    pub prices: Arc<PriceCalculator>,
    pub admin_api_key: Arc<str>,
    pub version: String,
}

impl AppState {
    pub fn new(
        cache: Arc<RwLock<Cache>>,
        loader: ContractsLoader,
        prices: Arc<PriceCalculator>,
        admin_api_key: &str,
    ) -> Self {
        Self {
            cache,
            loader,
            prices,
            admin_api_key: Arc::from(admin_api_key),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
