//! Hashrate marketplace indexer
//!
//! Mirrors clone factory positions into an in-memory cache, keeps it current
//! from the factory's event log and serves it over HTTP.
//!
//! # Components
//!
//! - [`chain::ChainClient`]: read seam to the network
//! - [`rpc::RpcChain`]: Soroban RPC client behind that seam
//! - [`loader::ContractsLoader`]: full and per-position loads
//! - [`cache::Cache`]: upsert-only projection with a validator history index
//! - [`projection::reduce`]: event-sourced participant counters
//! - [`pricing::PriceCalculator`]: TTL-cached oracle rate and quote mirror
//! - [`listener::Listener`]: event watch loop
//! - [`api`]: axum routes

pub mod api;
pub mod cache;
pub mod chain;
pub mod config;
pub mod error;
pub mod listener;
pub mod loader;
pub mod pricing;
pub mod projection;
pub mod rpc;
pub mod types;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::{mpsc, RwLock};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use api::{create_router, AppState};
pub use cache::Cache;
pub use chain::{ChainClient, MemoryChain};
pub use config::IndexerConfig;
pub use error::{IndexerError, IndexerResult};
pub use listener::Listener;
pub use loader::ContractsLoader;
pub use pricing::PriceCalculator;
pub use rpc::RpcChain;

/// Installs the global subscriber. `RUST_LOG` wins over `default_level`.
pub fn init_tracing(default_level: &str) {
    let installed = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("hashrate_indexer={},tower_http=info", default_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
    if installed.is_err() {
        warn!("tracing subscriber already installed");
    }
}

/// Loads every position and replays the event log into the counters, then
/// serves HTTP while the listener keeps the cache current. Returns when either
/// side fails; a watch failure is fatal.
pub async fn serve(config: IndexerConfig, chain: Arc<dyn ChainClient>) -> IndexerResult<()> {
    config.validate()?;
    let addr = config.socket_addr()?;

    let loader = ContractsLoader::new(chain.clone(), config.load_batch_size)
        .with_start_ledger(config.start_ledger);
    let cache = Arc::new(RwLock::new(Cache::new()));
    cache.write().await.restore(loader.load_snapshot().await?);

    let prices = Arc::new(PriceCalculator::new(chain.clone(), config.price_ttl()));
    let state = AppState::new(cache.clone(), loader.clone(), prices, &config.admin_api_key);
    let router = create_router(state);

    let (_shutdown_tx, shutdown_rx) = mpsc::channel(1);
    let listener = Listener::new(chain, loader, cache, config.poll_interval());
    let watch = tokio::spawn(listener.start_watch(shutdown_rx));

    let socket = TcpListener::bind(addr).await?;
    info!("indexer listening on {}", addr);

    tokio::select! {
        served = async { axum::serve(socket, router).await } => served.map_err(IndexerError::Io),
        watched = watch => match watched {
            Ok(result) => result,
            Err(e) => Err(IndexerError::Task(e.to_string())),
        },
    }
}
