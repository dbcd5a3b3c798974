//! Indexer entry point. Configuration comes from `INDEXER_*` variables.

use std::process::ExitCode;
use std::sync::Arc;

use hashrate_indexer::{init_tracing, serve, IndexerConfig, RpcChain};
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    let config = IndexerConfig::from_env();
    init_tracing(&config.log_level);

    let chain = match RpcChain::new(&config) {
        Ok(chain) => Arc::new(chain),
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    match serve(config, chain).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "indexer stopped");
            ExitCode::FAILURE
        }
    }
}
