//! HTTP surface over the cache

pub mod error;
pub mod routes;
pub mod state;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/healthcheck", get(routes::healthcheck))
        .route("/api/contracts", get(routes::list_contracts))
        .route("/api/contracts/:id", get(routes::get_contract))
        .route("/api/validator/:validator_addr", get(routes::get_validator))
        .route("/api/admin/reloadContracts", get(routes::reload_contracts))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
