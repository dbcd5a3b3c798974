//! Route handlers. Every payload is wrapped as `{data, blockNumber}`.

use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::error::{ApiError, ApiResult};
use super::state::AppState;
use crate::cache::{Cache, ValidatorHistoryEntry};
use crate::pricing;
use crate::projection::ValidatorAggregate;
use crate::types::{
    ContractId, ContractRecord, ContractState, FeeRate, HistoryEntry, ResellTerms, Stats, Terms,
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub data: T,
    pub block_number: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletQuery {
    pub wallet_addr: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReloadQuery {
    pub api_key: Option<String>,
}

/// A position as served to clients
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractView {
    pub id: ContractId,
    pub state: ContractState,
    pub terms: Terms,
    pub future_terms: Option<Terms>,
    pub start_time: u64,
    pub end_time: u64,
    pub seller: String,
    pub pubkey: String,
    pub is_deleted: bool,
    pub purchases_count: u32,
    pub balance: i128,
    pub fee_balance: i128,
    pub resell_chain: Vec<ResellTerms>,
    pub history: Vec<HistoryEntry>,
    pub stats: Stats,
    /// Live quote; absent while the oracle cannot price
    pub price: Option<i128>,
    pub fee: Option<i128>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatorView {
    pub validator: String,
    pub history: Vec<ValidatorHistoryEntry>,
    pub totals: ValidatorAggregate,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthView {
    pub status: &'static str,
    pub version: String,
    pub contracts: usize,
    pub last_synced_at: u64,
}

#[derive(Debug, Serialize)]
pub struct ReloadView {
    pub reloaded: usize,
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

fn view(
    record: &ContractRecord,
    rate: Option<u128>,
    fee_rate: Option<FeeRate>,
    now: u64,
    wallet: Option<&str>,
) -> ContractView {
    let public = &record.public;
    let price = rate.map(|rate| pricing::quote(record, now, rate));
    let fee = price.zip(fee_rate).map(|(price, fee_rate)| pricing::fee(price, fee_rate));
    let history = record
        .history
        .iter()
        .filter(|entry| wallet.map_or(true, |w| entry.buyer == w))
        .cloned()
        .collect();

    ContractView {
        id: record.id,
        state: pricing::effective_state(record, now),
        terms: pricing::effective_terms(record, now).clone(),
        future_terms: pricing::effective_future_terms(record, now).cloned(),
        start_time: public.start_time,
        end_time: record.end_time(),
        seller: public.seller.clone(),
        pubkey: public.pubkey.clone(),
        is_deleted: public.is_deleted,
        purchases_count: public.purchases_count,
        balance: public.balance,
        fee_balance: public.fee_balance,
        resell_chain: record.resell_chain.clone(),
        history,
        stats: record.stats,
        price,
        fee,
    }
}

async fn current_rate(state: &AppState) -> Option<u128> {
    match state.prices.hashes_for_token().await {
        Ok(rate) => Some(rate),
        Err(e) => {
            warn!(error = %e, "serving contracts without live prices");
            None
        }
    }
}

fn respond<T>(cache: &Cache, data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse { data, block_number: cache.last_synced_ledger() })
}

/// GET /api/contracts?walletAddr=
pub async fn list_contracts(
    State(state): State<AppState>,
    Query(query): Query<WalletQuery>,
) -> ApiResult<Json<ApiResponse<Vec<ContractView>>>> {
    let rate = current_rate(&state).await;
    let now = unix_now();
    let cache = state.cache.read().await;

    let contracts: Vec<ContractView> = cache
        .contracts()
        .map(|record| view(record, rate, cache.fee_rate(), now, query.wallet_addr.as_deref()))
        .collect();
    Ok(respond(&cache, contracts))
}

/// GET /api/contracts/:id?walletAddr=
pub async fn get_contract(
    State(state): State<AppState>,
    Path(id): Path<ContractId>,
    Query(query): Query<WalletQuery>,
) -> ApiResult<Json<ApiResponse<ContractView>>> {
    let rate = current_rate(&state).await;
    let cache = state.cache.read().await;

    let record = cache
        .get(id)
        .ok_or_else(|| ApiError::NotFound(format!("Contract {} not found", id)))?;
    let contract = view(record, rate, cache.fee_rate(), unix_now(), query.wallet_addr.as_deref());
    Ok(respond(&cache, contract))
}

/// GET /api/validator/:validatorAddr
pub async fn get_validator(
    State(state): State<AppState>,
    Path(validator): Path<String>,
) -> ApiResult<Json<ApiResponse<ValidatorView>>> {
    let cache = state.cache.read().await;
    let totals = cache
        .aggregates()
        .validators
        .get(&validator)
        .cloned()
        .unwrap_or_default();
    let history = cache.validator_history(&validator);

    Ok(respond(&cache, ValidatorView { validator, history, totals }))
}

/// GET /api/admin/reloadContracts?apiKey=
pub async fn reload_contracts(
    State(state): State<AppState>,
    Query(query): Query<ReloadQuery>,
) -> ApiResult<Json<ApiResponse<ReloadView>>> {
    let authorized = !state.admin_api_key.is_empty()
        && query.api_key.as_deref() == Some(&*state.admin_api_key);
    if !authorized {
        return Err(ApiError::Unauthorized("invalid api key".to_string()));
    }

    let snapshot = state.loader.load_snapshot().await?;
    let mut cache = state.cache.write().await;
    cache.restore(snapshot);
    info!(contracts = cache.len(), ledger = cache.last_synced_ledger(), "contracts reloaded");

    let reloaded = cache.len();
    Ok(respond(&cache, ReloadView { reloaded }))
}

/// GET /api/healthcheck
pub async fn healthcheck(State(state): State<AppState>) -> ApiResult<Json<ApiResponse<HealthView>>> {
    let cache = state.cache.read().await;
    let health = HealthView {
        status: "healthy",
        version: state.version.clone(),
        contracts: cache.len(),
        last_synced_at: cache.last_synced_at(),
    };
    Ok(respond(&cache, health))
}
