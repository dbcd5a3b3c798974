//! Soroban RPC implementation of [`ChainClient`]
//!
//! Contract reads are simulated `InvokeHostFunction` transactions; nothing is
//! signed or submitted. Events come from `getEvents`, restricted to the
//! factory contract and filtered to watched positions here.

pub mod decode;

use std::collections::BTreeSet;
use std::str::FromStr;

use async_trait::async_trait;
use jsonrpsee::core::client::ClientT;
use jsonrpsee::core::params::ObjectParams;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use stellar_xdr::curr::{
    HostFunction, InvokeContractArgs, InvokeHostFunctionOp, Limits, Memo, MuxedAccount, Operation,
    OperationBody, Preconditions, ReadXdr, ScAddress, ScSymbol, ScVal, SequenceNumber,
    Transaction, TransactionEnvelope, TransactionExt, TransactionV1Envelope, VecM, WriteXdr,
};
use tracing::{debug, warn};

use crate::chain::ChainClient;
use crate::config::IndexerConfig;
use crate::error::{IndexerError, IndexerResult};
use crate::types::{
    ChainEvent, ContractId, EventKind, FeeRate, HistoryEntry, PublicVariables, ResellTerms, Stats,
    Terms,
};

/// Contract error codes the indexer reacts to
const FACTORY_UNKNOWN_CONTRACT: u32 = 4;
const ORACLE_STALE_DATA: u32 = 3;

const ID_PAGE: u64 = 200;
const EVENT_PAGE: usize = 200;
const SIMULATION_FEE: u32 = 100;

fn chain_err(e: impl std::fmt::Display) -> IndexerError {
    IndexerError::Chain(e.to_string())
}

/// Code of a contract error reported in a simulation failure, e.g.
/// `HostError: Error(Contract, #4)`
pub fn contract_error_code(message: &str) -> Option<u32> {
    let (_, rest) = message.split_once("Error(Contract, #")?;
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

#[derive(Debug, Deserialize)]
struct LatestLedger {
    sequence: u32,
}

#[derive(Debug, Deserialize)]
struct SimulationResult {
    xdr: String,
}

#[derive(Debug, Deserialize)]
struct Simulation {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    results: Vec<SimulationResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcEvent {
    ledger: u32,
    id: String,
    topic: Vec<String>,
    value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventPage {
    #[serde(default)]
    events: Vec<RpcEvent>,
    #[serde(default)]
    cursor: Option<String>,
}

/// Why a simulated call failed
enum CallError {
    Contract(u32),
    Rpc(IndexerError),
}

impl From<IndexerError> for CallError {
    fn from(e: IndexerError) -> Self {
        CallError::Rpc(e)
    }
}

impl CallError {
    /// Maps contract codes through `f`; anything unmapped is a chain failure.
    fn into_indexer(self, f: impl FnOnce(u32) -> Option<IndexerError>) -> IndexerError {
        match self {
            CallError::Contract(code) => {
                f(code).unwrap_or_else(|| IndexerError::Chain(format!("contract error #{}", code)))
            }
            CallError::Rpc(e) => e,
        }
    }
}

/// Soroban RPC chain client
pub struct RpcChain {
    client: HttpClient,
    factory_id: String,
    factory: ScAddress,
    oracle: ScAddress,
    source: MuxedAccount,
}

impl RpcChain {
    pub fn new(config: &IndexerConfig) -> IndexerResult<Self> {
        let address = |name: &str, value: &str| {
            ScAddress::from_str(value)
                .map_err(|e| IndexerError::Configuration(format!("{}: {}", name, e)))
        };
        let factory = address("factory_id", &config.factory_id)?;
        let oracle = address("oracle_id", &config.oracle_id)?;
        let source = MuxedAccount::from_str(&config.source_account)
            .map_err(|e| IndexerError::Configuration(format!("source_account: {}", e)))?;

        let client = HttpClientBuilder::default()
            .build(&config.rpc_url)
            .map_err(|e| IndexerError::Configuration(format!("rpc client: {}", e)))?;
        Ok(Self { client, factory_id: config.factory_id.clone(), factory, oracle, source })
    }

    async fn request<R: DeserializeOwned>(
        &self,
        method: &str,
        params: ObjectParams,
    ) -> IndexerResult<R> {
        self.client.request(method, params).await.map_err(chain_err)
    }

    fn envelope(
        &self,
        contract: &ScAddress,
        function: &str,
        args: Vec<ScVal>,
    ) -> IndexerResult<String> {
        let function_name = ScSymbol::try_from(function)
            .map_err(|_| IndexerError::Chain(format!("invalid function name {}", function)))?;
        let invoke = Operation {
            source_account: None,
            body: OperationBody::InvokeHostFunction(InvokeHostFunctionOp {
                host_function: HostFunction::InvokeContract(InvokeContractArgs {
                    contract_address: contract.clone(),
                    function_name,
                    args: args.try_into().map_err(chain_err)?,
                }),
                auth: VecM::default(),
            }),
        };
        let tx = Transaction {
            source_account: self.source.clone(),
            fee: SIMULATION_FEE,
            seq_num: SequenceNumber(0),
            cond: Preconditions::None,
            memo: Memo::None,
            operations: vec![invoke].try_into().map_err(chain_err)?,
            ext: TransactionExt::V0,
        };
        TransactionEnvelope::Tx(TransactionV1Envelope { tx, signatures: VecM::default() })
            .to_xdr_base64(Limits::none())
            .map_err(chain_err)
    }

    /// Return value of a simulated call
    async fn call(
        &self,
        contract: &ScAddress,
        function: &str,
        args: Vec<ScVal>,
    ) -> Result<ScVal, CallError> {
        let mut params = ObjectParams::new();
        params
            .insert("transaction", self.envelope(contract, function, args)?)
            .map_err(chain_err)?;
        let simulation: Simulation = self.request("simulateTransaction", params).await?;

        if let Some(error) = simulation.error {
            debug!(function, error = %error, "simulation failed");
            return Err(match contract_error_code(&error) {
                Some(code) => CallError::Contract(code),
                None => CallError::Rpc(IndexerError::Chain(error)),
            });
        }
        let result = simulation
            .results
            .first()
            .ok_or_else(|| IndexerError::Chain(format!("{} returned no result", function)))?;
        Ok(ScVal::from_xdr_base64(&result.xdr, Limits::none()).map_err(chain_err)?)
    }

    /// Factory read of one position; an unknown id surfaces as `UnknownContract`
    async fn position_call(
        &self,
        id: ContractId,
        function: &str,
        mut args: Vec<ScVal>,
    ) -> IndexerResult<ScVal> {
        args.insert(0, ScVal::U64(id));
        self.call(&self.factory, function, args).await.map_err(|e| {
            e.into_indexer(|code| {
                (code == FACTORY_UNKNOWN_CONTRACT).then_some(IndexerError::UnknownContract(id))
            })
        })
    }

    async fn factory_call(&self, function: &str, args: Vec<ScVal>) -> IndexerResult<ScVal> {
        self.call(&self.factory, function, args).await.map_err(|e| e.into_indexer(|_| None))
    }

    async fn event_page(&self, from_ledger: u32, cursor: Option<&str>) -> IndexerResult<EventPage> {
        let mut params = ObjectParams::new();
        let pagination = match cursor {
            Some(cursor) => json!({ "limit": EVENT_PAGE, "cursor": cursor }),
            None => {
                params.insert("startLedger", from_ledger.max(1)).map_err(chain_err)?;
                json!({ "limit": EVENT_PAGE })
            }
        };
        let filters = json!([{ "type": "contract", "contractIds": [self.factory_id] }]);
        params.insert("filters", filters).map_err(chain_err)?;
        params.insert("pagination", pagination).map_err(chain_err)?;
        self.request("getEvents", params).await
    }
}

/// Decodes a page of raw events. `seq` numbers events within their ledger in
/// log order, counting every factory event, so it is stable across polls that
/// start at a ledger boundary.
fn decode_events(
    raw: &[RpcEvent],
    last: &mut Option<(u32, u32)>,
    watched: &BTreeSet<ContractId>,
) -> IndexerResult<Vec<ChainEvent>> {
    let mut events = Vec::new();
    for event in raw {
        let seq = match *last {
            Some((ledger, seq)) if ledger == event.ledger => seq + 1,
            _ => 0,
        };
        *last = Some((event.ledger, seq));

        let topics = event
            .topic
            .iter()
            .map(|topic| ScVal::from_xdr_base64(topic, Limits::none()).map_err(chain_err))
            .collect::<IndexerResult<Vec<_>>>()?;
        let data = ScVal::from_xdr_base64(&event.value, Limits::none()).map_err(chain_err)?;

        let kind = match decode::event_of(&topics, &data) {
            Ok(Some(kind)) => kind,
            Ok(None) => continue,
            Err(e) => {
                warn!(id = %event.id, error = %e, "skipping undecodable event");
                continue;
            }
        };
        let wanted = match (&kind, kind.contract_id()) {
            (EventKind::ContractCreated { .. }, _) | (_, None) => true,
            (_, Some(id)) => watched.contains(&id),
        };
        if wanted {
            events.push(ChainEvent { ledger: event.ledger, seq, kind });
        }
    }
    Ok(events)
}

#[async_trait]
impl ChainClient for RpcChain {
    async fn latest_ledger(&self) -> IndexerResult<u32> {
        let latest: LatestLedger = self.request("getLatestLedger", ObjectParams::new()).await?;
        Ok(latest.sequence)
    }

    async fn contract_ids(&self) -> IndexerResult<Vec<ContractId>> {
        let mut ids = Vec::new();
        loop {
            let page = self
                .factory_call(
                    "get_contract_list",
                    vec![ScVal::U64(ids.len() as u64), ScVal::U64(ID_PAGE)],
                )
                .await?;
            let page = decode::ids_of(&page)?;
            let done = (page.len() as u64) < ID_PAGE;
            ids.extend(page);
            if done {
                return Ok(ids);
            }
        }
    }

    async fn load_public_variables(&self, id: ContractId) -> IndexerResult<PublicVariables> {
        let value = self.position_call(id, "get_public_variables_v2", vec![]).await?;
        decode::public_variables_of(&value)
    }

    async fn load_history(
        &self,
        id: ContractId,
        offset: u32,
        limit: u32,
    ) -> IndexerResult<Vec<HistoryEntry>> {
        let value = self
            .position_call(id, "get_history", vec![ScVal::U32(offset), ScVal::U32(limit)])
            .await?;
        decode::history_of(&value)
    }

    async fn load_stats(&self, id: ContractId) -> IndexerResult<Stats> {
        decode::stats_of(&self.position_call(id, "get_stats", vec![]).await?)
    }

    async fn load_resell_chain(&self, id: ContractId) -> IndexerResult<Vec<ResellTerms>> {
        let length = self.load_public_variables(id).await?.resell_chain_length;
        let mut chain = Vec::with_capacity(length as usize);
        for index in 0..length {
            let hop = self.position_call(id, "resell_chain", vec![ScVal::U32(index)]).await?;
            chain.push(decode::resell_terms_of(&hop)?);
        }
        Ok(chain)
    }

    async fn load_future_terms(&self, id: ContractId) -> IndexerResult<Option<Terms>> {
        decode::future_terms_of(&self.position_call(id, "future_terms", vec![]).await?)
    }

    async fn hashes_for_token(&self) -> IndexerResult<u128> {
        let value = self
            .call(&self.oracle, "get_hashes_for_token", vec![])
            .await
            .map_err(|e| {
                e.into_indexer(|code| (code == ORACLE_STALE_DATA).then_some(IndexerError::StaleOracle))
            })?;
        decode::u128_of(&value)
    }

    async fn fee_rate(&self) -> IndexerResult<FeeRate> {
        decode::fee_rate_of(&self.factory_call("get_marketplace_config", vec![]).await?)
    }

    async fn get_events(
        &self,
        from_ledger: u32,
        watched: &BTreeSet<ContractId>,
    ) -> IndexerResult<Vec<ChainEvent>> {
        if from_ledger > self.latest_ledger().await? {
            return Ok(Vec::new());
        }

        let mut events = Vec::new();
        let mut last = None;
        let mut cursor: Option<String> = None;
        loop {
            let page = self.event_page(from_ledger, cursor.as_deref()).await?;
            events.extend(decode_events(&page.events, &mut last, watched)?);

            if page.events.len() < EVENT_PAGE {
                return Ok(events);
            }
            cursor = page.cursor.or_else(|| page.events.last().map(|e| e.id.clone()));
        }
    }
}
