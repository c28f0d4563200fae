//! JSON-RPC facade over a [`Wallet`].

pub mod dto;
pub mod error;

use std::collections::BTreeMap;
use std::sync::Arc;

use dto::{
    AddAddressParams, AddToLimboResponse, AddressInfoDto, AddressParams, AddressResponse,
    AddressesResponse, BalanceResponse, BatchAddressesParams, BatchAddressesResponse,
    BatchTransactionsParams, BatchTransactionsResponse, BlockRewardDto, BlockRewardsResponse,
    BroadcastParams, BroadcastResponse, ConsensusResponse, DtoError, EmptyParams, FeeResponse,
    FileContractEntryDto, FileContractsResponse, IdParams, JsonRpcError, JsonRpcRequest,
    JsonRpcResponse, LimboEntryDto, LimboParams, LimboResponse, MaxParams, MemoResponse,
    RemovedResponse, SeedIndexResponse, SetMemoParams, SignParams, SignResponse,
    TransactionDto, TransactionEntryDto, TransactionParams, TransactionsParams,
    TransactionsResponse, TxidParams, UnconfirmedParentsResponse, UtxoDto, UtxosResponse,
    JSONRPC_VERSION,
};
use error::WalletRpcErrorCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::chain::{Address, ContractId, OutputId, Transaction, TransactionId};
use crate::db::AddressRecord;
use crate::engine::{EngineError, FundingError, IntegrityError, LimboInsert, Limit, SigningError};
use crate::pool::PoolError;
use crate::wallet::{BroadcastOutcome, Wallet, WalletError};

pub struct WalletRpcRouter {
    wallet: Arc<Wallet>,
}

impl WalletRpcRouter {
    pub fn new(wallet: Arc<Wallet>) -> Self {
        Self { wallet }
    }

    pub fn handle(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let JsonRpcRequest {
            jsonrpc,
            id,
            method,
            params,
        } = request;

        if jsonrpc
            .as_deref()
            .map_or(true, |value| value != JSONRPC_VERSION)
        {
            return JsonRpcResponse::error(
                id,
                RouterError::InvalidRequest("unsupported JSON-RPC version").into_json_error(),
            );
        }

        match self.dispatch(&method, params) {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => JsonRpcResponse::error(id, error.into_json_error()),
        }
    }

    fn dispatch(&self, method: &str, params: Option<Value>) -> Result<Value, RouterError> {
        let engine = self.wallet.engine();
        match method {
            "addresses" => {
                parse_params::<EmptyParams>(params)?;
                let addresses = engine.addresses()?;
                to_value(AddressesResponse {
                    addresses: addresses.iter().map(Address::to_string).collect(),
                })
            }
            "address_info" => {
                let params: AddressParams = parse_params(params)?;
                let address: Address = dto::parse_id("address", &params.address)?;
                let policy = engine
                    .lookup_address(&address)?
                    .ok_or_else(|| EngineError::NotFound(format!("address {address}")))?;
                to_value(AddressInfoDto::from(&AddressRecord { address, policy }))
            }
            "add_address" => {
                let params: AddAddressParams = parse_params(params)?;
                let address: Address = dto::parse_id("address", &params.address)?;
                let metadata = hex::decode(&params.metadata)
                    .map_err(|err| RouterError::InvalidParams(format!("invalid metadata: {err}")))?;
                self.wallet.handle().add_address(address, metadata)?;
                to_value(AddressResponse {
                    address: address.to_string(),
                })
            }
            "remove_address" => {
                let params: AddressParams = parse_params(params)?;
                let address: Address = dto::parse_id("address", &params.address)?;
                let removed = self.wallet.handle().remove_address(&address)?;
                to_value(RemovedResponse { removed })
            }
            "next_address" => {
                parse_params::<EmptyParams>(params)?;
                let address = self.wallet.next_address()?;
                to_value(AddressResponse {
                    address: address.to_string(),
                })
            }
            "seed_index" => {
                parse_params::<EmptyParams>(params)?;
                let seed_index = self.wallet.seed_index()?;
                to_value(SeedIndexResponse { seed_index })
            }
            "balance" => {
                let params: LimboParams = parse_params(params)?;
                let balance = engine.balance(params.limbo)?;
                to_value(BalanceResponse {
                    balance: balance.to_string(),
                    limbo: params.limbo,
                })
            }
            "utxos" => {
                let params: LimboParams = parse_params(params)?;
                self.respond_utxos(params.limbo)
            }
            "block_rewards" => {
                let params: MaxParams = parse_params(params)?;
                let rewards = engine.block_rewards(Limit::from_max(params.max))?;
                to_value(BlockRewardsResponse {
                    rewards: rewards.iter().map(BlockRewardDto::from).collect(),
                })
            }
            "broadcast" => {
                let params: BroadcastParams = parse_params(params)?;
                let transactions = params
                    .transactions
                    .into_iter()
                    .map(Transaction::try_from)
                    .collect::<Result<Vec<_>, _>>()?;
                self.respond_broadcast(self.wallet.broadcast(transactions)?)
            }
            "consensus" => {
                parse_params::<EmptyParams>(params)?;
                let info = engine.consensus_info()?;
                to_value(ConsensusResponse {
                    cursor: info.cursor.to_string(),
                    height: info.height,
                })
            }
            "fee" => {
                parse_params::<EmptyParams>(params)?;
                let estimate = self.wallet.fee_estimate()?;
                to_value(FeeResponse {
                    minimum: estimate.minimum.to_string(),
                    maximum: estimate.maximum.to_string(),
                })
            }
            "file_contracts" => {
                let params: MaxParams = parse_params(params)?;
                let contracts = engine.file_contracts(Limit::from_max(params.max))?;
                to_value(FileContractsResponse {
                    contracts: contracts.iter().map(FileContractEntryDto::from).collect(),
                })
            }
            "file_contract_history" => {
                let params: IdParams = parse_params(params)?;
                let id: ContractId = dto::parse_id("id", &params.id)?;
                let revisions = engine.file_contract_history(&id)?;
                to_value(FileContractsResponse {
                    contracts: revisions.iter().map(FileContractEntryDto::from).collect(),
                })
            }
            "limbo" => {
                parse_params::<EmptyParams>(params)?;
                let entries = engine.limbo()?;
                to_value(LimboResponse {
                    transactions: entries.iter().map(LimboEntryDto::from).collect(),
                })
            }
            "add_to_limbo" => {
                let params: TransactionParams = parse_params(params)?;
                let txn = Transaction::try_from(params.transaction)?;
                let id = txn.id();
                let outcome = engine.add_to_limbo(txn)?;
                to_value(AddToLimboResponse {
                    id: id.to_string(),
                    inserted: outcome == LimboInsert::Inserted,
                })
            }
            "remove_from_limbo" => {
                let params: IdParams = parse_params(params)?;
                let txid: TransactionId = dto::parse_id("id", &params.id)?;
                let removed = engine.remove_from_limbo(&txid)?.is_some();
                to_value(RemovedResponse { removed })
            }
            "get_memo" => {
                let params: TxidParams = parse_params(params)?;
                let txid: TransactionId = dto::parse_id("txid", &params.txid)?;
                let memo = engine.memo(&txid)?;
                to_value(MemoResponse {
                    txid: txid.to_string(),
                    memo: memo.map(|bytes| String::from_utf8_lossy(&bytes).into_owned()),
                })
            }
            "set_memo" => {
                let params: SetMemoParams = parse_params(params)?;
                let txid: TransactionId = dto::parse_id("txid", &params.txid)?;
                engine.set_memo(&txid, params.memo.as_bytes())?;
                to_value(MemoResponse {
                    txid: txid.to_string(),
                    memo: Some(params.memo),
                })
            }
            "delete_memo" => {
                let params: TxidParams = parse_params(params)?;
                let txid: TransactionId = dto::parse_id("txid", &params.txid)?;
                let removed = engine.delete_memo(&txid)?;
                to_value(RemovedResponse { removed })
            }
            "transactions" => {
                let params: TransactionsParams = parse_params(params)?;
                let limit = Limit::from_max(params.max);
                let entries = match params.address {
                    Some(address) => {
                        let address: Address = dto::parse_id("address", &address)?;
                        engine.transactions_by_address(&address, limit)?
                    }
                    None => engine.transactions(limit)?,
                };
                to_value(TransactionsResponse {
                    transactions: entries.iter().map(|entry| entry.txid.to_string()).collect(),
                })
            }
            "transaction" => {
                let params: TxidParams = parse_params(params)?;
                let txid: TransactionId = dto::parse_id("txid", &params.txid)?;
                let (entry, flow) = engine
                    .transaction_with_flow(&txid)?
                    .ok_or_else(|| EngineError::NotFound(format!("transaction {txid}")))?;
                to_value(TransactionEntryDto::new(&entry, flow))
            }
            "unconfirmed_parents" => {
                let params: TransactionParams = parse_params(params)?;
                let txn = Transaction::try_from(params.transaction)?;
                let parents = engine.unconfirmed_parents(&txn)?;
                to_value(UnconfirmedParentsResponse {
                    parents: parents.iter().map(LimboEntryDto::from).collect(),
                })
            }
            "batch_addresses" => {
                let params: BatchAddressesParams = parse_params(params)?;
                let addresses = params
                    .addresses
                    .iter()
                    .map(|address| dto::parse_id("address", address))
                    .collect::<Result<Vec<Address>, _>>()?;
                let records = engine.batch_addresses(&addresses)?;
                to_value(BatchAddressesResponse {
                    addresses: records
                        .iter()
                        .map(|record| (record.address.to_string(), AddressInfoDto::from(record)))
                        .collect(),
                })
            }
            "batch_transactions" => {
                let params: BatchTransactionsParams = parse_params(params)?;
                let ids = params
                    .ids
                    .iter()
                    .map(|id| dto::parse_id("id", id))
                    .collect::<Result<Vec<TransactionId>, _>>()?;
                let transactions: BTreeMap<_, _> = engine
                    .batch_transactions_with_flow(&ids)?
                    .iter()
                    .map(|(entry, flow)| {
                        (entry.txid.to_string(), TransactionEntryDto::new(entry, *flow))
                    })
                    .collect();
                to_value(BatchTransactionsResponse { transactions })
            }
            "sign" => {
                let params: SignParams = parse_params(params)?;
                let mut txn = Transaction::try_from(params.transaction)?;
                let to_sign = params
                    .to_sign
                    .iter()
                    .map(|id| dto::parse_id("to_sign", id))
                    .collect::<Result<Vec<OutputId>, _>>()?;
                self.wallet.sign(&mut txn, &to_sign)?;
                to_value(SignResponse {
                    transaction: TransactionDto::from(&txn),
                })
            }
            _ => Err(RouterError::MethodNotFound(method.to_string())),
        }
    }

    fn respond_utxos(&self, include_limbo: bool) -> Result<Value, RouterError> {
        let utxos = self
            .wallet
            .engine()
            .unspent_outputs_with_conditions(include_limbo)?
            .iter()
            .map(|(utxo, conditions)| UtxoDto::new(utxo, conditions.as_ref()))
            .collect();
        to_value(UtxosResponse { utxos })
    }

    fn respond_broadcast(&self, outcome: BroadcastOutcome) -> Result<Value, RouterError> {
        let response = match outcome {
            BroadcastOutcome::AlreadyConfirmed => BroadcastResponse {
                status: "already_confirmed".into(),
                transactions: Vec::new(),
                inserted: 0,
            },
            BroadcastOutcome::Submitted {
                transactions,
                limbo,
            } => BroadcastResponse {
                status: "submitted".into(),
                transactions: transactions.iter().map(TransactionId::to_string).collect(),
                inserted: limbo
                    .iter()
                    .filter(|outcome| **outcome == LimboInsert::Inserted)
                    .count(),
            },
        };
        to_value(response)
    }
}

#[derive(Debug)]
enum RouterError {
    InvalidRequest(&'static str),
    MethodNotFound(String),
    InvalidParams(String),
    Wallet(WalletError),
    Serialization(String),
}

impl RouterError {
    fn into_json_error(self) -> JsonRpcError {
        match self {
            RouterError::InvalidRequest(message) => {
                json_error(WalletRpcErrorCode::InvalidRequest, message, None)
            }
            RouterError::MethodNotFound(method) => json_error(
                WalletRpcErrorCode::MethodNotFound,
                format!("method `{method}` not found"),
                Some(json!({ "method": method })),
            ),
            RouterError::InvalidParams(message) => {
                json_error(WalletRpcErrorCode::InvalidParams, message, None)
            }
            RouterError::Wallet(error) => wallet_error_to_json(&error),
            RouterError::Serialization(_) => json_error(
                WalletRpcErrorCode::InternalError,
                "wallet router internal error",
                None,
            ),
        }
    }
}

fn json_error(
    code: WalletRpcErrorCode,
    message: impl Into<String>,
    details: Option<Value>,
) -> JsonRpcError {
    let payload = code.data_payload(details);
    JsonRpcError::new(code.as_i32(), message.into(), Some(payload))
}

fn wallet_error_to_json(error: &WalletError) -> JsonRpcError {
    match error {
        WalletError::Engine(engine) => engine_error_to_json(engine),
        WalletError::Pool(pool) => pool_error_to_json(pool),
        WalletError::Funding(FundingError::InsufficientFunds {
            required,
            available,
        }) => json_error(
            WalletRpcErrorCode::InsufficientFunds,
            error.to_string(),
            Some(json!({
                "required": required.to_string(),
                "available": available.to_string(),
            })),
        ),
        WalletError::Funding(FundingError::Engine(engine)) => engine_error_to_json(engine),
        WalletError::Signing(SigningError::Engine(engine)) => engine_error_to_json(engine),
        WalletError::Signing(signing) => json_error(
            WalletRpcErrorCode::SigningFailed,
            signing.to_string(),
            None,
        ),
        WalletError::Unsupported { operation, kind } => json_error(
            WalletRpcErrorCode::Unsupported,
            error.to_string(),
            Some(json!({ "operation": operation, "kind": kind.as_str() })),
        ),
    }
}

fn engine_error_to_json(error: &EngineError) -> JsonRpcError {
    match error {
        EngineError::Validation(message) => json_error(
            WalletRpcErrorCode::ValidationFailed,
            message.clone(),
            None,
        ),
        EngineError::NotFound(what) => json_error(
            WalletRpcErrorCode::NotFound,
            error.to_string(),
            Some(json!({ "what": what })),
        ),
        EngineError::Integrity(integrity) => {
            let kind = match integrity {
                IntegrityError::CursorMismatch { .. } => "cursor_mismatch",
                IntegrityError::MissingOwner { .. } => "missing_owner",
                IntegrityError::HeightUnderflow { .. } => "height_underflow",
            };
            json_error(
                WalletRpcErrorCode::IntegrityViolation,
                error.to_string(),
                Some(json!({ "kind": kind })),
            )
        }
        EngineError::Store(store) => json_error(
            WalletRpcErrorCode::InternalError,
            error.to_string(),
            Some(json!({ "kind": "store", "message": store.to_string() })),
        ),
        EngineError::Poisoned => json_error(
            WalletRpcErrorCode::StatePoisoned,
            error.to_string(),
            None,
        ),
    }
}

fn pool_error_to_json(error: &PoolError) -> JsonRpcError {
    match error {
        PoolError::Duplicate | PoolError::Rejected(_) => json_error(
            WalletRpcErrorCode::PoolRejected,
            error.to_string(),
            None,
        ),
        PoolError::Transport(_) => json_error(
            WalletRpcErrorCode::PoolUnavailable,
            error.to_string(),
            None,
        ),
    }
}

impl From<WalletError> for RouterError {
    fn from(error: WalletError) -> Self {
        RouterError::Wallet(error)
    }
}

impl From<EngineError> for RouterError {
    fn from(error: EngineError) -> Self {
        RouterError::Wallet(WalletError::Engine(error))
    }
}

impl From<DtoError> for RouterError {
    fn from(error: DtoError) -> Self {
        RouterError::InvalidParams(error.to_string())
    }
}

fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> Result<T, RouterError> {
    let value = match params {
        None | Some(Value::Null) => Value::Object(Map::new()),
        Some(value) => value,
    };
    serde_json::from_value(value).map_err(|error| RouterError::InvalidParams(error.to_string()))
}

fn to_value<T: Serialize>(value: T) -> Result<Value, RouterError> {
    serde_json::to_value(value).map_err(|error| RouterError::Serialization(error.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::SiacoinOutput;
    use crate::engine::{SeedKeys, WalletEngine};
    use crate::modes::{SeedWallet, WalletKind, WatchOnlyWallet};
    use crate::pool::FeeEstimate;
    use crate::testing::{MockChain, RecordingPool};
    use tempfile::{tempdir, TempDir};

    fn watch_router() -> (WalletRpcRouter, TempDir) {
        let dir = tempdir().expect("tempdir");
        let engine = Arc::new(
            WalletEngine::open(dir.path(), WalletKind::WatchOnly, 144).expect("engine"),
        );
        let handle = WatchOnlyWallet::new(engine).expect("watch wallet");
        let pool = RecordingPool::new().with_fee_estimate(FeeEstimate::new(10, 40));
        let wallet = Wallet::new(Arc::new(handle), Arc::new(pool));
        (WalletRpcRouter::new(Arc::new(wallet)), dir)
    }

    fn call(router: &WalletRpcRouter, method: &str, params: Value) -> JsonRpcResponse {
        router.handle(JsonRpcRequest {
            jsonrpc: Some(JSONRPC_VERSION.to_string()),
            id: Some(json!(1)),
            method: method.to_string(),
            params: Some(params),
        })
    }

    fn result(response: JsonRpcResponse) -> Value {
        assert!(response.error.is_none(), "unexpected error: {:?}", response.error);
        response.result.expect("result")
    }

    fn error_code(response: JsonRpcResponse) -> i32 {
        response.error.expect("error").code
    }

    #[test]
    fn rejects_unknown_methods_and_versions() {
        let (router, _dir) = watch_router();
        assert_eq!(
            error_code(call(&router, "frobnicate", Value::Null)),
            WalletRpcErrorCode::MethodNotFound.as_i32()
        );
        let response = router.handle(JsonRpcRequest {
            jsonrpc: Some("1.0".into()),
            id: None,
            method: "addresses".into(),
            params: None,
        });
        assert_eq!(error_code(response), WalletRpcErrorCode::InvalidRequest.as_i32());
    }

    #[test]
    fn malformed_ids_are_invalid_params() {
        let (router, _dir) = watch_router();
        let response = call(&router, "address_info", json!({ "address": "zz" }));
        assert_eq!(error_code(response), WalletRpcErrorCode::InvalidParams.as_i32());
        let response = call(&router, "transaction", json!({ "txid": "abcd" }));
        assert_eq!(error_code(response), WalletRpcErrorCode::InvalidParams.as_i32());
    }

    #[test]
    fn watch_only_address_book_round_trip() {
        let (router, _dir) = watch_router();
        let address = Address::new([5u8; 32]).to_string();
        result(call(
            &router,
            "add_address",
            json!({ "address": address, "metadata": "cafe" }),
        ));
        let listed = result(call(&router, "addresses", Value::Null));
        assert_eq!(listed["addresses"], json!([address]));
        let info = result(call(&router, "address_info", json!({ "address": address })));
        assert_eq!(info["kind"], "watched");
        assert_eq!(info["metadata"], "cafe");

        let batch = result(call(
            &router,
            "batch_addresses",
            json!({ "addresses": [address, Address::new([6u8; 32]).to_string()] }),
        ));
        assert_eq!(batch["addresses"].as_object().expect("map").len(), 1);

        let removed = result(call(&router, "remove_address", json!({ "address": address })));
        assert_eq!(removed["removed"], true);
        let missing = call(&router, "address_info", json!({ "address": address }));
        assert_eq!(error_code(missing), WalletRpcErrorCode::NotFound.as_i32());
    }

    #[test]
    fn capability_errors_use_their_own_code() {
        let (router, _dir) = watch_router();
        assert_eq!(
            error_code(call(&router, "next_address", Value::Null)),
            WalletRpcErrorCode::Unsupported.as_i32()
        );
        let response = call(&router, "broadcast", json!({ "transactions": [] }));
        assert_eq!(error_code(response), WalletRpcErrorCode::ValidationFailed.as_i32());
    }

    #[test]
    fn queries_report_chain_and_limbo_state() {
        let (router, _dir) = watch_router();
        let address = Address::new([8u8; 32]);
        result(call(
            &router,
            "add_address",
            json!({ "address": address.to_string() }),
        ));
        let consensus = result(call(&router, "consensus", Value::Null));
        assert!(consensus.get("height").is_none());

        let txn = Transaction {
            siacoin_outputs: vec![SiacoinOutput {
                value: 1_000,
                address,
            }],
            ..Transaction::default()
        };
        let added = result(call(
            &router,
            "add_to_limbo",
            json!({ "transaction": TransactionDto::from(&txn) }),
        ));
        assert_eq!(added["inserted"], true);
        assert_eq!(
            result(call(&router, "balance", json!({ "limbo": true })))["balance"],
            "1000"
        );
        assert_eq!(result(call(&router, "balance", Value::Null))["balance"], "0");
        let limbo = result(call(&router, "limbo", Value::Null));
        assert_eq!(limbo["transactions"][0]["id"], txn.id().to_string());

        let fee = result(call(&router, "fee", Value::Null));
        assert_eq!(fee, json!({ "minimum": "10", "maximum": "40" }));

        let mut chain = MockChain::new();
        let engine = router.wallet.engine();
        engine.apply_change(&chain.genesis()).expect("genesis");
        engine.apply_change(&chain.confirm(vec![txn.clone()])).expect("confirm");
        let entry = result(call(
            &router,
            "transaction",
            json!({ "txid": txn.id().to_string() }),
        ));
        assert_eq!(entry["credit"], "1000");
        assert_eq!(entry["debit"], "0");
        assert_eq!(entry["block_height"], 1);
        let listed = result(call(&router, "transactions", json!({ "max": 5 })));
        assert_eq!(listed["transactions"], json!([txn.id().to_string()]));
        let unknown = TransactionId::new([3u8; 32]).to_string();
        let batch = result(call(
            &router,
            "batch_transactions",
            json!({ "ids": [txn.id().to_string(), unknown] }),
        ));
        let batched = batch["transactions"].as_object().expect("map");
        assert_eq!(batched.len(), 1);
        assert_eq!(batched[&txn.id().to_string()]["credit"], "1000");
        let utxos = result(call(&router, "utxos", Value::Null));
        assert_eq!(utxos["utxos"][0]["value"], "1000");
        assert!(utxos["utxos"][0].get("unlock_conditions").is_none());
        assert_eq!(result(call(&router, "limbo", Value::Null))["transactions"], json!([]));
    }

    #[test]
    fn seed_wallet_derives_and_signs() {
        let dir = tempdir().expect("tempdir");
        let engine =
            Arc::new(WalletEngine::open(dir.path(), WalletKind::Seed, 144).expect("engine"));
        let handle = SeedWallet::new(engine, SeedKeys::new([4u8; 32])).expect("seed wallet");
        let wallet = Wallet::new(Arc::new(handle), Arc::new(RecordingPool::new()));
        let router = WalletRpcRouter::new(Arc::new(wallet));

        let next = result(call(&router, "next_address", Value::Null));
        let address = next["address"].as_str().expect("address").to_string();
        assert_eq!(result(call(&router, "seed_index", Value::Null))["seed_index"], 1);
        let info = result(call(&router, "address_info", json!({ "address": address })));
        assert_eq!(info["kind"], "derived");
        assert_eq!(info["seed_index"], 0);

        let response = call(
            &router,
            "add_address",
            json!({ "address": Address::new([1u8; 32]).to_string() }),
        );
        assert_eq!(error_code(response), WalletRpcErrorCode::ValidationFailed.as_i32());

        let unlock_conditions = info["unlock_conditions"].clone();
        let unsigned = json!({
            "siacoin_inputs": [{
                "parent_id": OutputId::new([2u8; 32]).to_string(),
                "unlock_conditions": unlock_conditions,
            }],
            "siacoin_outputs": [{ "value": "10", "address": address }],
        });
        let signed = result(call(&router, "sign", json!({ "transaction": unsigned })));
        let signatures = signed["transaction"]["signatures"].as_array().expect("signatures");
        assert_eq!(signatures.len(), 1);
        assert_eq!(signatures[0]["signature"].as_str().expect("hex").len(), 128);
    }
}
