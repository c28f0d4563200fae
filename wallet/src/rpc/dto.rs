use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chain::{
    CoveredFields, Currency, FileContract, FileContractRevision, ParseIdError, SiacoinInput,
    SiacoinOutput, Transaction, TransactionSignature, UnlockConditions,
};
use crate::db::{AddressPolicy, AddressRecord, BlockReward, ContractRecord, HistoryEntry, LimboEntry, UtxoRecord};
use crate::engine::TransactionFlow;

pub const JSONRPC_VERSION: &str = "2.0";
const PUBLIC_KEY_PREFIX: &str = "ed25519:";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<Value>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn new(code: i32, message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            code,
            message: message.into(),
            data,
        }
    }
}

/// A DTO field that does not describe a valid chain value.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DtoError {
    #[error("invalid {field}: {source}")]
    Id {
        field: &'static str,
        #[source]
        source: ParseIdError,
    },
    #[error("invalid {field}: {value:?} is not a decimal amount")]
    Amount { field: &'static str, value: String },
    #[error("invalid public key {0:?}")]
    PublicKey(String),
    #[error("invalid {field}: {message}")]
    Bytes { field: &'static str, message: String },
}

pub(crate) fn parse_id<T: FromStr<Err = ParseIdError>>(
    field: &'static str,
    value: &str,
) -> Result<T, DtoError> {
    value
        .parse()
        .map_err(|source| DtoError::Id { field, source })
}

fn parse_amount(field: &'static str, value: &str) -> Result<Currency, DtoError> {
    value.parse().map_err(|_| DtoError::Amount {
        field,
        value: value.to_string(),
    })
}

fn parse_bytes(field: &'static str, value: &str) -> Result<Vec<u8>, DtoError> {
    hex::decode(value).map_err(|err| DtoError::Bytes {
        field,
        message: err.to_string(),
    })
}

fn parse_hash(field: &'static str, value: &str) -> Result<[u8; 32], DtoError> {
    let bytes = parse_bytes(field, value)?;
    let actual = bytes.len();
    bytes.try_into().map_err(|_| DtoError::Bytes {
        field,
        message: format!("expected 32 bytes, got {actual}"),
    })
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct EmptyParams {}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AddressParams {
    pub address: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AddAddressParams {
    pub address: String,
    /// Hex-encoded bytes echoed back on lookups.
    #[serde(default)]
    pub metadata: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LimboParams {
    #[serde(default)]
    pub limbo: bool,
}

fn unbounded() -> i64 {
    -1
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MaxParams {
    /// Negative values mean no limit.
    #[serde(default = "unbounded")]
    pub max: i64,
}

impl Default for MaxParams {
    fn default() -> Self {
        Self { max: unbounded() }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransactionsParams {
    #[serde(default = "unbounded")]
    pub max: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl Default for TransactionsParams {
    fn default() -> Self {
        Self {
            max: unbounded(),
            address: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdParams {
    pub id: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TxidParams {
    pub txid: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SetMemoParams {
    pub txid: String,
    pub memo: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransactionParams {
    pub transaction: TransactionDto,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BroadcastParams {
    pub transactions: Vec<TransactionDto>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchAddressesParams {
    pub addresses: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchTransactionsParams {
    pub ids: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignParams {
    pub transaction: TransactionDto,
    /// Parent ids of inputs to sign; empty signs every owned input.
    #[serde(default)]
    pub to_sign: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnlockConditionsDto {
    pub timelock: u64,
    pub public_keys: Vec<String>,
    pub signatures_required: u64,
}

impl From<&UnlockConditions> for UnlockConditionsDto {
    fn from(conditions: &UnlockConditions) -> Self {
        Self {
            timelock: conditions.timelock,
            public_keys: conditions
                .public_keys
                .iter()
                .map(|key| format!("{PUBLIC_KEY_PREFIX}{}", hex::encode(key)))
                .collect(),
            signatures_required: conditions.signatures_required,
        }
    }
}

impl TryFrom<UnlockConditionsDto> for UnlockConditions {
    type Error = DtoError;

    fn try_from(dto: UnlockConditionsDto) -> Result<Self, Self::Error> {
        let mut public_keys = Vec::with_capacity(dto.public_keys.len());
        for key in dto.public_keys {
            let encoded = key
                .strip_prefix(PUBLIC_KEY_PREFIX)
                .ok_or_else(|| DtoError::PublicKey(key.clone()))?;
            let bytes = hex::decode(encoded).map_err(|_| DtoError::PublicKey(key.clone()))?;
            let array: [u8; 32] = bytes
                .try_into()
                .map_err(|_| DtoError::PublicKey(key.clone()))?;
            public_keys.push(array);
        }
        Ok(UnlockConditions {
            timelock: dto.timelock,
            public_keys,
            signatures_required: dto.signatures_required,
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SiacoinOutputDto {
    /// Hastings as a decimal string.
    pub value: String,
    pub address: String,
}

impl From<&SiacoinOutput> for SiacoinOutputDto {
    fn from(output: &SiacoinOutput) -> Self {
        Self {
            value: output.value.to_string(),
            address: output.address.to_string(),
        }
    }
}

impl TryFrom<SiacoinOutputDto> for SiacoinOutput {
    type Error = DtoError;

    fn try_from(dto: SiacoinOutputDto) -> Result<Self, Self::Error> {
        Ok(SiacoinOutput {
            value: parse_amount("output value", &dto.value)?,
            address: parse_id("output address", &dto.address)?,
        })
    }
}

fn outputs_from(dtos: Vec<SiacoinOutputDto>) -> Result<Vec<SiacoinOutput>, DtoError> {
    dtos.into_iter().map(SiacoinOutput::try_from).collect()
}

fn outputs_to(outputs: &[SiacoinOutput]) -> Vec<SiacoinOutputDto> {
    outputs.iter().map(SiacoinOutputDto::from).collect()
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SiacoinInputDto {
    pub parent_id: String,
    pub unlock_conditions: UnlockConditionsDto,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileContractDto {
    pub file_size: u64,
    pub file_merkle_root: String,
    pub window_start: u64,
    pub window_end: u64,
    pub payout: String,
    pub valid_proof_outputs: Vec<SiacoinOutputDto>,
    pub missed_proof_outputs: Vec<SiacoinOutputDto>,
    pub unlock_hash: String,
    pub revision_number: u64,
}

impl From<&FileContract> for FileContractDto {
    fn from(contract: &FileContract) -> Self {
        Self {
            file_size: contract.file_size,
            file_merkle_root: hex::encode(contract.file_merkle_root),
            window_start: contract.window_start,
            window_end: contract.window_end,
            payout: contract.payout.to_string(),
            valid_proof_outputs: outputs_to(&contract.valid_proof_outputs),
            missed_proof_outputs: outputs_to(&contract.missed_proof_outputs),
            unlock_hash: contract.unlock_hash.to_string(),
            revision_number: contract.revision_number,
        }
    }
}

impl TryFrom<FileContractDto> for FileContract {
    type Error = DtoError;

    fn try_from(dto: FileContractDto) -> Result<Self, Self::Error> {
        Ok(FileContract {
            file_size: dto.file_size,
            file_merkle_root: parse_hash("file_merkle_root", &dto.file_merkle_root)?,
            window_start: dto.window_start,
            window_end: dto.window_end,
            payout: parse_amount("payout", &dto.payout)?,
            valid_proof_outputs: outputs_from(dto.valid_proof_outputs)?,
            missed_proof_outputs: outputs_from(dto.missed_proof_outputs)?,
            unlock_hash: parse_id("unlock_hash", &dto.unlock_hash)?,
            revision_number: dto.revision_number,
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileContractRevisionDto {
    pub parent_id: String,
    pub unlock_conditions: UnlockConditionsDto,
    pub new_revision_number: u64,
    pub new_file_size: u64,
    pub new_file_merkle_root: String,
    pub new_window_start: u64,
    pub new_window_end: u64,
    pub new_valid_proof_outputs: Vec<SiacoinOutputDto>,
    pub new_missed_proof_outputs: Vec<SiacoinOutputDto>,
    pub new_unlock_hash: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransactionSignatureDto {
    pub parent_id: String,
    pub public_key_index: u64,
    #[serde(default)]
    pub timelock: u64,
    pub whole_transaction: bool,
    /// Hex-encoded signature, empty until signed.
    #[serde(default)]
    pub signature: String,
}

/// JSON form of a transaction. Every list is present, empty or not.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransactionDto {
    #[serde(default)]
    pub siacoin_inputs: Vec<SiacoinInputDto>,
    #[serde(default)]
    pub siacoin_outputs: Vec<SiacoinOutputDto>,
    #[serde(default)]
    pub file_contracts: Vec<FileContractDto>,
    #[serde(default)]
    pub file_contract_revisions: Vec<FileContractRevisionDto>,
    #[serde(default)]
    pub miner_fees: Vec<String>,
    #[serde(default)]
    pub arbitrary_data: Vec<String>,
    #[serde(default)]
    pub signatures: Vec<TransactionSignatureDto>,
}

impl From<&Transaction> for TransactionDto {
    fn from(txn: &Transaction) -> Self {
        Self {
            siacoin_inputs: txn
                .siacoin_inputs
                .iter()
                .map(|input| SiacoinInputDto {
                    parent_id: input.parent_id.to_string(),
                    unlock_conditions: UnlockConditionsDto::from(&input.unlock_conditions),
                })
                .collect(),
            siacoin_outputs: outputs_to(&txn.siacoin_outputs),
            file_contracts: txn.file_contracts.iter().map(FileContractDto::from).collect(),
            file_contract_revisions: txn
                .file_contract_revisions
                .iter()
                .map(|revision| FileContractRevisionDto {
                    parent_id: revision.parent_id.to_string(),
                    unlock_conditions: UnlockConditionsDto::from(&revision.unlock_conditions),
                    new_revision_number: revision.new_revision_number,
                    new_file_size: revision.new_file_size,
                    new_file_merkle_root: hex::encode(revision.new_file_merkle_root),
                    new_window_start: revision.new_window_start,
                    new_window_end: revision.new_window_end,
                    new_valid_proof_outputs: outputs_to(&revision.new_valid_proof_outputs),
                    new_missed_proof_outputs: outputs_to(&revision.new_missed_proof_outputs),
                    new_unlock_hash: revision.new_unlock_hash.to_string(),
                })
                .collect(),
            miner_fees: txn.miner_fees.iter().map(|fee| fee.to_string()).collect(),
            arbitrary_data: txn.arbitrary_data.iter().map(hex::encode).collect(),
            signatures: txn
                .signatures
                .iter()
                .map(|signature| TransactionSignatureDto {
                    parent_id: signature.parent_id.to_string(),
                    public_key_index: signature.public_key_index,
                    timelock: signature.timelock,
                    whole_transaction: signature.covered_fields.whole_transaction,
                    signature: hex::encode(&signature.signature),
                })
                .collect(),
        }
    }
}

impl TryFrom<TransactionDto> for Transaction {
    type Error = DtoError;

    fn try_from(dto: TransactionDto) -> Result<Self, Self::Error> {
        let mut siacoin_inputs = Vec::with_capacity(dto.siacoin_inputs.len());
        for input in dto.siacoin_inputs {
            siacoin_inputs.push(SiacoinInput {
                parent_id: parse_id("input parent_id", &input.parent_id)?,
                unlock_conditions: input.unlock_conditions.try_into()?,
            });
        }

        let mut file_contract_revisions = Vec::with_capacity(dto.file_contract_revisions.len());
        for revision in dto.file_contract_revisions {
            file_contract_revisions.push(FileContractRevision {
                parent_id: parse_id("revision parent_id", &revision.parent_id)?,
                unlock_conditions: revision.unlock_conditions.try_into()?,
                new_revision_number: revision.new_revision_number,
                new_file_size: revision.new_file_size,
                new_file_merkle_root: parse_hash(
                    "new_file_merkle_root",
                    &revision.new_file_merkle_root,
                )?,
                new_window_start: revision.new_window_start,
                new_window_end: revision.new_window_end,
                new_valid_proof_outputs: outputs_from(revision.new_valid_proof_outputs)?,
                new_missed_proof_outputs: outputs_from(revision.new_missed_proof_outputs)?,
                new_unlock_hash: parse_id("new_unlock_hash", &revision.new_unlock_hash)?,
            });
        }

        let mut signatures = Vec::with_capacity(dto.signatures.len());
        for signature in dto.signatures {
            signatures.push(TransactionSignature {
                parent_id: parse_id("signature parent_id", &signature.parent_id)?,
                public_key_index: signature.public_key_index,
                timelock: signature.timelock,
                covered_fields: CoveredFields {
                    whole_transaction: signature.whole_transaction,
                },
                signature: parse_bytes("signature", &signature.signature)?,
            });
        }

        Ok(Transaction {
            siacoin_inputs,
            siacoin_outputs: outputs_from(dto.siacoin_outputs)?,
            file_contracts: dto
                .file_contracts
                .into_iter()
                .map(FileContract::try_from)
                .collect::<Result<_, _>>()?,
            file_contract_revisions,
            miner_fees: dto
                .miner_fees
                .iter()
                .map(|fee| parse_amount("miner fee", fee))
                .collect::<Result<_, _>>()?,
            arbitrary_data: dto
                .arbitrary_data
                .iter()
                .map(|data| parse_bytes("arbitrary_data", data))
                .collect::<Result<_, _>>()?,
            signatures,
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AddressInfoDto {
    pub address: String,
    /// `derived` or `watched`.
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed_index: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unlock_conditions: Option<UnlockConditionsDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
}

impl From<&AddressRecord> for AddressInfoDto {
    fn from(record: &AddressRecord) -> Self {
        let address = record.address.to_string();
        match &record.policy {
            AddressPolicy::Derived {
                seed_index,
                unlock_conditions,
            } => Self {
                address,
                kind: "derived".into(),
                seed_index: Some(*seed_index),
                unlock_conditions: Some(unlock_conditions.into()),
                metadata: None,
            },
            AddressPolicy::Watched { metadata } => Self {
                address,
                kind: "watched".into(),
                seed_index: None,
                unlock_conditions: None,
                metadata: Some(hex::encode(metadata)),
            },
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AddressesResponse {
    pub addresses: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchAddressesResponse {
    pub addresses: BTreeMap<String, AddressInfoDto>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemovedResponse {
    pub removed: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AddressResponse {
    pub address: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeedIndexResponse {
    pub seed_index: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BalanceResponse {
    pub balance: String,
    pub limbo: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UtxoDto {
    pub id: String,
    pub value: String,
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maturity_height: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unlock_conditions: Option<UnlockConditionsDto>,
}

impl UtxoDto {
    pub fn new(utxo: &UtxoRecord, unlock_conditions: Option<&UnlockConditions>) -> Self {
        Self {
            id: utxo.id.to_string(),
            value: utxo.value.to_string(),
            address: utxo.owner.to_string(),
            maturity_height: utxo.maturity_height,
            unlock_conditions: unlock_conditions.map(UnlockConditionsDto::from),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UtxosResponse {
    pub utxos: Vec<UtxoDto>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockRewardDto {
    pub id: String,
    pub value: String,
    pub address: String,
    pub maturity_height: u64,
    pub block_id: String,
    pub block_height: u64,
}

impl From<&BlockReward> for BlockRewardDto {
    fn from(reward: &BlockReward) -> Self {
        Self {
            id: reward.id.to_string(),
            value: reward.value.to_string(),
            address: reward.address.to_string(),
            maturity_height: reward.maturity_height,
            block_id: reward.block_id.to_string(),
            block_height: reward.block_height,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockRewardsResponse {
    pub rewards: Vec<BlockRewardDto>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BroadcastResponse {
    /// `submitted` or `already_confirmed`.
    pub status: String,
    pub transactions: Vec<String>,
    /// How many of the submitted transactions were newly pinned in limbo.
    pub inserted: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConsensusResponse {
    pub cursor: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeeResponse {
    pub minimum: String,
    pub maximum: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileContractEntryDto {
    pub id: String,
    pub recorded_height: u64,
    pub contract: FileContractDto,
}

impl From<&ContractRecord> for FileContractEntryDto {
    fn from(record: &ContractRecord) -> Self {
        Self {
            id: record.id.to_string(),
            recorded_height: record.recorded_height,
            contract: FileContractDto::from(&record.contract),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileContractsResponse {
    pub contracts: Vec<FileContractEntryDto>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LimboEntryDto {
    pub id: String,
    pub limbo_since_ms: u64,
    pub transaction: TransactionDto,
}

impl From<&LimboEntry> for LimboEntryDto {
    fn from(entry: &LimboEntry) -> Self {
        Self {
            id: entry.id().to_string(),
            limbo_since_ms: entry.limbo_since_ms,
            transaction: TransactionDto::from(&entry.transaction),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LimboResponse {
    pub transactions: Vec<LimboEntryDto>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AddToLimboResponse {
    pub id: String,
    pub inserted: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemoResponse {
    pub txid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransactionsResponse {
    pub transactions: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransactionEntryDto {
    pub txid: String,
    pub transaction: TransactionDto,
    pub block_id: String,
    pub block_height: u64,
    pub block_position: u32,
    pub timestamp: u64,
    pub fee_per_byte: String,
    pub credit: String,
    pub debit: String,
}

impl TransactionEntryDto {
    pub fn new(entry: &HistoryEntry, flow: TransactionFlow) -> Self {
        Self {
            txid: entry.txid.to_string(),
            transaction: TransactionDto::from(&entry.transaction),
            block_id: entry.block_id.to_string(),
            block_height: entry.block_height,
            block_position: entry.block_position,
            timestamp: entry.timestamp,
            fee_per_byte: flow.fee_per_byte.to_string(),
            credit: flow.credit.to_string(),
            debit: flow.debit.to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchTransactionsResponse {
    pub transactions: BTreeMap<String, TransactionEntryDto>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnconfirmedParentsResponse {
    pub parents: Vec<LimboEntryDto>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignResponse {
    pub transaction: TransactionDto,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{Address, OutputId};

    #[test]
    fn transaction_dto_lists_empty_fields() {
        let value = serde_json::to_value(TransactionDto::from(&Transaction::default()))
            .expect("serialize");
        assert_eq!(value["siacoin_inputs"], serde_json::json!([]));
        assert_eq!(value["signatures"], serde_json::json!([]));
        assert_eq!(value["miner_fees"], serde_json::json!([]));
    }

    #[test]
    fn transaction_dto_converts_back() {
        let txn = Transaction {
            siacoin_inputs: vec![SiacoinInput {
                parent_id: OutputId::new([1u8; 32]),
                unlock_conditions: UnlockConditions::standard([2u8; 32]),
            }],
            siacoin_outputs: vec![SiacoinOutput {
                value: 5 * crate::chain::SIACOIN_PRECISION,
                address: Address::new([3u8; 32]),
            }],
            miner_fees: vec![377],
            arbitrary_data: vec![b"memo".to_vec()],
            signatures: vec![TransactionSignature {
                signature: vec![9u8; 64],
                ..TransactionSignature::whole_transaction(OutputId::new([1u8; 32]))
            }],
            ..Transaction::default()
        };
        let dto = TransactionDto::from(&txn);
        assert_eq!(dto.siacoin_outputs[0].value, "5000000000000000000000000");
        assert!(dto.siacoin_inputs[0].unlock_conditions.public_keys[0].starts_with("ed25519:"));
        let restored = Transaction::try_from(dto).expect("convert");
        assert_eq!(restored, txn);
        assert_eq!(restored.id(), txn.id());
    }

    #[test]
    fn malformed_fields_name_the_culprit() {
        let mut dto = TransactionDto::from(&Transaction::default());
        dto.miner_fees.push("ten".into());
        assert_eq!(
            Transaction::try_from(dto),
            Err(DtoError::Amount {
                field: "miner fee",
                value: "ten".into()
            })
        );

        let conditions = UnlockConditionsDto {
            timelock: 0,
            public_keys: vec!["secp256k1:00".into()],
            signatures_required: 1,
        };
        assert!(matches!(
            UnlockConditions::try_from(conditions),
            Err(DtoError::PublicKey(_))
        ));
    }
}
