use bincode::Options;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chain::{
    Address, BlockId, ChangeId, ContractId, Currency, FileContract, OutputId, Transaction,
    TransactionId, UnlockConditions,
};
pub use crate::modes::WalletKind;

/// Error surfaced when encoding or decoding wallet payloads fails.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Wrapper around the underlying bincode error.
    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),
}

fn options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .allow_trailing_bytes()
}

/// How the wallet relates to an address.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum AddressPolicy {
    /// Spendable: derived from the wallet seed at `seed_index`.
    Derived {
        seed_index: u64,
        unlock_conditions: UnlockConditions,
    },
    /// Tracked only. The metadata is opaque to the wallet.
    Watched {
        #[serde(with = "serde_bytes")]
        metadata: Vec<u8>,
    },
}

impl AddressPolicy {
    pub fn kind(&self) -> WalletKind {
        match self {
            AddressPolicy::Derived { .. } => WalletKind::Seed,
            AddressPolicy::Watched { .. } => WalletKind::WatchOnly,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AddressRecord {
    pub address: Address,
    pub policy: AddressPolicy,
}

/// Wallet-tracked unspent output.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UtxoRecord {
    pub id: OutputId,
    pub value: Currency,
    pub owner: Address,
    /// Height at which a delayed output becomes spendable.
    pub maturity_height: Option<u64>,
}

impl UtxoRecord {
    pub fn is_mature(&self, chain_height: Option<u64>) -> bool {
        match self.maturity_height {
            None => true,
            Some(maturity) => chain_height.map_or(false, |height| height >= maturity),
        }
    }
}

/// Value of a spent output as known when its spending transaction confirmed.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct InputValue {
    pub parent_id: OutputId,
    pub owner: Address,
    pub value: Currency,
}

/// Confirmed transaction relevant to the wallet.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryEntry {
    pub txid: TransactionId,
    pub transaction: Transaction,
    pub block_id: BlockId,
    pub block_height: u64,
    pub block_position: u32,
    pub timestamp: u64,
    pub fee_per_byte: Currency,
    pub input_values: Vec<InputValue>,
}

/// Unconfirmed transaction pinned by the wallet.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LimboEntry {
    pub transaction: Transaction,
    pub limbo_since_ms: u64,
}

impl LimboEntry {
    pub fn id(&self) -> TransactionId {
        self.transaction.id()
    }
}

/// One revision of a file contract the wallet has a stake in.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContractRecord {
    pub id: ContractId,
    pub contract: FileContract,
    pub recorded_height: u64,
}

/// Miner payout credited to an owned address.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockReward {
    pub id: OutputId,
    pub value: Currency,
    pub address: Address,
    pub maturity_height: u64,
    pub block_id: BlockId,
    pub block_height: u64,
}

/// Position of the wallet on the chain.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChainState {
    pub cursor: ChangeId,
    /// Height of the tip block; `None` before the genesis block is applied.
    pub height: Option<u64>,
}

impl Default for ChainState {
    fn default() -> Self {
        Self {
            cursor: ChangeId::BEGINNING,
            height: None,
        }
    }
}

pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    Ok(options().serialize(value)?)
}

pub fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, CodecError> {
    Ok(options().deserialize(bytes)?)
}

pub fn encode_address_policy(policy: &AddressPolicy) -> Result<Vec<u8>, CodecError> {
    encode(policy)
}

pub fn decode_address_policy(bytes: &[u8]) -> Result<AddressPolicy, CodecError> {
    decode(bytes)
}

pub fn encode_utxo(record: &UtxoRecord) -> Result<Vec<u8>, CodecError> {
    encode(record)
}

pub fn decode_utxo(bytes: &[u8]) -> Result<UtxoRecord, CodecError> {
    decode(bytes)
}

pub fn encode_history_entry(entry: &HistoryEntry) -> Result<Vec<u8>, CodecError> {
    encode(entry)
}

pub fn decode_history_entry(bytes: &[u8]) -> Result<HistoryEntry, CodecError> {
    decode(bytes)
}

pub fn encode_limbo_entry(entry: &LimboEntry) -> Result<Vec<u8>, CodecError> {
    encode(entry)
}

pub fn decode_limbo_entry(bytes: &[u8]) -> Result<LimboEntry, CodecError> {
    decode(bytes)
}

pub fn encode_contract(record: &ContractRecord) -> Result<Vec<u8>, CodecError> {
    encode(record)
}

pub fn decode_contract(bytes: &[u8]) -> Result<ContractRecord, CodecError> {
    decode(bytes)
}

pub fn encode_block_reward(reward: &BlockReward) -> Result<Vec<u8>, CodecError> {
    encode(reward)
}

pub fn decode_block_reward(bytes: &[u8]) -> Result<BlockReward, CodecError> {
    decode(bytes)
}

pub fn encode_chain_state(state: &ChainState) -> Result<Vec<u8>, CodecError> {
    encode(state)
}

pub fn decode_chain_state(bytes: &[u8]) -> Result<ChainState, CodecError> {
    decode(bytes)
}

pub fn encode_wallet_kind(kind: WalletKind) -> Result<Vec<u8>, CodecError> {
    encode(&kind)
}

pub fn decode_wallet_kind(bytes: &[u8]) -> Result<WalletKind, CodecError> {
    decode(bytes)
}

pub fn encode_schema_version(version: u32) -> Result<Vec<u8>, CodecError> {
    encode(&version)
}

pub fn decode_schema_version(bytes: &[u8]) -> Result<u32, CodecError> {
    decode(bytes)
}

pub fn encode_seed_index(index: u64) -> Result<Vec<u8>, CodecError> {
    encode(&index)
}

pub fn decode_seed_index(bytes: &[u8]) -> Result<u64, CodecError> {
    decode(bytes)
}
