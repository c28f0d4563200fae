use std::path::Path;

use storage_kv::{Hash, KvError, LedgerKv, WriteSet};

use crate::chain::{Address, ContractId, OutputId, TransactionId};
use crate::db::{
    codec::{
        self, AddressPolicy, AddressRecord, BlockReward, ChainState, CodecError, ContractRecord,
        HistoryEntry, LimboEntry, UtxoRecord, WalletKind,
    },
    schema,
};

/// High-level wallet facade around the ledger key-value engine.
///
/// The store carries no lock of its own: readers borrow it shared through
/// [`WalletStore::view`], writers borrow it exclusively through
/// [`WalletStore::batch`]. The engine decides how those borrows are guarded.
pub struct WalletStore {
    kv: LedgerKv,
}

impl WalletStore {
    /// Open or initialise a wallet store rooted at `data_dir`.
    pub fn open(data_dir: &Path) -> Result<Self, WalletStoreError> {
        let mut kv = LedgerKv::open(data_dir)?;
        initialise_schema(&mut kv)?;
        Ok(Self { kv })
    }

    /// Read-only view of the committed state.
    pub fn view(&self) -> LedgerView<'_> {
        LedgerView {
            kv: &self.kv,
            staged: None,
        }
    }

    /// Start a new batched write session. Nothing reaches disk until
    /// [`WalletStoreBatch::commit`]; dropping the batch discards it.
    pub fn batch(&mut self) -> WalletStoreBatch<'_> {
        WalletStoreBatch {
            kv: &mut self.kv,
            set: WriteSet::new(),
        }
    }

    /// Root hash of the committed ledger state.
    pub fn root(&self) -> Hash {
        self.kv.root()
    }

    pub fn data_dir(&self) -> &Path {
        self.kv.base_dir()
    }
}

/// Typed reads over the ledger, optionally overlaid with a batch's staged writes.
#[derive(Clone, Copy)]
pub struct LedgerView<'a> {
    kv: &'a LedgerKv,
    staged: Option<&'a WriteSet>,
}

impl<'a> LedgerView<'a> {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        match self.staged {
            Some(set) => self.kv.get_staged(set, key),
            None => self.kv.get(key),
        }
    }

    fn scan(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        match self.staged {
            Some(set) => self.kv.scan_prefix_staged(set, prefix),
            None => self.kv.scan_prefix(prefix).collect(),
        }
    }

    /// Return the currently stored schema version.
    pub fn schema_version(&self) -> Result<u32, WalletStoreError> {
        let Some(bytes) = self.get(schema::SCHEMA_VERSION_KEY) else {
            return Ok(schema::SCHEMA_VERSION_LATEST);
        };
        Ok(codec::decode_schema_version(&bytes)?)
    }

    /// Wallet kind fixed when the store was first used, if any.
    pub fn wallet_kind(&self) -> Result<Option<WalletKind>, WalletStoreError> {
        self.get(&meta_key(schema::META_WALLET_KIND_KEY))
            .map(|bytes| codec::decode_wallet_kind(&bytes))
            .transpose()
            .map_err(Into::into)
    }

    pub fn chain_state(&self) -> Result<ChainState, WalletStoreError> {
        match self.get(&meta_key(schema::META_CHAIN_STATE_KEY)) {
            Some(bytes) => Ok(codec::decode_chain_state(&bytes)?),
            None => Ok(ChainState::default()),
        }
    }

    /// Next unused seed derivation index.
    pub fn seed_index(&self) -> Result<u64, WalletStoreError> {
        match self.get(&meta_key(schema::META_SEED_INDEX_KEY)) {
            Some(bytes) => Ok(codec::decode_seed_index(&bytes)?),
            None => Ok(0),
        }
    }

    pub fn address_policy(&self, address: &Address) -> Result<Option<AddressPolicy>, WalletStoreError> {
        self.get(&address_key(address))
            .map(|bytes| codec::decode_address_policy(&bytes))
            .transpose()
            .map_err(Into::into)
    }

    pub fn contains_address(&self, address: &Address) -> bool {
        self.get(&address_key(address)).is_some()
    }

    /// Every address book entry, ordered by address bytes.
    pub fn addresses(&self) -> Result<Vec<AddressRecord>, WalletStoreError> {
        self.scan(schema::ADDRESSES_NAMESPACE)
            .into_iter()
            .map(|(key, value)| {
                let address = parse_address(&key[schema::ADDRESSES_NAMESPACE.len()..])?;
                let policy = codec::decode_address_policy(&value)?;
                Ok(AddressRecord { address, policy })
            })
            .collect()
    }

    pub fn utxo(&self, id: &OutputId) -> Result<Option<UtxoRecord>, WalletStoreError> {
        self.get(&utxo_key(id))
            .map(|bytes| codec::decode_utxo(&bytes))
            .transpose()
            .map_err(Into::into)
    }

    /// Every tracked output, mature or not, ordered by output id.
    pub fn utxos(&self) -> Result<Vec<UtxoRecord>, WalletStoreError> {
        self.scan(schema::UTXOS_NAMESPACE)
            .into_iter()
            .map(|(_, value)| Ok(codec::decode_utxo(&value)?))
            .collect()
    }

    pub fn history_entry(&self, txid: &TransactionId) -> Result<Option<HistoryEntry>, WalletStoreError> {
        self.get(&history_key(txid))
            .map(|bytes| codec::decode_history_entry(&bytes))
            .transpose()
            .map_err(Into::into)
    }

    pub fn contains_history(&self, txid: &TransactionId) -> bool {
        self.get(&history_key(txid)).is_some()
    }

    /// Confirmed history, newest first by (block height, block position).
    /// `limit` of `None` means unbounded.
    pub fn history(&self, limit: Option<usize>) -> Result<Vec<HistoryEntry>, WalletStoreError> {
        let index = self.scan(schema::HISTORY_BY_HEIGHT_NAMESPACE);
        self.resolve_index(index, limit)
    }

    /// Confirmed history touching `address`, newest first.
    pub fn history_for_address(
        &self,
        address: &Address,
        limit: Option<usize>,
    ) -> Result<Vec<HistoryEntry>, WalletStoreError> {
        let prefix = namespaced(schema::HISTORY_BY_ADDRESS_NAMESPACE, address.as_bytes());
        let index = self.scan(&prefix);
        self.resolve_index(index, limit)
    }

    fn resolve_index(
        &self,
        index: Vec<(Vec<u8>, Vec<u8>)>,
        limit: Option<usize>,
    ) -> Result<Vec<HistoryEntry>, WalletStoreError> {
        let limit = limit.unwrap_or(usize::MAX);
        let mut entries = Vec::new();
        for (key, _) in index.into_iter().rev() {
            if entries.len() >= limit {
                break;
            }
            let txid = parse_trailing_txid(&key)?;
            let entry = self.history_entry(&txid)?.ok_or_else(|| {
                WalletStoreError::CorruptKey(format!("history index points at missing entry {txid}"))
            })?;
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Every stored revision of `id`, in revision order.
    pub fn contract_revisions(&self, id: &ContractId) -> Result<Vec<ContractRecord>, WalletStoreError> {
        let prefix = namespaced(schema::CONTRACTS_NAMESPACE, id.as_bytes());
        self.scan(&prefix)
            .into_iter()
            .map(|(_, value)| Ok(codec::decode_contract(&value)?))
            .collect()
    }

    pub fn contract_revision(
        &self,
        id: &ContractId,
        revision_number: u64,
    ) -> Result<Option<ContractRecord>, WalletStoreError> {
        self.get(&contract_key(id, revision_number))
            .map(|bytes| codec::decode_contract(&bytes))
            .transpose()
            .map_err(Into::into)
    }

    /// Every stored revision of every contract, grouped by contract id.
    pub fn contracts(&self) -> Result<Vec<ContractRecord>, WalletStoreError> {
        self.scan(schema::CONTRACTS_NAMESPACE)
            .into_iter()
            .map(|(_, value)| Ok(codec::decode_contract(&value)?))
            .collect()
    }

    /// Block rewards in ascending block height.
    pub fn block_rewards(&self) -> Result<Vec<BlockReward>, WalletStoreError> {
        self.scan(schema::REWARDS_NAMESPACE)
            .into_iter()
            .map(|(_, value)| Ok(codec::decode_block_reward(&value)?))
            .collect()
    }

    pub fn limbo_entry(&self, txid: &TransactionId) -> Result<Option<LimboEntry>, WalletStoreError> {
        self.get(&limbo_key(txid))
            .map(|bytes| codec::decode_limbo_entry(&bytes))
            .transpose()
            .map_err(Into::into)
    }

    pub fn contains_limbo(&self, txid: &TransactionId) -> bool {
        self.get(&limbo_key(txid)).is_some()
    }

    pub fn limbo_entries(&self) -> Result<Vec<LimboEntry>, WalletStoreError> {
        self.scan(schema::LIMBO_NAMESPACE)
            .into_iter()
            .map(|(_, value)| Ok(codec::decode_limbo_entry(&value)?))
            .collect()
    }

    pub fn memo(&self, txid: &TransactionId) -> Option<Vec<u8>> {
        self.get(&memo_key(txid))
    }
}

/// Write session staging mutations for a single atomic commit.
pub struct WalletStoreBatch<'a> {
    kv: &'a mut LedgerKv,
    set: WriteSet,
}

impl<'a> WalletStoreBatch<'a> {
    /// Reads through this view observe the batch's own staged writes.
    pub fn view(&self) -> LedgerView<'_> {
        LedgerView {
            kv: &*self.kv,
            staged: Some(&self.set),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    pub fn set_wallet_kind(&mut self, kind: WalletKind) -> Result<(), WalletStoreError> {
        let value = codec::encode_wallet_kind(kind)?;
        self.set.put(meta_key(schema::META_WALLET_KIND_KEY), value);
        Ok(())
    }

    pub fn set_chain_state(&mut self, state: &ChainState) -> Result<(), WalletStoreError> {
        let value = codec::encode_chain_state(state)?;
        self.set.put(meta_key(schema::META_CHAIN_STATE_KEY), value);
        Ok(())
    }

    pub fn set_seed_index(&mut self, index: u64) -> Result<(), WalletStoreError> {
        let value = codec::encode_seed_index(index)?;
        self.set.put(meta_key(schema::META_SEED_INDEX_KEY), value);
        Ok(())
    }

    pub fn put_address(&mut self, record: &AddressRecord) -> Result<(), WalletStoreError> {
        let value = codec::encode_address_policy(&record.policy)?;
        self.set.put(address_key(&record.address), value);
        Ok(())
    }

    pub fn delete_address(&mut self, address: &Address) {
        self.set.delete(&address_key(address));
    }

    pub fn put_utxo(&mut self, record: &UtxoRecord) -> Result<(), WalletStoreError> {
        let value = codec::encode_utxo(record)?;
        self.set.put(utxo_key(&record.id), value);
        Ok(())
    }

    pub fn delete_utxo(&mut self, id: &OutputId) {
        self.set.delete(&utxo_key(id));
    }

    /// Store `entry` and index it by height and by each of `addresses`.
    pub fn put_history_entry(
        &mut self,
        entry: &HistoryEntry,
        addresses: &[Address],
    ) -> Result<(), WalletStoreError> {
        let value = codec::encode_history_entry(entry)?;
        self.set.put(history_key(&entry.txid), value);
        self.set.put(history_height_key(entry), Vec::new());
        for address in addresses {
            self.set.put(history_address_key(address, entry), Vec::new());
        }
        Ok(())
    }

    /// Remove `entry` together with its height index and any address index
    /// rows among `addresses`.
    pub fn delete_history_entry(&mut self, entry: &HistoryEntry, addresses: &[Address]) {
        self.set.delete(&history_key(&entry.txid));
        self.set.delete(&history_height_key(entry));
        for address in addresses {
            let key = history_address_key(address, entry);
            if self.view().get(&key).is_some() {
                self.set.delete(&key);
            }
        }
    }

    pub fn put_contract(&mut self, record: &ContractRecord) -> Result<(), WalletStoreError> {
        let value = codec::encode_contract(record)?;
        self.set
            .put(contract_key(&record.id, record.contract.revision_number), value);
        Ok(())
    }

    pub fn delete_contract_revision(&mut self, id: &ContractId, revision_number: u64) {
        self.set.delete(&contract_key(id, revision_number));
    }

    pub fn put_block_reward(&mut self, reward: &BlockReward) -> Result<(), WalletStoreError> {
        let value = codec::encode_block_reward(reward)?;
        self.set
            .put(reward_key(reward.block_height, &reward.id), value);
        Ok(())
    }

    pub fn delete_block_reward(&mut self, block_height: u64, id: &OutputId) {
        self.set.delete(&reward_key(block_height, id));
    }

    pub fn put_limbo_entry(&mut self, entry: &LimboEntry) -> Result<(), WalletStoreError> {
        let value = codec::encode_limbo_entry(entry)?;
        self.set.put(limbo_key(&entry.id()), value);
        Ok(())
    }

    pub fn delete_limbo_entry(&mut self, txid: &TransactionId) {
        self.set.delete(&limbo_key(txid));
    }

    pub fn put_memo(&mut self, txid: &TransactionId, memo: &[u8]) {
        self.set.put(memo_key(txid), memo.to_vec());
    }

    pub fn delete_memo(&mut self, txid: &TransactionId) {
        self.set.delete(&memo_key(txid));
    }

    /// Stage the removal of everything learned from the chain: outputs,
    /// history, contracts, rewards and the chain state.
    pub fn clear_chain_derived(&mut self) {
        for namespace in schema::CHAIN_DERIVED_NAMESPACES {
            let keys: Vec<Vec<u8>> = self
                .view()
                .scan(namespace)
                .into_iter()
                .map(|(key, _)| key)
                .collect();
            for key in keys {
                self.set.delete(&key);
            }
        }
        self.set.delete(&meta_key(schema::META_CHAIN_STATE_KEY));
    }

    /// Atomically persist the staged writes. An empty batch is not written
    /// and yields the current root.
    pub fn commit(self) -> Result<Hash, WalletStoreError> {
        if self.set.is_empty() {
            return Ok(self.kv.root());
        }
        Ok(self.kv.commit(self.set)?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WalletStoreError {
    #[error("storage error: {0}")]
    Storage(#[from] KvError),
    #[error("serialization error: {0}")]
    Codec(#[from] CodecError),
    #[error("stored schema version {stored} exceeds supported {supported}")]
    UnsupportedSchema { stored: u32, supported: u32 },
    #[error("corrupt key encoding: {0}")]
    CorruptKey(String),
}

fn initialise_schema(kv: &mut LedgerKv) -> Result<(), WalletStoreError> {
    let supported = schema::SCHEMA_VERSION_LATEST;
    if let Some(bytes) = kv.get(schema::SCHEMA_VERSION_KEY) {
        let stored = codec::decode_schema_version(&bytes)?;
        if stored > supported {
            return Err(WalletStoreError::UnsupportedSchema { stored, supported });
        }
        if stored == supported {
            return Ok(());
        }
    }

    let mut set = WriteSet::new();
    set.put(
        schema::SCHEMA_VERSION_KEY.to_vec(),
        codec::encode_schema_version(supported)?,
    );
    kv.commit(set)?;
    Ok(())
}

fn meta_key(key: &str) -> Vec<u8> {
    namespaced(schema::META_NAMESPACE, key.as_bytes())
}

fn address_key(address: &Address) -> Vec<u8> {
    namespaced(schema::ADDRESSES_NAMESPACE, address.as_bytes())
}

fn utxo_key(id: &OutputId) -> Vec<u8> {
    namespaced(schema::UTXOS_NAMESPACE, id.as_bytes())
}

fn history_key(txid: &TransactionId) -> Vec<u8> {
    namespaced(schema::HISTORY_NAMESPACE, txid.as_bytes())
}

fn history_position(entry: &HistoryEntry) -> Vec<u8> {
    let mut suffix = Vec::with_capacity(8 + 4 + 32);
    suffix.extend_from_slice(&entry.block_height.to_be_bytes());
    suffix.extend_from_slice(&entry.block_position.to_be_bytes());
    suffix.extend_from_slice(entry.txid.as_bytes());
    suffix
}

fn history_height_key(entry: &HistoryEntry) -> Vec<u8> {
    namespaced(schema::HISTORY_BY_HEIGHT_NAMESPACE, &history_position(entry))
}

fn history_address_key(address: &Address, entry: &HistoryEntry) -> Vec<u8> {
    let mut key = namespaced(schema::HISTORY_BY_ADDRESS_NAMESPACE, address.as_bytes());
    key.extend_from_slice(&history_position(entry));
    key
}

fn contract_key(id: &ContractId, revision_number: u64) -> Vec<u8> {
    let mut key = namespaced(schema::CONTRACTS_NAMESPACE, id.as_bytes());
    key.extend_from_slice(&revision_number.to_be_bytes());
    key
}

fn reward_key(block_height: u64, id: &OutputId) -> Vec<u8> {
    let mut key = namespaced(schema::REWARDS_NAMESPACE, &block_height.to_be_bytes());
    key.extend_from_slice(id.as_bytes());
    key
}

fn limbo_key(txid: &TransactionId) -> Vec<u8> {
    namespaced(schema::LIMBO_NAMESPACE, txid.as_bytes())
}

fn memo_key(txid: &TransactionId) -> Vec<u8> {
    namespaced(schema::MEMOS_NAMESPACE, txid.as_bytes())
}

fn namespaced(prefix: &[u8], suffix: &[u8]) -> Vec<u8> {
    let mut key = prefix.to_vec();
    key.extend_from_slice(suffix);
    key
}

fn parse_address(bytes: &[u8]) -> Result<Address, WalletStoreError> {
    Address::from_slice(bytes).map_err(|err| {
        WalletStoreError::CorruptKey(format!("address key suffix: {err}"))
    })
}

fn parse_trailing_txid(key: &[u8]) -> Result<TransactionId, WalletStoreError> {
    if key.len() < 32 {
        return Err(WalletStoreError::CorruptKey(format!(
            "expected 32-byte txid suffix, got {} bytes",
            key.len()
        )));
    }
    TransactionId::from_slice(&key[key.len() - 32..])
        .map_err(|err| WalletStoreError::CorruptKey(err.to_string()))
}
