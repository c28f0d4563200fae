use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::info;

use crate::chain::{Address, BlockId, ChangeId, OutputId, TransactionId};
use crate::config::wallet::WalletEngineConfig;
use crate::db::{WalletStore, WalletStoreError};
use crate::modes::WalletKind;

pub mod addresses;
pub mod applier;
pub mod funding;
pub mod limbo;
pub mod query;
pub mod signing;

pub use addresses::SeedKeys;
pub use applier::{ApplyOutcome, ApplySummary};
pub use funding::{FundingError, FundingPlan, ValuedInput};
pub use limbo::LimboInsert;
pub use query::{ConsensusInfo, Limit, TransactionFlow};
pub use signing::SigningError;

/// Ledger corruption that must stop consensus processing.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum IntegrityError {
    #[error("consensus change expects prior cursor {expected} but the ledger is at {stored}")]
    CursorMismatch { stored: ChangeId, expected: ChangeId },
    #[error("tracked output {output} belongs to {address}, which has no address book entry")]
    MissingOwner { output: OutputId, address: Address },
    #[error("cannot revert block {block} below the beginning of the chain")]
    HeightUnderflow { block: BlockId },
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[from] WalletStoreError),
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("ledger integrity violation: {0}")]
    Integrity(#[from] IntegrityError),
    #[error("wallet ledger lock poisoned")]
    Poisoned,
}

impl EngineError {
    /// Whether the error leaves the ledger in a state consensus processing
    /// must not continue from.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::Integrity(_) | EngineError::Poisoned)
    }
}

/// Wallet state engine: the durable ledger, limbo and address book behind a
/// single reader/writer guard.
///
/// Every mutation holds the write guard for its whole duration, and every
/// query holds one read guard, so readers only ever observe states between
/// committed batches.
pub struct WalletEngine {
    kind: WalletKind,
    maturity_delay: u64,
    ledger: RwLock<WalletStore>,
}

impl WalletEngine {
    /// Open the ledger at `data_dir`, binding it to `kind` on first use.
    pub fn open(data_dir: &Path, kind: WalletKind, maturity_delay: u64) -> Result<Self, EngineError> {
        let mut store = WalletStore::open(data_dir)?;
        match store.view().wallet_kind()? {
            Some(stored) if stored != kind => {
                return Err(EngineError::Validation(format!(
                    "ledger at {} belongs to a {stored} wallet, not {kind}",
                    data_dir.display()
                )));
            }
            Some(_) => {}
            None => {
                let mut batch = store.batch();
                batch.set_wallet_kind(kind)?;
                batch.commit()?;
            }
        }

        let swept = limbo::sweep_confirmed(&mut store)?;
        let chain = store.view().chain_state()?;
        info!(
            dir = %data_dir.display(),
            %kind,
            cursor = %chain.cursor,
            height = ?chain.height,
            swept,
            "wallet ledger opened"
        );

        Ok(Self {
            kind,
            maturity_delay,
            ledger: RwLock::new(store),
        })
    }

    pub fn from_config(config: &WalletEngineConfig) -> Result<Self, EngineError> {
        Self::open(&config.data_dir, config.kind, config.maturity_delay)
    }

    pub fn kind(&self) -> WalletKind {
        self.kind
    }

    /// Blocks a miner payout waits before it can be spent.
    pub fn maturity_delay(&self) -> u64 {
        self.maturity_delay
    }

    pub(crate) fn read_ledger(&self) -> Result<RwLockReadGuard<'_, WalletStore>, EngineError> {
        self.ledger.read().map_err(|_| EngineError::Poisoned)
    }

    pub(crate) fn write_ledger(&self) -> Result<RwLockWriteGuard<'_, WalletStore>, EngineError> {
        self.ledger.write().map_err(|_| EngineError::Poisoned)
    }

    /// Root hash of the committed ledger.
    pub fn ledger_root(&self) -> Result<[u8; 32], EngineError> {
        Ok(self.read_ledger()?.root())
    }

    pub fn memo(&self, txid: &TransactionId) -> Result<Option<Vec<u8>>, EngineError> {
        Ok(self.read_ledger()?.view().memo(txid))
    }

    pub fn set_memo(&self, txid: &TransactionId, memo: &[u8]) -> Result<(), EngineError> {
        let mut store = self.write_ledger()?;
        let mut batch = store.batch();
        batch.put_memo(txid, memo);
        batch.commit()?;
        Ok(())
    }

    /// Returns whether a memo existed.
    pub fn delete_memo(&self, txid: &TransactionId) -> Result<bool, EngineError> {
        let mut store = self.write_ledger()?;
        if store.view().memo(txid).is_none() {
            return Ok(false);
        }
        let mut batch = store.batch();
        batch.delete_memo(txid);
        batch.commit()?;
        Ok(true)
    }

    /// Forget everything learned from the chain. The next consensus change
    /// must start from the beginning of the chain.
    pub fn reset(&self) -> Result<(), EngineError> {
        let mut store = self.write_ledger()?;
        let mut batch = store.batch();
        batch.clear_chain_derived();
        let root = batch.commit()?;
        info!(root = %hex::encode(root), "wallet chain state reset");
        Ok(())
    }
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn ledger_is_bound_to_its_wallet_kind() {
        let dir = tempdir().expect("tempdir");
        WalletEngine::open(dir.path(), WalletKind::WatchOnly, 144).expect("open");
        let err = WalletEngine::open(dir.path(), WalletKind::Seed, 144)
            .err()
            .expect("kind mismatch");
        assert!(matches!(err, EngineError::Validation(_)));
        assert!(!err.is_fatal());
        WalletEngine::open(dir.path(), WalletKind::WatchOnly, 144).expect("reopen");
    }

    #[test]
    fn memos_are_local_and_removable() {
        let dir = tempdir().expect("tempdir");
        let engine = WalletEngine::open(dir.path(), WalletKind::WatchOnly, 144).expect("open");
        let txid = TransactionId::new([4u8; 32]);
        assert_eq!(engine.memo(&txid).expect("memo"), None);
        engine.set_memo(&txid, b"invoice 17").expect("set");
        assert_eq!(engine.memo(&txid).expect("memo"), Some(b"invoice 17".to_vec()));
        assert!(engine.delete_memo(&txid).expect("delete"));
        assert!(!engine.delete_memo(&txid).expect("delete again"));
    }
}
