use std::sync::Arc;

use tracing::{debug, info};

use crate::chain::{Address, Currency, OutputId, Transaction, TransactionId};
use crate::config::wallet::FeedConfig;
use crate::engine::{EngineError, FundingError, FundingPlan, LimboInsert, SigningError, WalletEngine};
use crate::feed::{ConsensusFeed, FeedSubscriber};
use crate::modes::{WalletHandle, WalletKind};
use crate::pool::{FeeEstimate, PoolError, TransactionPool};

#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("pool error: {0}")]
    Pool(#[from] PoolError),
    #[error("funding error: {0}")]
    Funding(#[from] FundingError),
    #[error("signing error: {0}")]
    Signing(#[from] SigningError),
    #[error("{operation} is not available on a {kind} wallet")]
    Unsupported {
        operation: &'static str,
        kind: WalletKind,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BroadcastOutcome {
    /// Every transaction in the set is already confirmed; nothing was sent.
    AlreadyConfirmed,
    Submitted {
        /// Ids handed to the pool, in submission order.
        transactions: Vec<TransactionId>,
        /// Limbo outcome for each submitted transaction.
        limbo: Vec<LimboInsert>,
    },
}

/// A wallet variant wired to the node's transaction pool.
pub struct Wallet {
    handle: Arc<dyn WalletHandle>,
    pool: Arc<dyn TransactionPool>,
}

impl Wallet {
    pub fn new(handle: Arc<dyn WalletHandle>, pool: Arc<dyn TransactionPool>) -> Self {
        Self { handle, pool }
    }

    pub fn handle(&self) -> &Arc<dyn WalletHandle> {
        &self.handle
    }

    pub fn engine(&self) -> &Arc<WalletEngine> {
        self.handle.engine()
    }

    pub fn kind(&self) -> WalletKind {
        self.handle.kind()
    }

    /// Forward a transaction set to the pool and pin it in limbo.
    ///
    /// Transactions already confirmed are dropped from the set. The ledger
    /// lock is not held while the pool is called.
    pub fn broadcast(&self, transactions: Vec<Transaction>) -> Result<BroadcastOutcome, WalletError> {
        if transactions.is_empty() {
            return Err(EngineError::Validation("transaction set is empty".into()).into());
        }
        let engine = self.engine();
        let mut pending = Vec::with_capacity(transactions.len());
        for transaction in transactions {
            let txid = transaction.id();
            if engine.transaction(&txid)?.is_some() {
                debug!(%txid, "skipping broadcast of confirmed transaction");
                continue;
            }
            pending.push(transaction);
        }
        if pending.is_empty() {
            return Ok(BroadcastOutcome::AlreadyConfirmed);
        }

        match self.pool.accept_transaction_set(&pending) {
            Ok(()) => {}
            Err(PoolError::Duplicate) => debug!("transaction set already known to the pool"),
            Err(error) => return Err(error.into()),
        }

        let ids: Vec<TransactionId> = pending.iter().map(Transaction::id).collect();
        let limbo = engine.add_set_to_limbo(pending)?;
        info!(count = ids.len(), "broadcast transaction set");
        Ok(BroadcastOutcome::Submitted {
            transactions: ids,
            limbo,
        })
    }

    pub fn fee_estimate(&self) -> Result<FeeEstimate, WalletError> {
        Ok(self.pool.fee_estimate()?)
    }

    pub fn next_address(&self) -> Result<Address, WalletError> {
        let source = self.handle.address_source().ok_or(WalletError::Unsupported {
            operation: "address generation",
            kind: self.kind(),
        })?;
        Ok(source.next_address()?)
    }

    pub fn seed_index(&self) -> Result<u64, WalletError> {
        let source = self.handle.address_source().ok_or(WalletError::Unsupported {
            operation: "seed index",
            kind: self.kind(),
        })?;
        Ok(source.seed_index()?)
    }

    pub fn sign(&self, txn: &mut Transaction, to_sign: &[OutputId]) -> Result<(), WalletError> {
        let signer = self.handle.signer().ok_or(WalletError::Unsupported {
            operation: "signing",
            kind: self.kind(),
        })?;
        Ok(signer.sign(txn, to_sign)?)
    }

    pub fn fund(&self, amount: Currency, fee_per_byte: Currency) -> Result<FundingPlan, WalletError> {
        let signer = self.handle.signer().ok_or(WalletError::Unsupported {
            operation: "funding",
            kind: self.kind(),
        })?;
        Ok(signer.fund(amount, fee_per_byte)?)
    }

    /// Start following `feed` in the background.
    pub fn subscribe(&self, feed: Arc<dyn ConsensusFeed>, config: FeedConfig) -> FeedSubscriber {
        FeedSubscriber::start(Arc::clone(self.engine()), feed, config)
    }
}
