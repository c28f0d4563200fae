use std::fmt;

use anyhow::Error as AnyError;
use thiserror::Error;

use crate::chain::{Currency, Transaction};

/// Fee-per-byte range currently accepted by the pool.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FeeEstimate {
    pub minimum: Currency,
    pub maximum: Currency,
}

impl FeeEstimate {
    pub fn new(minimum: Currency, maximum: Currency) -> Self {
        Self { minimum, maximum }
    }
}

impl fmt::Display for FeeEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{} H/byte", self.minimum, self.maximum)
    }
}

#[derive(Debug, Error)]
pub enum PoolError {
    /// The pool already holds the transaction set.
    #[error("transaction set already in the pool")]
    Duplicate,
    /// The pool refused the set for application-level reasons.
    #[error("transaction set rejected: {0}")]
    Rejected(String),
    /// Transport-level failures such as networking errors or RPC timeouts.
    #[error("transport error: {0}")]
    Transport(#[from] AnyError),
}

impl PoolError {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected(reason.into())
    }

    pub fn transport(error: impl Into<AnyError>) -> Self {
        Self::Transport(error.into())
    }
}

pub type PoolResult<T> = Result<T, PoolError>;

/// Transaction pool of the full node the wallet broadcasts through.
pub trait TransactionPool: Send + Sync {
    fn accept_transaction_set(&self, transactions: &[Transaction]) -> PoolResult<()>;

    fn fee_estimate(&self) -> PoolResult<FeeEstimate>;
}
