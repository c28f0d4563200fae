//! Wallet variants and the capabilities each one offers.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::chain::{Address, ConsensusChange, Currency, OutputId, Transaction};
use crate::engine::{ApplyOutcome, EngineError, FundingError, FundingPlan, SigningError, WalletEngine};

pub mod seed;
pub mod watch_only;

pub use seed::SeedWallet;
pub use watch_only::WatchOnlyWallet;

/// Variant tag fixed when a ledger is first opened.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletKind {
    #[default]
    Seed,
    WatchOnly,
}

impl WalletKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletKind::Seed => "seed",
            WalletKind::WatchOnly => "watch_only",
        }
    }
}

impl fmt::Display for WalletKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capabilities shared by every wallet: queries and consensus application
/// through the engine, plus address book mutation.
pub trait WalletHandle: Send + Sync {
    fn engine(&self) -> &Arc<WalletEngine>;

    fn kind(&self) -> WalletKind {
        self.engine().kind()
    }

    /// Track `address`, echoing `metadata` back on lookups.
    fn add_address(&self, address: Address, metadata: Vec<u8>) -> Result<(), EngineError>;

    fn remove_address(&self, address: &Address) -> Result<bool, EngineError> {
        self.engine().remove_address(address)
    }

    fn apply_change(&self, change: &ConsensusChange) -> Result<ApplyOutcome, EngineError> {
        self.engine().apply_change(change)
    }

    fn address_source(&self) -> Option<&dyn AddressSource> {
        None
    }

    fn signer(&self) -> Option<&dyn TransactionSigner> {
        None
    }
}

/// Wallets that generate their own addresses.
pub trait AddressSource: Send + Sync {
    fn next_address(&self) -> Result<Address, EngineError>;

    fn seed_index(&self) -> Result<u64, EngineError>;
}

/// Wallets that hold spending keys.
pub trait TransactionSigner: Send + Sync {
    fn sign(&self, txn: &mut Transaction, to_sign: &[OutputId]) -> Result<(), SigningError>;

    fn fund(&self, amount: Currency, fee_per_byte: Currency) -> Result<FundingPlan, FundingError>;
}
