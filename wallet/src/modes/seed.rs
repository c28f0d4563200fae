use std::sync::Arc;

use crate::chain::{Address, Currency, OutputId, Transaction};
use crate::engine::{
    signing, EngineError, FundingError, FundingPlan, SeedKeys, SigningError, WalletEngine,
};

use super::{AddressSource, TransactionSigner, WalletHandle, WalletKind};

/// Spending wallet whose addresses all derive from one seed.
pub struct SeedWallet {
    engine: Arc<WalletEngine>,
    keys: SeedKeys,
}

impl SeedWallet {
    pub fn new(engine: Arc<WalletEngine>, keys: SeedKeys) -> Result<Self, EngineError> {
        if engine.kind() != WalletKind::Seed {
            return Err(EngineError::Validation(format!(
                "seed wallet needs a seed ledger, found {}",
                engine.kind()
            )));
        }
        Ok(Self { engine, keys })
    }

    pub fn fingerprint(&self) -> String {
        self.keys.fingerprint()
    }
}

impl WalletHandle for SeedWallet {
    fn engine(&self) -> &Arc<WalletEngine> {
        &self.engine
    }

    fn add_address(&self, address: Address, _metadata: Vec<u8>) -> Result<(), EngineError> {
        Err(EngineError::Validation(format!(
            "seed wallets derive their own addresses; cannot watch {address}"
        )))
    }

    fn address_source(&self) -> Option<&dyn AddressSource> {
        Some(self)
    }

    fn signer(&self) -> Option<&dyn TransactionSigner> {
        Some(self)
    }
}

impl AddressSource for SeedWallet {
    fn next_address(&self) -> Result<Address, EngineError> {
        Ok(self.engine.next_derived_address(&self.keys)?.address)
    }

    fn seed_index(&self) -> Result<u64, EngineError> {
        self.engine.seed_index()
    }
}

impl TransactionSigner for SeedWallet {
    fn sign(&self, txn: &mut Transaction, to_sign: &[OutputId]) -> Result<(), SigningError> {
        signing::sign_transaction(&self.engine, &self.keys, txn, to_sign)
    }

    fn fund(&self, amount: Currency, fee_per_byte: Currency) -> Result<FundingPlan, FundingError> {
        self.engine.fund_transaction(amount, fee_per_byte)
    }
}
