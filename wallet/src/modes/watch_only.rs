use std::sync::Arc;

use crate::chain::Address;
use crate::db::AddressPolicy;
use crate::engine::{EngineError, WalletEngine};

use super::{WalletHandle, WalletKind};

/// Tracking-only wallet over explicitly watched addresses.
pub struct WatchOnlyWallet {
    engine: Arc<WalletEngine>,
}

impl WatchOnlyWallet {
    pub fn new(engine: Arc<WalletEngine>) -> Result<Self, EngineError> {
        if engine.kind() != WalletKind::WatchOnly {
            return Err(EngineError::Validation(format!(
                "watch-only wallet needs a watch-only ledger, found {}",
                engine.kind()
            )));
        }
        Ok(Self { engine })
    }
}

impl WalletHandle for WatchOnlyWallet {
    fn engine(&self) -> &Arc<WalletEngine> {
        &self.engine
    }

    fn add_address(&self, address: Address, metadata: Vec<u8>) -> Result<(), EngineError> {
        self.engine
            .add_address(address, AddressPolicy::Watched { metadata })
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::engine::SeedKeys;
    use crate::modes::SeedWallet;

    #[test]
    fn variants_expose_only_their_capabilities() {
        let dir = tempdir().expect("tempdir");
        let engine = Arc::new(
            WalletEngine::open(&dir.path().join("watch"), WalletKind::WatchOnly, 144)
                .expect("open"),
        );
        let watch = WatchOnlyWallet::new(engine.clone()).expect("watch wallet");
        assert!(watch.signer().is_none());
        assert!(watch.address_source().is_none());
        watch
            .add_address(Address::new([1u8; 32]), b"label".to_vec())
            .expect("watch address");
        assert!(SeedWallet::new(engine, SeedKeys::new([0u8; 32])).is_err());

        let seed_engine = Arc::new(
            WalletEngine::open(&dir.path().join("seed"), WalletKind::Seed, 144).expect("open"),
        );
        let seed = SeedWallet::new(seed_engine, SeedKeys::new([0u8; 32])).expect("seed wallet");
        assert!(seed.signer().is_some());
        let source = seed.address_source().expect("address source");
        let address = source.next_address().expect("next address");
        assert_eq!(source.seed_index().expect("index"), 1);
        assert!(seed
            .add_address(Address::new([2u8; 32]), Vec::new())
            .is_err());
        assert!(seed.remove_address(&address).is_err());
    }
}
