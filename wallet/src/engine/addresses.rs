use blake2::{Blake2s256, Digest};
use ed25519_dalek::SigningKey;
use tracing::debug;
use zeroize::Zeroizing;

use crate::chain::{Address, UnlockConditions};
use crate::db::{AddressPolicy, AddressRecord};
use crate::modes::WalletKind;

use super::{EngineError, WalletEngine};

/// Seed material from which every spendable address of a seed wallet is derived.
pub struct SeedKeys {
    seed: Zeroizing<[u8; 32]>,
}

impl SeedKeys {
    pub fn new(seed: [u8; 32]) -> Self {
        Self {
            seed: Zeroizing::new(seed),
        }
    }

    /// Stable identifier of the seed that does not reveal it.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Blake2s256::new();
        hasher.update(b"walrus/fingerprint");
        hasher.update(self.seed.as_slice());
        hex::encode(hasher.finalize())
    }

    /// Ed25519 key at derivation `index`.
    pub fn signing_key(&self, index: u64) -> SigningKey {
        let mut hasher = Blake2s256::new();
        hasher.update(self.seed.as_slice());
        hasher.update(index.to_le_bytes());
        let digest = hasher.finalize();
        let mut secret = Zeroizing::new([0u8; 32]);
        secret.copy_from_slice(&digest);
        SigningKey::from_bytes(&secret)
    }

    pub fn unlock_conditions(&self, index: u64) -> UnlockConditions {
        UnlockConditions::standard(self.signing_key(index).verifying_key().to_bytes())
    }
}

impl WalletEngine {
    fn check_policy(&self, address: &Address, policy: &AddressPolicy) -> Result<(), EngineError> {
        if policy.kind() != self.kind {
            return Err(EngineError::Validation(format!(
                "{} policy not accepted by a {} wallet",
                policy.kind(),
                self.kind
            )));
        }
        if let AddressPolicy::Derived {
            unlock_conditions, ..
        } = policy
        {
            if unlock_conditions.address() != *address {
                return Err(EngineError::Validation(format!(
                    "unlock conditions do not hash to {address}"
                )));
            }
        }
        Ok(())
    }

    /// Insert or overwrite the address book entry for `address`.
    pub fn add_address(&self, address: Address, policy: AddressPolicy) -> Result<(), EngineError> {
        self.check_policy(&address, &policy)?;
        let mut store = self.write_ledger()?;
        let mut batch = store.batch();
        batch.put_address(&AddressRecord { address, policy })?;
        batch.commit()?;
        debug!(%address, "address book entry stored");
        Ok(())
    }

    /// Drop the address book entry. Outputs and history already recorded for
    /// the address are kept. Returns whether an entry existed.
    ///
    /// Derived addresses stay for the life of the wallet; the outputs they
    /// own must remain spendable.
    pub fn remove_address(&self, address: &Address) -> Result<bool, EngineError> {
        let mut store = self.write_ledger()?;
        match store.view().address_policy(address)? {
            None => return Ok(false),
            Some(AddressPolicy::Derived { .. }) => {
                return Err(EngineError::Validation(format!(
                    "derived address {address} cannot be removed"
                )));
            }
            Some(AddressPolicy::Watched { .. }) => {}
        }
        let mut batch = store.batch();
        batch.delete_address(address);
        batch.commit()?;
        debug!(%address, "address book entry removed");
        Ok(true)
    }

    pub fn lookup_address(&self, address: &Address) -> Result<Option<AddressPolicy>, EngineError> {
        Ok(self.read_ledger()?.view().address_policy(address)?)
    }

    pub fn owns_address(&self, address: &Address) -> Result<bool, EngineError> {
        Ok(self.read_ledger()?.view().contains_address(address))
    }

    /// Every tracked address in byte order.
    pub fn addresses(&self) -> Result<Vec<Address>, EngineError> {
        let records = self.read_ledger()?.view().addresses()?;
        Ok(records.into_iter().map(|record| record.address).collect())
    }

    pub fn address_entries(&self) -> Result<Vec<AddressRecord>, EngineError> {
        Ok(self.read_ledger()?.view().addresses()?)
    }

    /// Entries for the requested addresses; unknown addresses are omitted.
    pub fn batch_addresses(&self, addresses: &[Address]) -> Result<Vec<AddressRecord>, EngineError> {
        let store = self.read_ledger()?;
        let view = store.view();
        let mut records = Vec::with_capacity(addresses.len());
        for address in addresses {
            if let Some(policy) = view.address_policy(address)? {
                records.push(AddressRecord {
                    address: *address,
                    policy,
                });
            }
        }
        Ok(records)
    }

    pub fn seed_index(&self) -> Result<u64, EngineError> {
        Ok(self.read_ledger()?.view().seed_index()?)
    }

    /// Derive the address at the current seed index, record it and advance
    /// the index, all in one commit.
    pub fn next_derived_address(&self, keys: &SeedKeys) -> Result<AddressRecord, EngineError> {
        if self.kind != WalletKind::Seed {
            return Err(EngineError::Validation(format!(
                "a {} wallet cannot derive addresses",
                self.kind
            )));
        }
        let mut store = self.write_ledger()?;
        let index = store.view().seed_index()?;
        let unlock_conditions = keys.unlock_conditions(index);
        let record = AddressRecord {
            address: unlock_conditions.address(),
            policy: AddressPolicy::Derived {
                seed_index: index,
                unlock_conditions,
            },
        };
        let mut batch = store.batch();
        batch.put_address(&record)?;
        batch.set_seed_index(index + 1)?;
        batch.commit()?;
        debug!(address = %record.address, index, "derived new seed address");
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn derivation_is_deterministic_per_index() {
        let keys = SeedKeys::new([7u8; 32]);
        assert_eq!(
            keys.unlock_conditions(3).address(),
            SeedKeys::new([7u8; 32]).unlock_conditions(3).address()
        );
        assert_ne!(
            keys.unlock_conditions(3).address(),
            keys.unlock_conditions(4).address()
        );
        assert_eq!(keys.fingerprint().len(), 64);
    }

    #[test]
    fn next_address_advances_the_seed_index() {
        let dir = tempdir().expect("tempdir");
        let engine = WalletEngine::open(dir.path(), WalletKind::Seed, 144).expect("open");
        let keys = SeedKeys::new([1u8; 32]);
        assert_eq!(engine.seed_index().expect("index"), 0);

        let first = engine.next_derived_address(&keys).expect("derive");
        let second = engine.next_derived_address(&keys).expect("derive");
        assert_ne!(first.address, second.address);
        assert_eq!(engine.seed_index().expect("index"), 2);
        assert_eq!(first.address, keys.unlock_conditions(0).address());
        assert!(engine.owns_address(&second.address).expect("owns"));
    }

    #[test]
    fn watch_only_upsert_overwrites_metadata_and_rejects_derived_entries() {
        let dir = tempdir().expect("tempdir");
        let engine = WalletEngine::open(dir.path(), WalletKind::WatchOnly, 144).expect("open");
        let address = Address::new([9u8; 32]);
        engine
            .add_address(address, AddressPolicy::Watched { metadata: b"a".to_vec() })
            .expect("add");
        engine
            .add_address(address, AddressPolicy::Watched { metadata: b"b".to_vec() })
            .expect("re-add");
        assert_eq!(
            engine.lookup_address(&address).expect("lookup"),
            Some(AddressPolicy::Watched { metadata: b"b".to_vec() })
        );

        let keys = SeedKeys::new([2u8; 32]);
        let conditions = keys.unlock_conditions(0);
        let err = engine
            .add_address(
                conditions.address(),
                AddressPolicy::Derived {
                    seed_index: 0,
                    unlock_conditions: conditions,
                },
            )
            .expect_err("kind mismatch");
        assert!(matches!(err, EngineError::Validation(_)));
        assert!(engine.next_derived_address(&keys).is_err());
    }

    #[test]
    fn batch_lookup_omits_unknown_addresses() {
        let dir = tempdir().expect("tempdir");
        let engine = WalletEngine::open(dir.path(), WalletKind::WatchOnly, 144).expect("open");
        let known = Address::new([1u8; 32]);
        engine
            .add_address(known, AddressPolicy::Watched { metadata: Vec::new() })
            .expect("add");
        let records = engine
            .batch_addresses(&[Address::new([2u8; 32]), known])
            .expect("batch");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].address, known);
        assert!(engine.remove_address(&known).expect("remove"));
        assert!(engine.addresses().expect("list").is_empty());
    }
}
