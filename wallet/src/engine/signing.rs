use ed25519_dalek::{Signature, Signer, Verifier, VerifyingKey};
use tracing::debug;

use crate::chain::{Address, OutputId, Transaction, TransactionSignature};
use crate::db::AddressPolicy;

use super::addresses::SeedKeys;
use super::{EngineError, WalletEngine};

#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    #[error("no signature entry covers input {0}")]
    SignatureNotFound(OutputId),
    #[error("transaction has no input spending {0}")]
    InputNotFound(OutputId),
    #[error("wallet holds no key for address {0}")]
    UnknownKey(Address),
    #[error("signature {index} does not verify")]
    InvalidSignature { index: usize },
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Sign `txn` with keys derived from `keys`.
///
/// An empty `to_sign` adds and fills a whole-transaction signature for every
/// input owned by a derived address. Otherwise each listed parent id must
/// already have a signature entry, which gets filled.
pub fn sign_transaction(
    engine: &WalletEngine,
    keys: &SeedKeys,
    txn: &mut Transaction,
    to_sign: &[OutputId],
) -> Result<(), SigningError> {
    // Every key lookup finishes before `txn` is touched, so a failed lookup
    // leaves the transaction as it was handed in.
    let plan = {
        let store = engine.read_ledger()?;
        let view = store.view();
        let mut plan: Vec<(usize, u64)> = Vec::new();
        if to_sign.is_empty() {
            let mut owned: Vec<(OutputId, u64)> = Vec::new();
            for input in &txn.siacoin_inputs {
                let address = input.unlock_conditions.address();
                if let Some(AddressPolicy::Derived { seed_index, .. }) =
                    view.address_policy(&address).map_err(EngineError::from)?
                {
                    owned.push((input.parent_id, seed_index));
                }
            }
            for (parent_id, seed_index) in owned {
                txn.signatures
                    .push(TransactionSignature::whole_transaction(parent_id));
                plan.push((txn.signatures.len() - 1, seed_index));
            }
        } else {
            for parent_id in to_sign {
                let index = txn
                    .signatures
                    .iter()
                    .position(|signature| signature.parent_id == *parent_id)
                    .ok_or(SigningError::SignatureNotFound(*parent_id))?;
                let input = txn
                    .siacoin_inputs
                    .iter()
                    .find(|input| input.parent_id == *parent_id)
                    .ok_or(SigningError::InputNotFound(*parent_id))?;
                let address = input.unlock_conditions.address();
                match view.address_policy(&address).map_err(EngineError::from)? {
                    Some(AddressPolicy::Derived { seed_index, .. }) => plan.push((index, seed_index)),
                    _ => return Err(SigningError::UnknownKey(address)),
                }
            }
        }
        plan
    };

    for (index, seed_index) in plan {
        let parent_id = txn.signatures[index].parent_id;
        let digest = txn
            .sig_hash(index)
            .ok_or(SigningError::SignatureNotFound(parent_id))?;
        let signature = keys.signing_key(seed_index).sign(&digest);
        txn.signatures[index].signature = signature.to_bytes().to_vec();
        debug!(input = %parent_id, seed_index, "input signed");
    }
    Ok(())
}

/// Check every filled signature against the key its input names.
pub fn verify_signatures(txn: &Transaction) -> Result<(), SigningError> {
    for (index, entry) in txn.signatures.iter().enumerate() {
        let input = txn
            .siacoin_inputs
            .iter()
            .find(|input| input.parent_id == entry.parent_id)
            .ok_or(SigningError::InputNotFound(entry.parent_id))?;
        let invalid = || SigningError::InvalidSignature { index };
        let public_key = input
            .unlock_conditions
            .public_keys
            .get(entry.public_key_index as usize)
            .ok_or_else(invalid)?;
        let key = VerifyingKey::from_bytes(public_key).map_err(|_| invalid())?;
        let signature = Signature::from_slice(&entry.signature).map_err(|_| invalid())?;
        let digest = txn.sig_hash(index).ok_or_else(invalid)?;
        key.verify(&digest, &signature).map_err(|_| invalid())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::chain::{SiacoinInput, SiacoinOutput, UnlockConditions};
    use crate::modes::WalletKind;

    fn spend(unlock_conditions: UnlockConditions, parent: u8) -> SiacoinInput {
        SiacoinInput {
            parent_id: OutputId::new([parent; 32]),
            unlock_conditions,
        }
    }

    #[test]
    fn signs_every_owned_input_when_no_ids_are_given() {
        let dir = tempdir().expect("tempdir");
        let engine = WalletEngine::open(dir.path(), WalletKind::Seed, 144).expect("open");
        let keys = SeedKeys::new([3u8; 32]);
        let owned = engine.next_derived_address(&keys).expect("derive");
        let AddressPolicy::Derived {
            unlock_conditions, ..
        } = owned.policy
        else {
            panic!("seed wallet stores derived policies");
        };

        let mut txn = Transaction {
            siacoin_inputs: vec![
                spend(unlock_conditions, 1),
                spend(UnlockConditions::standard([9u8; 32]), 2),
            ],
            siacoin_outputs: vec![SiacoinOutput {
                value: 5,
                address: Address::new([4u8; 32]),
            }],
            ..Transaction::default()
        };
        sign_transaction(&engine, &keys, &mut txn, &[]).expect("sign");
        assert_eq!(txn.signatures.len(), 1);
        assert_eq!(txn.signatures[0].parent_id, OutputId::new([1u8; 32]));
        verify_signatures(&txn).expect("valid signature");

        txn.miner_fees.push(1);
        assert!(matches!(
            verify_signatures(&txn),
            Err(SigningError::InvalidSignature { index: 0 })
        ));
    }

    #[test]
    fn explicit_ids_need_entries_and_known_keys() {
        let dir = tempdir().expect("tempdir");
        let engine = WalletEngine::open(dir.path(), WalletKind::Seed, 144).expect("open");
        let keys = SeedKeys::new([5u8; 32]);
        let foreign = UnlockConditions::standard([8u8; 32]);
        let mut txn = Transaction {
            siacoin_inputs: vec![spend(foreign.clone(), 1)],
            ..Transaction::default()
        };

        let missing = sign_transaction(&engine, &keys, &mut txn, &[OutputId::new([1u8; 32])]);
        assert!(matches!(missing, Err(SigningError::SignatureNotFound(_))));

        txn.signatures
            .push(TransactionSignature::whole_transaction(OutputId::new([1u8; 32])));
        let unknown = sign_transaction(&engine, &keys, &mut txn, &[OutputId::new([1u8; 32])]);
        assert!(matches!(unknown, Err(SigningError::UnknownKey(address)) if address == foreign.address()));
    }

    #[test]
    fn failed_key_lookup_leaves_the_transaction_untouched() {
        let dir = tempdir().expect("tempdir");
        let keys = SeedKeys::new([6u8; 32]);
        let foreign = UnlockConditions::standard([7u8; 32]);
        let owned = {
            let engine = WalletEngine::open(dir.path(), WalletKind::Seed, 144).expect("open");
            let record = engine.next_derived_address(&keys).expect("derive");
            let AddressPolicy::Derived {
                unlock_conditions, ..
            } = record.policy
            else {
                panic!("seed wallet stores derived policies");
            };
            unlock_conditions
        };
        {
            // An undecodable address book entry for the second input.
            let mut kv = storage_kv::LedgerKv::open(dir.path()).expect("kv");
            let mut set = storage_kv::WriteSet::new();
            let mut key = crate::db::schema::ADDRESSES_NAMESPACE.to_vec();
            key.extend_from_slice(foreign.address().as_bytes());
            set.put(key, vec![0xff; 3]);
            kv.commit(set).expect("corrupt");
        }

        let engine = WalletEngine::open(dir.path(), WalletKind::Seed, 144).expect("reopen");
        let mut txn = Transaction {
            siacoin_inputs: vec![spend(owned, 1), spend(foreign, 2)],
            ..Transaction::default()
        };
        let before = txn.clone();
        let outcome = sign_transaction(&engine, &keys, &mut txn, &[]);
        assert!(matches!(outcome, Err(SigningError::Engine(EngineError::Store(_)))));
        assert_eq!(txn, before);
    }
}
