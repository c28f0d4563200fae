use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Currency amounts in base units (hastings).
pub type Currency = u128;

/// Number of hastings in one siacoin.
pub const SIACOIN_PRECISION: Currency = 10u128.pow(24);

const SPECIFIER_SIACOIN_OUTPUT: &[u8] = b"siacoin output";
const SPECIFIER_FILE_CONTRACT: &[u8] = b"file contract";
const SPECIFIER_MINER_PAYOUT: &[u8] = b"miner payout";
const SPECIFIER_ED25519: &[u8] = b"ed25519";

/// Error returned when a hex identifier cannot be parsed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseIdError {
    #[error("invalid hex encoding: {0}")]
    Hex(String),
    #[error("expected {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },
}

macro_rules! hash_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub [u8; 32]);

        impl $name {
            pub const fn new(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            pub fn from_slice(bytes: &[u8]) -> Result<Self, ParseIdError> {
                let array: [u8; 32] = bytes.try_into().map_err(|_| ParseIdError::Length {
                    expected: 32,
                    actual: bytes.len(),
                })?;
                Ok(Self(array))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), hex::encode(self.0))
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                let bytes = hex::decode(value).map_err(|err| ParseIdError::Hex(err.to_string()))?;
                Self::from_slice(&bytes)
            }
        }
    };
}

hash_id!(
    /// Identifier of a transaction, covering every field except signatures.
    TransactionId
);
hash_id!(
    /// Identifier of a siacoin output.
    OutputId
);
hash_id!(
    /// Identifier of a file contract.
    ContractId
);
hash_id!(BlockId);
hash_id!(
    /// Opaque cursor naming the last consensus change processed by the wallet.
    /// The zero value marks the start of the chain.
    ChangeId
);
hash_id!(
    /// Hash of a set of unlock conditions.
    Address
);

impl ChangeId {
    pub const BEGINNING: ChangeId = ChangeId([0u8; 32]);
}

/// Deterministic binary encoding used for identifiers, signature hashes and
/// size accounting.
pub trait CanonicalEncode {
    fn encode_to(&self, buf: &mut Vec<u8>);

    fn canonical_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode_to(&mut buf);
        buf
    }
}

impl CanonicalEncode for u64 {
    fn encode_to(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.to_le_bytes());
    }
}

impl CanonicalEncode for u128 {
    fn encode_to(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.to_le_bytes());
    }
}

impl CanonicalEncode for bool {
    fn encode_to(&self, buf: &mut Vec<u8>) {
        buf.push(u8::from(*self));
    }
}

impl CanonicalEncode for [u8; 32] {
    fn encode_to(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self);
    }
}

impl CanonicalEncode for Vec<u8> {
    fn encode_to(&self, buf: &mut Vec<u8>) {
        (self.len() as u64).encode_to(buf);
        buf.extend_from_slice(self);
    }
}

impl<T: CanonicalEncode> CanonicalEncode for [T] {
    fn encode_to(&self, buf: &mut Vec<u8>) {
        (self.len() as u64).encode_to(buf);
        for item in self {
            item.encode_to(buf);
        }
    }
}

macro_rules! encode_id {
    ($($name:ident),*) => {
        $(impl CanonicalEncode for $name {
            fn encode_to(&self, buf: &mut Vec<u8>) {
                buf.extend_from_slice(&self.0);
            }
        })*
    };
}

encode_id!(TransactionId, OutputId, ContractId, BlockId, Address);

fn hash_parts(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Conditions that must be met to spend an output sent to the matching address.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnlockConditions {
    pub timelock: u64,
    pub public_keys: Vec<[u8; 32]>,
    pub signatures_required: u64,
}

impl UnlockConditions {
    /// Standard 1-of-1 conditions for a single Ed25519 key.
    pub fn standard(public_key: [u8; 32]) -> Self {
        Self {
            timelock: 0,
            public_keys: vec![public_key],
            signatures_required: 1,
        }
    }

    pub fn address(&self) -> Address {
        Address(hash_parts(&[SPECIFIER_ED25519, &self.canonical_bytes()]))
    }
}

impl CanonicalEncode for UnlockConditions {
    fn encode_to(&self, buf: &mut Vec<u8>) {
        self.timelock.encode_to(buf);
        self.public_keys.as_slice().encode_to(buf);
        self.signatures_required.encode_to(buf);
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SiacoinInput {
    pub parent_id: OutputId,
    pub unlock_conditions: UnlockConditions,
}

impl CanonicalEncode for SiacoinInput {
    fn encode_to(&self, buf: &mut Vec<u8>) {
        self.parent_id.encode_to(buf);
        self.unlock_conditions.encode_to(buf);
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SiacoinOutput {
    pub value: Currency,
    pub address: Address,
}

impl CanonicalEncode for SiacoinOutput {
    fn encode_to(&self, buf: &mut Vec<u8>) {
        self.value.encode_to(buf);
        self.address.encode_to(buf);
    }
}

/// Storage agreement between a renter and a host.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileContract {
    pub file_size: u64,
    pub file_merkle_root: [u8; 32],
    pub window_start: u64,
    pub window_end: u64,
    pub payout: Currency,
    pub valid_proof_outputs: Vec<SiacoinOutput>,
    pub missed_proof_outputs: Vec<SiacoinOutput>,
    pub unlock_hash: Address,
    pub revision_number: u64,
}

impl FileContract {
    /// Every address that can receive funds from, or control, the contract.
    pub fn addresses(&self) -> impl Iterator<Item = &Address> {
        self.valid_proof_outputs
            .iter()
            .chain(self.missed_proof_outputs.iter())
            .map(|output| &output.address)
            .chain(std::iter::once(&self.unlock_hash))
    }
}

impl CanonicalEncode for FileContract {
    fn encode_to(&self, buf: &mut Vec<u8>) {
        self.file_size.encode_to(buf);
        self.file_merkle_root.encode_to(buf);
        self.window_start.encode_to(buf);
        self.window_end.encode_to(buf);
        self.payout.encode_to(buf);
        self.valid_proof_outputs.as_slice().encode_to(buf);
        self.missed_proof_outputs.as_slice().encode_to(buf);
        self.unlock_hash.encode_to(buf);
        self.revision_number.encode_to(buf);
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileContractRevision {
    pub parent_id: ContractId,
    pub unlock_conditions: UnlockConditions,
    pub new_revision_number: u64,
    pub new_file_size: u64,
    pub new_file_merkle_root: [u8; 32],
    pub new_window_start: u64,
    pub new_window_end: u64,
    pub new_valid_proof_outputs: Vec<SiacoinOutput>,
    pub new_missed_proof_outputs: Vec<SiacoinOutput>,
    pub new_unlock_hash: Address,
}

impl FileContractRevision {
    pub fn addresses(&self) -> impl Iterator<Item = &Address> {
        self.new_valid_proof_outputs
            .iter()
            .chain(self.new_missed_proof_outputs.iter())
            .map(|output| &output.address)
            .chain(std::iter::once(&self.new_unlock_hash))
    }
}

impl CanonicalEncode for FileContractRevision {
    fn encode_to(&self, buf: &mut Vec<u8>) {
        self.parent_id.encode_to(buf);
        self.unlock_conditions.encode_to(buf);
        self.new_revision_number.encode_to(buf);
        self.new_file_size.encode_to(buf);
        self.new_file_merkle_root.encode_to(buf);
        self.new_window_start.encode_to(buf);
        self.new_window_end.encode_to(buf);
        self.new_valid_proof_outputs.as_slice().encode_to(buf);
        self.new_missed_proof_outputs.as_slice().encode_to(buf);
        self.new_unlock_hash.encode_to(buf);
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CoveredFields {
    pub whole_transaction: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionSignature {
    pub parent_id: OutputId,
    pub public_key_index: u64,
    pub timelock: u64,
    pub covered_fields: CoveredFields,
    #[serde(with = "serde_bytes")]
    pub signature: Vec<u8>,
}

impl TransactionSignature {
    /// Unfilled whole-transaction signature entry for the input spending `parent_id`.
    pub fn whole_transaction(parent_id: OutputId) -> Self {
        Self {
            parent_id,
            public_key_index: 0,
            timelock: 0,
            covered_fields: CoveredFields {
                whole_transaction: true,
            },
            signature: Vec::new(),
        }
    }
}

impl CanonicalEncode for TransactionSignature {
    fn encode_to(&self, buf: &mut Vec<u8>) {
        self.parent_id.encode_to(buf);
        self.public_key_index.encode_to(buf);
        self.timelock.encode_to(buf);
        self.covered_fields.whole_transaction.encode_to(buf);
        self.signature.encode_to(buf);
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Transaction {
    pub siacoin_inputs: Vec<SiacoinInput>,
    pub siacoin_outputs: Vec<SiacoinOutput>,
    pub file_contracts: Vec<FileContract>,
    pub file_contract_revisions: Vec<FileContractRevision>,
    pub miner_fees: Vec<Currency>,
    pub arbitrary_data: Vec<Vec<u8>>,
    pub signatures: Vec<TransactionSignature>,
}

impl Transaction {
    fn encode_unsigned(&self, buf: &mut Vec<u8>) {
        self.siacoin_inputs.as_slice().encode_to(buf);
        self.siacoin_outputs.as_slice().encode_to(buf);
        self.file_contracts.as_slice().encode_to(buf);
        self.file_contract_revisions.as_slice().encode_to(buf);
        self.miner_fees.as_slice().encode_to(buf);
        self.arbitrary_data.as_slice().encode_to(buf);
    }

    pub fn id(&self) -> TransactionId {
        let mut buf = Vec::new();
        self.encode_unsigned(&mut buf);
        TransactionId(*blake3::hash(&buf).as_bytes())
    }

    pub fn siacoin_output_id(&self, index: usize) -> OutputId {
        let txid = self.id();
        OutputId(hash_parts(&[
            SPECIFIER_SIACOIN_OUTPUT,
            txid.as_bytes(),
            &(index as u64).to_le_bytes(),
        ]))
    }

    pub fn file_contract_id(&self, index: usize) -> ContractId {
        let txid = self.id();
        ContractId(hash_parts(&[
            SPECIFIER_FILE_CONTRACT,
            txid.as_bytes(),
            &(index as u64).to_le_bytes(),
        ]))
    }

    /// Outputs created by the transaction paired with their identifiers.
    pub fn outputs_with_ids(&self) -> Vec<(OutputId, &SiacoinOutput)> {
        let txid = self.id();
        self.siacoin_outputs
            .iter()
            .enumerate()
            .map(|(index, output)| {
                let id = OutputId(hash_parts(&[
                    SPECIFIER_SIACOIN_OUTPUT,
                    txid.as_bytes(),
                    &(index as u64).to_le_bytes(),
                ]));
                (id, output)
            })
            .collect()
    }

    /// Size of the fully encoded transaction, signatures included.
    pub fn serialized_size(&self) -> u64 {
        self.canonical_bytes().len() as u64
    }

    pub fn total_miner_fees(&self) -> Currency {
        self.miner_fees
            .iter()
            .fold(0u128, |acc, fee| acc.saturating_add(*fee))
    }

    pub fn fee_per_byte(&self) -> Currency {
        let size = self.serialized_size().max(1) as u128;
        self.total_miner_fees() / size
    }

    /// Digest signed by the signature at `signature_index`.
    pub fn sig_hash(&self, signature_index: usize) -> Option<[u8; 32]> {
        let signature = self.signatures.get(signature_index)?;
        let mut buf = Vec::new();
        self.encode_unsigned(&mut buf);
        signature.parent_id.encode_to(&mut buf);
        signature.public_key_index.encode_to(&mut buf);
        signature.timelock.encode_to(&mut buf);
        Some(*blake3::hash(&buf).as_bytes())
    }
}

impl CanonicalEncode for Transaction {
    fn encode_to(&self, buf: &mut Vec<u8>) {
        self.encode_unsigned(buf);
        self.signatures.as_slice().encode_to(buf);
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Block {
    pub parent_id: BlockId,
    pub nonce: u64,
    pub timestamp: u64,
    pub miner_payouts: Vec<SiacoinOutput>,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn id(&self) -> BlockId {
        let mut buf = Vec::new();
        self.parent_id.encode_to(&mut buf);
        self.nonce.encode_to(&mut buf);
        self.timestamp.encode_to(&mut buf);
        self.miner_payouts.as_slice().encode_to(&mut buf);
        for txn in &self.transactions {
            txn.id().encode_to(&mut buf);
        }
        BlockId(*blake3::hash(&buf).as_bytes())
    }

    pub fn miner_payout_id(&self, index: usize) -> OutputId {
        let block_id = self.id();
        OutputId(hash_parts(&[
            SPECIFIER_MINER_PAYOUT,
            block_id.as_bytes(),
            &(index as u64).to_le_bytes(),
        ]))
    }
}
