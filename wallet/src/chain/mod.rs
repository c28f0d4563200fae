//! Chain primitives consumed by the wallet: identifiers, transactions, blocks
//! and the consensus change batches delivered by the feed.

pub mod change;
pub mod types;

pub use change::{
    ConsensusChange, DelayedOutputDiff, DiffDirection, FileContractDiff, SiacoinOutputDiff,
};
pub use types::{
    Address, Block, BlockId, CanonicalEncode, ChangeId, ContractId, CoveredFields, Currency,
    FileContract, FileContractRevision, OutputId, ParseIdError, SiacoinInput, SiacoinOutput,
    Transaction, TransactionId, TransactionSignature, UnlockConditions, SIACOIN_PRECISION,
};
