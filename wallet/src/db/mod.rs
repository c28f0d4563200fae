pub mod codec;
pub mod schema;
pub mod store;

pub use codec::{
    AddressPolicy, AddressRecord, BlockReward, ChainState, ContractRecord, HistoryEntry,
    InputValue, LimboEntry, UtxoRecord,
};
pub use store::{LedgerView, WalletStore, WalletStoreBatch, WalletStoreError};
