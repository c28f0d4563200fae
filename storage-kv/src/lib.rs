//! Small transactional key-value engine used by the wallet ledger.
//!
//! Every commit is sealed into a single checksummed write-ahead log frame, so
//! a batch is either fully visible after a restart or not visible at all.
//! The log is folded into an atomically written snapshot once it grows past a
//! configurable number of frames.

pub mod kv;
pub mod snapshot;
pub mod wal;

pub use kv::{Hash, KvError, LedgerKv, WriteSet};
pub use wal::{FileWal, SequenceNumber, WalError, WriteAheadLog};
