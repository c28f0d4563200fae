use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::snapshot::{SnapshotFile, SnapshotImage};
use crate::wal::{FileWal, WalError, WriteAheadLog};

/// 32-byte hash output used when sealing commits.
pub type Hash = [u8; 32];

/// Number of WAL frames tolerated before the log is folded into a snapshot.
pub const DEFAULT_COMPACTION_THRESHOLD: usize = 1_024;

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Mutation {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

/// Binary record encoded into a single WAL frame per commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CommitRecord {
    mutations: Vec<Mutation>,
    root: Hash,
}

/// Error type reported by the ledger KV engine.
#[derive(Debug, Error)]
pub enum KvError {
    /// Failure caused by the underlying WAL subsystem.
    #[error("wal error: {0}")]
    Wal(#[from] WalError),
    /// Persistence layer failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// A WAL frame passed its checksum but could not be decoded.
    #[error("undecodable commit record: {0}")]
    Record(#[from] bincode::Error),
    /// Attempted to commit without any staged mutations.
    #[error("no pending mutations to commit")]
    EmptyCommit,
}

/// Mutations staged for a single atomic commit. The last write to a key wins.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteSet {
    ops: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl WriteSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.ops.insert(key, Some(value));
    }

    pub fn delete(&mut self, key: &[u8]) {
        self.ops.insert(key.to_vec(), None);
    }

    /// Staged state for `key`: `Some(None)` is a pending delete, `None` means
    /// the key is untouched by this set.
    pub fn staged(&self, key: &[u8]) -> Option<Option<&[u8]>> {
        self.ops.get(key).map(|value| value.as_deref())
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    fn staged_prefix<'a>(
        &'a self,
        prefix: &'a [u8],
    ) -> impl Iterator<Item = (&'a Vec<u8>, &'a Option<Vec<u8>>)> + 'a {
        self.ops
            .range(prefix.to_vec()..)
            .take_while(move |(key, _)| key.starts_with(prefix))
    }

    fn into_mutations(self) -> Vec<Mutation> {
        self.ops
            .into_iter()
            .map(|(key, value)| match value {
                Some(value) => Mutation::Put { key, value },
                None => Mutation::Delete { key },
            })
            .collect()
    }
}

/// Key-value engine that keeps the full key space in memory and makes it
/// durable through a snapshot plus a write-ahead log of commit records.
#[derive(Debug)]
pub struct LedgerKv {
    base_dir: PathBuf,
    wal: FileWal,
    snapshot: SnapshotFile,
    state: BTreeMap<Vec<u8>, Vec<u8>>,
    root: Hash,
    compaction_threshold: usize,
}

impl LedgerKv {
    /// Open (or create) a store located at `directory`.
    pub fn open<P: AsRef<Path>>(directory: P) -> Result<Self, KvError> {
        Self::open_with_threshold(directory, DEFAULT_COMPACTION_THRESHOLD)
    }

    pub fn open_with_threshold<P: AsRef<Path>>(
        directory: P,
        compaction_threshold: usize,
    ) -> Result<Self, KvError> {
        let directory = directory.as_ref();
        fs::create_dir_all(directory)?;
        let snapshot = SnapshotFile::new(directory);
        let wal = FileWal::open(directory)?;

        let mut kv = LedgerKv {
            base_dir: directory.to_path_buf(),
            wal,
            snapshot,
            state: BTreeMap::new(),
            root: [0u8; 32],
            compaction_threshold: compaction_threshold.max(1),
        };

        if let Some(image) = kv.snapshot.load()? {
            kv.root = image.root;
            kv.state = image.entries.into_iter().collect();
        }
        // Frames written after the snapshot may already be folded into it when
        // a crash hit between snapshot and log reset; replaying them is harmless
        // because each frame fully determines the keys it touches.
        let records = kv
            .wal
            .replay_from(0)?
            .map(|raw| bincode::deserialize::<CommitRecord>(&raw))
            .collect::<Result<Vec<_>, _>>()?;
        let replayed = records.len();
        for record in records {
            kv.apply_mutations(record.mutations);
            kv.root = record.root;
        }
        debug!(
            dir = %kv.base_dir.display(),
            replayed,
            keys = kv.state.len(),
            "ledger kv opened"
        );
        Ok(kv)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Root hash of the last committed state.
    pub fn root(&self) -> Hash {
        self.root
    }

    /// Fetch a committed value by key.
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.state.get(key).cloned()
    }

    /// Fetch a value as seen through the staged `set`.
    pub fn get_staged(&self, set: &WriteSet, key: &[u8]) -> Option<Vec<u8>> {
        match set.staged(key) {
            Some(staged) => staged.map(<[u8]>::to_vec),
            None => self.get(key),
        }
    }

    /// Iterate over the committed state for a specific prefix.
    pub fn scan_prefix<'a>(
        &'a self,
        prefix: &'a [u8],
    ) -> impl Iterator<Item = (Vec<u8>, Vec<u8>)> + 'a {
        self.state
            .range(prefix.to_vec()..)
            .take_while(move |(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
    }

    /// Prefix scan merged with the staged writes of `set`, in key order.
    pub fn scan_prefix_staged(&self, set: &WriteSet, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = self.scan_prefix(prefix).collect();
        for (key, value) in set.staged_prefix(prefix) {
            match value {
                Some(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
        merged.into_iter().collect()
    }

    /// Durably commit `set` and return the resulting state root. In-memory
    /// state changes only after the WAL frame is synced.
    pub fn commit(&mut self, set: WriteSet) -> Result<Hash, KvError> {
        if set.is_empty() {
            return Err(KvError::EmptyCommit);
        }

        let mutations = set.into_mutations();
        let mut next_state = self.state.clone();
        apply_to(&mut next_state, &mutations);
        let root = hash_state(&next_state);

        let record = CommitRecord { mutations, root };
        let raw = bincode::serialize(&record)?;
        let sequence = self.wal.append(&raw)?;
        if let Err(err) = self.wal.sync() {
            if let Err(rollback) = self.wal.truncate(sequence) {
                warn!(sequence, error = %rollback, "failed to roll back unsynced ledger frame");
            }
            return Err(err.into());
        }

        self.state = next_state;
        self.root = root;
        // The frame is durable at this point; a failed fold is retried on
        // the next commit.
        if let Err(error) = self.maybe_compact() {
            warn!(dir = %self.base_dir.display(), %error, "ledger compaction failed");
        }
        Ok(root)
    }

    /// Fold the log into a fresh snapshot.
    pub fn compact(&mut self) -> Result<(), KvError> {
        let image = SnapshotImage {
            root: self.root,
            entries: self
                .state
                .iter()
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        };
        self.snapshot.store(&image)?;
        let folded = self.wal.frame_count();
        self.wal.reset()?;
        info!(
            dir = %self.base_dir.display(),
            folded,
            keys = image.entries.len(),
            "compacted ledger write-ahead log"
        );
        Ok(())
    }

    fn maybe_compact(&mut self) -> Result<(), KvError> {
        if self.wal.frame_count() >= self.compaction_threshold {
            self.compact()?;
        }
        Ok(())
    }

    fn apply_mutations(&mut self, mutations: Vec<Mutation>) {
        apply_to(&mut self.state, &mutations);
    }
}

fn apply_to(state: &mut BTreeMap<Vec<u8>, Vec<u8>>, mutations: &[Mutation]) {
    for mutation in mutations {
        match mutation {
            Mutation::Put { key, value } => {
                state.insert(key.clone(), value.clone());
            }
            Mutation::Delete { key } => {
                state.remove(key);
            }
        }
    }
}

fn hash_state(state: &BTreeMap<Vec<u8>, Vec<u8>>) -> Hash {
    let mut hasher = blake3::Hasher::new();
    for (key, value) in state {
        hasher.update(&(key.len() as u32).to_le_bytes());
        hasher.update(key);
        hasher.update(&(value.len() as u32).to_le_bytes());
        hasher.update(value);
    }
    hasher.finalize().into()
}
