use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::kv::Hash;

const SNAPSHOT_FILE_NAME: &str = "ledger.snapshot";

fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("tmp");
    let mut file = File::create(&tmp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Full copy of the key space taken when the write-ahead log is compacted.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotImage {
    pub root: Hash,
    pub entries: Vec<(Vec<u8>, Vec<u8>)>,
}

#[derive(Serialize, Deserialize)]
struct SealedSnapshot {
    digest: Hash,
    payload: Vec<u8>,
}

/// Location of the compacted snapshot for a ledger directory.
#[derive(Clone, Debug)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new<P: AsRef<Path>>(directory: P) -> Self {
        Self {
            path: directory.as_ref().join(SNAPSHOT_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the snapshot image, or `None` when no compaction has happened yet.
    pub fn load(&self) -> io::Result<Option<SnapshotImage>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err),
        };
        let sealed: SealedSnapshot = bincode::deserialize(&bytes).map_err(invalid_data)?;
        if *blake3::hash(&sealed.payload).as_bytes() != sealed.digest {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "ledger snapshot digest mismatch",
            ));
        }
        let image = bincode::deserialize(&sealed.payload).map_err(invalid_data)?;
        Ok(Some(image))
    }

    /// Replace the snapshot with `image`. The previous snapshot stays intact
    /// until the new one is fully on disk.
    pub fn store(&self, image: &SnapshotImage) -> io::Result<()> {
        let payload = bincode::serialize(image).map_err(invalid_data)?;
        let sealed = SealedSnapshot {
            digest: *blake3::hash(&payload).as_bytes(),
            payload,
        };
        let encoded = bincode::serialize(&sealed).map_err(invalid_data)?;
        atomic_write(&self.path, &encoded)
    }

    pub fn remove(&self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }
}

fn invalid_data(err: bincode::Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn snapshot_roundtrips_through_disk() {
        let dir = tempdir().expect("tempdir");
        let snapshot = SnapshotFile::new(dir.path());
        assert!(snapshot.load().expect("load").is_none());

        let image = SnapshotImage {
            root: [9u8; 32],
            entries: vec![(b"k".to_vec(), b"v".to_vec())],
        };
        snapshot.store(&image).expect("store");
        assert_eq!(snapshot.load().expect("load"), Some(image));
    }

    #[test]
    fn tampered_snapshot_is_rejected() {
        let dir = tempdir().expect("tempdir");
        let snapshot = SnapshotFile::new(dir.path());
        snapshot
            .store(&SnapshotImage {
                root: [1u8; 32],
                entries: vec![(b"alpha".to_vec(), b"one".to_vec())],
            })
            .expect("store");

        let mut bytes = fs::read(snapshot.path()).expect("read");
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        fs::write(snapshot.path(), bytes).expect("write");

        let err = snapshot.load().expect_err("digest mismatch");
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
