use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::iter::Iterator;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::warn;

/// Logical position of a frame inside the log.
pub type SequenceNumber = u64;

const WAL_FILE_NAME: &str = "ledger.wal";
const FRAME_HEADER_LEN: usize = 4 + CHECKSUM_LEN;
const CHECKSUM_LEN: usize = 8;

/// Abstraction over the write-ahead log used to guarantee durability and ordering.
pub trait WriteAheadLog {
    /// Error type emitted by the WAL implementation.
    type Error;

    /// Logical sequence identifier that monotonically increases with every append.
    type SequenceNumber: Copy + Ord;

    /// Append a raw record to the log, returning the assigned sequence number.
    fn append(&mut self, record: &[u8]) -> Result<Self::SequenceNumber, Self::Error>;

    /// Force buffered log data to be persisted.
    fn sync(&mut self) -> Result<(), Self::Error>;

    /// Replay the log starting at `sequence`, yielding each record payload in order.
    fn replay_from(
        &self,
        sequence: Self::SequenceNumber,
    ) -> Result<Box<dyn Iterator<Item = Vec<u8>> + '_>, Self::Error>;

    /// Discard all log entries with sequence numbers greater than or equal to `sequence`.
    fn truncate(&mut self, sequence: Self::SequenceNumber) -> Result<(), Self::Error>;
}

#[derive(Debug, Error)]
pub enum WalError {
    #[error("wal io error: {0}")]
    Io(#[from] io::Error),
    #[error("wal frame {sequence} failed checksum validation")]
    Corrupt { sequence: SequenceNumber },
    #[error("wal record of {0} bytes exceeds the frame limit")]
    RecordTooLarge(usize),
}

/// Append-only file log. Each frame is `len (u32 LE) | checksum | payload`,
/// where the checksum is the leading bytes of the payload's blake3 digest.
#[derive(Debug)]
pub struct FileWal {
    path: PathBuf,
    file: File,
    /// Byte offset of every intact frame, indexed by sequence number.
    offsets: Vec<u64>,
    len: u64,
}

impl FileWal {
    /// Open the log inside `directory`, dropping any torn tail left by a crash.
    pub fn open<P: AsRef<Path>>(directory: P) -> Result<Self, WalError> {
        let path = directory.as_ref().join(WAL_FILE_NAME);
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let mut contents = Vec::new();
        file.read_to_end(&mut contents)?;
        let (offsets, intact_len) = scan_frames(&contents);
        if intact_len < contents.len() as u64 {
            warn!(
                path = %path.display(),
                discarded = contents.len() as u64 - intact_len,
                "discarding torn write-ahead log tail"
            );
            file.set_len(intact_len)?;
            file.sync_all()?;
        }
        file.seek(SeekFrom::Start(intact_len))?;

        Ok(Self {
            path,
            file,
            offsets,
            len: intact_len,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of intact frames currently held by the log.
    pub fn frame_count(&self) -> usize {
        self.offsets.len()
    }

    /// Drop every frame, leaving an empty log.
    pub fn reset(&mut self) -> Result<(), WalError> {
        self.truncate(0)
    }

    fn read_all(&self) -> Result<Vec<u8>, WalError> {
        let mut file = File::open(&self.path)?;
        let mut contents = Vec::with_capacity(self.len as usize);
        file.read_to_end(&mut contents)?;
        contents.truncate(self.len as usize);
        Ok(contents)
    }
}

impl WriteAheadLog for FileWal {
    type Error = WalError;
    type SequenceNumber = SequenceNumber;

    fn append(&mut self, record: &[u8]) -> Result<SequenceNumber, WalError> {
        let len = u32::try_from(record.len()).map_err(|_| WalError::RecordTooLarge(record.len()))?;
        let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + record.len());
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(&checksum(record));
        frame.extend_from_slice(record);

        if let Err(err) = self.file.write_all(&frame) {
            // Roll back a partial frame so later appends do not land behind garbage.
            let _ = self.file.set_len(self.len);
            let _ = self.file.seek(SeekFrom::Start(self.len));
            return Err(err.into());
        }

        let sequence = self.offsets.len() as SequenceNumber;
        self.offsets.push(self.len);
        self.len += frame.len() as u64;
        Ok(sequence)
    }

    fn sync(&mut self) -> Result<(), WalError> {
        self.file.sync_data()?;
        Ok(())
    }

    fn replay_from(
        &self,
        sequence: SequenceNumber,
    ) -> Result<Box<dyn Iterator<Item = Vec<u8>> + '_>, WalError> {
        let contents = self.read_all()?;
        let start = match self.offsets.get(sequence as usize) {
            Some(offset) => *offset as usize,
            None => return Ok(Box::new(std::iter::empty())),
        };

        let mut records = Vec::with_capacity(self.offsets.len() - sequence as usize);
        let mut cursor = start;
        let mut current = sequence;
        while cursor < contents.len() {
            match decode_frame(&contents[cursor..]) {
                Some((payload, consumed)) => {
                    records.push(payload.to_vec());
                    cursor += consumed;
                    current += 1;
                }
                None => return Err(WalError::Corrupt { sequence: current }),
            }
        }
        Ok(Box::new(records.into_iter()))
    }

    fn truncate(&mut self, sequence: SequenceNumber) -> Result<(), WalError> {
        let Some(&offset) = self.offsets.get(sequence as usize) else {
            return Ok(());
        };
        self.file.set_len(offset)?;
        self.file.sync_all()?;
        self.file.seek(SeekFrom::Start(offset))?;
        self.offsets.truncate(sequence as usize);
        self.len = offset;
        Ok(())
    }
}

fn checksum(payload: &[u8]) -> [u8; CHECKSUM_LEN] {
    let digest = blake3::hash(payload);
    let mut out = [0u8; CHECKSUM_LEN];
    out.copy_from_slice(&digest.as_bytes()[..CHECKSUM_LEN]);
    out
}

/// Decode one frame from the head of `bytes`, returning the payload and the
/// number of bytes consumed. `None` marks a torn or corrupt frame.
fn decode_frame(bytes: &[u8]) -> Option<(&[u8], usize)> {
    if bytes.len() < FRAME_HEADER_LEN {
        return None;
    }
    let mut len_bytes = [0u8; 4];
    len_bytes.copy_from_slice(&bytes[..4]);
    let len = u32::from_le_bytes(len_bytes) as usize;
    let end = FRAME_HEADER_LEN.checked_add(len)?;
    if bytes.len() < end {
        return None;
    }
    let payload = &bytes[FRAME_HEADER_LEN..end];
    if bytes[4..FRAME_HEADER_LEN] != checksum(payload) {
        return None;
    }
    Some((payload, end))
}

fn scan_frames(contents: &[u8]) -> (Vec<u64>, u64) {
    let mut offsets = Vec::new();
    let mut cursor = 0usize;
    while cursor < contents.len() {
        match decode_frame(&contents[cursor..]) {
            Some((_, consumed)) => {
                offsets.push(cursor as u64);
                cursor += consumed;
            }
            None => break,
        }
    }
    (offsets, cursor as u64)
}
