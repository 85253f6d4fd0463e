//! Checksummed journal records.
//!
//! Every persisted delta or snapshot is wrapped in a [`JournalRecord`]
//! before it reaches a backend. Records are versioned so the layout can
//! grow, and carry an FNV-1a checksum so a torn or bit-flipped record is
//! skipped at load time instead of poisoning the document.
//!
//! ```text
//! ┌────────┬──────┬─────────┬──────────┬──────────────┬──────────┐
//! │ format │ kind │ version │ room     │ payload(lz4) │ checksum │
//! └────────┴──────┴─────────┴──────────┴──────────────┴──────────┘
//! ```

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::StoreError;

/// Current record layout.
pub const FORMAT_VERSION: u8 = 1;

/// Record type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum RecordKind {
    /// Incremental document delta
    Delta = 1,
    /// Full document state covering every delta up to `version`
    Snapshot = 2,
}

/// One persisted entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalRecord {
    pub format: u8,
    pub kind: RecordKind,
    /// Position in the room's log. Snapshots take the version of the last
    /// delta they cover.
    pub version: u64,
    pub room: Uuid,
    /// LZ4 compressed update bytes
    payload: Vec<u8>,
    checksum: u32,
}

impl JournalRecord {
    pub fn delta(room: Uuid, version: u64, update: &[u8]) -> Self {
        Self::new(RecordKind::Delta, room, version, update)
    }

    pub fn snapshot(room: Uuid, version: u64, state: &[u8]) -> Self {
        Self::new(RecordKind::Snapshot, room, version, state)
    }

    fn new(kind: RecordKind, room: Uuid, version: u64, update: &[u8]) -> Self {
        let payload = lz4_flex::compress_prepend_size(update);
        let checksum = checksum(FORMAT_VERSION, kind, version, &room, &payload);
        Self {
            format: FORMAT_VERSION,
            kind,
            version,
            room,
            payload,
            checksum,
        }
    }

    /// Verify the record's checksum.
    pub fn verify(&self) -> bool {
        self.checksum == checksum(self.format, self.kind, self.version, &self.room, &self.payload)
    }

    /// Decompressed update bytes.
    pub fn update(&self) -> Result<Vec<u8>, StoreError> {
        lz4_flex::decompress_size_prepended(&self.payload)
            .map_err(|e| StoreError::Compression(e.to_string()))
    }

    pub fn encode(&self) -> Result<Vec<u8>, StoreError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Decode and verify. Fails on foreign formats and checksum mismatch.
    pub fn decode(bytes: &[u8]) -> Result<Self, StoreError> {
        let (record, _): (Self, _) =
            bincode::serde::decode_from_slice(bytes, bincode::config::standard())
                .map_err(|e| StoreError::Deserialization(e.to_string()))?;
        if record.format > FORMAT_VERSION {
            return Err(StoreError::UnsupportedFormat(record.format));
        }
        if !record.verify() {
            return Err(StoreError::ChecksumMismatch {
                version: record.version,
            });
        }
        Ok(record)
    }
}

/// FNV-1a over every field that identifies the record.
fn checksum(format: u8, kind: RecordKind, version: u64, room: &Uuid, payload: &[u8]) -> u32 {
    const OFFSET: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;

    let header = [format, kind as u8];
    header
        .iter()
        .chain(version.to_le_bytes().iter())
        .chain(room.as_bytes().iter())
        .chain(payload.iter())
        .fold(OFFSET, |hash, byte| (hash ^ *byte as u32).wrapping_mul(PRIME))
}
