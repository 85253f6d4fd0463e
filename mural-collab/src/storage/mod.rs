//! Durable update log for board documents.
//!
//! ```text
//! ┌─────────────┐  deltas   ┌────────────┐  records   ┌──────────────┐
//! │ Session     │ ────────► │ Persister  │ ─────────► │ UpdateLog    │
//! │ (driver)    │           │ (pending,  │            │ RocksDB or   │
//! └──────┬──────┘           │ compaction)│            │ memory       │
//!        │ on open          └────────────┘            └──────────────┘
//!        ▼
//! snapshot + deltas replayed into a fresh document
//! ```
//!
//! Storage is keyed by [`crate::room::RoomId::storage_key`]. Backends only
//! see opaque encoded [`JournalRecord`]s.

pub mod journal;
pub mod memory;
pub mod persister;
pub mod rocks;

pub use journal::{JournalRecord, RecordKind};
pub use memory::MemoryLog;
pub use persister::{Persister, Restored};
pub use rocks::{DocumentStore, StoreConfig};

use uuid::Uuid;

/// Storage errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("compression error: {0}")]
    Compression(String),

    #[error("checksum mismatch in record {version}")]
    ChecksumMismatch { version: u64 },

    #[error("unsupported record format {0}")]
    UnsupportedFormat(u8),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl From<rocksdb::Error> for StoreError {
    fn from(e: rocksdb::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

/// Everything a backend holds for one room, still encoded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoredLog {
    pub snapshot: Option<Vec<u8>>,
    /// `(version, encoded record)` in version order.
    pub deltas: Vec<(u64, Vec<u8>)>,
}

/// Append-only per-room log with snapshot compaction.
pub trait UpdateLog: Send + Sync {
    fn load(&self, room: Uuid) -> Result<StoredLog, StoreError>;

    /// Store `records` atomically, all or nothing.
    fn append(&self, room: Uuid, records: &[(u64, Vec<u8>)]) -> Result<(), StoreError>;

    /// Replace the snapshot and drop every delta up to `through_version`.
    fn compact(&self, room: Uuid, snapshot: &[u8], through_version: u64)
        -> Result<(), StoreError>;

    /// Make everything written so far durable. Called once on close.
    fn sync(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
