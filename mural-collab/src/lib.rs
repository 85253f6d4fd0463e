//! # mural-collab — real-time collaboration for mural boards
//!
//! Wraps a [`mural_core::Board`] replica in a [`Session`] that persists
//! every delta locally and exchanges deltas and live cursors with the other
//! participants of the same room.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   SyncMessage frames   ┌─────────────┐
//! │ Session A   │ ◄────────────────────► │ Session B   │
//! │ (driver)    │   RoomTransport link   │ (driver)    │
//! └──────┬──────┘  (WebSocket relay or   └──────┬──────┘
//!        │          in-process hub)             │
//!        ▼                                      ▼
//! ┌─────────────┐                        ┌─────────────┐
//! │ Board (yrs) │                        │ Board (yrs) │
//! │ UpdateLog   │                        │ UpdateLog   │
//! └─────────────┘                        └─────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] — bincode wire frames and the sync handshake
//! - [`transport`] — room transports (WebSocket relay, in-process hub)
//! - [`presence`] — ephemeral cursors with heartbeat expiry
//! - [`storage`] — checksummed update log on RocksDB or in memory
//! - [`session`] — the explicitly opened and closed board session

pub mod config;
pub mod presence;
pub mod protocol;
pub mod room;
pub mod session;
pub mod storage;
pub mod transport;

pub use config::{BackoffConfig, SessionConfig};
pub use presence::{PresenceMessage, PresenceRecord, PresenceRoom, PresenceTiming};
pub use protocol::{MessageType, ProtocolError, SyncMessage};
pub use room::{RoomId, DEFAULT_ROOM};
pub use session::{BoardEvent, ConnectionState, Session, SessionError};
pub use storage::{
    DocumentStore, JournalRecord, MemoryLog, Persister, StoreConfig, StoreError, UpdateLog,
};
pub use transport::{
    Link, MemoryHub, MemoryTransport, RoomTransport, TransportError, WebSocketTransport,
};

use std::sync::Arc;

/// Open the update log named by `config`: RocksDB under `data_dir`, or an
/// in-memory log when none is set.
pub fn open_log(config: &SessionConfig) -> Result<Arc<dyn UpdateLog>, StoreError> {
    match &config.data_dir {
        Some(dir) => Ok(Arc::new(DocumentStore::open(StoreConfig::at(dir))?)),
        None => Ok(Arc::new(MemoryLog::new())),
    }
}
