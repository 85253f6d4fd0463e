//! Room transports.
//!
//! A [`RoomTransport`] joins a room and hands back a [`Link`]: a pair of
//! byte-frame channels carrying encoded [`crate::protocol::SyncMessage`]s.
//! Delivery is best effort. Frames may be duplicated, reordered or lost,
//! and the inbound channel closing means the link dropped.

pub mod memory;
pub mod websocket;

use futures_util::future::BoxFuture;
use tokio::sync::mpsc;

use crate::room::RoomId;

pub use memory::{MemoryHub, MemoryTransport};
pub use websocket::WebSocketTransport;

/// Frames buffered per direction before senders wait.
pub const LINK_CAPACITY: usize = 256;

/// Transport errors. None of these are fatal to a session.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("no endpoint reachable: {0}")]
    Unreachable(String),

    #[error("no signaling endpoints configured")]
    NoEndpoints,

    #[error("connect timed out")]
    Timeout,

    #[error("network offline")]
    Offline,

    #[error("link closed")]
    Closed,
}

/// Live connection to a room.
pub struct Link {
    pub outbound: mpsc::Sender<Vec<u8>>,
    pub inbound: mpsc::Receiver<Vec<u8>>,
}

impl Link {
    /// Build both ends of a link. The transport keeps the returned
    /// `(inbound sender, outbound receiver)` pair.
    pub fn pair(capacity: usize) -> (Link, mpsc::Sender<Vec<u8>>, mpsc::Receiver<Vec<u8>>) {
        let (out_tx, out_rx) = mpsc::channel(capacity);
        let (in_tx, in_rx) = mpsc::channel(capacity);
        (
            Link {
                outbound: out_tx,
                inbound: in_rx,
            },
            in_tx,
            out_rx,
        )
    }
}

/// Discovery and relay capability used by a session.
pub trait RoomTransport: Send + Sync {
    fn connect<'a>(&'a self, room: &'a RoomId) -> BoxFuture<'a, Result<Link, TransportError>>;
}
