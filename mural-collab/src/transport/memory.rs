//! In-process room transport.
//!
//! Every room is one tokio broadcast channel; each link gets its own
//! receiver and never sees its own frames. A link that falls behind is
//! closed instead of silently skipping frames, which makes the session
//! reconnect and backfill through the handshake.

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, watch, RwLock};

use super::{Link, RoomTransport, TransportError, LINK_CAPACITY};
use crate::room::RoomId;

#[derive(Clone)]
struct Frame {
    from: u64,
    bytes: Arc<Vec<u8>>,
}

/// Counters for monitoring hub health.
#[derive(Debug, Clone, Default)]
pub struct HubStats {
    pub frames_relayed: u64,
    pub links_dropped: u64,
    pub rooms: usize,
}

struct AtomicHubStats {
    frames_relayed: AtomicU64,
    links_dropped: AtomicU64,
}

struct HubInner {
    rooms: RwLock<HashMap<String, broadcast::Sender<Frame>>>,
    capacity: usize,
    next_link: AtomicU64,
    stats: AtomicHubStats,
}

/// Shared relay for any number of in-process participants.
#[derive(Clone)]
pub struct MemoryHub {
    inner: Arc<HubInner>,
}

impl Default for MemoryHub {
    fn default() -> Self {
        Self::new(LINK_CAPACITY)
    }
}

impl MemoryHub {
    /// `capacity` is the number of frames a link may fall behind before
    /// it is dropped.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(HubInner {
                rooms: RwLock::new(HashMap::new()),
                capacity: capacity.max(1),
                next_link: AtomicU64::new(0),
                stats: AtomicHubStats {
                    frames_relayed: AtomicU64::new(0),
                    links_dropped: AtomicU64::new(0),
                },
            }),
        }
    }

    /// A participant handle that starts online.
    pub fn transport(&self) -> MemoryTransport {
        let (online, _) = watch::channel(true);
        MemoryTransport {
            hub: self.clone(),
            online,
        }
    }

    async fn room(&self, name: &str) -> broadcast::Sender<Frame> {
        {
            let rooms = self.inner.rooms.read().await;
            if let Some(sender) = rooms.get(name) {
                return sender.clone();
            }
        }

        let mut rooms = self.inner.rooms.write().await;
        // Double-check after acquiring write lock
        if let Some(sender) = rooms.get(name) {
            return sender.clone();
        }
        let (sender, _) = broadcast::channel(self.inner.capacity);
        rooms.insert(name.to_string(), sender.clone());
        sender
    }

    pub async fn room_count(&self) -> usize {
        self.inner.rooms.read().await.len()
    }

    /// Links currently joined to `room`.
    pub async fn participants(&self, room: &RoomId) -> usize {
        self.inner
            .rooms
            .read()
            .await
            .get(room.name())
            .map(|s| s.receiver_count())
            .unwrap_or(0)
    }

    pub async fn stats(&self) -> HubStats {
        HubStats {
            frames_relayed: self.inner.stats.frames_relayed.load(Ordering::Relaxed),
            links_dropped: self.inner.stats.links_dropped.load(Ordering::Relaxed),
            rooms: self.room_count().await,
        }
    }
}

/// One participant's connection to a [`MemoryHub`].
///
/// Taking it offline drops its live link and refuses new ones until it is
/// brought back online.
pub struct MemoryTransport {
    hub: MemoryHub,
    online: watch::Sender<bool>,
}

impl MemoryTransport {
    pub fn go_offline(&self) {
        self.online.send_replace(false);
    }

    pub fn go_online(&self) {
        self.online.send_replace(true);
    }

    pub fn is_online(&self) -> bool {
        *self.online.borrow()
    }

    pub fn hub(&self) -> &MemoryHub {
        &self.hub
    }
}

impl RoomTransport for MemoryTransport {
    fn connect<'a>(&'a self, room: &'a RoomId) -> BoxFuture<'a, Result<Link, TransportError>> {
        async move {
            if !self.is_online() {
                return Err(TransportError::Offline);
            }
            let sender = self.hub.room(room.name()).await;
            let link_id = self.hub.inner.next_link.fetch_add(1, Ordering::Relaxed);
            let (link, in_tx, out_rx) = Link::pair(LINK_CAPACITY);
            let frames = sender.subscribe();

            debug!("memory link {} joined room {}", link_id, room);
            tokio::spawn(pump(
                link_id,
                sender,
                frames,
                in_tx,
                out_rx,
                self.online.subscribe(),
                self.hub.inner.clone(),
            ));
            Ok(link)
        }
        .boxed()
    }
}

async fn pump(
    link_id: u64,
    sender: broadcast::Sender<Frame>,
    mut frames: broadcast::Receiver<Frame>,
    in_tx: mpsc::Sender<Vec<u8>>,
    mut out_rx: mpsc::Receiver<Vec<u8>>,
    mut online: watch::Receiver<bool>,
    hub: Arc<HubInner>,
) {
    loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Ok(frame) if frame.from == link_id => {}
                Ok(frame) => match in_tx.try_send(frame.bytes.as_ref().clone()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        warn!("memory link {} inbound full, dropping link", link_id);
                        hub.stats.links_dropped.fetch_add(1, Ordering::Relaxed);
                        break;
                    }
                    Err(TrySendError::Closed(_)) => break,
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("memory link {} lagged by {} frames, dropping link", link_id, skipped);
                    hub.stats.links_dropped.fetch_add(1, Ordering::Relaxed);
                    break;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },

            out = out_rx.recv() => match out {
                Some(bytes) => {
                    // No receivers is fine: nobody else is in the room yet.
                    let _ = sender.send(Frame { from: link_id, bytes: Arc::new(bytes) });
                    hub.stats.frames_relayed.fetch_add(1, Ordering::Relaxed);
                }
                None => break,
            },

            changed = online.changed() => {
                if changed.is_err() || !*online.borrow() {
                    debug!("memory link {} went offline", link_id);
                    break;
                }
            }
        }
    }
}
