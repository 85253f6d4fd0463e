//! Collaborative board session.
//!
//! A [`Session`] owns one replica of a room's board and a background
//! driver task:
//!
//! ```text
//!  local API ──▸ Board ──outbound──▸ driver ──▸ Persister ──▸ UpdateLog
//!                  ▲                   │
//!                  │                   └──▸ Link (room transport) ──▸ peers
//!                  └────── apply ◂─────────── inbound frames
//! ```
//!
//! The board stays fully usable while the transport is down. Deltas made
//! offline are persisted but not queued for sending: the state-vector
//! handshake on reconnect backfills both sides.

use log::{debug, info, trace, warn};
use mural_core::{
    merge_deltas, Area, Board, Bounds, Card, CardDraft, Collection, Connector, CoreError, Cursor,
    Drawing, Lens, LocalState, Point, ReplicatedStore,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::{broadcast, mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::presence::{cursors_of, PresenceMessage, PresenceRecord, PresenceRoom};
use crate::protocol::{MessageType, ProtocolError, SyncMessage};
use crate::room::RoomId;
use crate::storage::{Persister, StoreError, UpdateLog};
use crate::transport::{Link, RoomTransport, TransportError};

/// Link state as seen by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Working locally; reconnect pending.
    Offline,
    Connecting,
    Connected,
    Closed,
}

/// Re-render and status notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum BoardEvent {
    /// A mirrored collection changed, locally or remotely.
    Changed(Collection),
    /// Cursors of the other participants.
    Cursors(Vec<Cursor>),
    Connection(ConnectionState),
    PersistenceWarning(String),
    /// A remote frame or delta was dropped.
    RejectedUpdate(String),
}

/// Session errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("session driver failed: {0}")]
    Driver(String),
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State shared between the session handle and its driver.
struct Shared {
    config: SessionConfig,
    peer_id: Uuid,
    room_key: Uuid,
    board: Mutex<Board>,
    presence: Mutex<PresenceRoom>,
    /// Latest local presence message waiting to be sent.
    presence_outbox: Mutex<Option<PresenceMessage>>,
    events: broadcast::Sender<BoardEvent>,
    connection: watch::Sender<ConnectionState>,
    /// Local work is waiting for the driver.
    wake: Notify,
}

impl Shared {
    fn emit(&self, event: BoardEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn emit_changed(&self, changed: Vec<Collection>) {
        for collection in changed {
            self.emit(BoardEvent::Changed(collection));
        }
    }

    fn set_connection(&self, state: ConnectionState) {
        let previous = self.connection.send_replace(state);
        if previous != state {
            info!("room {}: {:?}", self.config.room, state);
            self.emit(BoardEvent::Connection(state));
        }
    }
}

/// One participant's open board.
pub struct Session {
    shared: Arc<Shared>,
    shutdown: watch::Sender<bool>,
    driver: Option<JoinHandle<()>>,
}

impl Session {
    /// Restore the room from `log`, then start syncing through `transport`.
    ///
    /// Must be called inside a tokio runtime.
    pub fn open(
        config: SessionConfig,
        transport: Arc<dyn RoomTransport>,
        log: Arc<dyn UpdateLog>,
    ) -> Result<Self, SessionError> {
        let peer_id = Uuid::new_v4();
        let room_key = config.room.storage_key();

        let (persister, restored) = Persister::open(log, room_key, config.compaction_threshold)?;

        let mut board = Board::new(ReplicatedStore::new());
        for update in &restored.updates {
            if let Err(e) = board.apply_remote(update) {
                warn!("skipping unreadable stored update: {}", e);
            }
        }
        board.take_changed();

        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let mut presence = PresenceRoom::new(
            peer_id,
            config.display_name.clone(),
            config.color.clone(),
            config.presence,
        );
        let cursor_events = events.clone();
        presence.observe(move |records: &[PresenceRecord]| {
            let _ = cursor_events.send(BoardEvent::Cursors(cursors_of(records)));
        });

        let (connection, _) = watch::channel(ConnectionState::Offline);
        let shared = Arc::new(Shared {
            config,
            peer_id,
            room_key,
            board: Mutex::new(board),
            presence: Mutex::new(presence),
            presence_outbox: Mutex::new(None),
            events,
            connection,
            wake: Notify::new(),
        });

        let (shutdown, shutdown_rx) = watch::channel(false);
        let driver = Driver {
            shared: shared.clone(),
            transport,
            persister,
            clock: 0,
            shutdown: shutdown_rx,
        };
        let handle = tokio::spawn(driver.run());

        info!(
            "opened room {} as {} ({} stored updates)",
            shared.config.room,
            peer_id,
            restored.updates.len()
        );
        Ok(Self {
            shared,
            shutdown,
            driver: Some(handle),
        })
    }

    /// Leave the room: announce departure, flush storage and stop the
    /// driver. No socket or timer outlives this call.
    pub async fn close(mut self) -> Result<(), SessionError> {
        self.shutdown.send_replace(true);
        if let Some(handle) = self.driver.take() {
            handle
                .await
                .map_err(|e| SessionError::Driver(e.to_string()))?;
        }
        Ok(())
    }

    // ─── Identity ─────────────────────────────────────────────────────

    pub fn room(&self) -> &RoomId {
        &self.shared.config.room
    }

    pub fn peer_id(&self) -> Uuid {
        self.shared.peer_id
    }

    /// URL other participants can open to join this room.
    pub fn share_link(&self) -> String {
        self.shared
            .config
            .room
            .share_link(&self.shared.config.share_base_url)
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.shared.connection.borrow()
    }

    /// Watch connection changes, e.g. `wait_for(|s| *s == Connected)`.
    pub fn connection(&self) -> watch::Receiver<ConnectionState> {
        self.shared.connection.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BoardEvent> {
        self.shared.events.subscribe()
    }

    // ─── Reads ────────────────────────────────────────────────────────

    pub fn state(&self) -> LocalState {
        lock(&self.shared.board).state()
    }

    pub fn cards(&self) -> Vec<Card> {
        lock(&self.shared.board).cards()
    }

    /// Areas with `card_ids` recomputed from geometry.
    pub fn areas(&self) -> Vec<Area> {
        lock(&self.shared.board).areas()
    }

    pub fn connectors(&self) -> Vec<Connector> {
        lock(&self.shared.board).connectors()
    }

    pub fn drawings(&self) -> Vec<Drawing> {
        lock(&self.shared.board).drawings()
    }

    pub fn card(&self, id: &str) -> Option<Card> {
        lock(&self.shared.board).card(id)
    }

    pub fn area(&self, id: &str) -> Option<Area> {
        lock(&self.shared.board).area(id)
    }

    pub fn cards_on_board(&self, lens: Lens) -> Vec<Card> {
        lock(&self.shared.board).cards_on_board(lens)
    }

    pub fn areas_on_board(&self, lens: Lens) -> Vec<Area> {
        lock(&self.shared.board).areas_on_board(lens)
    }

    pub fn blockers_of(&self, card_id: &str) -> Vec<Card> {
        lock(&self.shared.board).blockers_of(card_id)
    }

    pub fn connector_endpoints(&self, connector_id: &str) -> Option<(Card, Card)> {
        lock(&self.shared.board).connector_endpoints(connector_id)
    }

    pub fn lens(&self) -> Lens {
        lock(&self.shared.board).lens()
    }

    pub fn set_lens(&self, lens: Lens) {
        lock(&self.shared.board).set_lens(lens);
    }

    // ─── Writes ───────────────────────────────────────────────────────

    fn mutate<R>(&self, f: impl FnOnce(&mut Board) -> Result<R, CoreError>) -> Result<R, SessionError> {
        let (result, changed, produced) = {
            let mut board = lock(&self.shared.board);
            let result = f(&mut board);
            (result, board.take_changed(), board.has_outbound())
        };
        self.shared.emit_changed(changed);
        if produced {
            self.shared.wake.notify_one();
        }
        Ok(result?)
    }

    /// Run an arbitrary edit against the local state; only what differs
    /// from the document is written.
    pub fn edit<R>(&self, f: impl FnOnce(&mut LocalState) -> R) -> Result<R, SessionError> {
        self.mutate(|board| board.edit(f))
    }

    pub fn add_card(&self, draft: CardDraft) -> Result<Card, SessionError> {
        self.mutate(|board| board.add_card(draft))
    }

    pub fn update_card(&self, id: &str, f: impl FnOnce(&mut Card)) -> Result<Card, SessionError> {
        self.mutate(|board| board.update_card(id, f))
    }

    pub fn move_card(&self, id: &str, position: Point) -> Result<(), SessionError> {
        self.mutate(|board| board.move_card(id, position))
    }

    pub fn delete_card(&self, id: &str) -> Result<bool, SessionError> {
        self.mutate(|board| board.delete_card(id))
    }

    pub fn add_connector(
        &self,
        from_card_id: &str,
        to_card_id: &str,
        is_blocker: bool,
    ) -> Result<Connector, SessionError> {
        self.mutate(|board| board.add_connector(from_card_id, to_card_id, is_blocker))
    }

    pub fn remove_connector(&self, id: &str) -> Result<bool, SessionError> {
        self.mutate(|board| board.remove_connector(id))
    }

    pub fn add_drawing(
        &self,
        points: Vec<Point>,
        color: &str,
        width: f64,
    ) -> Result<Option<Drawing>, SessionError> {
        self.mutate(|board| board.add_drawing(points, color, width))
    }

    pub fn add_area(&self, label: &str, bounds: Bounds) -> Result<Area, SessionError> {
        self.mutate(|board| board.add_area(label, bounds))
    }

    pub fn create_area_around(
        &self,
        card_ids: &[String],
        label: &str,
    ) -> Result<Option<Area>, SessionError> {
        self.mutate(|board| board.create_area_around(card_ids, label))
    }

    pub fn update_area(&self, id: &str, f: impl FnOnce(&mut Area)) -> Result<Area, SessionError> {
        self.mutate(|board| board.update_area(id, f))
    }

    pub fn move_area(&self, id: &str, position: Point) -> Result<(), SessionError> {
        self.mutate(|board| board.move_area(id, position))
    }

    pub fn toggle_area_lock(&self, id: &str) -> Result<bool, SessionError> {
        self.mutate(|board| board.toggle_area_lock(id))
    }

    pub fn organize_area(&self, id: &str) -> Result<usize, SessionError> {
        self.mutate(|board| board.organize_area(id))
    }

    pub fn delete_area(&self, id: &str) -> Result<bool, SessionError> {
        self.mutate(|board| board.delete_area(id))
    }

    // ─── Presence ─────────────────────────────────────────────────────

    /// Report the local pointer. Call on every pointer move; sends are
    /// throttled and the last position is always delivered.
    pub fn update_presence(&self, position: Option<Point>) {
        let msg = lock(&self.shared.presence).update_local_cursor(position, Instant::now());
        if let Some(msg) = msg {
            *lock(&self.shared.presence_outbox) = Some(msg);
            self.shared.wake.notify_one();
        }
    }

    /// Change display name and, optionally, color.
    pub fn set_profile(&self, name: &str, color: Option<String>) {
        lock(&self.shared.presence).set_profile(name, color);
    }

    pub fn cursors(&self) -> Vec<Cursor> {
        lock(&self.shared.presence).cursors()
    }

    /// Other participants, cursor or not.
    pub fn participants(&self) -> Vec<PresenceRecord> {
        lock(&self.shared.presence).peers()
    }

    pub fn local_presence(&self) -> PresenceRecord {
        lock(&self.shared.presence).local().clone()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Stops the driver when the handle is dropped without close().
        self.shutdown.send_replace(true);
    }
}

// ─── Driver ──────────────────────────────────────────────────────────

/// Why the driver stopped using a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkEnd {
    Dropped,
    Shutdown,
}

struct Driver {
    shared: Arc<Shared>,
    transport: Arc<dyn RoomTransport>,
    persister: Persister,
    clock: u64,
    shutdown: watch::Receiver<bool>,
}

impl Driver {
    async fn run(mut self) {
        let room = self.shared.config.room.clone();
        let transport = self.transport.clone();
        let mut attempt: u32 = 0;

        while !*self.shutdown.borrow() {
            self.shared.set_connection(ConnectionState::Connecting);
            let result = tokio::select! {
                result = transport.connect(&room) => result,
                _ = self.shutdown.changed() => break,
            };

            match result {
                Ok(link) => {
                    attempt = 0;
                    self.shared.set_connection(ConnectionState::Connected);
                    let end = self.connected(link).await;
                    lock(&self.shared.presence).clear();
                    if end == LinkEnd::Shutdown {
                        break;
                    }
                    info!("link to room {} dropped", room);
                    self.shared.set_connection(ConnectionState::Offline);
                }
                Err(e) => {
                    self.shared.set_connection(ConnectionState::Offline);
                    let delay = self.shared.config.backoff.delay(attempt);
                    attempt = attempt.saturating_add(1);
                    debug!("connect to room {} failed: {}; retry in {:?}", room, e, delay);
                    if self.offline_for(delay).await == LinkEnd::Shutdown {
                        break;
                    }
                }
            }
        }

        let _ = self.flush_local(None).await;
        if let Err(e) = self.persister.close() {
            warn!(
                "{} updates for room {} not persisted at close: {}",
                self.persister.pending(),
                room,
                e
            );
            self.shared.emit(BoardEvent::PersistenceWarning(e.to_string()));
        }
        self.shared.set_connection(ConnectionState::Closed);
        debug!("driver for room {} stopped", room);
    }

    /// Keep persisting local edits until `delay` passes.
    async fn offline_for(&mut self, delay: std::time::Duration) -> LinkEnd {
        let deadline = tokio::time::sleep(delay);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => return LinkEnd::Dropped,
                _ = self.shared.wake.notified() => {
                    let _ = self.flush_local(None).await;
                }
                _ = self.shutdown.changed() => return LinkEnd::Shutdown,
            }
        }
    }

    async fn connected(&mut self, link: Link) -> LinkEnd {
        let Link {
            outbound,
            mut inbound,
        } = link;

        if self.handshake(&outbound).await.is_err() {
            return LinkEnd::Dropped;
        }

        let mut tick = tokio::time::interval(self.shared.config.presence.throttle);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let step = tokio::select! {
                frame = inbound.recv() => match frame {
                    Some(bytes) => self.handle_frame(&bytes, &outbound).await,
                    None => Err(LinkEnd::Dropped),
                },
                _ = self.shared.wake.notified() => self.flush_local(Some(&outbound)).await,
                _ = tick.tick() => self.tick_presence(&outbound).await,
                _ = self.shutdown.changed() => {
                    let _ = self.flush_local(Some(&outbound)).await;
                    let leave = lock(&self.shared.presence).leave_message();
                    let _ = self.send_presence(&outbound, &leave).await;
                    return LinkEnd::Shutdown;
                }
            };
            if let Err(end) = step {
                return end;
            }
        }
    }

    async fn handshake(&mut self, out: &mpsc::Sender<Vec<u8>>) -> Result<(), LinkEnd> {
        // Edits made while offline are covered by the diff peers request.
        let _ = self.flush_local(None).await;

        let sv = lock(&self.shared.board).store().state_vector();
        self.send(out, SyncMessage::hello(self.shared.peer_id, self.shared.room_key, sv))
            .await?;
        let announce = lock(&self.shared.presence).announce(Instant::now());
        self.send_presence(out, &announce).await
    }

    // ─── Outbound ─────────────────────────────────────────────────────

    async fn send(&mut self, out: &mpsc::Sender<Vec<u8>>, msg: SyncMessage) -> Result<(), LinkEnd> {
        let bytes = match msg.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("dropping {:?} frame: {}", msg.msg_type, e);
                return Ok(());
            }
        };
        trace!("send {:?} ({} bytes)", msg.msg_type, bytes.len());
        out.send(bytes).await.map_err(|_| LinkEnd::Dropped)
    }

    async fn send_presence(
        &mut self,
        out: &mpsc::Sender<Vec<u8>>,
        message: &PresenceMessage,
    ) -> Result<(), LinkEnd> {
        self.clock += 1;
        match SyncMessage::presence(self.shared.peer_id, self.shared.room_key, self.clock, message) {
            Ok(msg) => self.send(out, msg).await,
            Err(e) => {
                warn!("dropping presence frame: {}", e);
                Ok(())
            }
        }
    }

    /// Persist local deltas and, when connected, send them as one update.
    async fn flush_local(&mut self, out: Option<&mpsc::Sender<Vec<u8>>>) -> Result<(), LinkEnd> {
        let deltas = lock(&self.shared.board).take_outbound();
        if !deltas.is_empty() {
            let batch = match merge_deltas(&deltas) {
                Ok(merged) => vec![merged],
                Err(e) => {
                    warn!("could not coalesce {} deltas: {}", deltas.len(), e);
                    deltas
                }
            };
            for update in batch {
                self.persist(&update);
                if let Some(out) = out {
                    self.clock += 1;
                    let msg = SyncMessage::update(
                        self.shared.peer_id,
                        self.shared.room_key,
                        self.clock,
                        update,
                    );
                    self.send(out, msg).await?;
                }
            }
        }

        let presence = lock(&self.shared.presence_outbox).take();
        if let (Some(message), Some(out)) = (presence, out) {
            self.send_presence(out, &message).await?;
        }
        Ok(())
    }

    async fn tick_presence(&mut self, out: &mpsc::Sender<Vec<u8>>) -> Result<(), LinkEnd> {
        let now = Instant::now();
        let message = {
            let mut presence = lock(&self.shared.presence);
            presence.expire(now);
            presence.poll(now)
        };
        match message {
            Some(message) => self.send_presence(out, &message).await,
            None => Ok(()),
        }
    }

    // ─── Durability ───────────────────────────────────────────────────

    fn persist(&mut self, update: &[u8]) {
        if let Err(e) = self.persister.record(update) {
            warn!(
                "persisting update failed ({} pending): {}",
                self.persister.pending(),
                e
            );
            self.shared.emit(BoardEvent::PersistenceWarning(e.to_string()));
            return;
        }
        if self.persister.needs_compaction() {
            let state = lock(&self.shared.board).store().encode_state_as_update();
            if let Err(e) = self.persister.compact(&state) {
                warn!("compaction failed: {}", e);
                self.shared.emit(BoardEvent::PersistenceWarning(e.to_string()));
            }
        }
    }

    // ─── Inbound ──────────────────────────────────────────────────────

    fn reject(&self, reason: String) {
        warn!("rejected frame in room {}: {}", self.shared.config.room, reason);
        self.shared.emit(BoardEvent::RejectedUpdate(reason));
    }

    async fn handle_frame(
        &mut self,
        bytes: &[u8],
        out: &mpsc::Sender<Vec<u8>>,
    ) -> Result<(), LinkEnd> {
        let msg = match SyncMessage::decode(bytes) {
            Ok(msg) => msg,
            Err(e) => {
                self.reject(e.to_string());
                return Ok(());
            }
        };
        let me = self.shared.peer_id;
        if msg.room != self.shared.room_key || msg.peer_id == me || !msg.is_for(me) {
            trace!("ignoring {:?} from {}", msg.msg_type, msg.peer_id);
            return Ok(());
        }
        trace!("recv {:?} from {}", msg.msg_type, msg.peer_id);

        match msg.msg_type {
            MessageType::Hello => {
                debug!("peer {} joined room {}", msg.peer_id, self.shared.config.room);
                self.answer_state_vector(out, msg.peer_id, &msg.payload).await?;
                let sv = lock(&self.shared.board).store().state_vector();
                self.send(
                    out,
                    SyncMessage::sync_step1(me, self.shared.room_key, msg.peer_id, sv),
                )
                .await?;
                let announce = lock(&self.shared.presence).announce(Instant::now());
                self.send_presence(out, &announce).await
            }
            MessageType::SyncStep1 => {
                self.answer_state_vector(out, msg.peer_id, &msg.payload).await
            }
            MessageType::SyncStep2 | MessageType::Update => {
                self.apply_remote(&msg.payload);
                Ok(())
            }
            MessageType::Presence => {
                match msg.presence_message() {
                    Ok(presence) => {
                        lock(&self.shared.presence).handle_message(&presence, Instant::now());
                    }
                    Err(e) => self.reject(e.to_string()),
                }
                Ok(())
            }
        }
    }

    async fn answer_state_vector(
        &mut self,
        out: &mpsc::Sender<Vec<u8>>,
        peer: Uuid,
        state_vector: &[u8],
    ) -> Result<(), LinkEnd> {
        let diff = lock(&self.shared.board).store().encode_diff(state_vector);
        match diff {
            Ok(diff) => {
                let msg = SyncMessage::sync_step2(self.shared.peer_id, self.shared.room_key, peer, diff);
                self.send(out, msg).await
            }
            Err(e) => {
                self.reject(format!("state vector from {peer}: {e}"));
                Ok(())
            }
        }
    }

    fn apply_remote(&mut self, update: &[u8]) {
        let (result, changed) = {
            let mut board = lock(&self.shared.board);
            let result = board.apply_remote(update);
            (result, board.take_changed())
        };

        match result {
            Ok(_) => {
                // Updates parked by yrs for missing dependencies leave the
                // state vector alone but must still reach the log.
                if !ReplicatedStore::is_empty_update(update) {
                    self.persist(update);
                }
                self.shared.emit_changed(changed);
            }
            Err(e) => self.reject(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryLog;
    use crate::transport::MemoryHub;
    use std::time::Duration;

    fn open(hub: &MemoryHub, room: &str) -> Session {
        Session::open(
            SessionConfig::for_testing(room),
            Arc::new(hub.transport()),
            Arc::new(MemoryLog::new()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_local_edit_emits_changed() {
        let hub = MemoryHub::default();
        let session = open(&hub, "events");
        let mut events = session.subscribe();

        session.add_card(CardDraft::default()).unwrap();

        let event = tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                match events.recv().await {
                    Ok(BoardEvent::Changed(c)) => return c,
                    Ok(_) => continue,
                    Err(e) => panic!("event stream ended: {e}"),
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(event, Collection::Cards);
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_connects_and_closes() {
        let hub = MemoryHub::default();
        let session = open(&hub, "lifecycle");
        let mut connection = session.connection();
        tokio::time::timeout(
            Duration::from_secs(1),
            connection.wait_for(|s| *s == ConnectionState::Connected),
        )
        .await
        .unwrap()
        .unwrap();

        session.close().await.unwrap();
        assert_eq!(*connection.borrow(), ConnectionState::Closed);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(hub.participants(&RoomId::new("lifecycle")).await, 0);
    }

    #[tokio::test]
    async fn test_share_link_carries_room() {
        let hub = MemoryHub::default();
        let session = open(&hub, "q3 planning");
        let link = session.share_link();
        assert_eq!(RoomId::from_share_link(&link).name(), "q3 planning");
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_core_errors_surface() {
        let hub = MemoryHub::default();
        let session = open(&hub, "errors");
        let area = session
            .add_area("locked", Bounds::new(0.0, 0.0, 100.0, 100.0))
            .unwrap();
        session.toggle_area_lock(&area.id).unwrap();

        let result = session.move_area(&area.id, Point::new(5.0, 5.0));
        assert!(matches!(
            result,
            Err(SessionError::Core(CoreError::Locked(_)))
        ));
        session.close().await.unwrap();
    }
}
