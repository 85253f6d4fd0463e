//! Presence (awareness) channel for live cursors.
//!
//! ## Architecture
//!
//! ```text
//! Local pointer move
//!       │
//!       ▼
//! PresenceRoom::update_local_cursor()
//!       │  (throttled: 33ms, trailing send from poll())
//!       ▼
//! PresenceMessage::Update { seq, … }
//!       │
//!       ▼   (room transport)
//! Remote PresenceRoom::handle_message()
//!       │
//!       ▼
//! observers(full set of other participants)
//! ```
//!
//! Records are never merged into the document. Each participant only ever
//! publishes its own record; remote records disappear on `Leave` or when
//! no update arrives within the timeout.

use log::{debug, trace};
use mural_core::{Cursor, Point};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::protocol::ProtocolError;

// ───────────────────────────────────────────────────────────────────
// Core types
// ───────────────────────────────────────────────────────────────────

/// One participant's transient state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub session_id: Uuid,
    pub name: String,
    /// CSS hex color, e.g. `#4f86f7`.
    pub color: String,
    pub cursor: Option<Point>,
    /// Monotonic per-session sequence; older records are dropped.
    pub seq: u64,
}

impl PresenceRecord {
    fn same_content(&self, other: &PresenceRecord) -> bool {
        self.name == other.name && self.color == other.color && self.cursor == other.cursor
    }

    pub fn to_cursor(&self) -> Option<Cursor> {
        self.cursor.map(|position| Cursor {
            id: self.session_id.to_string(),
            name: self.name.clone(),
            color: self.color.clone(),
            position,
        })
    }
}

/// Presence frames carried inside `SyncMessage` payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PresenceMessage {
    Update(PresenceRecord),
    /// Clean disconnect.
    Leave { session_id: Uuid },
}

impl PresenceMessage {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let (msg, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| ProtocolError::Deserialization(e.to_string()))?;
        Ok(msg)
    }

    pub fn session_id(&self) -> Uuid {
        match self {
            PresenceMessage::Update(record) => record.session_id,
            PresenceMessage::Leave { session_id } => *session_id,
        }
    }
}

/// Stable, visually distinct hex color for a session id.
pub fn color_for(id: Uuid) -> String {
    let hue = ((id.as_u128() % 360) as f32) / 360.0;
    let (r, g, b) = hsl_to_rgb(hue, 0.7, 0.6);
    format!(
        "#{:02x}{:02x}{:02x}",
        (r * 255.0).round() as u8,
        (g * 255.0).round() as u8,
        (b * 255.0).round() as u8
    )
}

fn hsl_to_rgb(h: f32, s: f32, l: f32) -> (f32, f32, f32) {
    if s == 0.0 {
        return (l, l, l);
    }

    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;

    (
        hue_to_rgb(p, q, h + 1.0 / 3.0),
        hue_to_rgb(p, q, h),
        hue_to_rgb(p, q, h - 1.0 / 3.0),
    )
}

fn hue_to_rgb(p: f32, q: f32, mut t: f32) -> f32 {
    if t < 0.0 {
        t += 1.0;
    }
    if t > 1.0 {
        t -= 1.0;
    }
    if t < 1.0 / 6.0 {
        return p + (q - p) * 6.0 * t;
    }
    if t < 1.0 / 2.0 {
        return q;
    }
    if t < 2.0 / 3.0 {
        return p + (q - p) * (2.0 / 3.0 - t) * 6.0;
    }
    p
}

// ───────────────────────────────────────────────────────────────────
// Presence room
// ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct PresenceTiming {
    /// Minimum gap between two cursor broadcasts.
    pub throttle: Duration,
    /// Re-send the local record at least this often.
    pub heartbeat: Duration,
    /// Drop remote records not refreshed within this window.
    pub timeout: Duration,
}

impl Default for PresenceTiming {
    fn default() -> Self {
        Self {
            throttle: Duration::from_millis(33),
            heartbeat: Duration::from_secs(10),
            timeout: Duration::from_secs(30),
        }
    }
}

struct RemotePresence {
    record: PresenceRecord,
    last_seen: Instant,
}

type PresenceObserver = Box<dyn Fn(&[PresenceRecord]) + Send + Sync>;

/// Local record plus everything known about the other participants.
///
/// All time-dependent methods take `now` so callers (and tests) control
/// the clock.
pub struct PresenceRoom {
    local: PresenceRecord,
    peers: HashMap<Uuid, RemotePresence>,
    timing: PresenceTiming,
    last_sent: Option<Instant>,
    /// A local change is waiting for the throttle window to pass.
    dirty: bool,
    observers: Vec<PresenceObserver>,
}

impl PresenceRoom {
    /// `color` falls back to [`color_for`] the session id.
    pub fn new(
        session_id: Uuid,
        name: impl Into<String>,
        color: Option<String>,
        timing: PresenceTiming,
    ) -> Self {
        Self {
            local: PresenceRecord {
                session_id,
                name: name.into(),
                color: color.unwrap_or_else(|| color_for(session_id)),
                cursor: None,
                seq: 0,
            },
            peers: HashMap::new(),
            timing,
            last_sent: None,
            dirty: true,
            observers: Vec::new(),
        }
    }

    pub fn local(&self) -> &PresenceRecord {
        &self.local
    }

    pub fn session_id(&self) -> Uuid {
        self.local.session_id
    }

    /// Register a callback fired with all other participants' records
    /// whenever one is added, updated or removed.
    pub fn observe<F>(&mut self, callback: F)
    where
        F: Fn(&[PresenceRecord]) + Send + Sync + 'static,
    {
        self.observers.push(Box::new(callback));
    }

    fn notify(&self) {
        if self.observers.is_empty() {
            return;
        }
        let records = self.peers();
        for observer in &self.observers {
            observer(&records);
        }
    }

    // ── Local side ──────────────────────────────────────────────

    fn stamp(&mut self, now: Instant) -> PresenceMessage {
        self.local.seq += 1;
        self.last_sent = Some(now);
        self.dirty = false;
        PresenceMessage::Update(self.local.clone())
    }

    fn throttle_elapsed(&self, now: Instant) -> bool {
        self.last_sent
            .is_none_or(|sent| now.saturating_duration_since(sent) >= self.timing.throttle)
    }

    /// Set the local cursor. Returns a message to broadcast unless throttled,
    /// in which case [`PresenceRoom::poll`] sends the latest value later.
    pub fn update_local_cursor(
        &mut self,
        position: Option<Point>,
        now: Instant,
    ) -> Option<PresenceMessage> {
        self.local.cursor = position;
        self.dirty = true;
        if self.throttle_elapsed(now) {
            Some(self.stamp(now))
        } else {
            None
        }
    }

    /// Change display name and color. Sent on the next poll.
    pub fn set_profile(&mut self, name: impl Into<String>, color: Option<String>) {
        self.local.name = name.into();
        if let Some(color) = color {
            self.local.color = color;
        }
        self.dirty = true;
    }

    /// Trailing cursor send or heartbeat, whichever is due.
    pub fn poll(&mut self, now: Instant) -> Option<PresenceMessage> {
        if self.dirty && self.throttle_elapsed(now) {
            return Some(self.stamp(now));
        }
        let heartbeat_due = self
            .last_sent
            .is_none_or(|sent| now.saturating_duration_since(sent) >= self.timing.heartbeat);
        if heartbeat_due {
            trace!("presence heartbeat seq {}", self.local.seq + 1);
            return Some(self.stamp(now));
        }
        None
    }

    /// Record for immediate broadcast, e.g. right after (re)connecting.
    pub fn announce(&mut self, now: Instant) -> PresenceMessage {
        self.stamp(now)
    }

    pub fn leave_message(&self) -> PresenceMessage {
        PresenceMessage::Leave {
            session_id: self.local.session_id,
        }
    }

    // ── Remote side ─────────────────────────────────────────────

    /// Apply a message from another participant. Returns `true` if the
    /// visible set of records changed.
    pub fn handle_message(&mut self, msg: &PresenceMessage, now: Instant) -> bool {
        if msg.session_id() == self.local.session_id {
            return false;
        }

        let changed = match msg {
            PresenceMessage::Update(record) => match self.peers.get_mut(&record.session_id) {
                Some(existing) if record.seq < existing.record.seq => {
                    trace!("stale presence seq {} from {}", record.seq, record.session_id);
                    false
                }
                Some(existing) => {
                    let changed = !existing.record.same_content(record);
                    existing.record = record.clone();
                    existing.last_seen = now;
                    changed
                }
                None => {
                    debug!("participant {} ({}) joined", record.name, record.session_id);
                    self.peers.insert(
                        record.session_id,
                        RemotePresence {
                            record: record.clone(),
                            last_seen: now,
                        },
                    );
                    true
                }
            },
            PresenceMessage::Leave { session_id } => {
                let removed = self.peers.remove(session_id).is_some();
                if removed {
                    debug!("participant {} left", session_id);
                }
                removed
            }
        };

        if changed {
            self.notify();
        }
        changed
    }

    /// Remove participants silent for longer than the timeout.
    pub fn expire(&mut self, now: Instant) -> Vec<Uuid> {
        let timeout = self.timing.timeout;
        let stale: Vec<Uuid> = self
            .peers
            .iter()
            .filter(|(_, p)| now.saturating_duration_since(p.last_seen) >= timeout)
            .map(|(id, _)| *id)
            .collect();

        for id in &stale {
            debug!("participant {} timed out", id);
            self.peers.remove(id);
        }
        if !stale.is_empty() {
            self.notify();
        }
        stale
    }

    /// Forget every remote participant, e.g. after losing the link.
    pub fn clear(&mut self) {
        if !self.peers.is_empty() {
            self.peers.clear();
            self.notify();
        }
    }

    /// Other participants, ordered by session id.
    pub fn peers(&self) -> Vec<PresenceRecord> {
        let mut records: Vec<PresenceRecord> =
            self.peers.values().map(|p| p.record.clone()).collect();
        records.sort_by_key(|r| r.session_id);
        records
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Cursors of other participants that have one.
    pub fn cursors(&self) -> Vec<Cursor> {
        cursors_of(&self.peers())
    }
}

pub fn cursors_of(records: &[PresenceRecord]) -> Vec<Cursor> {
    records.iter().filter_map(PresenceRecord::to_cursor).collect()
}
