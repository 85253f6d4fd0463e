//! Binary protocol shared by every room transport.
//!
//! Wire format (bincode-encoded):
//! ```text
//! ┌──────────┬───────────┬──────────┬──────────┬──────────┬──────────┐
//! │ msg_type │ peer_id   │ room     │ target   │ clock    │ payload  │
//! │ 1 byte   │ 16 bytes  │ 16 bytes │ 0/16     │ varint   │ variable │
//! └──────────┴───────────┴──────────┴──────────┴──────────┴──────────┘
//! ```
//!
//! Handshake on (re)connect:
//! ```text
//!  newcomer ── Hello(sv) ─────────────▸ everyone
//!  peer     ── SyncStep2(diff) ───────▸ newcomer   (targeted)
//!  peer     ── SyncStep1(sv) ─────────▸ newcomer   (targeted)
//!  newcomer ── SyncStep2(diff) ───────▸ peer       (targeted)
//! ```
//! After that only `Update` and `Presence` frames flow.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::presence::PresenceMessage;

/// Message types for the sync protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    /// Newcomer announcing its state vector
    Hello = 1,
    /// State vector asking the target for what it is missing
    SyncStep1 = 2,
    /// State diff answering a Hello or SyncStep1
    SyncStep2 = 3,
    /// Incremental document delta
    Update = 4,
    /// Presence record or leave tombstone
    Presence = 5,
}

/// Top-level protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncMessage {
    pub msg_type: MessageType,
    pub peer_id: Uuid,
    /// Storage key of the room, see [`crate::room::RoomId::storage_key`].
    pub room: Uuid,
    /// Only this peer should act on the message. `None` means everyone.
    pub target: Option<Uuid>,
    /// Sender-local counter, informational only.
    pub clock: u64,
    pub payload: Vec<u8>,
}

impl SyncMessage {
    pub fn hello(peer_id: Uuid, room: Uuid, state_vector: Vec<u8>) -> Self {
        Self {
            msg_type: MessageType::Hello,
            peer_id,
            room,
            target: None,
            clock: 0,
            payload: state_vector,
        }
    }

    pub fn sync_step1(peer_id: Uuid, room: Uuid, target: Uuid, state_vector: Vec<u8>) -> Self {
        Self {
            msg_type: MessageType::SyncStep1,
            peer_id,
            room,
            target: Some(target),
            clock: 0,
            payload: state_vector,
        }
    }

    pub fn sync_step2(peer_id: Uuid, room: Uuid, target: Uuid, state_diff: Vec<u8>) -> Self {
        Self {
            msg_type: MessageType::SyncStep2,
            peer_id,
            room,
            target: Some(target),
            clock: 0,
            payload: state_diff,
        }
    }

    pub fn update(peer_id: Uuid, room: Uuid, clock: u64, yrs_update: Vec<u8>) -> Self {
        Self {
            msg_type: MessageType::Update,
            peer_id,
            room,
            target: None,
            clock,
            payload: yrs_update,
        }
    }

    pub fn presence(
        peer_id: Uuid,
        room: Uuid,
        clock: u64,
        message: &PresenceMessage,
    ) -> Result<Self, ProtocolError> {
        Ok(Self {
            msg_type: MessageType::Presence,
            peer_id,
            room,
            target: None,
            clock,
            payload: message.encode()?,
        })
    }

    /// Whether `peer` should handle this message.
    pub fn is_for(&self, peer: Uuid) -> bool {
        !matches!(self.target, Some(t) if t != peer)
    }

    /// Serialize to binary wire format.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    /// Deserialize from binary wire format.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let (msg, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| ProtocolError::Deserialization(e.to_string()))?;
        Ok(msg)
    }

    /// Parse the presence payload.
    pub fn presence_message(&self) -> Result<PresenceMessage, ProtocolError> {
        if self.msg_type != MessageType::Presence {
            return Err(ProtocolError::InvalidMessageType(self.msg_type));
        }
        PresenceMessage::decode(&self.payload)
    }
}

/// Protocol errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProtocolError {
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("deserialization error: {0}")]
    Deserialization(String),
    #[error("unexpected message type {0:?}")]
    InvalidMessageType(MessageType),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presence::PresenceRecord;
    use mural_core::Point;

    #[test]
    fn test_update_roundtrip() {
        let peer = Uuid::new_v4();
        let room = Uuid::new_v4();
        let payload = vec![1, 2, 3, 4, 5];

        let msg = SyncMessage::update(peer, room, 42, payload.clone());
        let decoded = SyncMessage::decode(&msg.encode().unwrap()).unwrap();

        assert_eq!(decoded.msg_type, MessageType::Update);
        assert_eq!(decoded.peer_id, peer);
        assert_eq!(decoded.room, room);
        assert_eq!(decoded.target, None);
        assert_eq!(decoded.clock, 42);
        assert_eq!(decoded.payload, payload);
    }

    #[test]
    fn test_targeted_messages() {
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();
        let room = Uuid::new_v4();

        let step2 = SyncMessage::sync_step2(other, room, me, vec![9]);
        let decoded = SyncMessage::decode(&step2.encode().unwrap()).unwrap();
        assert_eq!(decoded.target, Some(me));
        assert!(decoded.is_for(me));
        assert!(!decoded.is_for(Uuid::new_v4()));

        let hello = SyncMessage::hello(other, room, vec![0]);
        assert!(hello.is_for(me));
    }

    #[test]
    fn test_presence_payload() {
        let peer = Uuid::new_v4();
        let record = PresenceRecord {
            session_id: peer,
            name: "Alice".into(),
            color: "#ff0000".into(),
            cursor: Some(Point::new(10.5, -3.0)),
            seq: 7,
        };
        let msg = SyncMessage::presence(
            peer,
            Uuid::new_v4(),
            7,
            &PresenceMessage::Update(record.clone()),
        )
        .unwrap();

        let decoded = SyncMessage::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(
            decoded.presence_message().unwrap(),
            PresenceMessage::Update(record)
        );
    }

    #[test]
    fn test_presence_payload_on_wrong_type() {
        let msg = SyncMessage::update(Uuid::new_v4(), Uuid::new_v4(), 0, vec![]);
        assert_eq!(
            msg.presence_message(),
            Err(ProtocolError::InvalidMessageType(MessageType::Update))
        );
    }

    #[test]
    fn test_decode_invalid_bytes() {
        let garbage = vec![0xFF, 0xFE, 0xFD];
        assert!(SyncMessage::decode(&garbage).is_err());
    }

    #[test]
    fn test_update_size_efficient() {
        let msg = SyncMessage::update(Uuid::new_v4(), Uuid::new_v4(), 1, vec![0u8; 50]);
        let encoded = msg.encode().unwrap();
        assert!(encoded.len() < 150, "encoded size {} too large", encoded.len());
    }

    #[test]
    fn test_message_type_values() {
        assert_eq!(MessageType::Hello as u8, 1);
        assert_eq!(MessageType::SyncStep1 as u8, 2);
        assert_eq!(MessageType::SyncStep2 as u8, 3);
        assert_eq!(MessageType::Update as u8, 4);
        assert_eq!(MessageType::Presence as u8, 5);
    }
}
