//! Room identifiers and share links.

use std::fmt;
use uuid::Uuid;

pub const DEFAULT_ROOM: &str = "mural-room-default";

/// Namespace for deriving storage keys from room names.
const ROOM_NAMESPACE: Uuid = Uuid::from_u128(0x6d75_7261_6c2d_4b00_8000_726f_6f6d_7300);

/// Name of the room shared by every replica of one board.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomId {
    name: String,
}

impl Default for RoomId {
    fn default() -> Self {
        Self::new(DEFAULT_ROOM)
    }
}

impl RoomId {
    /// Blank names fall back to [`DEFAULT_ROOM`].
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Self {
                name: DEFAULT_ROOM.to_string(),
            };
        }
        Self {
            name: trimmed.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fixed 16-byte key used for storage and on the wire.
    pub fn storage_key(&self) -> Uuid {
        Uuid::new_v5(&ROOM_NAMESPACE, self.name.as_bytes())
    }

    /// Read the `room` query parameter of a share link.
    pub fn from_share_link(url: &str) -> Self {
        query_of(url)
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| *key == "room")
            .and_then(|(_, value)| urlencoding::decode(value).ok())
            .map(|name| Self::new(name.into_owned()))
            .unwrap_or_default()
    }

    /// `base_url` with its `room` parameter set to this room.
    pub fn share_link(&self, base_url: &str) -> String {
        let (without_fragment, fragment) = match base_url.split_once('#') {
            Some((head, frag)) => (head, Some(frag)),
            None => (base_url, None),
        };
        let (path, query) = without_fragment
            .split_once('?')
            .unwrap_or((without_fragment, ""));

        let room_param = format!("room={}", urlencoding::encode(&self.name));
        let mut params: Vec<&str> = query
            .split('&')
            .filter(|p| !p.is_empty() && *p != "room" && !p.starts_with("room="))
            .collect();
        params.push(&room_param);

        let mut link = format!("{}?{}", path, params.join("&"));
        if let Some(fragment) = fragment {
            link.push('#');
            link.push_str(fragment);
        }
        link
    }
}

fn query_of(url: &str) -> &str {
    let without_fragment = url.split('#').next().unwrap_or(url);
    without_fragment
        .split_once('?')
        .map(|(_, query)| query)
        .unwrap_or("")
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl From<&str> for RoomId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}
