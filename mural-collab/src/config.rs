//! Session configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::presence::PresenceTiming;
use crate::room::RoomId;

pub const DEFAULT_SIGNALING: &str = "ws://127.0.0.1:4444";
pub const DEFAULT_SHARE_URL: &str = "http://localhost:5173/";

/// Reconnect backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(250),
            max: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl BackoffConfig {
    /// Delay after `attempt` consecutive failures (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(attempt.min(64) as i32);
        let millis = self.initial.as_millis() as f64 * factor;
        Duration::from_millis(millis.min(self.max.as_millis() as f64) as u64)
    }
}

/// Everything needed to open a [`crate::Session`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub room: RoomId,
    pub display_name: String,
    /// Cursor color; derived from the session id when `None`.
    pub color: Option<String>,
    /// Base URL used by `share_link()`
    pub share_base_url: String,
    /// Relay/signaling endpoints, tried in order
    pub signaling: Vec<String>,
    /// RocksDB directory; `None` keeps the log in memory
    pub data_dir: Option<PathBuf>,
    pub connect_timeout: Duration,
    pub presence: PresenceTiming,
    pub backoff: BackoffConfig,
    /// Deltas appended before the log is folded into a snapshot
    pub compaction_threshold: usize,
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            room: RoomId::default(),
            display_name: "Anonymous".to_string(),
            color: None,
            share_base_url: DEFAULT_SHARE_URL.to_string(),
            signaling: vec![DEFAULT_SIGNALING.to_string()],
            data_dir: None,
            connect_timeout: Duration::from_secs(5),
            presence: PresenceTiming::default(),
            backoff: BackoffConfig::default(),
            compaction_threshold: 500,
            event_capacity: 256,
        }
    }
}

impl SessionConfig {
    pub fn for_room(room: impl Into<RoomId>) -> Self {
        Self {
            room: room.into(),
            ..Self::default()
        }
    }

    /// Fast timers for tests.
    pub fn for_testing(room: impl Into<RoomId>) -> Self {
        Self {
            room: room.into(),
            signaling: Vec::new(),
            connect_timeout: Duration::from_millis(500),
            presence: PresenceTiming {
                throttle: Duration::from_millis(5),
                heartbeat: Duration::from_millis(50),
                timeout: Duration::from_millis(200),
            },
            backoff: BackoffConfig {
                initial: Duration::from_millis(10),
                max: Duration::from_millis(100),
                multiplier: 2.0,
            },
            compaction_threshold: 50,
            ..Self::default()
        }
    }

    /// Read `MURAL_*` variables over the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(room) = get("MURAL_ROOM") {
            config.room = RoomId::new(room);
        }
        if let Some(name) = get("MURAL_NAME") {
            config.display_name = name;
        }
        config.color = get("MURAL_COLOR");
        if let Some(endpoints) = get("MURAL_SIGNALING") {
            config.signaling = endpoints
                .split(',')
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .map(String::from)
                .collect();
        }
        config.data_dir = get("MURAL_DATA_DIR").map(PathBuf::from);
        if let Some(url) = get("MURAL_SHARE_URL") {
            config.share_base_url = url;
        }
        config
    }
}
