//! Core domain types shared by the watcher, storage, and RCON layers.

use std::fmt;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque, stable identifier the game server assigns to a player.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(String);

impl PlayerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A typed event produced from exactly one log line (or a rotation marker).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Connected {
        player_id: PlayerId,
        display_name: String,
        ip: Option<IpAddr>,
        time: DateTime<Utc>,
    },
    Disconnected {
        player_id: PlayerId,
        display_name: Option<String>,
        time: DateTime<Utc>,
    },
    ChatMessage {
        player_id: PlayerId,
        display_name: String,
        channel: String,
        text: String,
        time: DateTime<Utc>,
    },
    WorldEvent {
        kind: WorldEventKind,
        detail: String,
        time: DateTime<Utc>,
    },
    Unstructured {
        text: String,
        time: DateTime<Utc>,
    },
    LogRotated {
        time: DateTime<Utc>,
    },
}

impl Event {
    pub fn time(&self) -> DateTime<Utc> {
        match self {
            Event::Connected { time, .. }
            | Event::Disconnected { time, .. }
            | Event::ChatMessage { time, .. }
            | Event::WorldEvent { time, .. }
            | Event::Unstructured { time, .. }
            | Event::LogRotated { time } => *time,
        }
    }

    /// The player this event is about, if any.
    pub fn player_id(&self) -> Option<&PlayerId> {
        match self {
            Event::Connected { player_id, .. }
            | Event::Disconnected { player_id, .. }
            | Event::ChatMessage { player_id, .. } => Some(player_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorldEventKind {
    Kill {
        victim: String,
        killer: Option<String>,
    },
    Engine {
        category: String,
    },
    /// One line of a multi-line diagnostic block. `line` 0 is the header.
    Diagnostic {
        block: u64,
        line: u16,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Online,
    /// A kick or ban was sent and the server has not yet logged the disconnect.
    Leaving,
}

/// In-memory roster entry. Only ever handed out as a snapshot clone.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RosterEntry {
    pub player_id: PlayerId,
    pub display_name: String,
    pub session_start: DateTime<Utc>,
    pub ip: Option<IpAddr>,
    pub state: ConnectionState,
}

/// Durable session row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionRecord {
    pub id: i64,
    pub player_id: PlayerId,
    pub connect_time: DateTime<Utc>,
    pub disconnect_time: Option<DateTime<Utc>>,
    pub ip: Option<String>,
    pub abnormal: bool,
    pub end_reason: Option<String>,
}

impl SessionRecord {
    pub fn is_open(&self) -> bool {
        self.disconnect_time.is_none()
    }

    pub fn duration(&self) -> Option<chrono::Duration> {
        self.disconnect_time.map(|end| end - self.connect_time)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerIdentity {
    pub id: PlayerId,
    pub display_name: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub total_playtime_secs: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BanRecord {
    pub player_id: PlayerId,
    pub reason: String,
    pub issued_by: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl BanRecord {
    pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |expires| expires > at)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminActionType {
    Kick,
    Ban,
    Teleport,
}

impl AdminActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdminActionType::Kick => "kick",
            AdminActionType::Ban => "ban",
            AdminActionType::Teleport => "teleport",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "kick" => Some(AdminActionType::Kick),
            "ban" => Some(AdminActionType::Ban),
            "teleport" => Some(AdminActionType::Teleport),
            _ => None,
        }
    }
}

impl fmt::Display for AdminActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only record of a successful admin command.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdminActionRecord {
    pub id: i64,
    pub action: AdminActionType,
    pub target: PlayerId,
    pub issued_by: String,
    pub timestamp: DateTime<Utc>,
    pub result: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinates {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.x, self.y, self.z)
    }
}

/// Half-open `[since, until)` window; either bound may be absent.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimeRange {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

#[cfg(test)]
impl TimeRange {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn between(since: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        Self {
            since: Some(since),
            until: Some(until),
        }
    }
}
