//! Admin commands: kick, ban and teleport.
//!
//! A command runs in two halves. [`CommandDispatcher::begin`] validates it
//! against the roster and queues it on the RCON client; [`CommandDispatcher::complete`]
//! takes the server's answer and, only on success, commits the admin action,
//! any ban and the session close in one transaction before touching the roster.
//! Any failure leaves the store and the roster untouched.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::error::ErrorClass;
use crate::model::{AdminActionRecord, AdminActionType, BanRecord, Coordinates, PlayerId, SessionRecord};
use crate::rcon::{Pending, RconClient, RconError};
use crate::storage::{AdminActionRepo, BanRepo, PlayerRepo, Store, StoreError};
use crate::watcher::SessionTracker;

/// Longest timed ban. Anything longer should be a permanent ban.
pub const MAX_BAN_DAYS: i64 = 36_500;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("player {0} is not online")]
    PlayerNotOnline(PlayerId),

    #[error("server refused command: {0}")]
    Refused(String),

    #[error("invalid ban length: {0}")]
    InvalidDuration(String),

    #[error(transparent)]
    Rcon(#[from] RconError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CommandError {
    pub fn class(&self) -> ErrorClass {
        match self {
            CommandError::PlayerNotOnline(_)
            | CommandError::Refused(_)
            | CommandError::InvalidDuration(_) => ErrorClass::Invalid,
            CommandError::Rcon(e) => e.class(),
            CommandError::Store(e) => e.class(),
        }
    }
}

/// Server command text. Placeholders: `{player}`, `{name}`, `{reason}`,
/// `{x}`, `{y}`, `{z}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CommandTemplates {
    pub kick: String,
    pub ban: String,
    pub teleport: String,
    /// Case-insensitive substrings that mark a response as a refusal.
    pub failure_markers: Vec<String>,
}

impl Default for CommandTemplates {
    fn default() -> Self {
        Self {
            kick: "#Kick {player} {reason}".into(),
            ban: "#Ban {player} {reason}".into(),
            teleport: "#Teleport {x} {y} {z} {player}".into(),
            failure_markers: vec!["not found".into(), "unknown command".into()],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AdminOp {
    Kick {
        player: PlayerId,
        reason: String,
    },
    Ban {
        player: PlayerId,
        reason: String,
        duration: Option<Duration>,
    },
    Teleport {
        player: PlayerId,
        to: Coordinates,
    },
}

impl AdminOp {
    pub fn action(&self) -> AdminActionType {
        match self {
            AdminOp::Kick { .. } => AdminActionType::Kick,
            AdminOp::Ban { .. } => AdminActionType::Ban,
            AdminOp::Teleport { .. } => AdminActionType::Teleport,
        }
    }

    pub fn target(&self) -> &PlayerId {
        match self {
            AdminOp::Kick { player, .. }
            | AdminOp::Ban { player, .. }
            | AdminOp::Teleport { player, .. } => player,
        }
    }

    fn requires_online(&self) -> bool {
        !matches!(self, AdminOp::Ban { .. })
    }
}

/// A command queued on the RCON client, not yet answered.
pub struct InFlight {
    pub op: AdminOp,
    pub command: String,
    pending: Pending<String>,
}

impl InFlight {
    pub async fn wait(self) -> (AdminOp, Result<String, RconError>) {
        (self.op, self.pending.wait().await)
    }
}

/// Durable outcome of a successful command.
#[derive(Debug, Clone, PartialEq)]
pub struct Completed {
    pub record: AdminActionRecord,
    pub ban: Option<BanRecord>,
    pub closed: Option<SessionRecord>,
}

pub struct CommandDispatcher {
    rcon: RconClient,
    store: Arc<Store>,
    templates: CommandTemplates,
    issued_by: String,
}

impl CommandDispatcher {
    pub fn new(
        rcon: RconClient,
        store: Arc<Store>,
        templates: CommandTemplates,
        issued_by: impl Into<String>,
    ) -> Self {
        Self {
            rcon,
            store,
            templates,
            issued_by: issued_by.into(),
        }
    }

    pub fn rcon(&self) -> &RconClient {
        &self.rcon
    }

    /// Validate `op` and queue it. Nothing is recorded yet.
    pub fn begin(&self, op: AdminOp, tracker: &SessionTracker) -> Result<InFlight, CommandError> {
        if op.requires_online() && !tracker.is_online(op.target()) {
            return Err(CommandError::PlayerNotOnline(op.target().clone()));
        }
        if let AdminOp::Ban { duration, .. } = &op {
            ban_expiry(Utc::now(), *duration)?;
        }
        let command = self.render(&op, tracker)?;
        let pending = self.rcon.submit(command.clone())?;
        info!(action = %op.action(), target = %op.target(), "Queued command");
        Ok(InFlight {
            op,
            command,
            pending,
        })
    }

    /// Apply the server's answer to `op`.
    pub fn complete(
        &self,
        op: &AdminOp,
        outcome: Result<String, RconError>,
        tracker: &mut SessionTracker,
        now: DateTime<Utc>,
    ) -> Result<Completed, CommandError> {
        let response = outcome.inspect_err(|e| {
            warn!(action = %op.action(), target = %op.target(), error = %e, "Command failed");
        })?;
        if let Some(marker) = self.refusal_marker(&response) {
            warn!(action = %op.action(), target = %op.target(), marker, "Server refused command");
            return Err(CommandError::Refused(response.trim().to_string()));
        }

        let target = op.target();
        let issued_by = self.issued_by.as_str();
        let expires_at = match op {
            AdminOp::Ban { duration, .. } => ban_expiry(now, *duration)?,
            _ => None,
        };
        let completed = self.store.write(|tx| {
            let record =
                AdminActionRepo::append(tx, op.action(), target, issued_by, now, response.trim())?;
            let (ban, closed) = match op {
                AdminOp::Kick { reason, .. } => {
                    let closed =
                        SessionTracker::close_in(tx, target, now, &format!("kick: {reason}"))?;
                    (None, closed)
                }
                AdminOp::Ban { reason, .. } => {
                    let ban = BanRecord {
                        player_id: target.clone(),
                        reason: reason.clone(),
                        issued_by: issued_by.to_string(),
                        issued_at: now,
                        expires_at,
                    };
                    BanRepo::insert(tx, &ban)?;
                    let closed =
                        SessionTracker::close_in(tx, target, now, &format!("ban: {reason}"))?;
                    (Some(ban), closed)
                }
                AdminOp::Teleport { .. } => (None, None),
            };
            Ok(Completed {
                record,
                ban,
                closed,
            })
        })?;

        if completed.closed.is_some() {
            tracker.mark_left(target, now);
        }
        info!(action = %op.action(), target = %target, "Command applied");
        Ok(completed)
    }

    fn render(&self, op: &AdminOp, tracker: &SessionTracker) -> Result<String, CommandError> {
        let target = op.target();
        let name = match tracker.roster_entry(target) {
            Some(entry) => entry.display_name,
            None => self
                .store
                .read(|conn| PlayerRepo::get(conn, target))?
                .map(|p| p.display_name)
                .unwrap_or_else(|| target.to_string()),
        };

        let (template, reason, to) = match op {
            AdminOp::Kick { reason, .. } => (&self.templates.kick, reason.as_str(), None),
            AdminOp::Ban { reason, .. } => (&self.templates.ban, reason.as_str(), None),
            AdminOp::Teleport { to, .. } => (&self.templates.teleport, "", Some(to)),
        };

        let mut command = template
            .replace("{player}", target.as_str())
            .replace("{name}", &single_line(&name))
            .replace("{reason}", &single_line(reason));
        if let Some(to) = to {
            command = command
                .replace("{x}", &to.x.to_string())
                .replace("{y}", &to.y.to_string())
                .replace("{z}", &to.z.to_string());
        }
        Ok(command.trim().to_string())
    }

    fn refusal_marker(&self, response: &str) -> Option<&str> {
        let lowered = response.to_lowercase();
        self.templates
            .failure_markers
            .iter()
            .find(|marker| lowered.contains(&marker.to_lowercase()))
            .map(String::as_str)
    }
}

/// When a ban of `duration` issued at `now` runs out; `None` is permanent.
fn ban_expiry(
    now: DateTime<Utc>,
    duration: Option<Duration>,
) -> Result<Option<DateTime<Utc>>, CommandError> {
    let Some(duration) = duration else {
        return Ok(None);
    };
    if duration <= Duration::zero() || duration > Duration::days(MAX_BAN_DAYS) {
        return Err(CommandError::InvalidDuration(format!(
            "{} days (allowed: up to {MAX_BAN_DAYS} days, or permanent)",
            duration.num_days()
        )));
    }
    now.checked_add_signed(duration)
        .map(Some)
        .ok_or_else(|| CommandError::InvalidDuration("expiry out of range".into()))
}

/// Control characters would split or corrupt the command frame.
fn single_line(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}
