//! Live roster of connected players, kept in step with the durable ledger.
//!
//! Every transition is committed to the [`Store`] first; the in-memory roster
//! only changes after that transaction succeeded. A failed write therefore
//! leaves the roster exactly as it was.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::model::{ConnectionState, Event, PlayerId, RosterEntry, SessionRecord};
use crate::storage::{PlayerRepo, ReconcilePolicy, SessionRepo, Store, StoreError};

/// How long a kicked or banned player stays in the roster as `Leaving`
/// waiting for the server's own disconnect line.
const LEAVING_GRACE_SECS: i64 = 60;

/// Counts of events that were accepted but did not map onto a transition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnomalyCounters {
    /// Disconnect for a player with no open session.
    pub orphan_disconnects: u64,
    /// Disconnect older than the player's open session (replayed log).
    pub stale_disconnects: u64,
    /// Open session force-closed by a second connect.
    pub self_heals: u64,
    /// Connect already recorded as a closed session.
    pub replayed_connects: u64,
    /// Server disconnect following a kick or ban we already recorded.
    pub command_echoes: u64,
}

/// What a single event changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Applied {
    pub roster_changed: bool,
    pub closed: Vec<SessionRecord>,
}

struct Tracked {
    entry: RosterEntry,
    left_at: Option<DateTime<Utc>>,
}

enum ConnectOutcome {
    Opened { healed: Option<SessionRecord> },
    Adopted,
    Replayed,
}

enum DisconnectOutcome {
    Closed(SessionRecord),
    Stale,
    NoSession,
}

pub struct SessionTracker {
    store: Arc<Store>,
    roster: HashMap<PlayerId, Tracked>,
    anomalies: AnomalyCounters,
}

impl SessionTracker {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            roster: HashMap::new(),
            anomalies: AnomalyCounters::default(),
        }
    }

    /// Close sessions a previous run left open. Call before tailing resumes.
    pub fn reconcile(
        &mut self,
        policy: ReconcilePolicy,
        now: DateTime<Utc>,
    ) -> Result<Vec<SessionRecord>, StoreError> {
        let closed = self.store.reconcile(policy, now)?;
        for record in &closed {
            self.roster.remove(&record.player_id);
        }
        info!(closed = closed.len(), policy = ?policy, "Reconciled open sessions");
        Ok(closed)
    }

    /// Apply one parsed event.
    pub fn handle(&mut self, event: &Event) -> Result<Applied, StoreError> {
        match event {
            Event::Connected {
                player_id,
                display_name,
                ip,
                time,
            } => self.connected(player_id, display_name, *ip, *time),
            Event::Disconnected {
                player_id,
                display_name,
                time,
            } => self.disconnected(player_id, display_name.as_deref(), *time),
            Event::ChatMessage {
                player_id,
                display_name,
                time,
                ..
            } => {
                self.store.write(|tx| {
                    PlayerRepo::upsert_seen(tx, player_id, Some(display_name.as_str()), *time)
                })?;
                Ok(Applied::default())
            }
            Event::WorldEvent { .. } | Event::Unstructured { .. } | Event::LogRotated { .. } => {
                Ok(Applied::default())
            }
        }
    }

    fn connected(
        &mut self,
        player_id: &PlayerId,
        display_name: &str,
        ip: Option<IpAddr>,
        time: DateTime<Utc>,
    ) -> Result<Applied, StoreError> {
        let ip_text = ip.map(|ip| ip.to_string());
        let outcome = self.store.write(|tx| {
            PlayerRepo::upsert_seen(tx, player_id, Some(display_name), time)?;

            if let Some(existing) = SessionRepo::find_by_key(tx, player_id, time)? {
                return Ok(if existing.is_open() {
                    ConnectOutcome::Adopted
                } else {
                    ConnectOutcome::Replayed
                });
            }

            let healed = match SessionRepo::find_open(tx, player_id)? {
                Some(prior) => Some(SessionRepo::close(
                    tx,
                    prior.id,
                    time.max(prior.connect_time),
                    true,
                    "self-heal",
                )?),
                None => None,
            };
            SessionRepo::insert_open(tx, player_id, time, ip_text.as_deref())?;
            Ok(ConnectOutcome::Opened { healed })
        })?;

        let mut applied = Applied::default();
        match outcome {
            ConnectOutcome::Replayed => {
                self.anomalies.replayed_connects += 1;
                debug!(player = %player_id, connect_time = %time, "Skipped replayed connect");
                return Ok(applied);
            }
            ConnectOutcome::Adopted => {
                debug!(player = %player_id, connect_time = %time, "Adopted open session");
            }
            ConnectOutcome::Opened { healed } => {
                if let Some(record) = healed {
                    self.anomalies.self_heals += 1;
                    warn!(
                        player = %player_id,
                        session = record.id,
                        "Connect while already online; closed previous session as abnormal"
                    );
                    applied.closed.push(record);
                }
                info!(player = %player_id, name = display_name, "Player connected");
            }
        }

        self.roster.insert(
            player_id.clone(),
            Tracked {
                entry: RosterEntry {
                    player_id: player_id.clone(),
                    display_name: display_name.to_string(),
                    session_start: time,
                    ip,
                    state: ConnectionState::Online,
                },
                left_at: None,
            },
        );
        applied.roster_changed = true;
        Ok(applied)
    }

    fn disconnected(
        &mut self,
        player_id: &PlayerId,
        display_name: Option<&str>,
        time: DateTime<Utc>,
    ) -> Result<Applied, StoreError> {
        let outcome = self.store.write(|tx| {
            PlayerRepo::upsert_seen(tx, player_id, display_name, time)?;
            match SessionRepo::find_open(tx, player_id)? {
                Some(open) if time < open.connect_time => Ok(DisconnectOutcome::Stale),
                Some(open) => Ok(DisconnectOutcome::Closed(SessionRepo::close(
                    tx, open.id, time, false, "logout",
                )?)),
                None => Ok(DisconnectOutcome::NoSession),
            }
        })?;

        match outcome {
            DisconnectOutcome::Closed(record) => {
                self.roster.remove(player_id);
                info!(
                    player = %player_id,
                    duration_secs = record.duration().map(|d| d.num_seconds()),
                    "Player disconnected"
                );
                Ok(Applied {
                    roster_changed: true,
                    closed: vec![record],
                })
            }
            DisconnectOutcome::Stale => {
                self.anomalies.stale_disconnects += 1;
                debug!(player = %player_id, "Skipped disconnect older than open session");
                Ok(Applied::default())
            }
            DisconnectOutcome::NoSession => {
                let leaving = self
                    .roster
                    .get(player_id)
                    .is_some_and(|t| t.entry.state == ConnectionState::Leaving);
                if leaving {
                    self.roster.remove(player_id);
                    self.anomalies.command_echoes += 1;
                    return Ok(Applied {
                        roster_changed: true,
                        closed: Vec::new(),
                    });
                }
                self.anomalies.orphan_disconnects += 1;
                debug!(player = %player_id, "Disconnect without open session");
                Ok(Applied::default())
            }
        }
    }

    /// Close `player_id`'s open session inside a caller's transaction.
    ///
    /// Used by command dispatch so the close commits together with the admin
    /// action. Follow up with [`SessionTracker::mark_left`] once committed.
    pub fn close_in(
        conn: &Connection,
        player_id: &PlayerId,
        at: DateTime<Utc>,
        reason: &str,
    ) -> Result<Option<SessionRecord>, StoreError> {
        match SessionRepo::find_open(conn, player_id)? {
            Some(open) => Ok(Some(SessionRepo::close(
                conn,
                open.id,
                at.max(open.connect_time),
                false,
                reason,
            )?)),
            None => Ok(None),
        }
    }

    /// Record in the roster that a command already closed this player's session.
    pub fn mark_left(&mut self, player_id: &PlayerId, at: DateTime<Utc>) {
        if let Some(tracked) = self.roster.get_mut(player_id) {
            tracked.entry.state = ConnectionState::Leaving;
            tracked.left_at = Some(at);
        }
    }

    /// Drop `Leaving` entries whose grace period ran out by `now`. Uses the
    /// same clock as [`SessionTracker::mark_left`]. Returns whether the roster
    /// changed.
    pub fn expire_leaving(&mut self, now: DateTime<Utc>) -> bool {
        let grace = Duration::seconds(LEAVING_GRACE_SECS);
        let before = self.roster.len();
        self.roster
            .retain(|_, tracked| tracked.left_at.map_or(true, |left| now - left <= grace));
        self.roster.len() != before
    }

    /// Snapshot of the roster, ordered by session start then player id.
    pub fn current_roster(&self) -> Vec<RosterEntry> {
        let mut entries: Vec<RosterEntry> =
            self.roster.values().map(|t| t.entry.clone()).collect();
        entries.sort_by(|a, b| {
            a.session_start
                .cmp(&b.session_start)
                .then_with(|| a.player_id.cmp(&b.player_id))
        });
        entries
    }

    pub fn roster_entry(&self, player_id: &PlayerId) -> Option<RosterEntry> {
        self.roster.get(player_id).map(|t| t.entry.clone())
    }

    pub fn is_online(&self, player_id: &PlayerId) -> bool {
        self.roster
            .get(player_id)
            .is_some_and(|t| t.entry.state == ConnectionState::Online)
    }

    pub fn anomalies(&self) -> &AnomalyCounters {
        &self.anomalies
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }
}
