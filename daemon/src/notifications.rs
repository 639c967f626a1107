//! Outbound notifications: roster changes, closed sessions, command outcomes
//! and typed failures.

use std::io::Write;
use std::sync::Mutex;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::ErrorClass;
use crate::model::{AdminActionType, PlayerId, RosterEntry, SessionRecord};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Notification {
    RosterChanged {
        roster: Vec<RosterEntry>,
    },
    SessionClosed {
        session: SessionRecord,
    },
    CommandResult {
        action: AdminActionType,
        target: PlayerId,
        success: bool,
        detail: String,
    },
    Failure {
        class: ErrorClass,
        message: String,
    },
}

pub trait NotificationSink: Send {
    fn notify(&self, notification: &Notification);
}

/// Writes every notification to the log.
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, notification: &Notification) {
        match notification {
            Notification::RosterChanged { roster } => {
                info!(online = roster.len(), "Roster changed");
            }
            Notification::SessionClosed { session } => {
                info!(
                    player = %session.player_id,
                    abnormal = session.abnormal,
                    reason = session.end_reason.as_deref().unwrap_or(""),
                    "Session closed"
                );
            }
            Notification::CommandResult {
                action,
                target,
                success,
                detail,
            } => {
                info!(%action, %target, success, detail = %detail, "Command finished");
            }
            Notification::Failure { class, message } => {
                warn!(%class, "{}", message);
            }
        }
    }
}

/// One JSON object per line, for piping into other tools.
pub struct JsonLinesSink<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<W: Write + Send> NotificationSink for JsonLinesSink<W> {
    fn notify(&self, notification: &Notification) {
        let Ok(mut out) = self.out.lock() else {
            return;
        };
        let written = serde_json::to_writer(&mut *out, notification)
            .map_err(std::io::Error::from)
            .and_then(|()| writeln!(out))
            .and_then(|()| out.flush());
        if let Err(e) = written {
            warn!(error = %e, "Failed to write notification");
        }
    }
}

/// Fan out to several sinks in order.
pub struct Fanout(pub Vec<Box<dyn NotificationSink>>);

impl NotificationSink for Fanout {
    fn notify(&self, notification: &Notification) {
        for sink in &self.0 {
            sink.notify(notification);
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_lines_sink_writes_one_object_per_line() {
        let sink = JsonLinesSink::new(Vec::new());
        sink.notify(&Notification::Failure {
            class: ErrorClass::Auth,
            message: "password rejected".into(),
        });
        sink.notify(&Notification::RosterChanged { roster: Vec::new() });

        let text = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["event"], "failure");
        assert_eq!(first["class"], "auth");
        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["roster"], serde_json::json!([]));
    }

    #[test]
    fn fanout_reaches_every_sink() {
        let a = testing::RecordingSink::default();
        let b = testing::RecordingSink::default();
        let fanout = Fanout(vec![Box::new(a.clone()), Box::new(b.clone())]);
        fanout.notify(&Notification::RosterChanged { roster: Vec::new() });
        assert_eq!(a.take().len(), 1);
        assert_eq!(b.take().len(), 1);
    }
}
