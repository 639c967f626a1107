//! The daemon loop.
//!
//! One task owns the tailer, the parser and the session tracker. It wakes on
//! the poll interval, on an admin request, on a finished RCON command or on a
//! config change, and handles each to completion before the next, so the
//! roster is never mutated from two places at once. RCON round-trips run on
//! spawned tasks and come back here as completions.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::dispatch::{AdminOp, CommandDispatcher, CommandError};
use crate::error::ErrorClass;
use crate::model::{ConnectionState, Event, RosterEntry};
use crate::notifications::{Notification, NotificationSink};
use crate::rcon::{ClientState, Credentials, RconError};
use crate::storage::{ReconcilePolicy, Store, StoreError, TailPositionRepo};
use crate::watcher::{
    AnomalyCounters, EventParser, FileTailer, ParseStats, SessionTracker, TailError, TailItem,
};

/// Something an operator asked for.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Admin(AdminOp),
    /// Raw RCON command. Not recorded as an admin action.
    Raw(String),
    Roster,
    Status,
}

/// Human-readable answer to a [`Request`].
pub type Reply = oneshot::Sender<String>;

struct Completion {
    op: AdminOp,
    outcome: Result<String, RconError>,
    reply: Reply,
}

struct Reload {
    config_path: Option<PathBuf>,
    credentials: watch::Sender<Credentials>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MonitorStats {
    pub ticks: u64,
    pub events: u64,
    pub store_failures: u64,
    pub tail_failures: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub log: String,
    pub rcon: ClientState,
    pub online: usize,
    pub anomalies: AnomalyCounters,
    pub parse: ParseStats,
    pub monitor: MonitorStats,
}

pub struct Monitor {
    tailer: FileTailer,
    parser: EventParser,
    tracker: SessionTracker,
    dispatcher: CommandDispatcher,
    sink: Box<dyn NotificationSink>,
    store: Arc<Store>,
    poll_interval: Duration,
    reload: Option<Reload>,
    stats: MonitorStats,
    /// Set while the ledger rejects writes; the batch is replayed each tick.
    store_failing: bool,
}

impl Monitor {
    pub fn new(
        tailer: FileTailer,
        store: Arc<Store>,
        dispatcher: CommandDispatcher,
        sink: Box<dyn NotificationSink>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            tailer,
            parser: EventParser::new(),
            tracker: SessionTracker::new(store.clone()),
            dispatcher,
            sink,
            store,
            poll_interval,
            reload: None,
            stats: MonitorStats::default(),
            store_failing: false,
        }
    }

    /// Re-read `config_path` on every reload signal and push changed RCON
    /// credentials through `credentials`.
    pub fn with_reload(
        mut self,
        config_path: Option<PathBuf>,
        credentials: watch::Sender<Credentials>,
    ) -> Self {
        self.reload = Some(Reload {
            config_path,
            credentials,
        });
        self
    }

    /// Close sessions left open by the previous run, then continue the log
    /// from the last checkpoint.
    pub fn start(&mut self, policy: ReconcilePolicy, now: DateTime<Utc>) -> Result<(), StoreError> {
        let closed = self.tracker.reconcile(policy, now)?;
        if !closed.is_empty() {
            warn!(count = closed.len(), "Closed sessions left open by previous run");
        }
        for session in closed {
            self.sink.notify(&Notification::SessionClosed { session });
        }

        let key = self.log_key();
        match self.store.read(|conn| TailPositionRepo::load(conn, &key))? {
            Some(position) => self.tailer.resume(&position),
            None => info!(path = %key, "No checkpoint, reading log from start"),
        }
        Ok(())
    }

    /// Poll the log once and apply everything it yields.
    ///
    /// A transient store failure stops the batch and rewinds the tailer to
    /// the last checkpoint, so the same lines are applied again next tick.
    /// Lines the ledger rejects as inconsistent are reported and skipped.
    pub fn tick(&mut self) {
        self.tick_at(Utc::now());
    }

    fn tick_at(&mut self, now: DateTime<Utc>) {
        self.stats.ticks += 1;
        if self.tracker.expire_leaving(now) {
            self.notify_roster();
        }
        let checkpoint = self.tailer.position();
        let was_failing = self.tailer.is_failing();
        let items = match self.tailer.poll() {
            Ok(items) => items,
            Err(e) => {
                self.tail_failed(e, was_failing);
                return;
            }
        };
        if was_failing && !self.tailer.is_failing() {
            info!(path = %self.tailer.path().display(), "Log readable again");
        }
        if items.is_empty() {
            return;
        }

        let received_at = now;
        let mut roster_changed = false;
        for item in items {
            let event = match item {
                TailItem::Line(line) => match self.parser.parse_at(&line, received_at) {
                    Some(event) => event,
                    None => continue,
                },
                TailItem::Rotated => {
                    self.parser.reset();
                    Event::LogRotated { time: received_at }
                }
            };
            self.stats.events += 1;

            match self.tracker.handle(&event) {
                Ok(applied) => {
                    roster_changed |= applied.roster_changed;
                    for session in applied.closed {
                        self.sink.notify(&Notification::SessionClosed { session });
                    }
                }
                Err(e) if e.is_integrity() => {
                    self.stats.store_failures += 1;
                    warn!(
                        error = %e,
                        player = ?event.player_id(),
                        time = %event.time(),
                        "Skipping event the ledger rejected"
                    );
                    self.report(e.class(), format!("failed to record event: {e}"));
                }
                Err(e) => {
                    self.stats.store_failures += 1;
                    if !self.store_failing {
                        self.store_failing = true;
                        warn!(
                            error = %e,
                            player = ?event.player_id(),
                            time = %event.time(),
                            "Ledger unavailable, will retry"
                        );
                        self.report(e.class(), format!("failed to record event, will retry: {e}"));
                    }
                    self.tailer.resume(&checkpoint);
                    self.parser.reset();
                    if roster_changed {
                        self.notify_roster();
                    }
                    return;
                }
            }
        }

        if self.store_failing {
            self.store_failing = false;
            info!("Ledger writable again");
        }
        if roster_changed {
            self.notify_roster();
        }
        self.save_position(received_at);
    }

    /// Serve until `shutdown` resolves.
    pub async fn run(
        mut self,
        mut requests: mpsc::Receiver<(Request, Reply)>,
        mut reloads: mpsc::Receiver<()>,
        shutdown: impl Future<Output = ()>,
    ) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Completion>();
        tokio::pin!(shutdown);

        info!(
            path = %self.tailer.path().display(),
            poll_ms = self.poll_interval.as_millis() as u64,
            "Monitor started"
        );
        loop {
            tokio::select! {
                biased;
                () = &mut shutdown => break,
                Some(done) = done_rx.recv() => self.finish(done),
                Some((request, reply)) = requests.recv() => self.accept(request, reply, &done_tx),
                Some(()) = reloads.recv() => self.reload(),
                _ = ticker.tick() => self.tick(),
            }
        }

        self.save_position(Utc::now());
        info!(stats = ?self.stats, anomalies = ?self.tracker.anomalies(), "Monitor stopped");
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            log: self.log_key(),
            rcon: self.dispatcher.rcon().state(),
            online: self
                .tracker
                .current_roster()
                .iter()
                .filter(|e| e.state == ConnectionState::Online)
                .count(),
            anomalies: self.tracker.anomalies().clone(),
            parse: self.parser.stats().clone(),
            monitor: self.stats.clone(),
        }
    }

    fn accept(&mut self, request: Request, reply: Reply, completions: &mpsc::UnboundedSender<Completion>) {
        match request {
            Request::Admin(op) => match self.dispatcher.begin(op.clone(), &self.tracker) {
                Ok(in_flight) => {
                    let completions = completions.clone();
                    tokio::spawn(async move {
                        let (op, outcome) = in_flight.wait().await;
                        // Only fails once the monitor has stopped.
                        let _ = completions.send(Completion { op, outcome, reply });
                    });
                }
                Err(e) => {
                    let text = format!("{} {} failed: {e}", op.action(), op.target());
                    self.command_failed(&op, &e);
                    let _ = reply.send(text);
                }
            },
            Request::Raw(command) => match self.dispatcher.rcon().submit(command) {
                Ok(pending) => {
                    tokio::spawn(async move {
                        let text = match pending.wait().await {
                            Ok(response) => response,
                            Err(e) => format!("error: {e}"),
                        };
                        let _ = reply.send(text);
                    });
                }
                Err(e) => {
                    let _ = reply.send(format!("error: {e}"));
                }
            },
            Request::Roster => {
                let _ = reply.send(format_roster(&self.tracker.current_roster()));
            }
            Request::Status => {
                let text = serde_json::to_string_pretty(&self.snapshot())
                    .unwrap_or_else(|e| format!("error: {e}"));
                let _ = reply.send(text);
            }
        }
    }

    fn finish(&mut self, done: Completion) {
        let Completion { op, outcome, reply } = done;
        let action = op.action();
        let target = op.target().clone();

        let text = match self
            .dispatcher
            .complete(&op, outcome, &mut self.tracker, Utc::now())
        {
            Ok(completed) => {
                self.sink.notify(&Notification::CommandResult {
                    action,
                    target: target.clone(),
                    success: true,
                    detail: completed.record.result.clone(),
                });
                if let Some(session) = completed.closed {
                    self.sink.notify(&Notification::SessionClosed { session });
                    self.notify_roster();
                }
                if completed.record.result.is_empty() {
                    format!("{action} {target}: ok")
                } else {
                    format!("{action} {target}: ok ({})", completed.record.result)
                }
            }
            Err(e) => {
                let text = format!("{action} {target} failed: {e}");
                self.command_failed(&op, &e);
                text
            }
        };
        let _ = reply.send(text);
    }

    fn reload(&mut self) {
        let Some(reload) = &self.reload else {
            return;
        };
        match Config::load(reload.config_path.as_deref()) {
            Ok(config) => {
                let next = config.credentials();
                let changed = reload.credentials.send_if_modified(|current| {
                    if *current == next {
                        return false;
                    }
                    *current = next;
                    true
                });
                if changed {
                    info!("RCON credentials changed, reconnecting");
                } else {
                    debug!("Config reloaded, credentials unchanged");
                }
            }
            Err(e) => {
                warn!(error = %e, "Config reload failed, keeping current settings");
                self.report(e.class(), format!("config reload failed: {e}"));
            }
        }
    }

    fn tail_failed(&mut self, error: TailError, was_failing: bool) {
        self.stats.tail_failures += 1;
        let first = match error {
            TailError::PermissionDenied { .. } => true,
            TailError::Unavailable { .. } => !was_failing,
        };
        if first {
            self.report(ErrorClass::TransientIo, error.to_string());
        }
    }

    fn command_failed(&self, op: &AdminOp, error: &CommandError) {
        self.sink.notify(&Notification::CommandResult {
            action: op.action(),
            target: op.target().clone(),
            success: false,
            detail: error.to_string(),
        });
        self.report(error.class(), error.to_string());
    }

    fn notify_roster(&self) {
        self.sink.notify(&Notification::RosterChanged {
            roster: self.tracker.current_roster(),
        });
    }

    fn report(&self, class: ErrorClass, message: String) {
        self.sink.notify(&Notification::Failure { class, message });
    }

    fn save_position(&mut self, at: DateTime<Utc>) {
        let key = self.log_key();
        let position = self.tailer.position();
        if let Err(e) = self
            .store
            .write(|tx| TailPositionRepo::save(tx, &key, &position, at))
        {
            self.stats.store_failures += 1;
            warn!(error = %e, "Failed to save log checkpoint");
        }
    }

    fn log_key(&self) -> String {
        self.tailer.path().to_string_lossy().into_owned()
    }
}

fn format_roster(roster: &[RosterEntry]) -> String {
    if roster.is_empty() {
        return "no players online".to_string();
    }
    roster
        .iter()
        .map(|entry| {
            let state = match entry.state {
                ConnectionState::Online => "online",
                ConnectionState::Leaving => "leaving",
            };
            let ip = entry.ip.map(|ip| ip.to_string()).unwrap_or_else(|| "-".into());
            format!(
                "{}\t{}\t{state} since {}\t{ip}",
                entry.player_id,
                entry.display_name,
                entry.session_start.to_rfc3339()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use std::fs::OpenOptions;
    use std::io::Write;
    use std::path::Path;

    use chrono::TimeZone;

    use super::*;
    use crate::dispatch::CommandTemplates;
    use crate::model::{PlayerId, TimeRange};
    use crate::notifications::testing::RecordingSink;
    use crate::rcon::testing::MockServer;
    use crate::rcon::{ClientOptions, RconClient};
    use crate::storage::{AdminActionRepo, SessionRepo};
    use crate::watcher::TailConfig;

    fn append(path: &Path, lines: &[&str]) {
        let mut file = OpenOptions::new().create(true).append(true).open(path).unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
    }

    fn offline_credentials() -> watch::Receiver<Credentials> {
        watch::channel(Credentials {
            host: "127.0.0.1".into(),
            port: 1,
            password: "unused".into(),
        })
        .1
    }

    fn monitor(
        log: &Path,
        store: Arc<Store>,
        sink: &RecordingSink,
        credentials: watch::Receiver<Credentials>,
    ) -> Monitor {
        let (rcon, _worker) = RconClient::spawn(credentials, ClientOptions::default());
        let dispatcher =
            CommandDispatcher::new(rcon, store.clone(), CommandTemplates::default(), "tester");
        Monitor::new(
            FileTailer::open(log, TailConfig::default()),
            store,
            dispatcher,
            Box::new(sink.clone()),
            Duration::from_millis(10),
        )
    }

    fn closed_sessions(events: &[Notification]) -> Vec<&crate::model::SessionRecord> {
        events
            .iter()
            .filter_map(|n| match n {
                Notification::SessionClosed { session } => Some(session),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn tick_turns_log_lines_into_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("server.log");
        let store = Arc::new(Store::open_in_memory().unwrap());
        let sink = RecordingSink::default();
        let mut monitor = monitor(&log, store.clone(), &sink, offline_credentials());

        append(&log, &["[2024-01-15 12:00:01] Player 'Alice' (P1) logged in from 1.2.3.4"]);
        monitor.tick();
        let events = sink.take();
        assert!(matches!(
            &events[..],
            [Notification::RosterChanged { roster }] if roster.len() == 1 && roster[0].display_name == "Alice"
        ));

        append(&log, &["[2024-01-15 12:05:01] Player 'Alice' (P1) logged out"]);
        monitor.tick();
        let events = sink.take();
        let closed = closed_sessions(&events);
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].duration(), Some(chrono::Duration::seconds(300)));
        assert_eq!(closed[0].ip.as_deref(), Some("1.2.3.4"));
        assert!(matches!(
            events.last(),
            Some(Notification::RosterChanged { roster }) if roster.is_empty()
        ));
        assert_eq!(monitor.snapshot().monitor.events, 2);
    }

    #[tokio::test]
    async fn restart_continues_from_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("server.log");
        let store = Arc::new(Store::open(&dir.path().join("warden.db")).unwrap());
        append(
            &log,
            &[
                "[2024-01-15 12:00:01] Player 'Alice' (P1) logged in",
                "[2024-01-15 12:05:01] Player 'Alice' (P1) logged out",
            ],
        );

        let sink = RecordingSink::default();
        let mut first = monitor(&log, store.clone(), &sink, offline_credentials());
        first.start(ReconcilePolicy::LastSeen, Utc::now()).unwrap();
        first.tick();
        drop(first);
        sink.take();

        let mut second = monitor(&log, store.clone(), &sink, offline_credentials());
        second.start(ReconcilePolicy::LastSeen, Utc::now()).unwrap();
        second.tick();

        assert!(sink.take().is_empty());
        assert_eq!(second.snapshot().monitor.events, 0);
        let history = store
            .read(|conn| SessionRepo::history(conn, &PlayerId::from("P1"), TimeRange::default()))
            .unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn restart_closes_crashed_session_at_last_activity() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("server.log");
        let store = Arc::new(Store::open(&dir.path().join("warden.db")).unwrap());
        append(
            &log,
            &[
                "2024.01.15-12.00.01: '76561198000000001:Alice(7)' logged in",
                "2024.01.15-12.10.00: '76561198000000001:Alice(7)' 'Global: brb'",
            ],
        );

        let sink = RecordingSink::default();
        let mut first = monitor(&log, store.clone(), &sink, offline_credentials());
        first.start(ReconcilePolicy::LastSeen, Utc::now()).unwrap();
        first.tick();
        drop(first);
        sink.take();

        let mut second = monitor(&log, store.clone(), &sink, offline_credentials());
        second.start(ReconcilePolicy::LastSeen, Utc::now()).unwrap();

        let events = sink.take();
        let closed = closed_sessions(&events);
        assert_eq!(closed.len(), 1);
        assert!(closed[0].abnormal);
        assert_eq!(
            closed[0].disconnect_time,
            Some(Utc.with_ymd_and_hms(2024, 1, 15, 12, 10, 0).unwrap())
        );
        assert!(second.tracker.current_roster().is_empty());
    }

    #[tokio::test]
    async fn missing_log_is_reported_once_per_outage() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("not-yet.log");
        let store = Arc::new(Store::open_in_memory().unwrap());
        let sink = RecordingSink::default();
        let mut monitor = monitor(&log, store, &sink, offline_credentials());

        monitor.tick();
        monitor.tick();

        let failures: Vec<_> = sink
            .take()
            .into_iter()
            .filter(|n| matches!(n, Notification::Failure { class: ErrorClass::TransientIo, .. }))
            .collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(monitor.snapshot().monitor.tail_failures, 1);
    }

    #[tokio::test]
    async fn busy_ledger_replays_batch_instead_of_dropping_it() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("server.log");
        let db = dir.path().join("warden.db");
        let store = Arc::new(Store::open(&db).unwrap());
        store
            .read(|conn| {
                conn.busy_timeout(Duration::from_millis(10))?;
                Ok(())
            })
            .unwrap();
        let sink = RecordingSink::default();
        let mut monitor = monitor(&log, store.clone(), &sink, offline_credentials());

        // Another process (e.g. `warden reconcile`) holding the write lock.
        let other = rusqlite::Connection::open(&db).unwrap();
        other.execute_batch("BEGIN EXCLUSIVE;").unwrap();

        append(&log, &["[2024-01-15 12:00:01] Player 'Alice' (P1) logged in"]);
        monitor.tick();
        monitor.tick();
        let failures: Vec<_> = sink
            .take()
            .into_iter()
            .filter(|n| matches!(n, Notification::Failure { class: ErrorClass::TransientIo, .. }))
            .collect();
        assert_eq!(failures.len(), 1);
        assert!(monitor.tracker.current_roster().is_empty());
        assert_eq!(monitor.tailer.position().offset, 0);

        other.execute_batch("COMMIT;").unwrap();
        monitor.tick();
        let roster = monitor.tracker.current_roster();
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].display_name, "Alice");
        let open = store
            .read(|conn| SessionRepo::find_open(conn, &PlayerId::from("P1")))
            .unwrap();
        assert!(open.is_some());
        assert!(monitor.tailer.position().offset > 0);
    }

    #[tokio::test]
    async fn leaving_entries_expire_on_a_quiet_log() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("server.log");
        let store = Arc::new(Store::open_in_memory().unwrap());
        let sink = RecordingSink::default();
        let mut monitor = monitor(&log, store, &sink, offline_credentials());

        append(&log, &["[2024-01-15 12:00:01] Player 'Alice' (P1) logged in"]);
        monitor.tick();
        let kicked_at = Utc::now();
        monitor.tracker.mark_left(&PlayerId::from("P1"), kicked_at);
        sink.take();

        monitor.tick_at(kicked_at + chrono::Duration::seconds(30));
        assert!(sink.take().is_empty());
        assert_eq!(monitor.tracker.current_roster().len(), 1);

        monitor.tick_at(kicked_at + chrono::Duration::seconds(61));
        assert!(matches!(
            &sink.take()[..],
            [Notification::RosterChanged { roster }] if roster.is_empty()
        ));
    }

    #[tokio::test]
    async fn reload_pushes_changed_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        std::fs::write(&config_path, "[rcon]\nport = 27099\npassword = \"rotated\"\n").unwrap();

        let store = Arc::new(Store::open_in_memory().unwrap());
        let sink = RecordingSink::default();
        let (tx, rx) = watch::channel(Credentials {
            host: "127.0.0.1".into(),
            port: 1,
            password: "old".into(),
        });
        let mut monitor = monitor(&dir.path().join("server.log"), store, &sink, rx.clone())
            .with_reload(Some(config_path), tx);

        monitor.reload();
        let current = rx.borrow().clone();
        assert_eq!(current.port, 27099);
        assert_eq!(current.password, "rotated");
    }

    #[tokio::test]
    async fn admin_requests_flow_through_the_loop() {
        let server = MockServer::start(|cmd| {
            cmd.starts_with("#Kick").then(|| "Kicked Alice".to_string())
        })
        .await;
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("server.log");
        let store = Arc::new(Store::open_in_memory().unwrap());
        let sink = RecordingSink::default();
        let mut monitor = monitor(&log, store.clone(), &sink, server.credentials());

        append(&log, &["[2024-01-15 12:00:01] Player 'Alice' (P1) logged in"]);
        monitor.tick();
        sink.take();

        let (requests, requests_rx) = mpsc::channel(8);
        let (_reloads, reloads_rx) = mpsc::channel(1);
        let (stop, stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn(monitor.run(requests_rx, reloads_rx, async {
            let _ = stopped.await;
        }));

        let (reply, answer) = oneshot::channel();
        requests.send((Request::Roster, reply)).await.unwrap();
        assert!(answer.await.unwrap().contains("Alice"));

        let (reply, answer) = oneshot::channel();
        let kick = AdminOp::Kick {
            player: PlayerId::from("P1"),
            reason: "griefing".into(),
        };
        requests.send((Request::Admin(kick), reply)).await.unwrap();
        let text = answer.await.unwrap();
        assert!(text.contains("ok"), "{text}");

        let (reply, answer) = oneshot::channel();
        let again = AdminOp::Kick {
            player: PlayerId::from("P1"),
            reason: "twice".into(),
        };
        requests.send((Request::Admin(again), reply)).await.unwrap();
        assert!(answer.await.unwrap().contains("not online"));

        stop.send(()).unwrap();
        handle.await.unwrap();

        assert_eq!(store.read(|conn| AdminActionRepo::count(conn)).unwrap(), 1);
        let history = store
            .read(|conn| SessionRepo::history(conn, &PlayerId::from("P1"), TimeRange::default()))
            .unwrap();
        assert_eq!(history[0].end_reason.as_deref(), Some("kick: griefing"));
        assert_eq!(server.received(), ["#Kick P1 griefing"]);

        let events = sink.take();
        assert!(events.iter().any(|n| matches!(
            n,
            Notification::CommandResult { success: true, .. }
        )));
        assert!(events.iter().any(|n| matches!(
            n,
            Notification::CommandResult { success: false, .. }
        )));
    }
}
