//! RCON client: a handle in front of a single worker task.
//!
//! Commands go through a bounded FIFO to the worker, which owns the socket and
//! runs exactly one frame exchange at a time. Callers wait on a oneshot; a
//! caller that gives up only drops its receiver, the exchange on the wire
//! still runs to completion.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::error::RconError;
use super::frame::{
    read_frame, write_frame, Frame, SERVERDATA_AUTH, SERVERDATA_AUTH_RESPONSE,
    SERVERDATA_EXECCOMMAND, SERVERDATA_RESPONSE_VALUE,
};

/// Upper bound on a reassembled multi-part response.
const MAX_RESPONSE_BYTES: usize = 1024 * 1024;

/// Where and how to authenticate. Swapped at runtime through a watch channel.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub host: String,
    pub port: u16,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Bound on auth and on each command exchange.
    pub timeout: Duration,
    pub queue_depth: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            queue_depth: 32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientState {
    Disconnected,
    Authenticating,
    Ready,
    Busy,
    Failed,
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClientState::Disconnected => "disconnected",
            ClientState::Authenticating => "authenticating",
            ClientState::Ready => "ready",
            ClientState::Busy => "busy",
            ClientState::Failed => "failed",
        };
        f.write_str(name)
    }
}

type Reply<T> = oneshot::Sender<Result<T, RconError>>;

enum Request {
    Connect { reply: Reply<()> },
    Execute { command: String, reply: Reply<String> },
}

/// Receiver side of a queued request.
pub struct Pending<T>(oneshot::Receiver<Result<T, RconError>>);

impl<T> Pending<T> {
    pub async fn wait(self) -> Result<T, RconError> {
        self.0
            .await
            .map_err(|_| RconError::ChannelDown("RCON worker stopped".into()))?
    }
}

#[derive(Clone)]
pub struct RconClient {
    tx: mpsc::Sender<Request>,
    state: watch::Receiver<ClientState>,
}

impl RconClient {
    /// Start the worker task. Must be called inside a tokio runtime.
    pub fn spawn(
        credentials: watch::Receiver<Credentials>,
        options: ClientOptions,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(options.queue_depth.max(1));
        let (state_tx, state) = watch::channel(ClientState::Disconnected);
        let worker = Worker {
            rx,
            credentials,
            options,
            state: state_tx,
            stream: None,
            auth_latch: None,
            next_id: 0,
        };
        let handle = tokio::spawn(worker.run());
        (Self { tx, state }, handle)
    }

    /// Queue a command. Fails immediately with `Rejected` when the FIFO is full.
    pub fn submit(&self, command: impl Into<String>) -> Result<Pending<String>, RconError> {
        let (reply, rx) = oneshot::channel();
        self.enqueue(Request::Execute {
            command: command.into(),
            reply,
        })?;
        Ok(Pending(rx))
    }

    pub async fn execute(&self, command: impl Into<String>) -> Result<String, RconError> {
        self.submit(command)?.wait().await
    }

    /// Connect and authenticate now instead of on the first command.
    pub async fn connect(&self) -> Result<(), RconError> {
        let (reply, rx) = oneshot::channel();
        self.enqueue(Request::Connect { reply })?;
        Pending(rx).wait().await
    }

    pub fn state(&self) -> ClientState {
        *self.state.borrow()
    }

    fn enqueue(&self, request: Request) -> Result<(), RconError> {
        self.tx.try_send(request).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => RconError::Rejected,
            mpsc::error::TrySendError::Closed(_) => {
                RconError::ChannelDown("RCON worker stopped".into())
            }
        })
    }
}

struct Worker {
    rx: mpsc::Receiver<Request>,
    credentials: watch::Receiver<Credentials>,
    options: ClientOptions,
    state: watch::Sender<ClientState>,
    stream: Option<TcpStream>,
    /// Set when the server rejected our password; cleared by new credentials.
    auth_latch: Option<String>,
    next_id: i32,
}

impl Worker {
    async fn run(mut self) {
        let mut credentials_open = true;
        loop {
            tokio::select! {
                request = self.rx.recv() => {
                    let Some(request) = request else { break };
                    if self.credentials.has_changed().unwrap_or(false) {
                        self.reset_credentials();
                    }
                    self.handle(request).await;
                }
                changed = self.credentials.changed(), if credentials_open => {
                    match changed {
                        Ok(()) => self.reset_credentials(),
                        Err(_) => credentials_open = false,
                    }
                }
            }
        }
        debug!("RCON worker stopped");
    }

    async fn handle(&mut self, request: Request) {
        match request {
            Request::Connect { reply } => {
                let result = match self.auth_latch.clone() {
                    Some(reason) => Err(RconError::Auth(reason)),
                    None => self.ensure_connected().await,
                };
                if result.is_err() {
                    self.fail();
                }
                let _ = reply.send(result);
            }
            Request::Execute { command, reply } => {
                let result = self.execute(&command).await;
                if reply.send(result).is_err() {
                    debug!("Caller stopped waiting for RCON response");
                }
            }
        }
    }

    fn reset_credentials(&mut self) {
        self.credentials.borrow_and_update();
        self.stream = None;
        self.auth_latch = None;
        self.state.send_replace(ClientState::Disconnected);
        info!("RCON credentials changed");
    }

    async fn execute(&mut self, command: &str) -> Result<String, RconError> {
        if let Some(reason) = &self.auth_latch {
            return Err(RconError::Auth(reason.clone()));
        }

        let mut retried = false;
        loop {
            match self.attempt(command).await {
                Ok(response) => return Ok(response),
                Err(err @ (RconError::Timeout(_) | RconError::Auth(_))) => {
                    self.fail();
                    return Err(err);
                }
                Err(err) if !retried => {
                    warn!(error = %err, "RCON exchange failed, reconnecting");
                    self.fail();
                    retried = true;
                }
                Err(err) => {
                    self.fail();
                    return Err(RconError::ChannelDown(err.to_string()));
                }
            }
        }
    }

    fn fail(&mut self) {
        self.stream = None;
        self.state.send_replace(ClientState::Failed);
    }

    async fn attempt(&mut self, command: &str) -> Result<String, RconError> {
        self.ensure_connected().await?;
        let id = self.next_id();
        let limit = self.options.timeout;
        let Some(stream) = self.stream.as_mut() else {
            return Err(RconError::ChannelDown("no connection".into()));
        };

        self.state.send_replace(ClientState::Busy);
        let response = timeout(limit, exchange(stream, id, command))
            .await
            .map_err(|_| RconError::Timeout(limit))??;
        self.state.send_replace(ClientState::Ready);
        debug!(id, bytes = response.len(), "RCON command completed");
        Ok(response)
    }

    async fn ensure_connected(&mut self) -> Result<(), RconError> {
        if self.stream.is_some() {
            return Ok(());
        }
        let credentials = self.credentials.borrow_and_update().clone();
        let limit = self.options.timeout;
        self.state.send_replace(ClientState::Authenticating);

        let mut stream = timeout(
            limit,
            TcpStream::connect((credentials.host.as_str(), credentials.port)),
        )
        .await
        .map_err(|_| {
            RconError::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "connect timed out",
            ))
        })??;

        let id = self.next_id();
        match timeout(limit, authenticate(&mut stream, id, &credentials.password)).await {
            Err(_) => {
                self.state.send_replace(ClientState::Failed);
                Err(RconError::Auth(format!("no auth response within {limit:?}")))
            }
            Ok(Err(RconError::Auth(reason))) => {
                warn!(host = %credentials.host, port = credentials.port, "RCON password rejected");
                self.auth_latch = Some(reason.clone());
                self.state.send_replace(ClientState::Failed);
                Err(RconError::Auth(reason))
            }
            Ok(Err(err)) => Err(err),
            Ok(Ok(())) => {
                info!(host = %credentials.host, port = credentials.port, "RCON authenticated");
                self.stream = Some(stream);
                self.state.send_replace(ClientState::Ready);
                Ok(())
            }
        }
    }

    fn next_id(&mut self) -> i32 {
        self.next_id = if self.next_id >= i32::MAX { 1 } else { self.next_id + 1 };
        self.next_id
    }
}

async fn authenticate(stream: &mut TcpStream, id: i32, password: &str) -> Result<(), RconError> {
    write_frame(stream, &Frame::new(id, SERVERDATA_AUTH, password)).await?;

    let mut skipped_empty = false;
    loop {
        let frame = read_frame(stream).await?;
        match frame.kind {
            // Source servers send an empty RESPONSE_VALUE ahead of the auth reply.
            SERVERDATA_RESPONSE_VALUE if frame.body.is_empty() && !skipped_empty => {
                skipped_empty = true;
            }
            SERVERDATA_AUTH_RESPONSE if frame.id == -1 => {
                return Err(RconError::Auth("password rejected".into()));
            }
            SERVERDATA_AUTH_RESPONSE if frame.id == id => return Ok(()),
            kind => {
                return Err(RconError::Protocol(format!(
                    "unexpected frame during auth (id {}, type {kind})",
                    frame.id
                )));
            }
        }
    }
}

/// Send one command and collect response frames until an empty body.
async fn exchange(stream: &mut TcpStream, id: i32, command: &str) -> Result<String, RconError> {
    write_frame(stream, &Frame::new(id, SERVERDATA_EXECCOMMAND, command)).await?;

    let mut response = String::new();
    loop {
        let frame = read_frame(stream).await?;
        if frame.id != id {
            return Err(RconError::Protocol(format!(
                "response id {} does not match request {id}",
                frame.id
            )));
        }
        if frame.kind != SERVERDATA_RESPONSE_VALUE {
            return Err(RconError::Protocol(format!(
                "unexpected frame type {} in response",
                frame.kind
            )));
        }
        if frame.body.is_empty() {
            return Ok(response);
        }
        if response.len() + frame.body.len() > MAX_RESPONSE_BYTES {
            return Err(RconError::Protocol("response exceeds size limit".into()));
        }
        response.push_str(&frame.body);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    async fn listener() -> (TcpListener, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    fn credentials(port: u16, password: &str) -> Credentials {
        Credentials {
            host: "127.0.0.1".into(),
            port,
            password: password.into(),
        }
    }

    fn quick() -> ClientOptions {
        ClientOptions {
            timeout: Duration::from_millis(300),
            queue_depth: 32,
        }
    }

    /// Complete the server side of auth the way Source servers do.
    async fn accept_auth(stream: &mut TcpStream, password: &str) -> bool {
        let frame = read_frame(stream).await.unwrap();
        assert_eq!(frame.kind, SERVERDATA_AUTH);
        write_frame(stream, &Frame::new(frame.id, SERVERDATA_RESPONSE_VALUE, ""))
            .await
            .unwrap();
        let ok = frame.body == password;
        let id = if ok { frame.id } else { -1 };
        write_frame(stream, &Frame::new(id, SERVERDATA_AUTH_RESPONSE, ""))
            .await
            .unwrap();
        ok
    }

    async fn reply(stream: &mut TcpStream, id: i32, parts: &[&str]) {
        for part in parts {
            write_frame(stream, &Frame::new(id, SERVERDATA_RESPONSE_VALUE, *part))
                .await
                .unwrap();
        }
        write_frame(stream, &Frame::new(id, SERVERDATA_RESPONSE_VALUE, ""))
            .await
            .unwrap();
    }

    /// Serve every connection: authenticate, then echo each command back.
    fn echo_server(listener: TcpListener, password: &'static str) -> Arc<AtomicUsize> {
        let connections = Arc::new(AtomicUsize::new(0));
        let count = connections.clone();
        tokio::spawn(async move {
            loop {
                let (mut stream, _) = listener.accept().await.unwrap();
                count.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    if !accept_auth(&mut stream, password).await {
                        return;
                    }
                    while let Ok(frame) = read_frame(&mut stream).await {
                        let body = format!("echo {}", frame.body);
                        reply(&mut stream, frame.id, &[body.as_str()]).await;
                    }
                });
            }
        });
        connections
    }

    #[tokio::test]
    async fn authenticates_and_reassembles_multi_part_response() {
        let (listener, port) = listener().await;
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            assert!(accept_auth(&mut stream, "secret").await);
            let frame = read_frame(&mut stream).await.unwrap();
            assert_eq!(frame.kind, SERVERDATA_EXECCOMMAND);
            assert_eq!(frame.body, "#ListPlayers");
            reply(&mut stream, frame.id, &["Alice\n", "Bob\n"]).await;
            // Keep the socket open until the client is done.
            let _ = read_frame(&mut stream).await;
        });

        let (_tx, rx) = watch::channel(credentials(port, "secret"));
        let (client, _worker) = RconClient::spawn(rx, quick());
        let response = client.execute("#ListPlayers").await.unwrap();
        assert_eq!(response, "Alice\nBob\n");
        assert_eq!(client.state(), ClientState::Ready);
    }

    #[tokio::test]
    async fn rejected_password_latches_until_credentials_change() {
        let (listener, port) = listener().await;
        let connections = echo_server(listener, "good");

        let (tx, rx) = watch::channel(credentials(port, "bad"));
        let (client, _worker) = RconClient::spawn(rx, quick());

        assert!(matches!(client.execute("a").await, Err(RconError::Auth(_))));
        assert_eq!(client.state(), ClientState::Failed);
        assert!(matches!(client.execute("b").await, Err(RconError::Auth(_))));
        assert_eq!(connections.load(Ordering::SeqCst), 1);

        tx.send(credentials(port, "good")).unwrap();
        assert_eq!(client.execute("c").await.unwrap(), "echo c");
        assert_eq!(connections.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn missing_response_times_out_and_next_command_reconnects() {
        let (listener, port) = listener().await;
        tokio::spawn(async move {
            // First connection: swallow the command and never answer.
            let (mut silent, _) = listener.accept().await.unwrap();
            assert!(accept_auth(&mut silent, "pw").await);
            let _ = read_frame(&mut silent).await;

            let (mut stream, _) = listener.accept().await.unwrap();
            assert!(accept_auth(&mut stream, "pw").await);
            let frame = read_frame(&mut stream).await.unwrap();
            reply(&mut stream, frame.id, &["done"]).await;
            let _ = read_frame(&mut stream).await;
            drop(silent);
        });

        let (_tx, rx) = watch::channel(credentials(port, "pw"));
        let (client, _worker) = RconClient::spawn(rx, quick());

        let err = client.execute("#Kick P1").await.unwrap_err();
        assert!(matches!(err, RconError::Timeout(_)));
        assert_eq!(client.state(), ClientState::Failed);

        assert_eq!(client.execute("#ListPlayers").await.unwrap(), "done");
    }

    #[tokio::test]
    async fn commands_never_overlap_on_the_wire() {
        let (listener, port) = listener().await;
        let log = Arc::new(Mutex::new(Vec::new()));
        let server_log = log.clone();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            assert!(accept_auth(&mut stream, "pw").await);

            let first = read_frame(&mut stream).await.unwrap();
            server_log.lock().unwrap().push(first.body.clone());
            // Nothing else may arrive while the first command is unanswered.
            let early = timeout(Duration::from_millis(100), read_frame(&mut stream)).await;
            assert!(early.is_err(), "second command sent before first resolved");
            reply(&mut stream, first.id, &["one"]).await;

            let second = read_frame(&mut stream).await.unwrap();
            server_log.lock().unwrap().push(second.body.clone());
            reply(&mut stream, second.id, &["two"]).await;
            let _ = read_frame(&mut stream).await;
        });

        let (_tx, rx) = watch::channel(credentials(port, "pw"));
        let (client, _worker) = RconClient::spawn(rx, quick());

        let first = client.submit("first").unwrap();
        let second = client.submit("second").unwrap();
        let (a, b) = tokio::join!(second.wait(), first.wait());

        assert_eq!(b.unwrap(), "one");
        assert_eq!(a.unwrap(), "two");
        assert_eq!(*log.lock().unwrap(), ["first", "second"]);
    }

    #[tokio::test]
    async fn full_queue_rejects() {
        let (listener, port) = listener().await;
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            assert!(accept_auth(&mut stream, "pw").await);
            // Hold every command without answering.
            while read_frame(&mut stream).await.is_ok() {}
        });

        let (_tx, rx) = watch::channel(credentials(port, "pw"));
        let options = ClientOptions {
            timeout: Duration::from_secs(5),
            queue_depth: 1,
        };
        let (client, _worker) = RconClient::spawn(rx, options);

        let results: Vec<_> = (0..4).map(|i| client.submit(format!("cmd{i}"))).collect();
        let rejected = results
            .iter()
            .filter(|r| matches!(r, Err(RconError::Rejected)))
            .count();
        assert!(rejected >= 2, "rejected {rejected}");
    }

    #[tokio::test]
    async fn dropped_caller_does_not_disturb_next_command() {
        let (listener, port) = listener().await;
        echo_server(listener, "pw");

        let (_tx, rx) = watch::channel(credentials(port, "pw"));
        let (client, _worker) = RconClient::spawn(rx, quick());

        drop(client.submit("abandoned").unwrap());
        assert_eq!(client.execute("next").await.unwrap(), "echo next");
    }

    #[tokio::test]
    async fn reconnects_once_after_dropped_connection() {
        let (listener, port) = listener().await;
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            assert!(accept_auth(&mut stream, "pw").await);
            let _ = read_frame(&mut stream).await;
            drop(stream);

            let (mut stream, _) = listener.accept().await.unwrap();
            assert!(accept_auth(&mut stream, "pw").await);
            let frame = read_frame(&mut stream).await.unwrap();
            reply(&mut stream, frame.id, &["recovered"]).await;
            let _ = read_frame(&mut stream).await;
        });

        let (_tx, rx) = watch::channel(credentials(port, "pw"));
        let (client, _worker) = RconClient::spawn(rx, quick());
        assert_eq!(client.execute("status").await.unwrap(), "recovered");
    }

    #[tokio::test]
    async fn mismatched_ids_twice_bring_channel_down() {
        let (listener, port) = listener().await;
        tokio::spawn(async move {
            loop {
                let (mut stream, _) = listener.accept().await.unwrap();
                tokio::spawn(async move {
                    assert!(accept_auth(&mut stream, "pw").await);
                    if let Ok(frame) = read_frame(&mut stream).await {
                        reply(&mut stream, frame.id + 100, &["wrong"]).await;
                    }
                    let _ = read_frame(&mut stream).await;
                });
            }
        });

        let (_tx, rx) = watch::channel(credentials(port, "pw"));
        let (client, _worker) = RconClient::spawn(rx, quick());
        assert!(matches!(
            client.execute("x").await,
            Err(RconError::ChannelDown(_))
        ));
        assert_eq!(client.state(), ClientState::Failed);
    }

    #[tokio::test]
    async fn unreachable_server_is_channel_down() {
        let (listener, port) = listener().await;
        drop(listener);

        let (_tx, rx) = watch::channel(credentials(port, "pw"));
        let (client, _worker) = RconClient::spawn(rx, quick());
        assert!(matches!(
            client.connect().await,
            Err(RconError::Io(_))
        ));
        assert!(matches!(
            client.execute("x").await,
            Err(RconError::ChannelDown(_))
        ));
    }
}
