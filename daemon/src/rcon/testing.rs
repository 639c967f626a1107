//! In-process RCON server for tests.

use std::sync::{Arc, Mutex};

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

use super::frame::{
    read_frame, write_frame, Frame, SERVERDATA_AUTH_RESPONSE, SERVERDATA_RESPONSE_VALUE,
};
use super::Credentials;

pub const PASSWORD: &str = "hunter2";

/// Decides the reply to each command; `None` keeps the server silent.
pub type Responder = fn(&str) -> Option<String>;

pub struct MockServer {
    pub port: u16,
    pub received: Arc<Mutex<Vec<String>>>,
}

impl MockServer {
    pub async fn start(respond: Responder) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let received = Arc::new(Mutex::new(Vec::new()));
        let log = received.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, respond, log.clone()));
            }
        });
        Self { port, received }
    }

    pub fn credentials(&self) -> watch::Receiver<Credentials> {
        // The worker keeps the last value after the sender is gone.
        let (_tx, rx) = watch::channel(Credentials {
            host: "127.0.0.1".into(),
            port: self.port,
            password: PASSWORD.into(),
        });
        rx
    }

    pub fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }
}

async fn serve(mut stream: TcpStream, respond: Responder, log: Arc<Mutex<Vec<String>>>) {
    let Ok(auth) = read_frame(&mut stream).await else {
        return;
    };
    let id = if auth.body == PASSWORD { auth.id } else { -1 };
    if write_frame(&mut stream, &Frame::new(id, SERVERDATA_AUTH_RESPONSE, ""))
        .await
        .is_err()
        || id == -1
    {
        return;
    }

    while let Ok(frame) = read_frame(&mut stream).await {
        log.lock().unwrap().push(frame.body.clone());
        let Some(body) = respond(&frame.body) else {
            continue;
        };
        let parts = if body.is_empty() { vec![""] } else { vec![body.as_str(), ""] };
        for part in parts {
            if write_frame(&mut stream, &Frame::new(frame.id, SERVERDATA_RESPONSE_VALUE, part))
                .await
                .is_err()
            {
                return;
            }
        }
    }
}
