//! Incremental reader over a rotating, append-only log file.
//!
//! Each [`FileTailer::poll`] reads at most `max_read_bytes` of new data and
//! returns the complete lines it found; a trailing partial line is buffered
//! until its newline arrives, or delivered as-is once it reaches
//! `max_read_bytes`. When the file shrinks or its identity changes
//! (unix: device + inode) the tailer restarts from offset 0 and yields
//! [`TailItem::Rotated`] before the first line of the new file.

use std::fs::{File, Metadata};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::storage::StoredPosition;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TailItem {
    Line(String),
    Rotated,
}

#[derive(Debug, Error)]
pub enum TailError {
    /// File missing or temporarily unreadable. Retried with backoff.
    #[error("log file unavailable: {path}: {source}")]
    Unavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Reported once; later attempts report `Unavailable`.
    #[error("permission denied reading {path}")]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct TailConfig {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub max_read_bytes: u64,
}

impl Default for TailConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            max_read_bytes: 1024 * 1024,
        }
    }
}

#[derive(Debug)]
struct Backoff {
    initial: Duration,
    max: Duration,
    current: Option<Duration>,
    next_attempt: Option<Instant>,
}

impl Backoff {
    fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: None,
            next_attempt: None,
        }
    }

    fn waiting(&self, now: Instant) -> bool {
        self.next_attempt.is_some_and(|next| now < next)
    }

    fn fail(&mut self, now: Instant) -> Duration {
        let delay = self
            .current
            .map_or(self.initial, |d| d.saturating_mul(2).min(self.max));
        self.current = Some(delay);
        self.next_attempt = Some(now + delay);
        delay
    }

    fn reset(&mut self) {
        self.current = None;
        self.next_attempt = None;
    }

    fn failing(&self) -> bool {
        self.current.is_some()
    }
}

pub struct FileTailer {
    path: PathBuf,
    config: TailConfig,
    /// Bytes consumed from the current file, including `pending`.
    offset: u64,
    pending: Vec<u8>,
    file_id: Option<String>,
    backoff: Backoff,
    permission_reported: bool,
}

impl FileTailer {
    /// Create a tailer for `path`. The file does not need to exist yet.
    pub fn open(path: impl Into<PathBuf>, config: TailConfig) -> Self {
        let backoff = Backoff::new(config.initial_backoff, config.max_backoff);
        Self {
            path: path.into(),
            config,
            offset: 0,
            pending: Vec::new(),
            file_id: None,
            backoff,
            permission_reported: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Continue from a checkpoint. Rotation since the checkpoint is detected on
    /// the next poll.
    pub fn resume(&mut self, position: &StoredPosition) {
        self.offset = position.offset;
        self.file_id = position.file_id.clone();
        self.pending.clear();
        debug!(path = %self.path.display(), offset = self.offset, "Resuming tail");
    }

    /// Offset of the last delivered newline, for checkpointing.
    pub fn position(&self) -> StoredPosition {
        StoredPosition {
            offset: self.offset - self.pending.len() as u64,
            file_id: self.file_id.clone(),
        }
    }

    /// True between a failed read and the next successful one.
    pub fn is_failing(&self) -> bool {
        self.backoff.failing()
    }

    pub fn poll(&mut self) -> Result<Vec<TailItem>, TailError> {
        self.poll_at(Instant::now())
    }

    fn poll_at(&mut self, now: Instant) -> Result<Vec<TailItem>, TailError> {
        if self.backoff.waiting(now) {
            return Ok(Vec::new());
        }

        match self.read_new() {
            Ok(items) => {
                self.backoff.reset();
                self.permission_reported = false;
                Ok(items)
            }
            Err(source) => {
                let delay = self.backoff.fail(now);
                let path = self.path.clone();
                if source.kind() == io::ErrorKind::PermissionDenied && !self.permission_reported {
                    self.permission_reported = true;
                    warn!(path = %path.display(), error = %source, "Permission denied reading log");
                    return Err(TailError::PermissionDenied { path, source });
                }
                debug!(
                    path = %path.display(),
                    error = %source,
                    retry_in_ms = delay.as_millis() as u64,
                    "Log file unavailable"
                );
                Err(TailError::Unavailable { path, source })
            }
        }
    }

    fn read_new(&mut self) -> io::Result<Vec<TailItem>> {
        let mut file = File::open(&self.path)?;
        let metadata = file.metadata()?;
        let current_id = file_id(&metadata);
        let len = metadata.len();
        let mut items = Vec::new();

        let replaced = matches!(
            (&self.file_id, &current_id),
            (Some(known), Some(current)) if known != current
        );
        if replaced || len < self.offset {
            info!(
                path = %self.path.display(),
                replaced,
                previous_offset = self.offset,
                new_len = len,
                "Log rotated, reading from start"
            );
            if !self.pending.is_empty() {
                let tail = std::mem::take(&mut self.pending);
                items.push(TailItem::Line(decode_line(&tail)));
            }
            items.push(TailItem::Rotated);
            self.offset = 0;
        }
        if current_id.is_some() {
            self.file_id = current_id;
        }

        if len > self.offset {
            file.seek(SeekFrom::Start(self.offset))?;
            let budget = (len - self.offset).min(self.config.max_read_bytes);
            let mut chunk = Vec::with_capacity(budget as usize);
            (&mut file).take(budget).read_to_end(&mut chunk)?;
            self.offset += chunk.len() as u64;
            self.pending.extend_from_slice(&chunk);
            self.drain_lines(&mut items);
            if self.pending.len() as u64 >= self.config.max_read_bytes {
                warn!(
                    path = %self.path.display(),
                    bytes = self.pending.len(),
                    "Line longer than read budget, delivering it unterminated"
                );
                let long = std::mem::take(&mut self.pending);
                items.push(TailItem::Line(decode_line(&long)));
            }
        }

        Ok(items)
    }

    fn drain_lines(&mut self, items: &mut Vec<TailItem>) {
        let Some(last_newline) = self.pending.iter().rposition(|&b| b == b'\n') else {
            return;
        };
        let rest = self.pending.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending, rest);
        items.extend(
            complete[..complete.len() - 1]
                .split(|&b| b == b'\n')
                .map(|line| TailItem::Line(decode_line(line))),
        );
    }
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

#[cfg(unix)]
fn file_id(metadata: &Metadata) -> Option<String> {
    use std::os::unix::fs::MetadataExt;
    Some(format!("{}:{}", metadata.dev(), metadata.ino()))
}

#[cfg(not(unix))]
fn file_id(_metadata: &Metadata) -> Option<String> {
    None
}
