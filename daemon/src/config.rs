//! Warden configuration.
//!
//! Read from `~/.warden/config.toml` (or `--config`), then RCON port and
//! password discovered from the game server's INI files, then `WARDEN_*`
//! environment variables. Later sources win.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use notify::{RecursiveMode, Watcher};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, Debouncer};
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::dispatch::CommandTemplates;
use crate::error::ErrorClass;
use crate::rcon::{ClientOptions, Credentials};
use crate::storage::ReconcilePolicy;
use crate::watcher::TailConfig;

/// Server INI files that may carry RCON settings, in lookup order.
const SERVER_INI_FILES: [&str; 3] = ["ServerSettings.ini", "Game.ini", "Engine.ini"];

// Keys match in any case; commented-out lines do not match.
static INI_PORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^\s*RCONPort\s*=\s*(\d+)").expect("RCONPort regex"));
static INI_PASSWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?im)^\s*RCONPassword\s*=\s*"([^"]*)""#).expect("RCONPassword regex")
});

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Config not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Config parse error in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid config value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },

    #[error("Config watcher error: {0}")]
    Watch(#[from] notify::Error),
}

impl ConfigError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ConfigError::Io { .. } | ConfigError::Watch(_) => ErrorClass::TransientIo,
            _ => ErrorClass::Invalid,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log: LogConfig,
    pub rcon: RconConfig,
    pub commands: CommandsConfig,
    pub reconcile: ReconcileConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Server log to tail.
    pub path: Option<PathBuf>,
    pub poll_interval_ms: u64,
    pub max_read_bytes: u64,
    pub max_backoff_secs: u64,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            path: None,
            poll_interval_ms: 500,
            max_read_bytes: 1024 * 1024,
            max_backoff_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RconConfig {
    pub host: String,
    pub port: u16,
    pub password: String,
    pub timeout_ms: u64,
    pub queue_depth: usize,
    /// Directory holding the server's INI files (`ServerSettings.ini`, …).
    pub server_config_dir: Option<PathBuf>,
}

impl Default for RconConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 27015,
            password: String::new(),
            timeout_ms: 5000,
            queue_depth: 32,
            server_config_dir: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CommandsConfig {
    #[serde(flatten)]
    pub templates: CommandTemplates,
    /// Recorded as `issued_by`; defaults to the OS user.
    pub issued_by: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    pub policy: ReconcilePolicy,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database: Option<PathBuf>,
}

/// RCON settings found in the server's own INI files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IniCredentials {
    pub port: Option<u16>,
    pub password: Option<String>,
}

/// `~/.warden`
pub fn warden_dir() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|home| home.join(".warden"))
        .ok_or(ConfigError::HomeDirNotFound)
}

pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    Ok(warden_dir()?.join("config.toml"))
}

impl Config {
    /// Load from `path`, or from the default location when `None`.
    ///
    /// An explicit path must exist; a missing default file means defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) if !path.exists() => return Err(ConfigError::NotFound(path.to_path_buf())),
            Some(path) => Self::from_file(path)?,
            None => {
                let path = default_config_path()?;
                if path.exists() {
                    Self::from_file(&path)?
                } else {
                    debug!(path = %path.display(), "No config file, using defaults");
                    Self::default()
                }
            }
        };

        if let Some(dir) = config.rcon.server_config_dir.clone() {
            config.apply_ini(&discover_ini(&dir));
        }
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, path)
    }

    fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn apply_ini(&mut self, ini: &IniCredentials) {
        if let Some(port) = ini.port {
            self.rcon.port = port;
        }
        if let Some(password) = &ini.password {
            self.rcon.password = password.clone();
        }
    }

    /// Apply `WARDEN_*` overrides read through `lookup`.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(path) = lookup("WARDEN_LOG_PATH") {
            self.log.path = Some(PathBuf::from(path));
        }
        if let Some(host) = lookup("WARDEN_RCON_HOST") {
            self.rcon.host = host;
        }
        if let Some(port) = lookup("WARDEN_RCON_PORT") {
            self.rcon.port = port.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "WARDEN_RCON_PORT",
                value: port.clone(),
            })?;
        }
        if let Some(password) = lookup("WARDEN_RCON_PASSWORD") {
            self.rcon.password = password;
        }
        Ok(())
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            host: self.rcon.host.clone(),
            port: self.rcon.port,
            password: self.rcon.password.clone(),
        }
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            timeout: Duration::from_millis(self.rcon.timeout_ms),
            queue_depth: self.rcon.queue_depth,
        }
    }

    pub fn tail_config(&self) -> TailConfig {
        TailConfig {
            max_backoff: Duration::from_secs(self.log.max_backoff_secs),
            max_read_bytes: self.log.max_read_bytes,
            ..TailConfig::default()
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.log.poll_interval_ms.max(10))
    }

    pub fn database_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.storage.database {
            Some(path) => Ok(path.clone()),
            None => Ok(warden_dir()?.join("warden.db")),
        }
    }

    pub fn issued_by(&self) -> String {
        self.commands
            .issued_by
            .clone()
            .unwrap_or_else(whoami::username)
    }
}

/// Read `RCONPort` / `RCONPassword` from the server's INI files.
///
/// The first file that defines a key wins for that key. Unreadable files are
/// skipped.
pub fn discover_ini(dir: &Path) -> IniCredentials {
    let mut found = IniCredentials::default();
    for name in SERVER_INI_FILES {
        let path = dir.join(name);
        let Ok(content) = fs::read_to_string(&path) else {
            continue;
        };
        if found.port.is_none() {
            found.port = INI_PORT
                .captures(&content)
                .and_then(|caps| caps[1].parse().ok());
        }
        if found.password.is_none() {
            found.password = INI_PASSWORD
                .captures(&content)
                .map(|caps| caps[1].to_string());
        }
        if found.port.is_some() && found.password.is_some() {
            break;
        }
    }
    if found != IniCredentials::default() {
        info!(dir = %dir.display(), port = ?found.port, "Found RCON settings in server INI");
    }
    found
}

/// Signal `changed` whenever the file at `path` is written or replaced.
///
/// The parent directory is watched so editors that replace the file are seen.
/// Keep the returned debouncer alive for as long as reloads are wanted.
pub fn watch(
    path: &Path,
    changed: mpsc::Sender<()>,
) -> Result<Debouncer<notify::RecommendedWatcher>, ConfigError> {
    let file_name = path.file_name().map(|n| n.to_os_string());
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();

    let mut debouncer = new_debouncer(
        Duration::from_millis(500),
        move |result: DebounceEventResult| match result {
            Ok(events) => {
                let ours = events
                    .iter()
                    .any(|e| e.path.file_name().map(|n| n.to_os_string()) == file_name);
                if ours {
                    // A full queue already holds a pending reload.
                    let _ = changed.try_send(());
                }
            }
            Err(e) => warn!(error = %e, "Config watcher error"),
        },
    )?;
    debouncer
        .watcher()
        .watch(&dir, RecursiveMode::NonRecursive)?;
    info!(path = %path.display(), "Watching config for changes");
    Ok(debouncer)
}
