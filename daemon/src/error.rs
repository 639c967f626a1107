//! Error types for Warden.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigError;
use crate::dispatch::CommandError;
use crate::rcon::RconError;
use crate::storage::StoreError;

/// How a failure is handled, independent of which component raised it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// File or socket temporarily unavailable. Retried, never fatal.
    TransientIo,
    /// Malformed RCON frame. Connection reset, one reconnect.
    ProtocolViolation,
    /// Unrecognized line or orphan event. Counted only.
    ParseAnomaly,
    /// Duplicate key or corrupted record. Fatal for that write only.
    DataIntegrity,
    /// Rejected credentials. Fatal until new ones are configured.
    Auth,
    /// Request refused before any state was touched.
    Invalid,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorClass::TransientIo => "transient_io",
            ErrorClass::ProtocolViolation => "protocol_violation",
            ErrorClass::ParseAnomaly => "parse_anomaly",
            ErrorClass::DataIntegrity => "data_integrity",
            ErrorClass::Auth => "auth",
            ErrorClass::Invalid => "invalid",
        };
        f.write_str(name)
    }
}

/// Warden error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Rcon(#[from] RconError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::Io(_) => ErrorClass::TransientIo,
            Error::InvalidArgument(_) => ErrorClass::Invalid,
            Error::Store(e) => e.class(),
            Error::Rcon(e) => e.class(),
            Error::Command(e) => e.class(),
            Error::Config(e) => e.class(),
        }
    }
}
