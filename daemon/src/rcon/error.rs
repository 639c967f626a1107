use std::time::Duration;

use thiserror::Error;

use crate::error::ErrorClass;

#[derive(Debug, Error)]
pub enum RconError {
    #[error("RCON authentication failed: {0}")]
    Auth(String),

    #[error("RCON command timed out after {0:?}")]
    Timeout(Duration),

    #[error("RCON command queue is full")]
    Rejected,

    #[error("RCON channel down: {0}")]
    ChannelDown(String),

    #[error("RCON protocol violation: {0}")]
    Protocol(String),

    #[error("RCON I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RconError {
    pub fn class(&self) -> ErrorClass {
        match self {
            RconError::Auth(_) => ErrorClass::Auth,
            RconError::Protocol(_) => ErrorClass::ProtocolViolation,
            RconError::Timeout(_)
            | RconError::Rejected
            | RconError::ChannelDown(_)
            | RconError::Io(_) => ErrorClass::TransientIo,
        }
    }
}
