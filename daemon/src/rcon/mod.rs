//! Remote console client for the game server.

pub mod client;
pub mod error;
pub mod frame;

pub use client::{ClientOptions, ClientState, Credentials, Pending, RconClient};
pub use error::RconError;

#[cfg(test)]
pub mod testing;
