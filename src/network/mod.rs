//! Network module.
//!
//! Contains the Gateway (WebSocket listener) and per-session Connection
//! handler.

mod connection;
mod gateway;

pub use connection::Connection;
pub use gateway::Gateway;
