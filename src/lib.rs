//! fxchatd - real-time messaging and push-notification hub.
//!
//! Clients connect over WebSocket, messages fan out through a single
//! coordination task (the hub), and everything that must survive a
//! restart lands in SQLite. A management REST API covers channels,
//! history, and device registration.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod hub;
pub mod metrics;
pub mod network;
pub mod notify;
pub mod proto;
pub mod router;
