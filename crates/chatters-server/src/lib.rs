//! # chatters-server
//!
//! The live-message hub and everything around it.
//!
//! - [`hub`]: the single-loop [`hub::MessageRouter`] that persists inbound
//!   messages and fans them out, plus its connection registry
//! - [`websocket`]: per-connection read/write pumps, heartbeat, and the
//!   authenticated upgrade handshake
//! - [`api`]: REST endpoints for accounts, chats, history and media
//! - [`server`]: axum wiring, health, metrics and graceful shutdown

#![deny(unsafe_code)]

pub mod api;
pub mod config;
pub mod error;
pub mod health;
pub mod hub;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use server::{AppState, ChattersServer};
