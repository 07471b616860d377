//! # chatters-store
//!
//! SQLite persistence. A single connection guarded by a mutex serializes all
//! writers, which keeps message ids strictly increasing and makes the
//! select-then-update in [`MessageRepo::mark_seen`] atomic.
//!
//! Repositories are synchronous; [`SqliteStore`] runs them on tokio's blocking
//! pool and implements the hub's [`chatters_core::Persistence`] and
//! [`chatters_core::MembershipResolver`] traits.

#![deny(unsafe_code)]

pub mod chats;
pub mod database;
pub mod error;
pub mod media;
pub mod messages;
pub mod row_helpers;
pub mod schema;
pub mod store;
pub mod users;

pub use chats::{ChatRepo, ChatRow};
pub use database::Database;
pub use error::StoreError;
pub use media::{MediaRepo, MediaRow};
pub use messages::{MessageRepo, MessageRow};
pub use store::SqliteStore;
pub use users::{UserRepo, UserRow};
