//! # chatters-core
//!
//! Foundation types shared by every Chatters crate:
//!
//! - Branded identifiers for users, chats, connections, messages and media
//! - The wire protocol: [`ChatEvent`] (server → client) and [`ClientFrame`]
//!   (client → server), both tagged by `type`
//! - The error taxonomy ([`AuthError`], [`StorageError`])
//! - Collaborator traits the hub depends on ([`Persistence`],
//!   [`MembershipResolver`], [`AuthValidator`])

#![deny(unsafe_code)]

pub mod errors;
pub mod events;
pub mod ids;
pub mod ports;

pub use errors::{AuthError, StorageError};
pub use events::{ChatEvent, ClientFrame, DeliveryStatus};
pub use ids::{ChatId, ConnectionId, MediaId, MessageId, UserId};
pub use ports::{AuthValidator, MembershipResolver, Persistence, StoredMedia, StoredMessage};
