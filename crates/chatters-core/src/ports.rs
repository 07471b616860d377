//! Collaborator traits the hub is written against.
//!
//! Storage and credential checks live behind these seams so the router can be
//! driven by an in-memory store in tests and by SQLite in production.

use async_trait::async_trait;

use crate::errors::{AuthError, StorageError};
use crate::ids::{ChatId, MediaId, MessageId, UserId};

/// Result of durably appending a text message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredMessage {
    /// Server-assigned id.
    pub id: MessageId,
    /// RFC 3339 persistence timestamp.
    pub created_at: String,
}

/// Result of durably appending a media record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredMedia {
    /// Server-assigned id.
    pub id: MediaId,
    /// RFC 3339 persistence timestamp.
    pub created_at: String,
}

/// Durable message storage.
#[cfg_attr(feature = "mocks", mockall::automock)]
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Append a text message with status `sent`.
    async fn append_message(
        &self,
        chat_id: &ChatId,
        sender: &UserId,
        content: &str,
    ) -> Result<StoredMessage, StorageError>;

    /// Mark every message in `chat_id` not sent by `viewer` and not yet seen
    /// as seen. Returns the affected ids in ascending order.
    async fn mark_seen(
        &self,
        chat_id: &ChatId,
        viewer: &UserId,
    ) -> Result<Vec<MessageId>, StorageError>;

    /// Append a media record.
    async fn append_media(
        &self,
        chat_id: &ChatId,
        sender: &UserId,
        file_path: &str,
        mime_type: &str,
    ) -> Result<StoredMedia, StorageError>;
}

/// Current member set of a conversation. Queried on every fan-out.
#[cfg_attr(feature = "mocks", mockall::automock)]
#[async_trait]
pub trait MembershipResolver: Send + Sync {
    /// Members of `chat_id`; empty for an unknown conversation.
    async fn members(&self, chat_id: &ChatId) -> Result<Vec<UserId>, StorageError>;
}

/// Bearer credential verification.
#[cfg_attr(feature = "mocks", mockall::automock)]
pub trait AuthValidator: Send + Sync {
    /// Verify `token` and return the identity it was issued to.
    fn validate(&self, token: &str) -> Result<UserId, AuthError>;
}
