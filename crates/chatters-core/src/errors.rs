//! Error taxonomy shared across the boundary between the hub and its
//! collaborators.

use crate::ids::{ChatId, UserId};

/// Credential verification failure. Always rejected at the boundary.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// No credential was presented.
    #[error("missing token")]
    MissingToken,
    /// The credential was well formed but has expired.
    #[error("token expired")]
    Expired,
    /// Bad signature, malformed token or unusable claims.
    #[error("invalid token: {0}")]
    Invalid(String),
}

/// Storage collaborator failure. The triggering event is dropped.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// The underlying database rejected the operation.
    #[error("database error: {0}")]
    Database(String),
    /// A referenced row does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// A uniqueness constraint would be violated.
    #[error("conflict: {0}")]
    Conflict(String),
    /// The user is not a member of the conversation.
    #[error("user {user_id} is not a member of chat {chat_id}")]
    NotMember {
        /// Conversation.
        chat_id: ChatId,
        /// Acting user.
        user_id: UserId,
    },
    /// Storage could not be reached at all.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    /// Short classification for logs and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Database(_) => "database",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::NotMember { .. } => "not_member",
            Self::Unavailable(_) => "unavailable",
        }
    }
}
