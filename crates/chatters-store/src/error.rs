//! Store error type.

use chatters_core::{ChatId, StorageError, UserId};

/// Errors raised by repositories.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// SQLite rejected the statement.
    #[error("database error: {0}")]
    Database(String),

    /// A referenced row does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A referenced account does not exist.
    #[error("unknown user: {0}")]
    UnknownUser(UserId),

    /// A uniqueness rule would be violated.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The acting user does not belong to the chat.
    #[error("user {user_id} is not a member of chat {chat_id}")]
    NotMember {
        /// Conversation.
        chat_id: ChatId,
        /// Acting user.
        user_id: UserId,
    },

    /// Caller-supplied data is unusable.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A stored value could not be decoded.
    #[error("corrupt row in {table}.{column}: {detail}")]
    CorruptRow {
        /// Table name.
        table: &'static str,
        /// Column name.
        column: &'static str,
        /// Decoder message.
        detail: String,
    },

    /// Filesystem failure around the database file.
    #[error("IO error: {0}")]
    Io(String),

    /// The blocking task running the query panicked or was cancelled.
    #[error("storage task failed: {0}")]
    TaskFailed(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<StoreError> for StorageError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => StorageError::NotFound(what),
            StoreError::UnknownUser(user) => StorageError::NotFound(format!("user {user}")),
            StoreError::Conflict(what) => StorageError::Conflict(what),
            StoreError::NotMember { chat_id, user_id } => {
                StorageError::NotMember { chat_id, user_id }
            }
            StoreError::TaskFailed(detail) | StoreError::Io(detail) => {
                StorageError::Unavailable(detail)
            }
            other @ (StoreError::Database(_)
            | StoreError::InvalidInput(_)
            | StoreError::CorruptRow { .. }) => StorageError::Database(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_member_maps_across() {
        let err: StorageError = StoreError::NotMember {
            chat_id: ChatId::from_raw("c"),
            user_id: UserId::from_raw("u"),
        }
        .into();
        assert_eq!(err.kind(), "not_member");
    }

    #[test]
    fn unknown_user_is_not_found() {
        let err: StorageError = StoreError::UnknownUser(UserId::from_raw("bob")).into();
        assert_eq!(err, StorageError::NotFound("user bob".into()));
    }

    #[test]
    fn task_failure_is_unavailable() {
        let err: StorageError = StoreError::TaskFailed("panicked".into()).into();
        assert_eq!(err, StorageError::Unavailable("panicked".into()));
    }

    #[test]
    fn corrupt_row_is_database() {
        let err: StorageError = StoreError::CorruptRow {
            table: "messages",
            column: "status",
            detail: "bad".into(),
        }
        .into();
        assert_eq!(err.kind(), "database");
        assert!(err.to_string().contains("messages.status"));
    }

    #[test]
    fn rusqlite_error_converts() {
        let err: StoreError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, StoreError::Database(_)));
    }
}
