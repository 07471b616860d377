//! Async facade over the repositories.

use async_trait::async_trait;

use chatters_core::{
    ChatId, MembershipResolver, MessageId, Persistence, StorageError, StoredMedia, StoredMessage,
    UserId,
};

use crate::chats::ChatRepo;
use crate::database::Database;
use crate::error::StoreError;
use crate::media::MediaRepo;
use crate::messages::MessageRepo;
use crate::users::UserRepo;

/// All repositories over one shared database.
#[derive(Clone)]
pub struct SqliteStore {
    /// Accounts.
    pub users: UserRepo,
    /// Conversations and membership.
    pub chats: ChatRepo,
    /// Text messages.
    pub messages: MessageRepo,
    /// Media records.
    pub media: MediaRepo,
}

impl SqliteStore {
    /// Build the repositories over `db`.
    pub fn new(db: Database) -> Self {
        Self {
            users: UserRepo::new(db.clone()),
            chats: ChatRepo::new(db.clone()),
            messages: MessageRepo::new(db.clone()),
            media: MediaRepo::new(db),
        }
    }

    /// Run synchronous repository work on the blocking pool.
    pub async fn run<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&SqliteStore) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(|e| StoreError::TaskFailed(e.to_string()))?
    }
}

#[async_trait]
impl Persistence for SqliteStore {
    async fn append_message(
        &self,
        chat_id: &ChatId,
        sender: &UserId,
        content: &str,
    ) -> Result<StoredMessage, StorageError> {
        let (chat_id, sender, content) = (chat_id.clone(), sender.clone(), content.to_owned());
        Ok(self
            .run(move |s| s.messages.append(&chat_id, &sender, &content))
            .await?)
    }

    async fn mark_seen(
        &self,
        chat_id: &ChatId,
        viewer: &UserId,
    ) -> Result<Vec<MessageId>, StorageError> {
        let (chat_id, viewer) = (chat_id.clone(), viewer.clone());
        Ok(self.run(move |s| s.messages.mark_seen(&chat_id, &viewer)).await?)
    }

    async fn append_media(
        &self,
        chat_id: &ChatId,
        sender: &UserId,
        file_path: &str,
        mime_type: &str,
    ) -> Result<StoredMedia, StorageError> {
        let (chat_id, sender) = (chat_id.clone(), sender.clone());
        let (file_path, mime_type) = (file_path.to_owned(), mime_type.to_owned());
        Ok(self
            .run(move |s| s.media.append(&chat_id, &sender, &file_path, &mime_type))
            .await?)
    }
}

#[async_trait]
impl MembershipResolver for SqliteStore {
    async fn members(&self, chat_id: &ChatId) -> Result<Vec<UserId>, StorageError> {
        let chat_id = chat_id.clone();
        Ok(self.run(move |s| s.chats.members(&chat_id)).await?)
    }
}
