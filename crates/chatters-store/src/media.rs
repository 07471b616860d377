//! Media attachment records. File bytes live on disk; rows hold the path.

use tracing::instrument;

use chatters_core::{ChatId, MediaId, StoredMedia, UserId};

use crate::chats::ensure_member;
use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers::{self, now_rfc3339};

/// One stored attachment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaRow {
    /// Id assigned on insert.
    pub id: MediaId,
    /// Conversation the file was posted to.
    pub chat_id: ChatId,
    /// Uploader.
    pub sender: UserId,
    /// Location under the upload directory.
    pub file_path: String,
    /// Content type recorded at upload.
    pub mime_type: String,
    /// Set once any member has downloaded the file.
    pub downloaded: bool,
    /// RFC 3339 upload time.
    pub created_at: String,
}

impl MediaRow {
    /// File name component of the stored path, without the upload prefix.
    pub fn file_name(&self) -> &str {
        let name = std::path::Path::new(&self.file_path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&self.file_path);
        // Stored names are `<nanos>_<original>`.
        name.split_once('_').map_or(name, |(_, original)| original)
    }
}

/// Media record storage.
#[derive(Clone)]
pub struct MediaRepo {
    db: Database,
}

impl MediaRepo {
    /// Repository over `db`.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Record an uploaded file. The sender must be a member.
    #[instrument(skip(self), fields(chat_id = %chat_id, sender = %sender))]
    pub fn append(
        &self,
        chat_id: &ChatId,
        sender: &UserId,
        file_path: &str,
        mime_type: &str,
    ) -> Result<StoredMedia, StoreError> {
        let now = now_rfc3339();
        self.db.with_tx(|conn| {
            ensure_member(conn, chat_id, sender)?;
            let _ = conn.execute(
                "INSERT INTO media_messages (chat_id, sender_id, file_path, mime_type, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![chat_id.as_str(), sender.as_str(), file_path, mime_type, now],
            )?;
            Ok(StoredMedia {
                id: MediaId(conn.last_insert_rowid()),
                created_at: now.clone(),
            })
        })
    }

    /// Fetch one attachment record.
    #[instrument(skip(self), fields(media_id = %id))]
    pub fn get(&self, id: MediaId) -> Result<MediaRow, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, chat_id, sender_id, file_path, mime_type, downloaded, created_at
                 FROM media_messages WHERE id = ?1",
            )?;
            let mut rows = stmt.query([id.get()])?;
            match rows.next()? {
                Some(row) => row_to_media(row),
                None => Err(StoreError::NotFound(format!("media {id}"))),
            }
        })
    }

    /// Flag a media record as downloaded.
    #[instrument(skip(self), fields(media_id = %id))]
    pub fn mark_downloaded(&self, id: MediaId) -> Result<(), StoreError> {
        let changed = self.db.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE media_messages SET downloaded = 1 WHERE id = ?1",
                [id.get()],
            )?)
        })?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("media {id}")));
        }
        Ok(())
    }
}

fn row_to_media(row: &rusqlite::Row<'_>) -> Result<MediaRow, StoreError> {
    Ok(MediaRow {
        id: MediaId(row_helpers::get(row, 0, "media_messages", "id")?),
        chat_id: ChatId::from_raw(row_helpers::get::<String>(row, 1, "media_messages", "chat_id")?),
        sender: UserId::from_raw(row_helpers::get::<String>(row, 2, "media_messages", "sender_id")?),
        file_path: row_helpers::get(row, 3, "media_messages", "file_path")?,
        mime_type: row_helpers::get(row, 4, "media_messages", "mime_type")?,
        downloaded: row_helpers::get(row, 5, "media_messages", "downloaded")?,
        created_at: row_helpers::get(row, 6, "media_messages", "created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chats::ChatRepo;
    use crate::users::UserRepo;
    use assert_matches::assert_matches;

    fn uid(s: &str) -> UserId {
        UserId::from_raw(s)
    }

    fn setup() -> (MediaRepo, ChatId) {
        let db = Database::in_memory().unwrap();
        let users = UserRepo::new(db.clone());
        for name in ["alice", "bob", "eve"] {
            let _ = users.create(name, &format!("{name}@example.com"), "h").unwrap();
        }
        let chat = ChatRepo::new(db.clone())
            .create(&uid("alice"), &[uid("bob")], false)
            .unwrap();
        (MediaRepo::new(db), chat.id)
    }

    #[test]
    fn append_and_get() {
        let (repo, chat) = setup();
        let stored = repo
            .append(&chat, &uid("alice"), "uploads/c/123_cat.png", "image/png")
            .unwrap();
        let row = repo.get(stored.id).unwrap();
        assert_eq!(row.chat_id, chat);
        assert_eq!(row.sender, uid("alice"));
        assert_eq!(row.mime_type, "image/png");
        assert!(!row.downloaded);
        assert_eq!(row.created_at, stored.created_at);
    }

    #[test]
    fn ids_increase() {
        let (repo, chat) = setup();
        let a = repo.append(&chat, &uid("alice"), "a", "text/plain").unwrap();
        let b = repo.append(&chat, &uid("bob"), "b", "text/plain").unwrap();
        assert!(a.id < b.id);
    }

    #[test]
    fn non_member_cannot_append() {
        let (repo, chat) = setup();
        assert_matches!(
            repo.append(&chat, &uid("eve"), "x", "text/plain"),
            Err(StoreError::NotMember { .. })
        );
    }

    #[test]
    fn mark_downloaded_sets_flag() {
        let (repo, chat) = setup();
        let stored = repo.append(&chat, &uid("alice"), "p", "image/png").unwrap();
        repo.mark_downloaded(stored.id).unwrap();
        assert!(repo.get(stored.id).unwrap().downloaded);
    }

    #[test]
    fn unknown_media_is_not_found() {
        let (repo, _) = setup();
        assert_matches!(repo.get(MediaId(999)), Err(StoreError::NotFound(_)));
        assert_matches!(repo.mark_downloaded(MediaId(999)), Err(StoreError::NotFound(_)));
    }

    #[test]
    fn file_name_strips_prefix() {
        let (repo, chat) = setup();
        let stored = repo
            .append(&chat, &uid("alice"), "private_uploads/c1/1700000000_my_photo.jpg", "image/jpeg")
            .unwrap();
        assert_eq!(repo.get(stored.id).unwrap().file_name(), "my_photo.jpg");
    }
}
