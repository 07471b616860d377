//! Text message log.

use tracing::{debug, instrument};

use chatters_core::{ChatId, DeliveryStatus, MessageId, StoredMessage, UserId};

use crate::chats::ensure_member;
use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers::{self, now_rfc3339};

/// One persisted message as returned by history queries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageRow {
    /// Monotonic id assigned on insert.
    pub id: MessageId,
    /// Conversation the message belongs to.
    pub chat_id: ChatId,
    /// Author.
    pub sender: UserId,
    /// Message text.
    pub content: String,
    /// `sent` until another member marks it seen.
    pub status: DeliveryStatus,
    /// RFC 3339 insert time.
    pub created_at: String,
}

/// Message storage.
#[derive(Clone)]
pub struct MessageRepo {
    db: Database,
}

impl MessageRepo {
    /// Repository over `db`.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Append a message with status `sent`. The sender must be a member.
    #[instrument(skip(self, content), fields(chat_id = %chat_id, sender = %sender, len = content.len()))]
    pub fn append(
        &self,
        chat_id: &ChatId,
        sender: &UserId,
        content: &str,
    ) -> Result<StoredMessage, StoreError> {
        let now = now_rfc3339();
        self.db.with_tx(|conn| {
            ensure_member(conn, chat_id, sender)?;
            let _ = conn.execute(
                "INSERT INTO messages (chat_id, sender_id, content, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    chat_id.as_str(),
                    sender.as_str(),
                    content,
                    DeliveryStatus::Sent.as_str(),
                    now,
                ],
            )?;
            let id = MessageId(conn.last_insert_rowid());
            debug!(message_id = %id, "message stored");
            Ok(StoredMessage {
                id,
                created_at: now.clone(),
            })
        })
    }

    /// Mark every unseen message in `chat_id` not sent by `viewer` as seen.
    ///
    /// Returns the ids that changed, ascending. A second call with no new
    /// messages returns an empty list.
    #[instrument(skip(self), fields(chat_id = %chat_id, viewer = %viewer))]
    pub fn mark_seen(
        &self,
        chat_id: &ChatId,
        viewer: &UserId,
    ) -> Result<Vec<MessageId>, StoreError> {
        self.db.with_tx(|conn| {
            ensure_member(conn, chat_id, viewer)?;
            let mut stmt = conn.prepare(
                "SELECT id FROM messages
                 WHERE chat_id = ?1 AND sender_id != ?2 AND status != 'seen'
                 ORDER BY id ASC",
            )?;
            let ids = stmt
                .query_map([chat_id.as_str(), viewer.as_str()], |row| row.get::<_, i64>(0))?
                .map(|r| r.map(MessageId))
                .collect::<Result<Vec<_>, _>>()?;

            if !ids.is_empty() {
                let changed = conn.execute(
                    "UPDATE messages SET status = 'seen'
                     WHERE chat_id = ?1 AND sender_id != ?2 AND status != 'seen'",
                    [chat_id.as_str(), viewer.as_str()],
                )?;
                debug!(changed, "messages marked seen");
            }
            Ok(ids)
        })
    }

    /// Full history of a conversation, oldest first.
    #[instrument(skip(self), fields(chat_id = %chat_id))]
    pub fn list(&self, chat_id: &ChatId) -> Result<Vec<MessageRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, chat_id, sender_id, content, status, created_at
                 FROM messages WHERE chat_id = ?1 ORDER BY id ASC",
            )?;
            let mut rows = stmt.query([chat_id.as_str()])?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                out.push(row_to_message(row)?);
            }
            Ok(out)
        })
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> Result<MessageRow, StoreError> {
    Ok(MessageRow {
        id: MessageId(row_helpers::get(row, 0, "messages", "id")?),
        chat_id: ChatId::from_raw(row_helpers::get::<String>(row, 1, "messages", "chat_id")?),
        sender: UserId::from_raw(row_helpers::get::<String>(row, 2, "messages", "sender_id")?),
        content: row_helpers::get(row, 3, "messages", "content")?,
        status: row_helpers::parse(row, 4, "messages", "status")?,
        created_at: row_helpers::get(row, 5, "messages", "created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chats::ChatRepo;
    use crate::users::UserRepo;
    use assert_matches::assert_matches;

    struct Fixture {
        repo: MessageRepo,
        chat: ChatId,
    }

    fn uid(s: &str) -> UserId {
        UserId::from_raw(s)
    }

    fn fixture() -> Fixture {
        let db = Database::in_memory().unwrap();
        let users = UserRepo::new(db.clone());
        for name in ["alice", "bob", "mallory"] {
            let _ = users.create(name, &format!("{name}@example.com"), "h").unwrap();
        }
        let chat = ChatRepo::new(db.clone())
            .create(&uid("alice"), &[uid("bob")], false)
            .unwrap();
        Fixture {
            repo: MessageRepo::new(db),
            chat: chat.id,
        }
    }

    #[test]
    fn append_assigns_increasing_ids() {
        let f = fixture();
        let a = f.repo.append(&f.chat, &uid("alice"), "one").unwrap();
        let b = f.repo.append(&f.chat, &uid("bob"), "two").unwrap();
        let c = f.repo.append(&f.chat, &uid("alice"), "three").unwrap();
        assert!(a.id < b.id && b.id < c.id);
        assert!(a.created_at <= b.created_at);
    }

    #[test]
    fn list_returns_history_in_order() {
        let f = fixture();
        for (who, text) in [("alice", "m1"), ("bob", "m2"), ("alice", "m3")] {
            let _ = f.repo.append(&f.chat, &uid(who), text).unwrap();
        }
        let history = f.repo.list(&f.chat).unwrap();
        let contents: Vec<&str> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m1", "m2", "m3"]);
        assert!(history.iter().all(|m| m.status == DeliveryStatus::Sent));
        assert_eq!(history[1].sender, uid("bob"));
    }

    #[test]
    fn non_member_cannot_append() {
        let f = fixture();
        let err = f.repo.append(&f.chat, &uid("mallory"), "hi").unwrap_err();
        assert_matches!(err, StoreError::NotMember { .. });
        assert!(f.repo.list(&f.chat).unwrap().is_empty());
    }

    #[test]
    fn mark_seen_affects_only_other_senders() {
        let f = fixture();
        let m1 = f.repo.append(&f.chat, &uid("alice"), "from alice 1").unwrap();
        let _own = f.repo.append(&f.chat, &uid("bob"), "from bob").unwrap();
        let m3 = f.repo.append(&f.chat, &uid("alice"), "from alice 2").unwrap();

        let seen = f.repo.mark_seen(&f.chat, &uid("bob")).unwrap();
        assert_eq!(seen, vec![m1.id, m3.id]);

        let history = f.repo.list(&f.chat).unwrap();
        let statuses: Vec<DeliveryStatus> = history.iter().map(|m| m.status).collect();
        assert_eq!(
            statuses,
            vec![DeliveryStatus::Seen, DeliveryStatus::Sent, DeliveryStatus::Seen]
        );
    }

    #[test]
    fn mark_seen_is_idempotent() {
        let f = fixture();
        let _ = f.repo.append(&f.chat, &uid("alice"), "hi").unwrap();
        assert_eq!(f.repo.mark_seen(&f.chat, &uid("bob")).unwrap().len(), 1);
        assert!(f.repo.mark_seen(&f.chat, &uid("bob")).unwrap().is_empty());
    }

    #[test]
    fn mark_seen_with_nothing_pending_is_empty() {
        let f = fixture();
        assert!(f.repo.mark_seen(&f.chat, &uid("alice")).unwrap().is_empty());
    }

    #[test]
    fn non_member_cannot_mark_seen() {
        let f = fixture();
        let _ = f.repo.append(&f.chat, &uid("alice"), "hi").unwrap();
        assert_matches!(
            f.repo.mark_seen(&f.chat, &uid("mallory")),
            Err(StoreError::NotMember { .. })
        );
        assert_eq!(f.repo.list(&f.chat).unwrap()[0].status, DeliveryStatus::Sent);
    }
}
