//! Conversations and their membership.

use std::collections::BTreeSet;

use rusqlite::{Connection, OptionalExtension};
use tracing::instrument;

use chatters_core::{ChatId, UserId};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers::{self, now_rfc3339};

/// A conversation with its current members.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatRow {
    /// Conversation id.
    pub id: ChatId,
    /// Whether the conversation was created as a group.
    pub is_group: bool,
    /// Current members, creator first.
    pub members: Vec<UserId>,
    /// RFC 3339 creation time.
    pub created_at: String,
}

/// Conversation and membership storage.
#[derive(Clone)]
pub struct ChatRepo {
    db: Database,
}

impl ChatRepo {
    /// Repository over `db`.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create a conversation. The creator is always a member; duplicates in
    /// `members` are collapsed. Every member must be a registered user.
    /// `is_group` is recorded as given and does not limit the member count.
    #[instrument(skip(self, members), fields(creator = %creator, requested = members.len()))]
    pub fn create(
        &self,
        creator: &UserId,
        members: &[UserId],
        is_group: bool,
    ) -> Result<ChatRow, StoreError> {
        let mut unique: BTreeSet<&UserId> = members.iter().collect();
        let _ = unique.insert(creator);

        let id = ChatId::new();
        let now = now_rfc3339();
        // Creator first, then the others in a stable order.
        let ordered: Vec<UserId> = std::iter::once(creator)
            .chain(unique.iter().copied().filter(|u| *u != creator))
            .cloned()
            .collect();

        self.db.with_tx(|conn| {
            for member in &ordered {
                if !user_exists(conn, member)? {
                    return Err(StoreError::UnknownUser(member.clone()));
                }
            }
            let _ = conn.execute(
                "INSERT INTO chats (id, is_group, created_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![id.as_str(), is_group, now],
            )?;
            for member in &ordered {
                let _ = conn.execute(
                    "INSERT INTO chat_members (chat_id, user_id, joined_at) VALUES (?1, ?2, ?3)",
                    rusqlite::params![id.as_str(), member.as_str(), now],
                )?;
            }
            Ok(())
        })?;

        Ok(ChatRow {
            id,
            is_group,
            members: ordered,
            created_at: now,
        })
    }

    /// Every conversation `user` belongs to, oldest first.
    #[instrument(skip(self), fields(user_id = %user))]
    pub fn list_for_user(&self, user: &UserId) -> Result<Vec<ChatRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.is_group, c.created_at FROM chats c
                 JOIN chat_members m ON m.chat_id = c.id
                 WHERE m.user_id = ?1
                 ORDER BY c.created_at ASC, c.id ASC",
            )?;
            let mut rows = stmt.query([user.as_str()])?;
            let mut heads = Vec::new();
            while let Some(row) = rows.next()? {
                let id: String = row_helpers::get(row, 0, "chats", "id")?;
                let is_group: bool = row_helpers::get(row, 1, "chats", "is_group")?;
                let created_at: String = row_helpers::get(row, 2, "chats", "created_at")?;
                heads.push((ChatId::from_raw(id), is_group, created_at));
            }

            heads
                .into_iter()
                .map(|(id, is_group, created_at)| {
                    let members = members_of(conn, &id)?;
                    Ok(ChatRow {
                        id,
                        is_group,
                        members,
                        created_at,
                    })
                })
                .collect()
        })
    }

    /// Add `user` to an existing conversation.
    #[instrument(skip(self), fields(chat_id = %chat_id, user_id = %user))]
    pub fn add_member(&self, chat_id: &ChatId, user: &UserId) -> Result<(), StoreError> {
        let now = now_rfc3339();
        self.db.with_tx(|conn| {
            if !chat_exists(conn, chat_id)? {
                return Err(StoreError::NotFound(format!("chat {chat_id}")));
            }
            if !user_exists(conn, user)? {
                return Err(StoreError::UnknownUser(user.clone()));
            }
            if is_member_in(conn, chat_id, user)? {
                return Err(StoreError::Conflict("user already in chat".into()));
            }
            let _ = conn.execute(
                "INSERT INTO chat_members (chat_id, user_id, joined_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![chat_id.as_str(), user.as_str(), now],
            )?;
            Ok(())
        })
    }

    /// Whether `user` belongs to `chat_id`.
    pub fn is_member(&self, chat_id: &ChatId, user: &UserId) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| is_member_in(conn, chat_id, user))
    }

    /// Current members in join order; empty for an unknown chat.
    pub fn members(&self, chat_id: &ChatId) -> Result<Vec<UserId>, StoreError> {
        self.db.with_conn(|conn| members_of(conn, chat_id))
    }
}

pub(crate) fn is_member_in(
    conn: &Connection,
    chat_id: &ChatId,
    user: &UserId,
) -> Result<bool, StoreError> {
    let found = conn
        .query_row(
            "SELECT 1 FROM chat_members WHERE chat_id = ?1 AND user_id = ?2",
            [chat_id.as_str(), user.as_str()],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Fail with `NotMember` unless `user` belongs to `chat_id`.
pub(crate) fn ensure_member(
    conn: &Connection,
    chat_id: &ChatId,
    user: &UserId,
) -> Result<(), StoreError> {
    if is_member_in(conn, chat_id, user)? {
        Ok(())
    } else {
        Err(StoreError::NotMember {
            chat_id: chat_id.clone(),
            user_id: user.clone(),
        })
    }
}

fn members_of(conn: &Connection, chat_id: &ChatId) -> Result<Vec<UserId>, StoreError> {
    let mut stmt =
        conn.prepare("SELECT user_id FROM chat_members WHERE chat_id = ?1 ORDER BY rowid ASC")?;
    let mut rows = stmt.query([chat_id.as_str()])?;
    let mut members = Vec::new();
    while let Some(row) = rows.next()? {
        let id: String = row_helpers::get(row, 0, "chat_members", "user_id")?;
        members.push(UserId::from_raw(id));
    }
    Ok(members)
}

fn chat_exists(conn: &Connection, chat_id: &ChatId) -> Result<bool, StoreError> {
    let found = conn
        .query_row("SELECT 1 FROM chats WHERE id = ?1", [chat_id.as_str()], |_| Ok(()))
        .optional()?;
    Ok(found.is_some())
}

fn user_exists(conn: &Connection, user: &UserId) -> Result<bool, StoreError> {
    let found = conn
        .query_row("SELECT 1 FROM users WHERE id = ?1", [user.as_str()], |_| Ok(()))
        .optional()?;
    Ok(found.is_some())
}
