//! Registered accounts.

use tracing::{info, instrument};

use chatters_core::UserId;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers::{self, now_rfc3339};

/// A registered account. Never serialized: it carries the password hash.
#[derive(Clone, Debug)]
pub struct UserRow {
    /// Username, used as the identity everywhere else.
    pub id: UserId,
    /// Unique contact address; also accepted at login.
    pub email: String,
    /// bcrypt hash of the password.
    pub password_hash: String,
    /// RFC 3339 registration time.
    pub created_at: String,
}

/// Account storage.
#[derive(Clone)]
pub struct UserRepo {
    db: Database,
}

/// Columns that hold a user id and must follow a rename.
const USER_REFERENCES: [(&str, &str); 3] = [
    ("chat_members", "user_id"),
    ("messages", "sender_id"),
    ("media_messages", "sender_id"),
];

impl UserRepo {
    /// Repository over `db`.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Register a new account. The username becomes the user's identity.
    #[instrument(skip(self, password_hash))]
    pub fn create(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<UserRow, StoreError> {
        if username.is_empty() || email.is_empty() {
            return Err(StoreError::InvalidInput("username and email are required".into()));
        }
        let now = now_rfc3339();

        self.db.with_tx(|conn| {
            let email_taken: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE email = ?1)",
                [email],
                |row| row.get(0),
            )?;
            if email_taken {
                return Err(StoreError::Conflict("email already in use".into()));
            }
            let name_taken: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)",
                [username],
                |row| row.get(0),
            )?;
            if name_taken {
                return Err(StoreError::Conflict("username already taken".into()));
            }

            let _ = conn.execute(
                "INSERT INTO users (id, email, password_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![username, email, password_hash, now],
            )?;

            Ok(UserRow {
                id: UserId::from_raw(username),
                email: email.to_string(),
                password_hash: password_hash.to_string(),
                created_at: now.clone(),
            })
        })
    }

    /// Look up an account by username or email, for login.
    #[instrument(skip(self))]
    pub fn find_by_login(&self, identifier: &str) -> Result<Option<UserRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, email, password_hash, created_at FROM users
                 WHERE id = ?1 OR email = ?1
                 ORDER BY id = ?1 DESC
                 LIMIT 1",
            )?;
            let mut rows = stmt.query([identifier])?;
            match rows.next()? {
                Some(row) => Ok(Some(row_to_user(row)?)),
                None => Ok(None),
            }
        })
    }

    /// Fetch an account by identity.
    #[instrument(skip(self), fields(user_id = %id))]
    pub fn get(&self, id: &UserId) -> Result<UserRow, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, email, password_hash, created_at FROM users WHERE id = ?1",
            )?;
            let mut rows = stmt.query([id.as_str()])?;
            match rows.next()? {
                Some(row) => row_to_user(row),
                None => Err(StoreError::UnknownUser(id.clone())),
            }
        })
    }

    /// Replace the stored password hash.
    #[instrument(skip(self, password_hash), fields(user_id = %id))]
    pub fn update_password(&self, id: &UserId, password_hash: &str) -> Result<(), StoreError> {
        let updated = self.db.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE users SET password_hash = ?1 WHERE id = ?2",
                [password_hash, id.as_str()],
            )?)
        })?;
        if updated == 0 {
            return Err(StoreError::UnknownUser(id.clone()));
        }
        Ok(())
    }

    /// Change a user's identity, carrying memberships and authored messages
    /// and media along in the same transaction.
    #[instrument(skip(self), fields(user_id = %current))]
    pub fn rename(&self, current: &UserId, new_username: &str) -> Result<UserId, StoreError> {
        if new_username.is_empty() {
            return Err(StoreError::InvalidInput("username is required".into()));
        }

        let renamed = self.db.with_tx(|conn| {
            let taken: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)",
                [new_username],
                |row| row.get(0),
            )?;
            if taken {
                return Err(StoreError::Conflict("username already taken".into()));
            }

            // Child rows briefly point at the old id; checked at commit.
            conn.execute_batch("PRAGMA defer_foreign_keys = ON")?;
            let updated = conn.execute(
                "UPDATE users SET id = ?1 WHERE id = ?2",
                [new_username, current.as_str()],
            )?;
            if updated == 0 {
                return Err(StoreError::UnknownUser(current.clone()));
            }
            for (table, column) in USER_REFERENCES {
                let _ = conn.execute(
                    &format!("UPDATE {table} SET {column} = ?1 WHERE {column} = ?2"),
                    [new_username, current.as_str()],
                )?;
            }
            Ok(UserId::from_raw(new_username))
        })?;

        info!(new_id = %renamed, "user renamed");
        Ok(renamed)
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> Result<UserRow, StoreError> {
    Ok(UserRow {
        id: UserId::from_raw(row_helpers::get::<String>(row, 0, "users", "id")?),
        email: row_helpers::get(row, 1, "users", "email")?,
        password_hash: row_helpers::get(row, 2, "users", "password_hash")?,
        created_at: row_helpers::get(row, 3, "users", "created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    use crate::chats::ChatRepo;
    use crate::media::MediaRepo;
    use crate::messages::MessageRepo;

    fn repo() -> UserRepo {
        UserRepo::new(Database::in_memory().unwrap())
    }

    #[test]
    fn create_and_get() {
        let repo = repo();
        let user = repo.create("alice", "alice@example.com", "hash").unwrap();
        assert_eq!(user.id.as_str(), "alice");

        let fetched = repo.get(&UserId::from_raw("alice")).unwrap();
        assert_eq!(fetched.email, "alice@example.com");
        assert_eq!(fetched.password_hash, "hash");
    }

    #[test]
    fn duplicate_email_conflicts() {
        let repo = repo();
        let _ = repo.create("alice", "a@example.com", "h").unwrap();
        let err = repo.create("alice2", "a@example.com", "h").unwrap_err();
        assert_matches!(err, StoreError::Conflict(msg) if msg.contains("email"));
    }

    #[test]
    fn duplicate_username_conflicts() {
        let repo = repo();
        let _ = repo.create("alice", "a@example.com", "h").unwrap();
        let err = repo.create("alice", "b@example.com", "h").unwrap_err();
        assert_matches!(err, StoreError::Conflict(msg) if msg.contains("username"));
    }

    #[test]
    fn empty_fields_rejected() {
        assert_matches!(repo().create("", "a@b.c", "h"), Err(StoreError::InvalidInput(_)));
    }

    #[test]
    fn find_by_username_or_email() {
        let repo = repo();
        let _ = repo.create("bob", "bob@example.com", "h").unwrap();
        assert_eq!(repo.find_by_login("bob").unwrap().unwrap().id.as_str(), "bob");
        assert_eq!(
            repo.find_by_login("bob@example.com").unwrap().unwrap().id.as_str(),
            "bob"
        );
        assert!(repo.find_by_login("carol").unwrap().is_none());
    }

    #[test]
    fn username_match_wins_over_email_match() {
        let repo = repo();
        let _ = repo.create("x@example.com", "first@example.com", "h1").unwrap();
        let _ = repo.create("second", "x@example.com", "h2").unwrap();
        let found = repo.find_by_login("x@example.com").unwrap().unwrap();
        assert_eq!(found.password_hash, "h1");
    }

    #[test]
    fn get_missing_is_unknown_user() {
        assert_matches!(
            repo().get(&UserId::from_raw("ghost")),
            Err(StoreError::UnknownUser(id)) if id.as_str() == "ghost"
        );
    }

    #[test]
    fn update_password_replaces_hash() {
        let repo = repo();
        let _ = repo.create("dave", "d@example.com", "old").unwrap();
        let dave = UserId::from_raw("dave");
        repo.update_password(&dave, "new").unwrap();
        assert_eq!(repo.get(&dave).unwrap().password_hash, "new");

        assert_matches!(
            repo.update_password(&UserId::from_raw("erin"), "x"),
            Err(StoreError::UnknownUser(_))
        );
    }

    #[test]
    fn rename_carries_memberships_and_authorship() {
        let db = Database::in_memory().unwrap();
        let users = UserRepo::new(db.clone());
        let chats = ChatRepo::new(db.clone());
        let messages = MessageRepo::new(db.clone());
        let media = MediaRepo::new(db);
        for name in ["alice", "bob"] {
            let _ = users.create(name, &format!("{name}@example.com"), "h").unwrap();
        }
        let alice = UserId::from_raw("alice");
        let chat = chats.create(&alice, &[UserId::from_raw("bob")], false).unwrap();
        let message = messages.append(&chat.id, &alice, "hi").unwrap();
        let upload = media.append(&chat.id, &alice, "up/1_a.png", "image/png").unwrap();

        let renamed = users.rename(&alice, "alicia").unwrap();
        assert_eq!(renamed.as_str(), "alicia");

        assert_matches!(users.get(&alice), Err(StoreError::UnknownUser(_)));
        let row = users.get(&renamed).unwrap();
        assert_eq!(row.email, "alice@example.com");
        assert_eq!(users.find_by_login("alice@example.com").unwrap().unwrap().id, renamed);

        assert_eq!(chats.members(&chat.id).unwrap(), vec![renamed.clone(), UserId::from_raw("bob")]);
        assert!(chats.list_for_user(&alice).unwrap().is_empty());
        let history = messages.list(&chat.id).unwrap();
        assert_eq!(history[0].id, message.id);
        assert_eq!(history[0].sender, renamed);
        assert_eq!(media.get(upload.id).unwrap().sender, renamed);
    }

    #[test]
    fn rename_to_taken_or_empty_name_is_rejected() {
        let repo = repo();
        let _ = repo.create("alice", "a@example.com", "h").unwrap();
        let _ = repo.create("bob", "b@example.com", "h").unwrap();
        let alice = UserId::from_raw("alice");

        assert_matches!(
            repo.rename(&alice, "bob"),
            Err(StoreError::Conflict(msg)) if msg == "username already taken"
        );
        assert_matches!(repo.rename(&alice, ""), Err(StoreError::InvalidInput(_)));
        assert_eq!(repo.get(&alice).unwrap().email, "a@example.com");
    }

    #[test]
    fn rename_unknown_user_changes_nothing() {
        let repo = repo();
        assert_matches!(
            repo.rename(&UserId::from_raw("ghost"), "spirit"),
            Err(StoreError::UnknownUser(_))
        );
        assert!(repo.find_by_login("spirit").unwrap().is_none());
    }
}
