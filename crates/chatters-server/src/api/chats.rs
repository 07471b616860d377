//! Conversation creation, listing and membership.

use axum::Json;
use axum::extract::{Path, State};
use chatters_core::{ChatId, UserId};
use chatters_store::{ChatRow, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, instrument};

use super::AuthUser;
use crate::error::ApiError;
use crate::server::AppState;

/// `POST /api/chats` body.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CreateChatRequest {
    /// Other participants; the caller is always added.
    pub members: Vec<UserId>,
    /// Recorded on the chat; does not limit the member count.
    pub is_group: bool,
}

/// `POST /api/chats/{chat_id}/members` body.
#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    /// User to add.
    pub user_id: UserId,
}

/// One entry of `GET /api/chats`.
#[derive(Debug, Serialize)]
pub struct ChatSummary {
    /// Conversation id.
    pub id: ChatId,
    /// Whether the conversation was created as a group.
    pub is_group: bool,
    /// Current members, creator first.
    pub members: Vec<UserId>,
    /// RFC 3339 creation time.
    pub created_at: String,
}

impl From<ChatRow> for ChatSummary {
    fn from(row: ChatRow) -> Self {
        Self {
            id: row.id,
            is_group: row.is_group,
            members: row.members,
            created_at: row.created_at,
        }
    }
}

/// Create a conversation with the caller and `members`.
#[instrument(skip_all, fields(creator = %creator))]
pub async fn create_chat(
    AuthUser(creator): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<CreateChatRequest>,
) -> Result<Json<Value>, ApiError> {
    if req.members.is_empty() {
        return Err(ApiError::BadRequest("at least one member required".into()));
    }

    let chat = state
        .store
        .run(move |s| s.chats.create(&creator, &req.members, req.is_group))
        .await
        .map_err(|e| match e {
            StoreError::UnknownUser(user) => ApiError::BadRequest(format!("user does not exist: {user}")),
            other => other.into(),
        })?;

    info!(chat_id = %chat.id, members = chat.members.len(), "chat created");
    Ok(Json(json!({ "chat_id": chat.id })))
}

/// Conversations the caller belongs to, with member lists.
pub async fn list_chats(
    AuthUser(user_id): AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<ChatSummary>>, ApiError> {
    let chats = state
        .store
        .run(move |s| s.chats.list_for_user(&user_id))
        .await?;
    Ok(Json(chats.into_iter().map(ChatSummary::from).collect()))
}

/// Add a user to a conversation the caller already belongs to.
#[instrument(skip_all, fields(chat_id = %chat_id, caller = %caller))]
pub async fn add_member(
    AuthUser(caller): AuthUser,
    State(state): State<AppState>,
    Path(chat_id): Path<ChatId>,
    Json(req): Json<AddMemberRequest>,
) -> Result<Json<Value>, ApiError> {
    let target = req.user_id;
    let chat = chat_id.clone();
    state
        .store
        .run(move |s| {
            if !s.chats.is_member(&chat, &caller)? {
                return Err(StoreError::NotMember {
                    chat_id: chat,
                    user_id: caller,
                });
            }
            s.chats.add_member(&chat, &target)
        })
        .await
        .map_err(|e| match e {
            StoreError::Conflict(what) => ApiError::BadRequest(what),
            other => other.into(),
        })?;

    info!("member added");
    Ok(Json(json!({ "status": "member added" })))
}
