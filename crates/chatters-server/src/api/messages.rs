//! Conversation history.

use axum::Json;
use axum::extract::{Path, State};
use chatters_core::{ChatId, DeliveryStatus, MessageId, Persistence, UserId};
use chatters_store::MessageRow;
use serde::Serialize;
use tracing::{instrument, warn};

use super::AuthUser;
use crate::error::ApiError;
use crate::server::AppState;

/// One message in a history response.
#[derive(Debug, Serialize)]
pub struct MessageView {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub from: UserId,
    pub content: String,
    pub created_at: String,
    pub status: DeliveryStatus,
}

impl From<MessageRow> for MessageView {
    fn from(row: MessageRow) -> Self {
        Self {
            id: row.id,
            chat_id: row.chat_id,
            from: row.sender,
            content: row.content,
            created_at: row.created_at,
            status: row.status,
        }
    }
}

/// Full history of a conversation, oldest first.
///
/// Opening a conversation marks the other members' unseen messages as seen
/// and announces them with a single `seen` event.
#[instrument(skip_all, fields(chat_id = %chat_id, viewer = %viewer))]
pub async fn list_messages(
    AuthUser(viewer): AuthUser,
    State(state): State<AppState>,
    Path(chat_id): Path<ChatId>,
) -> Result<Json<Vec<MessageView>>, ApiError> {
    let (chat, user) = (chat_id.clone(), viewer.clone());
    let is_member = state
        .store
        .run(move |s| s.chats.is_member(&chat, &user))
        .await?;
    if !is_member {
        return Err(ApiError::Forbidden("not a chat member".into()));
    }

    match state.store.mark_seen(&chat_id, &viewer).await {
        Ok(ids) => {
            if state.router.broadcast_seen(chat_id.clone(), ids).await.is_err() {
                warn!("message router stopped, seen update not broadcast");
            }
        }
        Err(e) => warn!(error = %e, "failed to mark messages seen"),
    }

    let chat = chat_id.clone();
    let rows = state
        .store
        .run(move |s| s.messages.list(&chat))
        .await?;
    Ok(Json(rows.into_iter().map(MessageView::from).collect()))
}
