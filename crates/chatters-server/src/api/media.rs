//! Media upload and download.
//!
//! Files are stored under `<upload_dir>/<chat_id>/<nanos>_<name>`; the
//! database only keeps the path and MIME type.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Multipart, Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use chatters_core::{ChatId, MediaId, Persistence};
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};

use super::AuthUser;
use crate::error::ApiError;
use crate::hub::MediaNotice;
use crate::server::AppState;

const DEFAULT_MIME: &str = "application/octet-stream";

struct UploadedFile {
    filename: String,
    mime_type: String,
    data: Bytes,
}

/// Accept a multipart upload (`chat_id`, `file`) from a chat member.
#[instrument(skip_all, fields(sender = %sender))]
pub async fn upload_media(
    AuthUser(sender): AuthUser,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let mut chat_id: Option<ChatId> = None;
    let mut file: Option<UploadedFile> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("chat_id") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.body_text()))?;
                chat_id = Some(ChatId::from_raw(text.trim()));
            }
            Some("file") => {
                let filename = sanitize_filename(field.file_name().unwrap_or_default());
                let mime_type = field.content_type().unwrap_or(DEFAULT_MIME).to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.body_text()))?;
                file = Some(UploadedFile {
                    filename,
                    mime_type,
                    data,
                });
            }
            _ => {}
        }
    }

    let chat_id = chat_id
        .filter(|id| !id.as_str().is_empty())
        .ok_or_else(|| ApiError::BadRequest("chat_id required".into()))?;

    let (chat, user) = (chat_id.clone(), sender.clone());
    let is_member = state
        .store
        .run(move |s| s.chats.is_member(&chat, &user))
        .await?;
    if !is_member {
        return Err(ApiError::Forbidden("not a chat member".into()));
    }

    let file = file.ok_or_else(|| ApiError::BadRequest("file required".into()))?;

    let dir = state.config.upload_dir.join(chat_id.as_str());
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| ApiError::internal("failed to save file", e))?;
    let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let path = dir.join(format!("{nanos}_{}", file.filename));
    tokio::fs::write(&path, &file.data)
        .await
        .map_err(|e| ApiError::internal("failed to save file", e))?;
    let stored_path = path.to_string_lossy().into_owned();

    let stored = match state
        .store
        .append_media(&chat_id, &sender, &stored_path, &file.mime_type)
        .await
    {
        Ok(stored) => stored,
        Err(e) => {
            if let Err(io) = tokio::fs::remove_file(&path).await {
                warn!(path = %stored_path, error = %io, "failed to remove orphaned upload");
            }
            return Err(e.into());
        }
    };

    info!(
        chat_id = %chat_id,
        media_id = %stored.id,
        bytes = file.data.len(),
        "media uploaded"
    );

    let notice = MediaNotice {
        id: stored.id,
        chat_id,
        from: sender,
        filename: file.filename,
        created_at: stored.created_at,
    };
    if state.router.broadcast_media(notice).await.is_err() {
        warn!("message router stopped, media not broadcast");
    }

    Ok(Json(json!({ "media_id": stored.id })))
}

/// Serve a stored file to a member of its chat.
///
/// The downloaded flag is set by a detached task after the response is built.
#[instrument(skip_all, fields(media_id = media_id, viewer = %viewer))]
pub async fn download_media(
    AuthUser(viewer): AuthUser,
    State(state): State<AppState>,
    Path(media_id): Path<i64>,
) -> Result<Response, ApiError> {
    let id = MediaId(media_id);
    let row = state
        .store
        .run(move |s| s.media.get(id))
        .await
        .map_err(|_| ApiError::NotFound("not found".into()))?;

    let (chat, user) = (row.chat_id.clone(), viewer.clone());
    let is_member = state
        .store
        .run(move |s| s.chats.is_member(&chat, &user))
        .await?;
    if !is_member {
        return Err(ApiError::Forbidden("forbidden".into()));
    }

    let data = tokio::fs::read(&row.file_path).await.map_err(|e| {
        warn!(path = %row.file_path, error = %e, "stored media file is missing");
        ApiError::NotFound("not found".into())
    })?;

    let store = state.store.clone();
    drop(tokio::spawn(async move {
        match store.run(move |s| s.media.mark_downloaded(id)).await {
            Ok(()) => debug!(media_id = %id, "media marked downloaded"),
            Err(e) => warn!(media_id = %id, error = %e, "failed to mark media downloaded"),
        }
    }));

    let disposition = format!("attachment; filename=\"{}\"", row.file_name());
    Ok((
        [
            (header::CONTENT_TYPE, row.mime_type.clone()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        data,
    )
        .into_response())
}

/// Keep only the final path component and replace anything unusual.
fn sanitize_filename(raw: &str) -> String {
    let base = std::path::Path::new(raw)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}
