//! `GET /api/ws`: authenticate first, then upgrade.

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chatters_core::AuthValidator;
use metrics::counter;
use serde::Deserialize;
use tracing::warn;

use super::session::run_ws_session;
use crate::metrics::WS_UPGRADE_REJECTED_TOTAL;
use crate::server::AppState;

/// Query string carrying the bearer token.
#[derive(Debug, Default, Deserialize)]
pub struct WsAuthQuery {
    /// Signed session token.
    #[serde(default)]
    pub token: Option<String>,
}

/// Validate `?token=` and only then switch protocols.
///
/// A missing or invalid token is answered with `401` and the connection is
/// never upgraded.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    query: Result<Query<WsAuthQuery>, QueryRejection>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let token = query
        .ok()
        .and_then(|Query(q)| q.token)
        .unwrap_or_default();

    let user_id = match state.authority.validate(&token) {
        Ok(user_id) => user_id,
        Err(e) => {
            warn!(error = %e, "websocket upgrade rejected");
            counter!(WS_UPGRADE_REJECTED_TOTAL).increment(1);
            return (StatusCode::UNAUTHORIZED, e.to_string()).into_response();
        }
    };

    let ws = match upgrade {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    let ctx = state.session.clone();
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| run_ws_session(socket, user_id, ctx))
}
