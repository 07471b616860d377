//! `ChattersServer`: axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post, put};
use chatters_auth::JwtAuthority;
use chatters_core::Persistence;
use chatters_store::SqliteStore;
use metrics_exporter_prometheus::PrometheusHandle;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::api::{accounts, chats, media, messages};
use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::hub::{MessageRouter, RouterHandle};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::session::SessionContext;
use crate::websocket::upgrade::ws_upgrade;

/// Shared state accessible from axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Hub entry point.
    pub router: RouterHandle,
    /// Repositories for the REST surface.
    pub store: SqliteStore,
    /// Token issuer and validator.
    pub authority: Arc<JwtAuthority>,
    /// Handed to every upgraded connection.
    pub session: SessionContext,
    /// Runtime configuration.
    pub config: Arc<ServerConfig>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// The Chatters server.
pub struct ChattersServer {
    state: AppState,
    router_task: Mutex<Option<JoinHandle<()>>>,
}

impl ChattersServer {
    /// Build the server and start its message router.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        config: ServerConfig,
        store: SqliteStore,
        authority: Arc<JwtAuthority>,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let persistence: Arc<dyn Persistence> = Arc::new(store.clone());
        let (hub, router) = MessageRouter::new(
            Arc::clone(&persistence),
            Arc::new(store.clone()),
            config.router_queue_capacity,
        );
        let router_task = hub.spawn(shutdown.token());

        let session = SessionContext {
            router: router.clone(),
            persistence,
            heartbeat: config.heartbeat,
            outbound_capacity: config.outbound_queue_capacity,
        };
        let state = AppState {
            router,
            store,
            authority,
            session,
            config: Arc::new(config),
            shutdown,
            start_time: Instant::now(),
            metrics,
        };

        Self {
            state,
            router_task: Mutex::new(Some(router_task)),
        }
    }

    /// Build the axum router with all routes.
    pub fn router(&self) -> Router {
        let upload_limit = self.state.config.max_upload_bytes;

        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/register", post(accounts::register))
            .route("/login", post(accounts::login))
            .route("/api/me", get(accounts::me))
            .route("/api/profile/password", put(accounts::change_password))
            .route("/api/profile/username", put(accounts::change_username))
            .route("/api/ws", get(ws_upgrade))
            .route("/api/chats", get(chats::list_chats).post(chats::create_chat))
            .route("/api/chats/{chat_id}/members", post(chats::add_member))
            .route("/api/chats/{chat_id}/messages", get(messages::list_messages))
            .route(
                "/api/media",
                post(media::upload_media).layer(DefaultBodyLimit::max(upload_limit)),
            )
            .route("/api/media/{media_id}", get(media::download_media))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    /// Bind the configured address and serve until shutdown.
    ///
    /// Returns the bound address (useful with port 0) and the serve task.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind(self.state.config.bind_addr()).await?;
        let addr = listener.local_addr()?;
        let app = self.router();
        let token = self.state.shutdown.token();

        let handle = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(token.cancelled_owned());
            if let Err(e) = serve.await {
                error!(error = %e, "http server failed");
            }
        });

        info!(%addr, "chatters server listening");
        Ok((addr, handle))
    }

    /// Stop the listener and the router, waiting up to `timeout` for both.
    pub async fn shutdown_gracefully(&self, server_task: JoinHandle<()>, timeout: Option<Duration>) {
        let mut handles = vec![server_task];
        if let Some(router_task) = self.router_task.lock().take() {
            handles.push(router_task);
        }
        self.state.shutdown.graceful_shutdown(handles, timeout).await;
        info!("chatters server stopped");
    }

    /// Hub handle.
    pub fn hub(&self) -> &RouterHandle {
        &self.state.router
    }

    /// Shared handler state.
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.state.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(state.start_time, state.router.online_count()))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, crate::metrics::render(handle)),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed".to_string()),
    }
}
