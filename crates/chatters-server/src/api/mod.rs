//! REST endpoints.
//!
//! Every `/api/*` handler authenticates through [`AuthUser`], which reads an
//! `Authorization: Bearer <token>` header.

pub mod accounts;
pub mod chats;
pub mod extract;
pub mod media;
pub mod messages;

pub use extract::AuthUser;

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::Router;
    use axum::body::Body;
    use axum::http::{Request, header};
    use axum::response::Response;
    use chatters_auth::JwtAuthority;
    use chatters_core::UserId;
    use chatters_store::{Database, SqliteStore};
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::config::ServerConfig;
    use crate::server::ChattersServer;

    pub(crate) struct TestApp {
        pub(crate) server: ChattersServer,
        pub(crate) store: SqliteStore,
        pub(crate) authority: Arc<JwtAuthority>,
        pub(crate) _uploads: tempfile::TempDir,
    }

    impl TestApp {
        pub(crate) fn new() -> Self {
            let uploads = tempfile::tempdir().unwrap();
            let config = ServerConfig {
                upload_dir: uploads.path().to_path_buf(),
                bcrypt_cost: 4,
                ..ServerConfig::default()
            };
            let store = SqliteStore::new(Database::in_memory().unwrap());
            let authority = Arc::new(JwtAuthority::new(b"test-secret", Duration::from_secs(3600)));
            let server = ChattersServer::new(config, store.clone(), Arc::clone(&authority), None);
            Self {
                server,
                store,
                authority,
                _uploads: uploads,
            }
        }

        pub(crate) fn router(&self) -> Router {
            self.server.router()
        }

        /// Insert a user directly and return a bearer token for them.
        pub(crate) fn user(&self, name: &str) -> String {
            let _ = self
                .store
                .users
                .create(name, &format!("{name}@example.com"), "unused-hash")
                .unwrap();
            self.authority.issue(&UserId::from_raw(name)).unwrap()
        }

        pub(crate) async fn call(&self, request: Request<Body>) -> (u16, Value) {
            let response = self.router().oneshot(request).await.unwrap();
            into_json(response).await
        }
    }

    pub(crate) async fn into_json(response: Response) -> (u16, Value) {
        let status = response.status().as_u16();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap_or(Value::Null)
        };
        (status, json)
    }

    pub(crate) fn json_request(method: &str, uri: &str, token: Option<&str>, body: &Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    pub(crate) fn get(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }
}
