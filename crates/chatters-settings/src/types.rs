//! Settings types with compiled defaults.
//!
//! All structs use `#[serde(rename_all = "camelCase", default)]` so a settings
//! file only needs the keys it overrides.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Placeholder signing secret. Startup logs a warning while it is in use.
pub const DEFAULT_JWT_SECRET: &str = "chatters-dev-secret-change-me";

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChattersSettings {
    /// HTTP / WebSocket server.
    pub server: ServerSettings,
    /// Token issuance and password hashing.
    pub auth: AuthSettings,
    /// Database and upload locations.
    pub storage: StorageSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl ChattersSettings {
    /// Reject combinations the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.auth.jwt_secret.is_empty() {
            return Err(SettingsError::InvalidValue("auth.jwtSecret is empty".into()));
        }
        if self.server.outbound_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "server.outboundQueueCapacity must be at least 1".into(),
            ));
        }
        if self.server.router_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "server.routerQueueCapacity must be at least 1".into(),
            ));
        }
        if self.server.heartbeat_interval_secs == 0 {
            return Err(SettingsError::InvalidValue(
                "server.heartbeatIntervalSecs must be at least 1".into(),
            ));
        }
        if self.server.heartbeat_timeout_secs < self.server.heartbeat_interval_secs {
            return Err(SettingsError::InvalidValue(
                "server.heartbeatTimeoutSecs must not be shorter than the interval".into(),
            ));
        }
        Ok(())
    }
}

/// Server network and runtime settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port (0 = OS-assigned).
    pub port: u16,
    /// Largest accepted WebSocket frame, in bytes.
    pub max_message_size: usize,
    /// Largest accepted upload body, in bytes.
    pub max_upload_bytes: usize,
    /// Per-connection outbound queue length before payloads are dropped.
    pub outbound_queue_capacity: usize,
    /// Hub inbound channel length before producers wait.
    pub router_queue_capacity: usize,
    /// Seconds between server-initiated pings.
    pub heartbeat_interval_secs: u64,
    /// Seconds of silence after which a peer is considered dead.
    pub heartbeat_timeout_secs: u64,
}

impl ServerSettings {
    /// Ping interval as a [`Duration`].
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Liveness timeout as a [`Duration`].
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }

    /// `host:port` string for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_message_size: 64 * 1024,
            max_upload_bytes: 25 * 1024 * 1024,
            outbound_queue_capacity: 256,
            router_queue_capacity: 1024,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
        }
    }
}

/// Token and password settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthSettings {
    /// HMAC secret for HS256 tokens.
    pub jwt_secret: String,
    /// Token lifetime in hours.
    pub token_ttl_hours: u64,
    /// bcrypt work factor.
    pub bcrypt_cost: u32,
}

impl AuthSettings {
    /// Whether the placeholder secret is still configured.
    pub fn uses_default_secret(&self) -> bool {
        self.jwt_secret == DEFAULT_JWT_SECRET
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            jwt_secret: DEFAULT_JWT_SECRET.to_string(),
            token_ttl_hours: 72,
            bcrypt_cost: 12,
        }
    }
}

/// Storage locations.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageSettings {
    /// SQLite database file.
    pub database_path: String,
    /// Root directory for uploaded media (one subdirectory per chat).
    pub upload_dir: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            database_path: "data/chatters.db".to_string(),
            upload_dir: "private_uploads".to_string(),
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level (`RUST_LOG` wins when set).
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
    /// Per-module level overrides, e.g. `{"chatters_server": "debug"}`.
    pub modules: std::collections::BTreeMap<String, String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            modules: std::collections::BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_defaults() {
        let s = ServerSettings::default();
        assert_eq!(s.host, "0.0.0.0");
        assert_eq!(s.port, 8080);
        assert_eq!(s.outbound_queue_capacity, 256);
        assert_eq!(s.router_queue_capacity, 1024);
        assert_eq!(s.heartbeat_interval(), Duration::from_secs(30));
        assert_eq!(s.heartbeat_timeout(), Duration::from_secs(90));
        assert_eq!(s.bind_addr(), "0.0.0.0:8080");
    }

    #[test]
    fn auth_defaults() {
        let a = AuthSettings::default();
        assert_eq!(a.token_ttl_hours, 72);
        assert_eq!(a.bcrypt_cost, 12);
        assert!(a.uses_default_secret());
    }

    #[test]
    fn storage_defaults() {
        let s = StorageSettings::default();
        assert_eq!(s.database_path, "data/chatters.db");
        assert_eq!(s.upload_dir, "private_uploads");
    }

    #[test]
    fn logging_defaults() {
        let l = LoggingSettings::default();
        assert_eq!(l.level, "info");
        assert!(!l.json);
        assert!(l.modules.is_empty());
    }

    #[test]
    fn serializes_camel_case() {
        let v = serde_json::to_value(ChattersSettings::default()).unwrap();
        assert!(v["server"]["outboundQueueCapacity"].is_number());
        assert!(v["auth"]["tokenTtlHours"].is_number());
        assert!(v["storage"]["uploadDir"].is_string());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let s: ChattersSettings = serde_json::from_str(r#"{"server":{"port":9000}}"#).unwrap();
        assert_eq!(s.server.port, 9000);
        assert_eq!(s.server.host, "0.0.0.0");
        assert_eq!(s.auth.token_ttl_hours, 72);
    }

    #[test]
    fn defaults_validate() {
        assert!(ChattersSettings::default().validate().is_ok());
    }

    #[test]
    fn empty_secret_is_invalid() {
        let mut s = ChattersSettings::default();
        s.auth.jwt_secret.clear();
        assert!(matches!(s.validate(), Err(SettingsError::InvalidValue(_))));
    }

    #[test]
    fn zero_queue_is_invalid() {
        let mut s = ChattersSettings::default();
        s.server.outbound_queue_capacity = 0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn timeout_shorter_than_interval_is_invalid() {
        let mut s = ChattersSettings::default();
        s.server.heartbeat_interval_secs = 60;
        s.server.heartbeat_timeout_secs = 30;
        assert!(s.validate().is_err());
    }
}
