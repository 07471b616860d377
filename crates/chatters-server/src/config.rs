//! Server runtime configuration, derived from the loaded settings.

use std::path::PathBuf;
use std::time::Duration;

use chatters_settings::ChattersSettings;

use crate::websocket::heartbeat::HeartbeatConfig;

/// Values the server reads at runtime.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,
    /// Listen port (0 = OS-assigned).
    pub port: u16,
    /// Largest accepted WebSocket frame, in bytes.
    pub max_message_size: usize,
    /// Largest accepted upload body, in bytes.
    pub max_upload_bytes: usize,
    /// Per-connection outbound queue length.
    pub outbound_queue_capacity: usize,
    /// Hub inbound channel length.
    pub router_queue_capacity: usize,
    /// Ping cadence and liveness timeout.
    pub heartbeat: HeartbeatConfig,
    /// Root directory for uploaded media.
    pub upload_dir: PathBuf,
    /// bcrypt work factor for new passwords.
    pub bcrypt_cost: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            max_message_size: 64 * 1024,
            max_upload_bytes: 25 * 1024 * 1024,
            outbound_queue_capacity: 256,
            router_queue_capacity: 1024,
            heartbeat: HeartbeatConfig::default(),
            upload_dir: PathBuf::from("private_uploads"),
            bcrypt_cost: 12,
        }
    }
}

impl ServerConfig {
    /// Build from loaded settings.
    pub fn from_settings(settings: &ChattersSettings) -> Self {
        let server = &settings.server;
        Self {
            host: server.host.clone(),
            port: server.port,
            max_message_size: server.max_message_size,
            max_upload_bytes: server.max_upload_bytes,
            outbound_queue_capacity: server.outbound_queue_capacity,
            router_queue_capacity: server.router_queue_capacity,
            heartbeat: HeartbeatConfig {
                interval: server.heartbeat_interval(),
                timeout: server.heartbeat_timeout(),
            },
            upload_dir: PathBuf::from(&settings.storage.upload_dir),
            bcrypt_cost: settings.auth.bcrypt_cost,
        }
    }

    /// `host:port` for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Shorten the heartbeat for tests that exercise dead-peer detection.
    pub fn with_heartbeat(mut self, interval: Duration, timeout: Duration) -> Self {
        self.heartbeat = HeartbeatConfig { interval, timeout };
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_binds_loopback_ephemeral() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr(), "127.0.0.1:0");
        assert_eq!(config.outbound_queue_capacity, 256);
    }

    #[test]
    fn from_settings_copies_fields() {
        let mut settings = ChattersSettings::default();
        settings.server.port = 9001;
        settings.server.outbound_queue_capacity = 8;
        settings.server.heartbeat_interval_secs = 5;
        settings.server.heartbeat_timeout_secs = 15;
        settings.storage.upload_dir = "/srv/media".into();
        settings.auth.bcrypt_cost = 4;

        let config = ServerConfig::from_settings(&settings);
        assert_eq!(config.port, 9001);
        assert_eq!(config.outbound_queue_capacity, 8);
        assert_eq!(config.heartbeat.interval, Duration::from_secs(5));
        assert_eq!(config.heartbeat.timeout, Duration::from_secs(15));
        assert_eq!(config.upload_dir, PathBuf::from("/srv/media"));
        assert_eq!(config.bcrypt_cost, 4);
    }

    #[test]
    fn with_heartbeat_overrides() {
        let config = ServerConfig::default()
            .with_heartbeat(Duration::from_millis(50), Duration::from_millis(200));
        assert_eq!(config.heartbeat.interval, Duration::from_millis(50));
        assert_eq!(config.heartbeat.timeout, Duration::from_millis(200));
    }
}
