//! `GET /health`.

use std::time::Instant;

use serde::Serialize;

/// Liveness probe body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `"ok"` while the process is serving.
    pub status: &'static str,
    /// Whole seconds since startup.
    pub uptime_secs: u64,
    /// Users currently holding a live WebSocket.
    pub connections: usize,
}

/// Snapshot the server's uptime and online user count.
pub fn health_check(start_time: Instant, connections: usize) -> HealthResponse {
    HealthResponse {
        status: "ok",
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn fresh_server_reports_ok() {
        let resp = health_check(Instant::now(), 0);
        assert_eq!(resp.status, "ok");
        assert!(resp.uptime_secs < 2);
    }

    #[test]
    fn uptime_counts_from_start() {
        let start = Instant::now().checked_sub(Duration::from_secs(90)).unwrap();
        assert!(health_check(start, 0).uptime_secs >= 89);
    }

    #[test]
    fn body_shape() {
        let body = serde_json::to_value(health_check(Instant::now(), 3)).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["connections"], 3);
        assert!(body["uptime_secs"].is_u64());
    }
}
