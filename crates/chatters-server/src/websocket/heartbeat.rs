//! Ping cadence and peer liveness tracking.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

/// How often the write pump pings and how long a silent peer is tolerated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Interval between server-initiated Ping frames.
    pub interval: Duration,
    /// Silence after which the connection is considered dead.
    pub timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(90),
        }
    }
}

/// Last time anything arrived from the peer.
///
/// Shared between the read pump, which marks activity, and the write pump,
/// which checks it on every ping tick.
pub struct Liveness {
    last_seen: Mutex<Instant>,
}

impl Liveness {
    /// Start tracking from now.
    pub fn new() -> Self {
        Self {
            last_seen: Mutex::new(Instant::now()),
        }
    }

    /// Record inbound activity (any frame, including Pong).
    pub fn mark_alive(&self) {
        *self.last_seen.lock() = Instant::now();
    }

    /// Time since the last inbound activity.
    pub fn idle(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }

    /// Whether the peer has been silent longer than `timeout`.
    pub fn is_expired(&self, timeout: Duration) -> bool {
        self.idle() > timeout
    }
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}
