//! Hub-side handle to one live WebSocket connection.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chatters_core::{ChatEvent, ConnectionId, UserId};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// One authenticated client connection as seen by the router.
///
/// The registry owns the only sender of the outbound queue. Dropping the
/// connection closes the queue, which tells the write pump to flush what is
/// left, send a Close frame and exit.
pub struct ClientConnection {
    id: ConnectionId,
    user_id: UserId,
    /// Send channel to the connection's write pump.
    tx: mpsc::Sender<Arc<str>>,
    /// Fired when the hub wants the session torn down.
    closing: CancellationToken,
    /// When this connection was established.
    connected_at: Instant,
    /// Count of events dropped due to a full or closed queue.
    dropped_messages: AtomicU64,
}

impl ClientConnection {
    /// Create a connection for `user_id` with a bounded outbound queue.
    pub fn new(user_id: UserId, capacity: usize) -> (Self, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let connection = Self {
            id: ConnectionId::new(),
            user_id,
            tx,
            closing: CancellationToken::new(),
            connected_at: Instant::now(),
            dropped_messages: AtomicU64::new(0),
        };
        (connection, rx)
    }

    /// Unique id of this connection.
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Authenticated owner.
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Token the session's pumps watch for hub-initiated teardown.
    pub fn closing_token(&self) -> CancellationToken {
        self.closing.clone()
    }

    /// Enqueue a serialized event without waiting.
    ///
    /// Returns `false` if the queue is full or closed, and increments
    /// the dropped message counter.
    pub fn send(&self, payload: Arc<str>) -> bool {
        if self.tx.try_send(payload).is_ok() {
            true
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Serialize an event and enqueue it.
    pub fn send_event(&self, event: &ChatEvent) -> bool {
        match serde_json::to_string(event) {
            Ok(json) => self.send(Arc::from(json)),
            Err(_) => false,
        }
    }

    /// Total events dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Signal the session to stop and release the outbound queue.
    pub fn close(self) {
        self.closing.cancel();
    }
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("dropped_messages", &self.drop_count())
            .finish_non_exhaustive()
    }
}
