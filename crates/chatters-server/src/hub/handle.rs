//! Cloneable front door to the router loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chatters_core::{ChatId, ConnectionId, MessageId, UserId};
use tokio::sync::mpsc;

use super::command::{InboundChat, MediaNotice, RouterCommand};
use crate::websocket::connection::ClientConnection;

/// Failure to hand work to the router.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RouterError {
    /// The router loop has stopped and accepts no more work.
    #[error("message router is not running")]
    Closed,
}

/// Handle used by sessions and HTTP handlers to feed the router.
///
/// Every method enqueues a command and waits only for queue capacity, never
/// for the command to be processed.
#[derive(Clone)]
pub struct RouterHandle {
    tx: mpsc::Sender<RouterCommand>,
    online: Arc<AtomicUsize>,
}

impl RouterHandle {
    pub(crate) fn new(tx: mpsc::Sender<RouterCommand>, online: Arc<AtomicUsize>) -> Self {
        Self { tx, online }
    }

    /// Register a live connection, superseding any existing one for the user.
    pub async fn connect(&self, connection: ClientConnection) -> Result<(), RouterError> {
        self.send(RouterCommand::Connect(connection)).await
    }

    /// Remove `connection_id` for `user_id` if it is still current.
    pub async fn disconnect(
        &self,
        user_id: UserId,
        connection_id: ConnectionId,
    ) -> Result<(), RouterError> {
        self.send(RouterCommand::Disconnect {
            user_id,
            connection_id,
        })
        .await
    }

    /// Persist and fan out a chat message.
    pub async fn submit(&self, chat: InboundChat) -> Result<(), RouterError> {
        self.send(RouterCommand::Inbound(chat)).await
    }

    /// Announce messages newly marked seen. An empty list is not broadcast.
    pub async fn broadcast_seen(
        &self,
        chat_id: ChatId,
        message_ids: Vec<MessageId>,
    ) -> Result<(), RouterError> {
        if message_ids.is_empty() {
            return Ok(());
        }
        self.send(RouterCommand::BroadcastSeen {
            chat_id,
            message_ids,
        })
        .await
    }

    /// Announce an already-stored media upload.
    pub async fn broadcast_media(&self, notice: MediaNotice) -> Result<(), RouterError> {
        self.send(RouterCommand::BroadcastMedia(notice)).await
    }

    /// Users with a registered connection, as last published by the loop.
    pub fn online_count(&self) -> usize {
        self.online.load(Ordering::Relaxed)
    }

    /// Whether the router loop has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn send(&self, command: RouterCommand) -> Result<(), RouterError> {
        self.tx.send(command).await.map_err(|_| RouterError::Closed)
    }
}

impl std::fmt::Debug for RouterHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterHandle")
            .field("online", &self.online_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}
