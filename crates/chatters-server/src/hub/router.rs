//! The router loop.
//!
//! A single task drains one command queue and owns the [`ConnectionRegistry`].
//! Inbound chat messages are persisted before anything is sent, and the
//! fan-out of each message finishes before the next command is read, so every
//! member sees a conversation in storage order.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use chatters_core::{
    ChatEvent, ConnectionId, DeliveryStatus, MembershipResolver, Persistence, StorageError, UserId,
};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::command::{InboundChat, RouterCommand};
use super::handle::RouterHandle;
use super::registry::ConnectionRegistry;
use crate::metrics::{
    HUB_COMMAND_DURATION_SECONDS, HUB_DELIVERIES_TOTAL, HUB_DELIVERY_DROPS_TOTAL,
    HUB_MESSAGES_PERSISTED_TOTAL, HUB_ONLINE_USERS, HUB_PERSIST_FAILURES_TOTAL,
    WS_CONNECTIONS_SUPERSEDED_TOTAL,
};
use crate::websocket::connection::ClientConnection;

/// Owns the online-user table and serializes persist-then-fan-out.
pub struct MessageRouter {
    commands: mpsc::Receiver<RouterCommand>,
    registry: ConnectionRegistry,
    persistence: Arc<dyn Persistence>,
    members: Arc<dyn MembershipResolver>,
    online: Arc<AtomicUsize>,
}

/// Outcome of delivering one event to a conversation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct FanOut {
    pub(crate) members: usize,
    pub(crate) delivered: usize,
    pub(crate) offline: usize,
    pub(crate) dropped: usize,
}

impl MessageRouter {
    /// Build a router and the handle that feeds it.
    ///
    /// `queue_capacity` bounds the command queue; producers wait when it is full.
    pub fn new(
        persistence: Arc<dyn Persistence>,
        members: Arc<dyn MembershipResolver>,
        queue_capacity: usize,
    ) -> (Self, RouterHandle) {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let online = Arc::new(AtomicUsize::new(0));
        let router = Self {
            commands: rx,
            registry: ConnectionRegistry::new(),
            persistence,
            members,
            online: Arc::clone(&online),
        };
        (router, RouterHandle::new(tx, online))
    }

    /// Run the loop on its own task.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// Process commands until `shutdown` fires or every handle is dropped.
    ///
    /// On exit every registered connection is closed.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!("message router started");
        loop {
            let command = tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                command = self.commands.recv() => match command {
                    Some(command) => command,
                    None => break,
                },
            };
            let started = Instant::now();
            let kind = command.kind();
            self.dispatch(command).await;
            histogram!(HUB_COMMAND_DURATION_SECONDS, "command" => kind)
                .record(started.elapsed().as_secs_f64());
        }

        self.commands.close();
        let mut closed = 0usize;
        for connection in self.registry.drain() {
            connection.close();
            closed += 1;
        }
        self.publish_online();
        info!(closed, "message router stopped");
    }

    async fn dispatch(&mut self, command: RouterCommand) {
        match command {
            RouterCommand::Connect(connection) => self.connect(connection),
            RouterCommand::Disconnect {
                user_id,
                connection_id,
            } => self.disconnect(&user_id, &connection_id),
            RouterCommand::Inbound(chat) => self.route_inbound(chat).await,
            RouterCommand::BroadcastSeen {
                chat_id,
                message_ids,
            } => {
                let _ = self
                    .fan_out(&ChatEvent::Seen {
                        chat_id,
                        message_ids,
                    })
                    .await;
            }
            RouterCommand::BroadcastMedia(notice) => {
                let _ = self.fan_out(&notice.into()).await;
            }
        }
    }

    fn connect(&mut self, connection: ClientConnection) {
        let user_id = connection.user_id().clone();
        let connection_id = connection.id().clone();
        if let Some(previous) = self.registry.register(connection) {
            info!(
                user_id = %user_id,
                previous = %previous.id(),
                current = %connection_id,
                "superseding existing connection"
            );
            counter!(WS_CONNECTIONS_SUPERSEDED_TOTAL).increment(1);
            previous.close();
        } else {
            debug!(user_id = %user_id, connection_id = %connection_id, "connection registered");
        }
        self.publish_online();
    }

    fn disconnect(&mut self, user_id: &UserId, connection_id: &ConnectionId) {
        match self.registry.unregister(user_id, connection_id) {
            Some(connection) => {
                debug!(
                    user_id = %user_id,
                    connection_id = %connection_id,
                    dropped = connection.drop_count(),
                    age = ?connection.age(),
                    "connection unregistered"
                );
                connection.close();
                self.publish_online();
            }
            None => debug!(user_id = %user_id, connection_id = %connection_id, "stale disconnect ignored"),
        }
    }

    #[instrument(skip_all, fields(chat_id = %chat.chat_id, sender = %chat.sender))]
    async fn route_inbound(&mut self, chat: InboundChat) {
        let InboundChat {
            chat_id,
            sender,
            content,
        } = chat;

        match self
            .persistence
            .append_message(&chat_id, &sender, &content)
            .await
        {
            Ok(stored) => {
                counter!(HUB_MESSAGES_PERSISTED_TOTAL).increment(1);
                let event = ChatEvent::Message {
                    id: stored.id,
                    chat_id,
                    from: sender,
                    content,
                    created_at: stored.created_at,
                    status: DeliveryStatus::Sent,
                };
                let _ = self.fan_out(&event).await;
            }
            Err(e) => {
                warn!(error = %e, "message not persisted, dropping");
                counter!(HUB_PERSIST_FAILURES_TOTAL, "kind" => e.kind()).increment(1);
                if let Some(connection) = self.registry.lookup(&sender) {
                    let _ = connection.send_event(&ChatEvent::Error {
                        chat_id,
                        reason: rejection_reason(&e).to_string(),
                    });
                }
            }
        }
    }

    /// Deliver `event` to every online member of its conversation.
    ///
    /// Membership is resolved fresh each time. A full or closed member queue
    /// drops the event for that member only.
    async fn fan_out(&self, event: &ChatEvent) -> FanOut {
        let chat_id = event.chat_id();
        let kind = event.kind();

        let members = match self.members.members(chat_id).await {
            Ok(members) => members,
            Err(e) => {
                warn!(chat_id = %chat_id, event = kind, error = %e, "membership lookup failed, event not delivered");
                return FanOut::default();
            }
        };

        let payload: Arc<str> = match serde_json::to_string(event) {
            Ok(json) => Arc::from(json),
            Err(e) => {
                error!(chat_id = %chat_id, event = kind, error = %e, "failed to serialize event");
                return FanOut::default();
            }
        };

        let mut report = FanOut {
            members: members.len(),
            ..FanOut::default()
        };
        for member in &members {
            let Some(connection) = self.registry.lookup(member) else {
                report.offline += 1;
                continue;
            };
            if connection.send(Arc::clone(&payload)) {
                report.delivered += 1;
            } else {
                report.dropped += 1;
                warn!(
                    user_id = %member,
                    chat_id = %chat_id,
                    event = kind,
                    dropped_total = connection.drop_count(),
                    "outbound queue full or closed, event dropped"
                );
            }
        }

        counter!(HUB_DELIVERIES_TOTAL, "event" => kind).increment(report.delivered as u64);
        if report.dropped > 0 {
            counter!(HUB_DELIVERY_DROPS_TOTAL, "event" => kind).increment(report.dropped as u64);
        }
        debug!(
            chat_id = %chat_id,
            event = kind,
            members = report.members,
            delivered = report.delivered,
            offline = report.offline,
            "event fanned out"
        );
        report
    }

    fn publish_online(&self) {
        let count = self.registry.len();
        self.online.store(count, Ordering::Relaxed);
        #[allow(clippy::cast_precision_loss)]
        gauge!(HUB_ONLINE_USERS).set(count as f64);
    }
}

fn rejection_reason(error: &StorageError) -> &'static str {
    match error {
        StorageError::NotMember { .. } => "not a member of this chat",
        StorageError::NotFound(_) => "chat not found",
        _ => "message could not be saved",
    }
}
