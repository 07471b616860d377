//! WebSocket session lifecycle: one authenticated client from upgrade
//! through disconnect.
//!
//! Each session runs two pumps. The read pump decodes client frames and hands
//! them to the hub; it never writes to the socket. The write pump is the only
//! writer: it drains the connection's outbound queue and sends heartbeat pings.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use chatters_core::{ClientFrame, Persistence, UserId};
use futures::{Sink, SinkExt, Stream, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::connection::ClientConnection;
use super::heartbeat::{HeartbeatConfig, Liveness};
use crate::hub::{InboundChat, RouterHandle};
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL, WS_INVALID_FRAMES_TOTAL,
};

/// How long the write pump gets to flush after the read side has ended.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything a session needs besides the socket.
#[derive(Clone)]
pub struct SessionContext {
    /// Hub entry point.
    pub router: RouterHandle,
    /// Used directly for seen updates, which are written before broadcast.
    pub persistence: Arc<dyn Persistence>,
    /// Ping cadence and dead-peer timeout.
    pub heartbeat: HeartbeatConfig,
    /// Outbound queue length per connection.
    pub outbound_capacity: usize,
}

/// Why the read pump stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The peer sent a Close frame.
    PeerClosed,
    /// The stream ended without a Close frame.
    PeerGone,
    /// The transport failed.
    TransportError,
    /// The hub or the write pump asked the session to stop.
    Closed,
    /// The router is no longer running.
    RouterGone,
}

impl ReadOutcome {
    fn as_str(self) -> &'static str {
        match self {
            Self::PeerClosed => "peer_closed",
            Self::PeerGone => "peer_gone",
            Self::TransportError => "transport_error",
            Self::Closed => "closed",
            Self::RouterGone => "router_gone",
        }
    }
}

/// Why the write pump stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The outbound queue was closed and fully flushed.
    Drained,
    /// A send on the socket failed.
    TransportError,
    /// The peer was silent for longer than the heartbeat timeout.
    TimedOut,
}

/// Run a WebSocket session for an authenticated user.
///
/// 1. Registers a new connection with the hub (superseding any older one)
/// 2. Spawns the write pump
/// 3. Runs the read pump until the peer leaves or the hub closes the session
/// 4. Unregisters, then gives the write pump a bounded window to flush
#[instrument(skip_all, fields(user_id = %user_id))]
pub async fn run_ws_session(ws: WebSocket, user_id: UserId, ctx: SessionContext) {
    let (connection, outbound) = ClientConnection::new(user_id.clone(), ctx.outbound_capacity);
    let connection_id = connection.id().clone();
    let closing = connection.closing_token();

    if ctx.router.connect(connection).await.is_err() {
        warn!("message router unavailable, dropping connection");
        return;
    }

    let connection_start = Instant::now();
    info!(connection_id = %connection_id, "client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let (ws_tx, ws_rx) = ws.split();
    let liveness = Arc::new(Liveness::new());
    let mut writer = tokio::spawn(write_pump(
        ws_tx,
        outbound,
        Arc::clone(&liveness),
        ctx.heartbeat,
        closing.clone(),
    ));

    let outcome = read_pump(ws_rx, &user_id, &ctx, &liveness, &closing).await;
    closing.cancel();

    if ctx
        .router
        .disconnect(user_id.clone(), connection_id.clone())
        .await
        .is_err()
    {
        debug!("message router already stopped");
    }

    match tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer).await {
        Ok(Ok(written)) => debug!(?written, "write pump finished"),
        Ok(Err(e)) => warn!(error = %e, "write pump failed"),
        Err(_) => {
            warn!("write pump did not drain in time, aborting");
            writer.abort();
        }
    }

    info!(connection_id = %connection_id, reason = outcome.as_str(), "client disconnected");
    counter!(WS_DISCONNECTIONS_TOTAL, "reason" => outcome.as_str()).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection_start.elapsed().as_secs_f64());
}

/// Sole writer to the socket.
///
/// Forwards queued events in order and pings every `heartbeat.interval`.
/// When the queue closes the remaining events are flushed and a Close frame
/// is sent. On exit the closing token is fired so the read pump stops too.
pub(crate) async fn write_pump<S>(
    mut sink: S,
    mut outbound: mpsc::Receiver<Arc<str>>,
    liveness: Arc<Liveness>,
    heartbeat: HeartbeatConfig,
    closing: CancellationToken,
) -> WriteOutcome
where
    S: Sink<Message> + Unpin,
{
    let mut ping_interval = tokio::time::interval(heartbeat.interval);
    // Skip the immediate first tick
    let _ = ping_interval.tick().await;

    let outcome = loop {
        tokio::select! {
            next = outbound.recv() => {
                let Some(payload) = next else {
                    let _ = sink.send(Message::Close(None)).await;
                    break WriteOutcome::Drained;
                };
                if sink.send(Message::Text(payload.to_string().into())).await.is_err() {
                    break WriteOutcome::TransportError;
                }
            }
            _ = ping_interval.tick() => {
                if liveness.is_expired(heartbeat.timeout) {
                    warn!(idle = ?liveness.idle(), "client unresponsive, disconnecting");
                    break WriteOutcome::TimedOut;
                }
                if sink.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break WriteOutcome::TransportError;
                }
            }
        }
    };
    closing.cancel();
    outcome
}

/// Decode inbound frames and hand them to the hub until the session ends.
pub(crate) async fn read_pump<R, E>(
    mut stream: R,
    user_id: &UserId,
    ctx: &SessionContext,
    liveness: &Liveness,
    closing: &CancellationToken,
) -> ReadOutcome
where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: std::fmt::Display,
{
    loop {
        let next = tokio::select! {
            () = closing.cancelled() => return ReadOutcome::Closed,
            next = stream.next() => next,
        };
        let message = match next {
            None => return ReadOutcome::PeerGone,
            Some(Err(e)) => {
                debug!(error = %e, "websocket read failed");
                return ReadOutcome::TransportError;
            }
            Some(Ok(message)) => message,
        };
        liveness.mark_alive();

        let flow = match message {
            Message::Text(text) => handle_frame(text.as_str(), user_id, ctx).await,
            Message::Binary(data) => match std::str::from_utf8(&data) {
                Ok(text) => handle_frame(text, user_id, ctx).await,
                Err(_) => {
                    info!(len = data.len(), "received non-UTF8 binary frame");
                    counter!(WS_INVALID_FRAMES_TOTAL).increment(1);
                    ControlFlow::Continue(())
                }
            },
            Message::Close(_) => return ReadOutcome::PeerClosed,
            Message::Ping(_) | Message::Pong(_) => ControlFlow::Continue(()),
        };
        if flow.is_break() {
            return ReadOutcome::RouterGone;
        }
    }
}

/// Route one decoded client frame. Breaks only when the router is gone.
async fn handle_frame(text: &str, user_id: &UserId, ctx: &SessionContext) -> ControlFlow<()> {
    let frame = match ClientFrame::parse(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(error = %e, "skipping undecodable frame");
            counter!(WS_INVALID_FRAMES_TOTAL).increment(1);
            return ControlFlow::Continue(());
        }
    };
    debug!(chat_id = %frame.chat_id(), "frame received");

    let routed = match frame {
        ClientFrame::Seen { chat_id } => match ctx.persistence.mark_seen(&chat_id, user_id).await {
            Ok(ids) => {
                debug!(chat_id = %chat_id, count = ids.len(), "messages marked seen");
                ctx.router.broadcast_seen(chat_id, ids).await
            }
            Err(e) => {
                warn!(chat_id = %chat_id, error = %e, "failed to mark messages seen");
                Ok(())
            }
        },
        ClientFrame::Message { chat_id, content } | ClientFrame::Media { chat_id, content } => {
            ctx.router
                .submit(InboundChat {
                    chat_id,
                    sender: user_id.clone(),
                    content,
                })
                .await
        }
    };

    match routed {
        Ok(()) => ControlFlow::Continue(()),
        Err(_) => ControlFlow::Break(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatters_core::ports::{MockMembershipResolver, MockPersistence};
    use chatters_core::{MessageId, StorageError, StoredMessage};
    use futures::channel::mpsc as fmpsc;

    use crate::hub::MessageRouter;

    fn uid(s: &str) -> UserId {
        UserId::from_raw(s)
    }

    fn context(
        persistence: MockPersistence,
        members: MockMembershipResolver,
    ) -> (SessionContext, CancellationToken) {
        let persistence: Arc<dyn Persistence> = Arc::new(persistence);
        let (router, handle) = MessageRouter::new(Arc::clone(&persistence), Arc::new(members), 16);
        let cancel = CancellationToken::new();
        let _router_task = router.spawn(cancel.clone());
        let ctx = SessionContext {
            router: handle,
            persistence,
            heartbeat: HeartbeatConfig::default(),
            outbound_capacity: 16,
        };
        (ctx, cancel)
    }

    fn text(s: &str) -> Result<Message, String> {
        Ok(Message::Text(s.into()))
    }

    async fn online(ctx: &SessionContext, user: &str) -> mpsc::Receiver<Arc<str>> {
        let (connection, rx) = ClientConnection::new(uid(user), 16);
        ctx.router.connect(connection).await.unwrap();
        rx
    }

    async fn next_json(rx: &mut mpsc::Receiver<Arc<str>>) -> serde_json::Value {
        let payload = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        serde_json::from_str(&payload).unwrap()
    }

    #[tokio::test]
    async fn read_pump_submits_as_authenticated_user() {
        let mut persistence = MockPersistence::new();
        let _ = persistence
            .expect_append_message()
            .withf(|chat, sender, content| {
                chat.as_str() == "c1" && sender.as_str() == "alice" && content == "hi"
            })
            .times(1)
            .returning(|_, _, _| {
                Ok(StoredMessage {
                    id: MessageId(1),
                    created_at: "2024-01-01T00:00:00.000Z".into(),
                })
            });
        let mut members = MockMembershipResolver::new();
        let _ = members
            .expect_members()
            .returning(|_| Ok(vec![UserId::from_raw("alice"), UserId::from_raw("bob")]));
        let (ctx, cancel) = context(persistence, members);
        let mut bob = online(&ctx, "bob").await;

        // A spoofed `from` is ignored; the sender is the session's user.
        let frames = futures::stream::iter(vec![
            text(r#"{"type":"message","chat_id":"c1","content":"hi","from":"mallory"}"#),
            text(r#"{"type":"close"}"#),
            text("not json"),
        ]);
        let liveness = Liveness::new();
        let closing = CancellationToken::new();
        let outcome = read_pump(frames, &uid("alice"), &ctx, &liveness, &closing).await;
        assert_eq!(outcome, ReadOutcome::PeerGone);

        let event = next_json(&mut bob).await;
        assert_eq!(event["from"], "alice");
        assert_eq!(event["content"], "hi");
        cancel.cancel();
    }

    #[tokio::test]
    async fn seen_frame_marks_then_broadcasts() {
        let mut persistence = MockPersistence::new();
        let _ = persistence
            .expect_mark_seen()
            .withf(|chat, viewer| chat.as_str() == "c1" && viewer.as_str() == "bob")
            .times(1)
            .returning(|_, _| Ok(vec![MessageId(3), MessageId(4)]));
        let mut members = MockMembershipResolver::new();
        let _ = members
            .expect_members()
            .returning(|_| Ok(vec![UserId::from_raw("alice"), UserId::from_raw("bob")]));
        let (ctx, cancel) = context(persistence, members);
        let mut alice = online(&ctx, "alice").await;

        let frames = futures::stream::iter(vec![text(r#"{"type":"seen","chat_id":"c1"}"#)]);
        let _ = read_pump(frames, &uid("bob"), &ctx, &Liveness::new(), &CancellationToken::new()).await;

        let event = next_json(&mut alice).await;
        assert_eq!(event["type"], "seen");
        assert_eq!(event["message_ids"], serde_json::json!([3, 4]));
        cancel.cancel();
    }

    #[tokio::test]
    async fn seen_failure_is_not_broadcast() {
        let mut persistence = MockPersistence::new();
        let _ = persistence
            .expect_mark_seen()
            .returning(|chat, user| {
                Err(StorageError::NotMember {
                    chat_id: chat.clone(),
                    user_id: user.clone(),
                })
            });
        let mut members = MockMembershipResolver::new();
        let _ = members.expect_members().never();
        let (ctx, cancel) = context(persistence, members);

        let frames = futures::stream::iter(vec![text(r#"{"type":"seen","chat_id":"c9"}"#)]);
        let outcome =
            read_pump(frames, &uid("eve"), &ctx, &Liveness::new(), &CancellationToken::new()).await;
        assert_eq!(outcome, ReadOutcome::PeerGone);
        cancel.cancel();
    }

    #[tokio::test]
    async fn read_pump_stops_on_close_and_on_signal() {
        let (ctx, cancel) = context(MockPersistence::new(), MockMembershipResolver::new());

        let frames = futures::stream::iter(vec![Ok::<_, String>(Message::Close(None))]);
        let outcome =
            read_pump(frames, &uid("a"), &ctx, &Liveness::new(), &CancellationToken::new()).await;
        assert_eq!(outcome, ReadOutcome::PeerClosed);

        let closing = CancellationToken::new();
        closing.cancel();
        let pending = futures::stream::pending::<Result<Message, String>>();
        let outcome = read_pump(pending, &uid("a"), &ctx, &Liveness::new(), &closing).await;
        assert_eq!(outcome, ReadOutcome::Closed);

        let failing = futures::stream::iter(vec![Err::<Message, _>("reset".to_string())]);
        let outcome =
            read_pump(failing, &uid("a"), &ctx, &Liveness::new(), &CancellationToken::new()).await;
        assert_eq!(outcome, ReadOutcome::TransportError);
        cancel.cancel();
    }

    #[tokio::test]
    async fn read_pump_reports_stopped_router() {
        let (ctx, cancel) = context(MockPersistence::new(), MockMembershipResolver::new());
        cancel.cancel();
        while !ctx.router.is_closed() {
            tokio::task::yield_now().await;
        }

        let frames = futures::stream::iter(vec![text(r#"{"type":"message","chat_id":"c1","content":"x"}"#)]);
        let outcome =
            read_pump(frames, &uid("a"), &ctx, &Liveness::new(), &CancellationToken::new()).await;
        assert_eq!(outcome, ReadOutcome::RouterGone);
    }

    #[tokio::test]
    async fn write_pump_flushes_then_closes() {
        let (sink, mut written) = fmpsc::unbounded::<Message>();
        let (tx, rx) = mpsc::channel::<Arc<str>>(8);
        let closing = CancellationToken::new();
        tx.send(Arc::from("one")).await.unwrap();
        tx.send(Arc::from("two")).await.unwrap();
        drop(tx);

        let outcome = write_pump(
            sink,
            rx,
            Arc::new(Liveness::new()),
            HeartbeatConfig::default(),
            closing.clone(),
        )
        .await;
        assert_eq!(outcome, WriteOutcome::Drained);
        assert!(closing.is_cancelled());

        let frames: Vec<Message> = written.by_ref().take(3).collect().await;
        assert_eq!(frames[0], Message::Text("one".into()));
        assert_eq!(frames[1], Message::Text("two".into()));
        assert!(matches!(frames[2], Message::Close(None)));
    }

    #[tokio::test(start_paused = true)]
    async fn write_pump_pings_then_times_out_silent_peer() {
        let (sink, mut written) = fmpsc::unbounded::<Message>();
        let (_tx, rx) = mpsc::channel::<Arc<str>>(8);
        let heartbeat = HeartbeatConfig {
            interval: Duration::from_millis(100),
            timeout: Duration::from_millis(250),
        };

        let outcome = write_pump(
            sink,
            rx,
            Arc::new(Liveness::new()),
            heartbeat,
            CancellationToken::new(),
        )
        .await;
        assert_eq!(outcome, WriteOutcome::TimedOut);

        let first = written.next().await.unwrap();
        assert!(matches!(first, Message::Ping(_)));
    }

    #[tokio::test]
    async fn write_pump_stops_on_transport_error() {
        let (sink, written) = fmpsc::unbounded::<Message>();
        drop(written);
        let (tx, rx) = mpsc::channel::<Arc<str>>(8);
        tx.send(Arc::from("lost")).await.unwrap();

        let outcome = write_pump(
            sink,
            rx,
            Arc::new(Liveness::new()),
            HeartbeatConfig::default(),
            CancellationToken::new(),
        )
        .await;
        assert_eq!(outcome, WriteOutcome::TransportError);
    }
}
