//! Work items accepted by the router loop.

use chatters_core::{ChatEvent, ChatId, ConnectionId, MediaId, MessageId, UserId};

use crate::websocket::connection::ClientConnection;

/// A chat message received from a connection, before persistence.
///
/// `sender` is always the authenticated owner of the connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundChat {
    /// Target conversation.
    pub chat_id: ChatId,
    /// Authenticated sender.
    pub sender: UserId,
    /// Message body.
    pub content: String,
}

/// An already-persisted media upload to announce to chat members.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaNotice {
    /// Stored media id.
    pub id: MediaId,
    /// Conversation the upload belongs to.
    pub chat_id: ChatId,
    /// Uploader.
    pub from: UserId,
    /// Original file name.
    pub filename: String,
    /// Persistence timestamp.
    pub created_at: String,
}

impl From<MediaNotice> for ChatEvent {
    fn from(notice: MediaNotice) -> Self {
        ChatEvent::Media {
            id: notice.id,
            chat_id: notice.chat_id,
            from: notice.from,
            filename: notice.filename,
            created_at: notice.created_at,
        }
    }
}

pub(crate) enum RouterCommand {
    Connect(ClientConnection),
    Disconnect {
        user_id: UserId,
        connection_id: ConnectionId,
    },
    Inbound(InboundChat),
    BroadcastSeen {
        chat_id: ChatId,
        message_ids: Vec<MessageId>,
    },
    BroadcastMedia(MediaNotice),
}

impl RouterCommand {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::Connect(_) => "connect",
            Self::Disconnect { .. } => "disconnect",
            Self::Inbound(_) => "inbound",
            Self::BroadcastSeen { .. } => "seen",
            Self::BroadcastMedia(_) => "media",
        }
    }
}
