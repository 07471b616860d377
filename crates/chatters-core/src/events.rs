//! Wire protocol for the live channel.
//!
//! Every frame is a JSON object tagged by `type`. Server-originated frames are
//! [`ChatEvent`]s; client-originated frames are [`ClientFrame`]s. Keeping the
//! two directions as separate sum types means a client can never inject a
//! `from` or an `id`: those fields simply do not exist on the inbound side.

use serde::{Deserialize, Serialize};

use crate::ids::{ChatId, MediaId, MessageId, UserId};

/// Delivery status of a text message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    /// Persisted and fanned out.
    Sent,
    /// Viewed by another member of the conversation.
    Seen,
}

impl DeliveryStatus {
    /// Storage representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Seen => "seen",
        }
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DeliveryStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent" => Ok(Self::Sent),
            "seen" => Ok(Self::Seen),
            other => Err(format!("unknown delivery status: {other}")),
        }
    }
}

/// Server → client event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChatEvent {
    /// A persisted text message.
    Message {
        /// Server-assigned id.
        id: MessageId,
        /// Conversation the message belongs to.
        chat_id: ChatId,
        /// Authenticated sender.
        from: UserId,
        /// Message body.
        content: String,
        /// RFC 3339 persistence timestamp.
        created_at: String,
        /// Always `sent` when first broadcast.
        status: DeliveryStatus,
    },
    /// Messages in a conversation were marked seen.
    Seen {
        /// Conversation the messages belong to.
        chat_id: ChatId,
        /// Affected ids, in storage order.
        message_ids: Vec<MessageId>,
    },
    /// A media attachment is available for download.
    Media {
        /// Server-assigned media id.
        id: MediaId,
        /// Conversation the media belongs to.
        chat_id: ChatId,
        /// Uploader.
        from: UserId,
        /// Original file name.
        filename: String,
        /// RFC 3339 persistence timestamp.
        created_at: String,
    },
    /// A message from this client could not be accepted.
    Error {
        /// Conversation the rejected message targeted.
        chat_id: ChatId,
        /// Human-readable reason.
        reason: String,
    },
}

impl ChatEvent {
    /// Conversation this event belongs to.
    pub fn chat_id(&self) -> &ChatId {
        match self {
            Self::Message { chat_id, .. }
            | Self::Seen { chat_id, .. }
            | Self::Media { chat_id, .. }
            | Self::Error { chat_id, .. } => chat_id,
        }
    }

    /// Wire tag, for logs and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Message { .. } => "message",
            Self::Seen { .. } => "seen",
            Self::Media { .. } => "media",
            Self::Error { .. } => "error",
        }
    }
}

/// Client → server frame.
///
/// Unknown `type` tags and malformed JSON fail to decode; the read loop logs
/// and skips them. Extra fields (such as a client-supplied `from`) are ignored.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientFrame {
    /// Send a text message.
    Message {
        /// Target conversation.
        chat_id: ChatId,
        /// Message body.
        #[serde(default)]
        content: String,
    },
    /// Media-tagged frame; routed exactly like a text message.
    Media {
        /// Target conversation.
        chat_id: ChatId,
        /// Message body.
        #[serde(default)]
        content: String,
    },
    /// Mark every unseen message from other members as seen.
    Seen {
        /// Target conversation.
        chat_id: ChatId,
    },
}

impl ClientFrame {
    /// Decode a text frame.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Conversation this frame targets.
    pub fn chat_id(&self) -> &ChatId {
        match self {
            Self::Message { chat_id, .. } | Self::Media { chat_id, .. } | Self::Seen { chat_id } => {
                chat_id
            }
        }
    }
}
