//! Message types for the Parley message bus
//!
//! Inbound messages carry the raw platform message (ordered segments) so
//! the normalizer can resolve mentions, images, forwards and replies.
//! Outbound messages carry the final reply text.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Who sent a platform message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    /// Platform user id
    pub id: String,
    /// Display name
    pub nickname: String,
}

impl Sender {
    pub fn new(id: &str, nickname: &str) -> Self {
        Self {
            id: id.to_string(),
            nickname: nickname.to_string(),
        }
    }
}

/// One ordered piece of a platform message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Segment {
    /// Plain text
    Text { text: String },
    /// Mention of another participant
    Mention { target: String },
    /// Image reference
    Image { url: String },
    /// Reference to a bundle of forwarded messages
    Forward { id: String },
    /// Reference to a quoted message
    Reply { message_id: String },
}

/// A message as delivered by the chat platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformMessage {
    /// Platform message id
    pub message_id: String,
    /// Author
    pub sender: Sender,
    /// Ordered content segments
    pub segments: Vec<Segment>,
}

impl PlatformMessage {
    /// Create a message with no segments.
    pub fn new(message_id: &str, sender: Sender) -> Self {
        Self {
            message_id: message_id.to_string(),
            sender,
            segments: Vec::new(),
        }
    }

    /// Convenience constructor for a text-only message.
    pub fn text(message_id: &str, sender: Sender, text: &str) -> Self {
        Self::new(message_id, sender).with_segment(Segment::Text {
            text: text.to_string(),
        })
    }

    pub fn with_segment(mut self, segment: Segment) -> Self {
        self.segments.push(segment);
        self
    }
}

/// A message received from a chat platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Platform name (e.g. "qq", "cli")
    pub channel: String,
    /// Group or chat id within the platform
    pub chat_id: String,
    /// Conversation key, `"channel:chat_id"`
    pub conversation_key: String,
    /// The raw platform message
    pub message: PlatformMessage,
    /// Additional platform-specific metadata
    pub metadata: HashMap<String, String>,
}

impl InboundMessage {
    /// Create an inbound message; the conversation key is derived as
    /// `"channel:chat_id"`.
    ///
    /// # Example
    /// ```
    /// use parley::bus::{InboundMessage, PlatformMessage, Sender};
    ///
    /// let msg = PlatformMessage::text("m1", Sender::new("42", "bob"), "hi");
    /// let inbound = InboundMessage::new("qq", "group7", msg);
    /// assert_eq!(inbound.conversation_key, "qq:group7");
    /// ```
    pub fn new(channel: &str, chat_id: &str, message: PlatformMessage) -> Self {
        Self {
            channel: channel.to_string(),
            chat_id: chat_id.to_string(),
            conversation_key: format!("{}:{}", channel, chat_id),
            message,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }
}

/// What kind of reply an outbound message carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyKind {
    /// Model-generated text
    Text,
    /// The model produced no text; content is the no-content sentinel
    Empty,
    /// The conversation already had an invocation in flight
    Busy,
    /// The invocation failed; content is the error description
    Error,
    /// Answer to a slash command
    Command,
}

/// A reply to be delivered to a chat platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Target platform
    pub channel: String,
    /// Target chat id
    pub chat_id: String,
    /// Reply text
    pub content: String,
    /// Reply classification
    pub kind: ReplyKind,
    /// Platform message id being replied to
    pub reply_to: Option<String>,
}

impl OutboundMessage {
    pub fn new(channel: &str, chat_id: &str, content: &str, kind: ReplyKind) -> Self {
        Self {
            channel: channel.to_string(),
            chat_id: chat_id.to_string(),
            content: content.to_string(),
            kind,
            reply_to: None,
        }
    }

    /// Build a reply addressed to the origin of `msg`.
    pub fn reply_to(msg: &InboundMessage, content: &str, kind: ReplyKind) -> Self {
        Self {
            reply_to: Some(msg.message.message_id.clone()),
            ..Self::new(&msg.channel, &msg.chat_id, content, kind)
        }
    }
}
