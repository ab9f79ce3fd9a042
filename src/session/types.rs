//! Conversation types for Parley
//!
//! This module defines the core types for conversation state: turns, roles,
//! multimodal content and tool calls.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The full turn sequence of one conversation plus bookkeeping timestamps.
///
/// Conversations are identified by a key such as `"qq:group123"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique identifier for this conversation
    pub key: String,
    /// Ordered turns, oldest first
    pub turns: Vec<Turn>,
    /// When this conversation was created
    pub created_at: DateTime<Utc>,
    /// When the turn sequence was last changed; drives LRU eviction
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Create a conversation seeded with the given turns.
    ///
    /// # Example
    /// ```
    /// use parley::session::{Conversation, Turn};
    ///
    /// let conv = Conversation::new("qq:group1", vec![Turn::system("be nice")]);
    /// assert_eq!(conv.len(), 1);
    /// ```
    pub fn new(key: &str, turns: Vec<Turn>) -> Self {
        let now = Utc::now();
        Self {
            key: key.to_string(),
            turns,
            created_at: now,
            updated_at: now,
        }
    }

    /// Append turns at the tail and bump `updated_at`.
    pub fn append(&mut self, turns: impl IntoIterator<Item = Turn>) {
        self.turns.extend(turns);
        self.touch();
    }

    /// Replace the whole sequence and bump `updated_at`.
    pub fn replace(&mut self, turns: Vec<Turn>) {
        self.turns = turns;
        self.touch();
    }

    /// Mark the conversation as used now.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Number of turns.
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether there are no turns.
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

/// One turn in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Who produced this turn
    pub role: Role,
    /// Text or multimodal content
    pub content: Content,
    /// Tool calls requested by the assistant
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// For tool-role turns, the id of the call being answered
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tool_call_id: Option<String>,
}

impl Turn {
    fn text_turn(role: Role, content: &str) -> Self {
        Self {
            role,
            content: Content::Text(content.to_string()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Create a user turn.
    ///
    /// # Example
    /// ```
    /// use parley::session::{Turn, Role};
    ///
    /// let turn = Turn::user("[FROM: bob(42)] [BODY: hi]");
    /// assert_eq!(turn.role, Role::User);
    /// ```
    pub fn user(content: &str) -> Self {
        Self::text_turn(Role::User, content)
    }

    /// Create an assistant turn.
    pub fn assistant(content: &str) -> Self {
        Self::text_turn(Role::Assistant, content)
    }

    /// Create a system turn.
    pub fn system(content: &str) -> Self {
        Self::text_turn(Role::System, content)
    }

    /// Create a tool result turn answering `tool_call_id`.
    pub fn tool_result(tool_call_id: &str, content: &str) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.to_string()),
            ..Self::text_turn(Role::Tool, content)
        }
    }

    /// Create an assistant turn that requests tool calls.
    pub fn assistant_with_tools(content: &str, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: if tool_calls.is_empty() {
                None
            } else {
                Some(tool_calls)
            },
            ..Self::text_turn(Role::Assistant, content)
        }
    }

    /// Create a user turn carrying text plus one image.
    pub fn user_with_image(text: &str, image_url: &str) -> Self {
        Self {
            role: Role::User,
            content: Content::Parts(vec![
                ContentPart::Text {
                    text: text.to_string(),
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: image_url.to_string(),
                    },
                },
            ]),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Flattened text content. Image parts render as `[IMAGE]`.
    pub fn text(&self) -> String {
        self.content.to_text()
    }

    /// Check if this turn requests tool calls.
    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls.as_ref().is_some_and(|tc| !tc.is_empty())
    }

    /// Check if this turn is a tool result.
    pub fn is_tool_result(&self) -> bool {
        self.role == Role::Tool
    }

    /// Check if this is a system turn.
    pub fn is_system(&self) -> bool {
        self.role == Role::System
    }
}

/// Turn content: plain text, or ordered multimodal parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl Content {
    /// Flatten to text. Image parts render as `[IMAGE]`.
    pub fn to_text(&self) -> String {
        match self {
            Content::Text(text) => text.clone(),
            Content::Parts(parts) => parts
                .iter()
                .map(|part| match part {
                    ContentPart::Text { text } => text.as_str(),
                    ContentPart::ImageUrl { .. } => "[IMAGE]",
                })
                .collect::<Vec<_>>()
                .join(" "),
        }
    }

    /// Whether the content is empty text (multimodal content never is).
    pub fn is_empty(&self) -> bool {
        match self {
            Content::Text(text) => text.trim().is_empty(),
            Content::Parts(parts) => parts.is_empty(),
        }
    }
}

/// One part of multimodal content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

/// Image reference inside multimodal content (http URL or data URL).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

/// Role of a turn's author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Correlates the call with its result turn
    pub id: String,
    /// Registered tool name
    pub name: String,
    /// Raw JSON argument text as produced by the model
    pub arguments: String,
}

impl ToolCall {
    /// Create a new tool call.
    pub fn new(id: &str, name: &str, arguments: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversation_append_bumps_updated_at() {
        let mut conv = Conversation::new("qq:1", Vec::new());
        let before = conv.updated_at;
        std::thread::sleep(std::time::Duration::from_millis(2));
        conv.append([Turn::user("hi")]);
        assert_eq!(conv.len(), 1);
        assert!(conv.updated_at > before);
    }

    #[test]
    fn test_tool_result_turn() {
        let turn = Turn::tool_result("call_1", "done");
        assert!(turn.is_tool_result());
        assert_eq!(turn.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(turn.text(), "done");
    }

    #[test]
    fn test_assistant_with_empty_tools_has_none() {
        let turn = Turn::assistant_with_tools("ok", vec![]);
        assert!(!turn.has_tool_calls());
        assert!(turn.tool_calls.is_none());
    }

    #[test]
    fn test_text_turn_serialization() {
        let turn = Turn::user("hello");
        let json = serde_json::to_value(&turn).unwrap();
        assert_eq!(json, serde_json::json!({"role": "user", "content": "hello"}));
    }

    #[test]
    fn test_multimodal_serialization() {
        let turn = Turn::user_with_image("what is this", "data:image/png;base64,AAAA");
        let json = serde_json::to_value(&turn).unwrap();
        assert_eq!(json["content"][0]["type"], "text");
        assert_eq!(json["content"][1]["type"], "image_url");
        assert_eq!(
            json["content"][1]["image_url"]["url"],
            "data:image/png;base64,AAAA"
        );

        let back: Turn = serde_json::from_value(json).unwrap();
        assert_eq!(back, turn);
        assert_eq!(back.text(), "what is this [IMAGE]");
    }

    #[test]
    fn test_role_display() {
        assert_eq!(Role::System.to_string(), "system");
        assert_eq!(Role::Tool.to_string(), "tool");
    }

    #[test]
    fn test_content_is_empty() {
        assert!(Content::Text("  ".into()).is_empty());
        assert!(!Content::Text("x".into()).is_empty());
    }
}
