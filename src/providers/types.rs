//! Provider types for Parley
//!
//! This module defines the `LLMProvider` trait, chat options, and the
//! response types returned by chat-completion endpoints.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::ModelDescriptor;
use crate::error::Result;
use crate::session::{ToolCall, Turn};

/// Definition of a tool offered to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The name of the tool (must be unique)
    pub name: String,
    /// Human-readable description of what the tool does
    pub description: String,
    /// JSON Schema defining the tool's parameters
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    pub fn new(name: &str, description: &str, parameters: serde_json::Value) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters,
        }
    }
}

/// A chat-completion backend.
///
/// One provider instance serves every registered model; the
/// [`ModelDescriptor`] passed to each call carries the endpoint, credential
/// and model id.
///
/// # Example
///
/// ```rust,ignore
/// use parley::providers::{LLMProvider, ChatOptions};
///
/// let response = provider
///     .chat(&model, turns, tools, ChatOptions::new().with_max_tokens(1000))
///     .await?;
/// ```
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Send one chat-completion request.
    ///
    /// # Arguments
    /// * `model` - Which endpoint/model to call
    /// * `turns` - The outbound conversation view
    /// * `tools` - Tools offered to the model (empty for none)
    /// * `options` - Sampling and output-format options
    async fn chat(
        &self,
        model: &ModelDescriptor,
        turns: Vec<Turn>,
        tools: Vec<ToolDefinition>,
        options: ChatOptions,
    ) -> Result<LLMResponse>;

    /// Name of this provider (for logging).
    fn name(&self) -> &str;
}

/// Options for a chat completion request.
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    /// Maximum number of tokens to generate
    pub max_tokens: Option<u32>,
    /// Sampling temperature
    pub temperature: Option<f32>,
    /// Ask the endpoint for a JSON-object response
    pub json_output: bool,
}

impl ChatOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_json_output(mut self) -> Self {
        self.json_output = true;
        self
    }
}

/// Response from a chat-completion endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LLMResponse {
    /// Text content (may be empty when only tools are requested)
    pub content: String,
    /// Tool calls requested by the model
    pub tool_calls: Vec<LLMToolCall>,
    /// Token usage, when the endpoint reports it
    pub usage: Option<Usage>,
}

impl LLMResponse {
    /// A text-only response.
    pub fn text(content: &str) -> Self {
        Self {
            content: content.to_string(),
            ..Default::default()
        }
    }

    /// A response requesting tool calls.
    pub fn with_tools(content: &str, tool_calls: Vec<LLMToolCall>) -> Self {
        Self {
            content: content.to_string(),
            tool_calls,
            usage: None,
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// The assistant turn recording this response.
    pub fn to_turn(&self) -> Turn {
        Turn::assistant_with_tools(
            &self.content,
            self.tool_calls.iter().map(ToolCall::from).collect(),
        )
    }
}

/// A tool call as returned by the endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMToolCall {
    pub id: String,
    pub name: String,
    /// Raw JSON argument text
    pub arguments: String,
}

impl LLMToolCall {
    pub fn new(id: &str, name: &str, arguments: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }
    }
}

impl From<&LLMToolCall> for ToolCall {
    fn from(call: &LLMToolCall) -> Self {
        ToolCall::new(&call.id, &call.name, &call.arguments)
    }
}

/// Token usage reported by the endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}
