//! OpenAI-compatible chat-completion client
//!
//! Every registered model speaks the OpenAI Chat Completions wire format;
//! this provider converts conversation turns, tool definitions and
//! multimodal content to that format and parses responses back.
//!
//! # Example
//!
//! ```rust,ignore
//! use parley::providers::{ChatOptions, LLMProvider, ModelDescriptor, OpenAIProvider};
//! use parley::session::Turn;
//!
//! async fn example() {
//!     let provider = OpenAIProvider::new(std::time::Duration::from_secs(60)).unwrap();
//!     let model = ModelDescriptor::new("deepseek", "https://api.deepseek.com", "deepseek-chat")
//!         .with_api_key("sk-xxx");
//!
//!     let response = provider
//!         .chat(&model, vec![Turn::user("Hello!")], vec![], ChatOptions::default())
//!         .await
//!         .unwrap();
//!     println!("{}", response.content);
//! }
//! ```

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::error::{ParleyError, ProviderError, Result};
use crate::session::{Content, ContentPart, Turn};

use super::{
    parse_provider_error, ChatOptions, LLMProvider, LLMResponse, LLMToolCall, ModelDescriptor,
    ToolDefinition, Usage,
};

// ============================================================================
// Request Types
// ============================================================================

/// Chat Completions request body.
#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAITool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    r#type: &'static str,
}

/// A message in the wire format. `content` is a string or a part array.
#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAIToolCallRequest>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct OpenAIToolCallRequest {
    id: String,
    r#type: String,
    function: OpenAIFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Serialize)]
struct OpenAITool {
    r#type: String,
    function: OpenAIFunctionDef,
}

#[derive(Debug, Serialize)]
struct OpenAIFunctionDef {
    name: String,
    description: String,
    parameters: Value,
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    #[serde(default)]
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAIToolCallResponse>>,
}

#[derive(Debug, Deserialize)]
struct OpenAIToolCallResponse {
    #[serde(default)]
    id: String,
    #[serde(default = "default_call_type")]
    r#type: String,
    function: OpenAIFunctionCall,
}

fn default_call_type() -> String {
    "function".to_string()
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    total_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorResponse {
    error: OpenAIError,
}

#[derive(Debug, Deserialize)]
struct OpenAIError {
    message: String,
}

// ============================================================================
// Provider
// ============================================================================

/// Client for OpenAI-compatible `/chat/completions` endpoints.
///
/// Stateless apart from the pooled HTTP client; endpoint, key and model id
/// come from the [`ModelDescriptor`] of each call.
pub struct OpenAIProvider {
    client: Client,
}

impl OpenAIProvider {
    /// Create a provider whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// Create a provider with a custom HTTP client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

// ============================================================================
// Conversion Functions
// ============================================================================

fn convert_content(content: Content) -> Value {
    match content {
        Content::Text(text) => Value::String(text),
        Content::Parts(parts) => Value::Array(
            parts
                .into_iter()
                .map(|part| match part {
                    ContentPart::Text { text } => serde_json::json!({
                        "type": "text",
                        "text": text,
                    }),
                    ContentPart::ImageUrl { image_url } => serde_json::json!({
                        "type": "image_url",
                        "image_url": { "url": image_url.url },
                    }),
                })
                .collect(),
        ),
    }
}

/// Convert conversation turns to the wire format.
fn convert_messages(turns: Vec<Turn>) -> Vec<OpenAIMessage> {
    turns
        .into_iter()
        .map(|turn| {
            let tool_calls = turn.tool_calls.filter(|tcs| !tcs.is_empty()).map(|tcs| {
                tcs.into_iter()
                    .map(|tc| OpenAIToolCallRequest {
                        id: tc.id,
                        r#type: "function".to_string(),
                        function: OpenAIFunctionCall {
                            name: tc.name,
                            arguments: tc.arguments,
                        },
                    })
                    .collect()
            });

            let content = if turn.content.is_empty() && tool_calls.is_some() {
                None
            } else {
                Some(convert_content(turn.content))
            };

            OpenAIMessage {
                role: turn.role.to_string(),
                content,
                tool_calls,
                tool_call_id: turn.tool_call_id,
            }
        })
        .collect()
}

fn convert_tools(tools: Vec<ToolDefinition>) -> Vec<OpenAITool> {
    tools
        .into_iter()
        .map(|t| OpenAITool {
            r#type: "function".to_string(),
            function: OpenAIFunctionDef {
                name: t.name,
                description: t.description,
                parameters: t.parameters,
            },
        })
        .collect()
}

/// Convert a wire response. Only `function` tool calls are surfaced.
fn convert_response(response: OpenAIResponse) -> Result<LLMResponse> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ParleyError::Provider("response contained no choices".to_string()))?;

    let content = choice.message.content.unwrap_or_default();
    let tool_calls: Vec<LLMToolCall> = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .filter(|tc| tc.r#type == "function")
        .map(|tc| LLMToolCall::new(&tc.id, &tc.function.name, &tc.function.arguments))
        .collect();

    let mut llm_response = LLMResponse::with_tools(&content, tool_calls);
    if let Some(usage) = response.usage {
        let mut converted = Usage::new(usage.prompt_tokens, usage.completion_tokens);
        if let Some(total) = usage.total_tokens {
            converted.total_tokens = total;
        }
        llm_response = llm_response.with_usage(converted);
    }
    Ok(llm_response)
}

/// Merge the descriptor's extra body into the request. Core fields win.
fn merge_extra_body(body: &mut Value, extra: Option<&Value>) {
    let (Value::Object(target), Some(Value::Object(extra))) = (body, extra) else {
        return;
    };
    for (key, value) in extra {
        if matches!(key.as_str(), "model" | "messages" | "tools") {
            continue;
        }
        target.entry(key.clone()).or_insert_with(|| value.clone());
    }
}

fn build_body(
    model: &ModelDescriptor,
    turns: Vec<Turn>,
    tools: Vec<ToolDefinition>,
    options: &ChatOptions,
) -> Result<Value> {
    let request = OpenAIRequest {
        model: model.model.clone(),
        messages: convert_messages(turns),
        tools: if tools.is_empty() {
            None
        } else {
            Some(convert_tools(tools))
        },
        max_tokens: options.max_tokens,
        temperature: options.temperature,
        response_format: options.json_output.then_some(ResponseFormat {
            r#type: "json_object",
        }),
    };
    let mut body = serde_json::to_value(request)?;
    merge_extra_body(&mut body, model.extra_body.as_ref());
    Ok(body)
}

// ============================================================================
// LLMProvider Implementation
// ============================================================================

#[async_trait]
impl LLMProvider for OpenAIProvider {
    async fn chat(
        &self,
        model: &ModelDescriptor,
        turns: Vec<Turn>,
        tools: Vec<ToolDefinition>,
        options: ChatOptions,
    ) -> Result<LLMResponse> {
        let turn_count = turns.len();
        let tool_count = tools.len();
        let body = build_body(model, turns, tools, &options)?;

        debug!(
            model = %model.name,
            turns = turn_count,
            tools = tool_count,
            json = options.json_output,
            "Chat completion request"
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", model.base_url))
            .bearer_auth(&model.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ParleyError::from(ProviderError::Timeout(e.to_string()))
                } else {
                    ParleyError::Provider(format!("{} request failed: {}", model.name, e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<OpenAIErrorResponse>(&error_text)
                .map(|e| e.error.message)
                .unwrap_or(error_text);
            return Err(parse_provider_error(status.as_u16(), &message).into());
        }

        let wire: OpenAIResponse = response.json().await.map_err(|e| {
            ParleyError::Provider(format!("failed to parse {} response: {}", model.name, e))
        })?;

        let llm_response = convert_response(wire)?;
        debug!(
            model = %model.name,
            tool_calls = llm_response.tool_calls.len(),
            total_tokens = llm_response.usage.map(|u| u.total_tokens).unwrap_or(0),
            "Chat completion response"
        );
        Ok(llm_response)
    }

    fn name(&self) -> &str {
        "openai-compatible"
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ToolCall;

    #[test]
    fn test_convert_messages_simple() {
        let converted = convert_messages(vec![
            Turn::system("You are helpful"),
            Turn::user("Hello"),
            Turn::assistant("Hi there!"),
        ]);

        assert_eq!(converted.len(), 3);
        assert_eq!(converted[0].role, "system");
        assert_eq!(converted[0].content, Some(Value::from("You are helpful")));
        assert_eq!(converted[1].role, "user");
        assert_eq!(converted[2].role, "assistant");
    }

    #[test]
    fn test_convert_messages_with_tool_calls() {
        let tool_call = ToolCall::new("call_1", "change_model", r#"{"provider":"glm"}"#);
        let converted = convert_messages(vec![
            Turn::assistant_with_tools("", vec![tool_call]),
            Turn::tool_result("call_1", "Model switched to glm"),
        ]);

        assert_eq!(converted[0].role, "assistant");
        assert!(converted[0].content.is_none());
        let tool_calls = converted[0].tool_calls.as_ref().unwrap();
        assert_eq!(tool_calls[0].id, "call_1");
        assert_eq!(tool_calls[0].r#type, "function");
        assert_eq!(tool_calls[0].function.name, "change_model");

        assert_eq!(converted[1].role, "tool");
        assert_eq!(converted[1].tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn test_convert_multimodal_content() {
        let converted = convert_messages(vec![Turn::user_with_image(
            "describe",
            "data:image/png;base64,AAAA",
        )]);
        let content = converted[0].content.as_ref().unwrap();
        assert_eq!(content[0]["type"], "text");
        assert_eq!(content[1]["type"], "image_url");
        assert_eq!(content[1]["image_url"]["url"], "data:image/png;base64,AAAA");
    }

    #[test]
    fn test_convert_response_filters_non_function_calls() {
        let json = r#"{
            "choices": [{"message": {"content": null, "tool_calls": [
                {"id": "a", "type": "function", "function": {"name": "f", "arguments": "{}"}},
                {"id": "b", "type": "retrieval", "function": {"name": "g", "arguments": "{}"}}
            ]}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5}
        }"#;
        let response = convert_response(serde_json::from_str(json).unwrap()).unwrap();

        assert_eq!(response.content, "");
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].name, "f");
        assert_eq!(response.usage.unwrap().total_tokens, 15);
    }

    #[test]
    fn test_convert_response_prefers_reported_total() {
        let json = r#"{
            "choices": [{"message": {"content": "hi"}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 40}
        }"#;
        let response = convert_response(serde_json::from_str(json).unwrap()).unwrap();
        assert_eq!(response.content, "hi");
        assert_eq!(response.usage.unwrap().total_tokens, 40);
    }

    #[test]
    fn test_convert_response_without_choices_fails() {
        let response: OpenAIResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(convert_response(response).is_err());
    }

    #[test]
    fn test_build_body_merges_extra_without_overriding_core_fields() {
        let mut model = ModelDescriptor::new("glm", "http://g", "glm-4.7");
        model.extra_body = Some(serde_json::json!({
            "thinking": {"type": "disabled"},
            "model": "hijack",
        }));

        let body = build_body(
            &model,
            vec![Turn::user("hi")],
            vec![],
            &ChatOptions::new().with_json_output(),
        )
        .unwrap();

        assert_eq!(body["model"], "glm-4.7");
        assert_eq!(body["thinking"]["type"], "disabled");
        assert_eq!(body["response_format"]["type"], "json_object");
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn test_build_body_with_tools() {
        let model = ModelDescriptor::new("m", "http://m", "m-1");
        let tools = vec![ToolDefinition::new(
            "change_model",
            "Switch model",
            serde_json::json!({"type": "object"}),
        )];
        let body = build_body(&model, vec![Turn::user("hi")], tools, &ChatOptions::new()).unwrap();
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "change_model");
        assert!(body.get("response_format").is_none());
    }
}
