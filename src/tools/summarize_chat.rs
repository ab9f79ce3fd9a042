//! Group chat summary tool.
//!
//! Fetches the most recent platform messages of the conversation, renders
//! them as labelled turns (no vision, no forward expansion) and asks the
//! `json-output` model for a structured summary.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::{ParleyError, Result};
use crate::normalize::Normalizer;
use crate::providers::{Capability, ChatOptions, LLMProvider, ModelRegistry};
use crate::session::Turn;

use super::{Tool, ToolContext, ToolOutput};

/// Upper bound on how many messages one summary may cover.
const MAX_SUMMARY_COUNT: usize = 200;

pub struct SummarizeChatTool {
    registry: Arc<ModelRegistry>,
    provider: Arc<dyn LLMProvider>,
    normalizer: Arc<Normalizer>,
    prompt: String,
    default_count: usize,
}

impl SummarizeChatTool {
    pub fn new(
        registry: Arc<ModelRegistry>,
        provider: Arc<dyn LLMProvider>,
        normalizer: Arc<Normalizer>,
        prompt: &str,
        default_count: usize,
    ) -> Self {
        Self {
            registry,
            provider,
            normalizer,
            prompt: prompt.to_string(),
            default_count,
        }
    }

    async fn summarize(&self, count: usize, conversation_key: &str) -> Result<String> {
        let model = self.registry.require(Capability::JsonOutput)?;
        let messages = self
            .normalizer
            .source()
            .recent(conversation_key, count)
            .await?;
        let turns = self.normalizer.normalize_history(&messages);
        if turns.is_empty() {
            return Err(ParleyError::Source("no recent messages".to_string()));
        }

        let transcript = turns
            .iter()
            .map(Turn::text)
            .collect::<Vec<_>>()
            .join("\n");
        debug!(messages = turns.len(), model = %model.name, "Summarizing chat");

        let response = self
            .provider
            .chat(
                &model,
                vec![Turn::system(&self.prompt), Turn::user(&transcript)],
                vec![],
                ChatOptions::new().with_json_output(),
            )
            .await?;
        let summary = response.content.trim();
        if summary.is_empty() {
            return Err(ParleyError::Provider("empty summary".to_string()));
        }
        Ok(summary.to_string())
    }
}

#[async_trait]
impl Tool for SummarizeChatTool {
    fn name(&self) -> &str {
        "summarize_chat"
    }

    fn description(&self) -> &str {
        "Summarize the recent group chat messages. \
         Use when the user asks what was discussed."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "count": {
                    "type": "integer",
                    "description": format!(
                        "How many recent messages to cover (default {}, max {})",
                        self.default_count, MAX_SUMMARY_COUNT
                    )
                }
            },
            "required": []
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolOutput> {
        let count = match args.get("count") {
            None | Some(Value::Null) => self.default_count,
            Some(value) => match value.as_u64() {
                Some(n) if n > 0 => (n as usize).min(MAX_SUMMARY_COUNT),
                _ => {
                    return Ok(ToolOutput::text(
                        "Summary failed: 'count' must be a positive integer",
                    ))
                }
            },
        };

        match self.summarize(count, &ctx.conversation_key).await {
            Ok(summary) => Ok(ToolOutput::text(summary)),
            Err(e) => {
                warn!(conversation = %ctx.conversation_key, error = %e, "Chat summary failed");
                Ok(ToolOutput::text(format!("Summary failed: {}", e)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{PlatformMessage, Sender};
    use crate::normalize::{MessageSource, NoMessageSource};
    use crate::providers::{LLMResponse, ModelDescriptor, ToolDefinition};
    use std::sync::Mutex;

    struct History(Vec<PlatformMessage>);

    #[async_trait]
    impl MessageSource for History {
        async fn forwarded(&self, id: &str) -> Result<Vec<PlatformMessage>> {
            Err(ParleyError::Source(id.to_string()))
        }

        async fn message(&self, id: &str) -> Result<PlatformMessage> {
            Err(ParleyError::Source(id.to_string()))
        }

        async fn recent(&self, _key: &str, count: usize) -> Result<Vec<PlatformMessage>> {
            let skip = self.0.len().saturating_sub(count);
            Ok(self.0[skip..].to_vec())
        }
    }

    struct Recorder {
        requests: Mutex<Vec<Vec<Turn>>>,
    }

    #[async_trait]
    impl LLMProvider for Recorder {
        async fn chat(
            &self,
            _model: &ModelDescriptor,
            turns: Vec<Turn>,
            _tools: Vec<ToolDefinition>,
            options: ChatOptions,
        ) -> Result<LLMResponse> {
            assert!(options.json_output);
            self.requests.lock().unwrap().push(turns);
            Ok(LLMResponse::text(r#"{"topics":[]}"#))
        }

        fn name(&self) -> &str {
            "recorder"
        }
    }

    fn json_registry() -> Arc<ModelRegistry> {
        Arc::new(ModelRegistry::new(vec![ModelDescriptor::new(
            "ds", "http://d", "ds",
        )
        .with_capabilities(&[Capability::Chat, Capability::JsonOutput])]))
    }

    fn history() -> Vec<PlatformMessage> {
        (0..5)
            .map(|i| {
                PlatformMessage::text(
                    &format!("m{}", i),
                    Sender::new("7", "amy"),
                    &format!("line {}", i),
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn test_summarize_recent_messages() {
        let provider = Arc::new(Recorder {
            requests: Mutex::new(Vec::new()),
        });
        let normalizer = Arc::new(Normalizer::new(Arc::new(History(history())), None));
        let tool = SummarizeChatTool::new(json_registry(), provider.clone(), normalizer, "SUM", 30);

        let out = tool
            .execute(json!({"count": 2}), &ToolContext::new("qq:1"))
            .await
            .unwrap();
        assert_eq!(out.content, r#"{"topics":[]}"#);

        let requests = provider.requests.lock().unwrap();
        let transcript = requests[0][1].text();
        assert!(transcript.contains("line 3"));
        assert!(transcript.contains("line 4"));
        assert!(!transcript.contains("line 2"));
    }

    #[tokio::test]
    async fn test_source_failure_reported_as_text() {
        let provider = Arc::new(Recorder {
            requests: Mutex::new(Vec::new()),
        });
        let normalizer = Arc::new(Normalizer::new(Arc::new(NoMessageSource), None));
        let tool = SummarizeChatTool::new(json_registry(), provider.clone(), normalizer, "SUM", 30);

        let out = tool.execute(json!({}), &ToolContext::new("qq:1")).await.unwrap();
        assert!(out.content.starts_with("Summary failed:"));
        assert!(provider.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_json_model() {
        let provider = Arc::new(Recorder {
            requests: Mutex::new(Vec::new()),
        });
        let normalizer = Arc::new(Normalizer::new(Arc::new(History(history())), None));
        let registry = Arc::new(ModelRegistry::new(vec![ModelDescriptor::new(
            "c", "http://c", "c",
        )]));
        let tool = SummarizeChatTool::new(registry, provider, normalizer, "SUM", 30);

        let out = tool.execute(json!({}), &ToolContext::new("qq:1")).await.unwrap();
        assert!(out.content.contains("json-output"));
    }

    #[tokio::test]
    async fn test_invalid_count() {
        let provider = Arc::new(Recorder {
            requests: Mutex::new(Vec::new()),
        });
        let normalizer = Arc::new(Normalizer::new(Arc::new(History(history())), None));
        let tool = SummarizeChatTool::new(json_registry(), provider, normalizer, "SUM", 30);

        let out = tool
            .execute(json!({"count": "lots"}), &ToolContext::new("qq:1"))
            .await
            .unwrap();
        assert!(out.content.starts_with("Summary failed"));
    }
}
