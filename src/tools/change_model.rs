//! Model switch tool.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use crate::error::{ParleyError, Result};
use crate::providers::{Capability, ModelRegistry};

use super::{Tool, ToolContext, ToolOutput};

/// Switches the active chat model.
///
/// An unknown or non-chat model is reported back to the model as a normal
/// tool result so it can recover in the next round.
pub struct ChangeModelTool {
    registry: Arc<ModelRegistry>,
}

impl ChangeModelTool {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self { registry }
    }

    fn available(&self) -> String {
        self.registry
            .iter()
            .filter(|m| m.supports(Capability::Chat))
            .map(|m| m.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[async_trait]
impl Tool for ChangeModelTool {
    fn name(&self) -> &str {
        "change_model"
    }

    fn description(&self) -> &str {
        "Switch the chat model used for this and later replies. \
         Use when the user asks for a different model."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "provider": {
                    "type": "string",
                    "description": format!(
                        "Name, alias or model id to switch to. Available: {}",
                        self.available()
                    )
                }
            },
            "required": ["provider"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolOutput> {
        let query = args
            .get("provider")
            .and_then(Value::as_str)
            .map(str::trim)
            .ok_or_else(|| ParleyError::Tool("'provider' must be a string".to_string()))?;

        let Some(selection) = self.registry.switch_to(query) else {
            return Ok(ToolOutput::text(format!(
                "Switch failed: no model named {}",
                query
            )));
        };
        let supports_chat = selection
            .get()
            .is_some_and(|m| m.supports(Capability::Chat));
        if !supports_chat {
            return Ok(ToolOutput::text(format!(
                "Switch failed: {} is not a chat model",
                selection.name()
            )));
        }

        info!(
            conversation = %ctx.conversation_key,
            from = %ctx.active_model.name(),
            to = %selection.name(),
            "Model switch requested"
        );
        let message = format!("Model switched to {}", selection.name());
        Ok(ToolOutput::switched(message, selection))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ModelDescriptor;

    fn tool() -> ChangeModelTool {
        let registry = ModelRegistry::new(vec![
            ModelDescriptor::new("glm", "http://g", "glm-4.7").with_aliases(&["zhipu"]),
            ModelDescriptor::new("deepseek", "http://d", "deepseek-chat"),
            ModelDescriptor::new("glm-vision", "http://g", "glm-4.6v")
                .with_capabilities(&[Capability::VisionUnderstanding]),
        ]);
        ChangeModelTool::new(Arc::new(registry))
    }

    #[tokio::test]
    async fn test_switch_by_alias() {
        let out = tool()
            .execute(json!({"provider": "ZHIPU"}), &ToolContext::new("qq:1"))
            .await
            .unwrap();
        assert_eq!(out.content, "Model switched to glm");
        assert_eq!(out.model_switch.unwrap().name(), "glm");
    }

    #[tokio::test]
    async fn test_unknown_model_is_soft_failure() {
        let out = tool()
            .execute(json!({"provider": "X"}), &ToolContext::new("qq:1"))
            .await
            .unwrap();
        assert_eq!(out.content, "Switch failed: no model named X");
        assert!(out.model_switch.is_none());
    }

    #[tokio::test]
    async fn test_non_chat_model_rejected() {
        let out = tool()
            .execute(json!({"provider": "glm-vision"}), &ToolContext::new("qq:1"))
            .await
            .unwrap();
        assert!(out.content.starts_with("Switch failed"));
        assert!(out.model_switch.is_none());
    }

    #[tokio::test]
    async fn test_wrong_type_is_tool_error() {
        let err = tool()
            .execute(json!({"provider": 3}), &ToolContext::new("qq:1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ParleyError::Tool(_)));
    }

    #[test]
    fn test_parameters_list_chat_models() {
        let params = tool().parameters();
        let description = params["properties"]["provider"]["description"]
            .as_str()
            .unwrap();
        assert!(description.contains("glm, deepseek"));
        assert!(!description.contains("glm-vision"));
    }
}
