//! Tool registry and dispatch for Parley
//!
//! `ToolRegistry` holds the tool table advertised to the model and
//! dispatches model-requested calls after structural validation: the tool
//! must be registered, the arguments must be a JSON object, and every key
//! listed under the schema's `required` must be present. Value types are
//! not checked here; tools report those as execution failures.

use std::collections::BTreeMap;
use std::time::Instant;

use serde_json::Value;
use tracing::{error, info};

use crate::error::{ParleyError, Result};
use crate::providers::ToolDefinition;
use crate::session::ToolCall;
use crate::utils::string::{preview, LOG_PREVIEW_CHARS};

use super::{Tool, ToolContext, ToolOutput};

/// A registry that holds and dispatches tools.
///
/// # Example
///
/// ```rust
/// use parley::tools::{ToolRegistry, ToolContext};
/// use parley::session::ToolCall;
///
/// # tokio_test::block_on(async {
/// let registry = ToolRegistry::new();
/// let call = ToolCall::new("c1", "missing", "{}");
/// let result = registry.dispatch(&call, &ToolContext::new("cli:local")).await;
/// assert!(result.is_err());
/// # });
/// ```
pub struct ToolRegistry {
    tools: BTreeMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Register a tool. A tool with the same name is replaced.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        info!(tool = %name, "Registering tool");
        self.tools.insert(name, tool);
    }

    /// Tool table for the completion request, ordered by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .map(|t| ToolDefinition::new(t.name(), t.description(), t.parameters()))
            .collect()
    }

    /// Validate and execute one model-requested call.
    ///
    /// # Errors
    ///
    /// - [`ParleyError::UnknownTool`] if no tool has that name
    /// - [`ParleyError::InvalidToolArguments`] if the payload is not a JSON
    ///   object or a required key is absent
    /// - whatever the tool itself returns
    pub async fn dispatch(&self, call: &ToolCall, ctx: &ToolContext) -> Result<ToolOutput> {
        let tool = self
            .tools
            .get(&call.name)
            .ok_or_else(|| ParleyError::UnknownTool(call.name.clone()))?;

        let args = parse_arguments(&call.name, &call.arguments)?;
        check_required(&call.name, &tool.parameters(), &args)?;

        let start = Instant::now();
        match tool.execute(args, ctx).await {
            Ok(output) => {
                info!(
                    tool = %call.name,
                    call_id = %call.id,
                    args = %preview(&call.arguments, LOG_PREVIEW_CHARS),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Tool executed successfully"
                );
                Ok(output)
            }
            Err(e) => {
                error!(
                    tool = %call.name,
                    call_id = %call.id,
                    error = %e,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Tool execution failed"
                );
                Err(e)
            }
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse the raw argument payload. An empty payload is an empty object.
fn parse_arguments(tool: &str, raw: &str) -> Result<Value> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    let value: Value =
        serde_json::from_str(raw).map_err(|e| ParleyError::InvalidToolArguments {
            tool: tool.to_string(),
            reason: format!("not valid JSON: {}", e),
        })?;
    if !value.is_object() {
        return Err(ParleyError::InvalidToolArguments {
            tool: tool.to_string(),
            reason: "arguments must be a JSON object".to_string(),
        });
    }
    Ok(value)
}

fn check_required(tool: &str, schema: &Value, args: &Value) -> Result<()> {
    let Some(required) = schema.get("required").and_then(Value::as_array) else {
        return Ok(());
    };
    for key in required.iter().filter_map(Value::as_str) {
        if args.get(key).is_none() {
            return Err(ParleyError::InvalidToolArguments {
                tool: tool.to_string(),
                reason: format!("missing required parameter '{}'", key),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echo the message back"
        }

        fn parameters(&self) -> Value {
            json!({
                "type": "object",
                "properties": { "message": { "type": "string" } },
                "required": ["message"]
            })
        }

        async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<ToolOutput> {
            match args.get("message").and_then(Value::as_str) {
                Some(message) => Ok(ToolOutput::text(message)),
                None => Err(ParleyError::Tool("message must be a string".into())),
            }
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        registry
    }

    fn ctx() -> ToolContext {
        ToolContext::new("test:1")
    }

    #[test]
    fn test_registry_register() {
        let registry = registry();
        assert!(registry.has("echo"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.names(), vec!["echo"]);
        assert!(!ToolRegistry::default().has("echo"));
    }

    #[test]
    fn test_definitions() {
        let defs = registry().definitions();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "echo");
        assert_eq!(defs[0].parameters["required"][0], "message");
    }

    #[tokio::test]
    async fn test_dispatch_success() {
        let call = ToolCall::new("c1", "echo", r#"{"message":"hi"}"#);
        let out = registry().dispatch(&call, &ctx()).await.unwrap();
        assert_eq!(out.content, "hi");
    }

    #[tokio::test]
    async fn test_dispatch_unknown_tool() {
        let call = ToolCall::new("c1", "nope", "{}");
        let err = registry().dispatch(&call, &ctx()).await.unwrap_err();
        assert!(matches!(err, ParleyError::UnknownTool(ref n) if n == "nope"));
    }

    #[tokio::test]
    async fn test_dispatch_invalid_json() {
        let call = ToolCall::new("c1", "echo", "{not json");
        let err = registry().dispatch(&call, &ctx()).await.unwrap_err();
        assert!(matches!(err, ParleyError::InvalidToolArguments { .. }));
    }

    #[tokio::test]
    async fn test_dispatch_non_object() {
        let call = ToolCall::new("c1", "echo", r#"["hi"]"#);
        let err = registry().dispatch(&call, &ctx()).await.unwrap_err();
        assert!(err.to_string().contains("JSON object"));
    }

    #[tokio::test]
    async fn test_dispatch_missing_required() {
        let call = ToolCall::new("c1", "echo", "");
        let err = registry().dispatch(&call, &ctx()).await.unwrap_err();
        assert!(err.to_string().contains("missing required parameter 'message'"));
    }

    #[tokio::test]
    async fn test_type_error_is_execution_failure() {
        // Presence is enough for dispatch; the tool rejects the type.
        let call = ToolCall::new("c1", "echo", r#"{"message": 42}"#);
        let err = registry().dispatch(&call, &ctx()).await.unwrap_err();
        assert!(matches!(err, ParleyError::Tool(_)));
    }
}
