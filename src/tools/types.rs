//! Tool types for Parley
//!
//! This module defines the `Tool` trait that every model-callable tool
//! implements, the `ToolContext` passed to each execution, and the
//! `ToolOutput` a tool returns.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::providers::ActiveModel;

/// Result of one tool execution.
///
/// `content` becomes the tool-result turn. A tool that switches the active
/// model returns the new value in `model_switch`; the orchestration loop
/// applies it before the next call in the same round.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    /// Text appended as the tool-result turn.
    pub content: String,
    /// New active model, if the tool changed it.
    pub model_switch: Option<ActiveModel>,
}

impl ToolOutput {
    /// Plain text result.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            model_switch: None,
        }
    }

    /// Text result that also switches the active model.
    pub fn switched(content: impl Into<String>, model: ActiveModel) -> Self {
        Self {
            content: content.into(),
            model_switch: Some(model),
        }
    }
}

/// Trait that all tools must implement.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use serde_json::Value;
/// use parley::tools::{Tool, ToolContext, ToolOutput};
/// use parley::error::Result;
///
/// struct MyTool;
///
/// #[async_trait]
/// impl Tool for MyTool {
///     fn name(&self) -> &str { "my_tool" }
///     fn description(&self) -> &str { "Does something useful" }
///     fn parameters(&self) -> Value {
///         serde_json::json!({
///             "type": "object",
///             "properties": {},
///             "required": []
///         })
///     }
///     async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<ToolOutput> {
///         Ok(ToolOutput::text("Done!"))
///     }
/// }
/// ```
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name the model uses to request the tool.
    fn name(&self) -> &str;

    /// Description sent to the model.
    fn description(&self) -> &str;

    /// JSON schema of the arguments. Keys listed under `required` are
    /// checked for presence before `execute` runs.
    fn parameters(&self) -> Value;

    /// Execute with already-validated arguments.
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolOutput>;
}

/// Context provided to tools during execution.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    /// Conversation the invocation belongs to
    pub conversation_key: String,
    /// Active model as seen by this invocation at the time of the call
    pub active_model: ActiveModel,
}

impl ToolContext {
    /// Create a context for `conversation_key`.
    ///
    /// # Example
    /// ```
    /// use parley::tools::ToolContext;
    ///
    /// let ctx = ToolContext::new("qq:group1");
    /// assert_eq!(ctx.conversation_key, "qq:group1");
    /// assert_eq!(ctx.active_model.name(), "none");
    /// ```
    pub fn new(conversation_key: &str) -> Self {
        Self {
            conversation_key: conversation_key.to_string(),
            active_model: ActiveModel::none(),
        }
    }

    pub fn with_active_model(mut self, active_model: ActiveModel) -> Self {
        self.active_model = active_model;
        self
    }
}
