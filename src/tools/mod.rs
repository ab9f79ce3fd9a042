//! Tools module - Tool definitions and dispatch for LLM function calling
//!
//! # Overview
//!
//! - `Tool` trait: The interface that all tools must implement
//! - `ToolContext`: Execution context (conversation key, active model)
//! - `ToolOutput`: Result text plus an optional model switch
//! - `ToolRegistry`: Tool table and validated dispatch
//!
//! # Built-in Tools
//!
//! - `ChangeModelTool`: Switch the active chat model
//! - `SummarizeChatTool`: Summarize recent platform messages
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use parley::providers::{ModelDescriptor, ModelRegistry};
//! use parley::session::ToolCall;
//! use parley::tools::{ChangeModelTool, ToolContext, ToolRegistry};
//!
//! # tokio_test::block_on(async {
//! let models = Arc::new(ModelRegistry::new(vec![
//!     ModelDescriptor::new("glm", "https://example.invalid", "glm-4.7"),
//! ]));
//! let mut registry = ToolRegistry::new();
//! registry.register(Box::new(ChangeModelTool::new(models)));
//!
//! let call = ToolCall::new("call_1", "change_model", r#"{"provider":"glm"}"#);
//! let output = registry.dispatch(&call, &ToolContext::new("cli:local")).await.unwrap();
//! assert_eq!(output.content, "Model switched to glm");
//! # });
//! ```

pub mod change_model;
mod registry;
pub mod summarize_chat;
mod types;

pub use change_model::ChangeModelTool;
pub use registry::ToolRegistry;
pub use summarize_chat::SummarizeChatTool;
pub use types::{Tool, ToolContext, ToolOutput};
