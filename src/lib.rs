//! Parley - Conversational agent gateway
//!
//! Receives chat events from a messaging platform, keeps a bounded and
//! durable history per conversation, and drives a tool-augmented completion
//! loop against OpenAI-compatible model endpoints.

pub mod agent;
pub mod bus;
pub mod config;
pub mod error;
pub mod normalize;
pub mod providers;
pub mod session;
pub mod tools;
pub mod utils;

pub use agent::{AgentLoop, Reply};
pub use bus::{InboundMessage, MessageBus, OutboundMessage};
pub use config::Config;
pub use error::{ParleyError, Result};
pub use providers::{
    ActiveModel, Capability, ChatOptions, LLMProvider, LLMResponse, ModelDescriptor,
    ModelRegistry, OpenAIProvider,
};
pub use session::{ContextStore, Role, ToolCall, Turn};
