//! Agent module - Orchestration loop and context compaction
//!
//! The agent is responsible for:
//!
//! - Answering slash commands without a completion request
//! - Refusing a conversation that already has an invocation in flight
//! - Compacting the conversation before each completion request
//! - Calling the active model and dispatching the tools it requests
//! - Committing the conversation only when an invocation completes
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  MessageBus │────>│  AgentLoop  │────>│ LLMProvider │
//! │  (inbound)  │     │             │     │  (OpenAI)   │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                            │                   │
//!                            ▼                   ▼
//!                     ┌─────────────┐     ┌─────────────┐
//!                     │   Context   │     │    Tools    │
//!                     │    Store    │     │  Registry   │
//!                     └─────────────┘     └─────────────┘
//! ```

pub mod commands;
pub mod compaction;
mod r#loop;

pub use compaction::Compactor;
pub use r#loop::{AgentLoop, Reply, BUSY_REPLY, NO_CONTENT};
