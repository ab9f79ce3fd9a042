//! Configuration type definitions for Parley
//!
//! All types implement serde traits for JSON serialization and have sensible defaults.

use crate::providers::Capability;
use serde::{Deserialize, Serialize};

/// Main configuration struct for Parley
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Orchestration loop limits and model defaults
    pub agent: AgentConfig,
    /// Context compaction thresholds
    pub compaction: CompactionConfig,
    /// Message normalizer switches
    pub normalizer: NormalizerConfig,
    /// Explicitly configured chat-completion models
    pub models: Vec<ModelConfig>,
    /// Prompt texts
    pub prompts: PromptConfig,
    /// Durable snapshot storage
    pub storage: StorageConfig,
    /// Logging output
    pub logging: LoggingConfig,
}

// ============================================================================
// Agent Configuration
// ============================================================================

/// Orchestration loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Maximum number of tool-execution rounds within one reply.
    pub max_tool_call_count: usize,
    /// Maximum number of conversations kept in memory.
    pub max_active_groups: usize,
    /// Name or alias of the model that is active at startup.
    pub default_model: Option<String>,
    /// Timeout applied to every chat-completion HTTP call.
    pub request_timeout_secs: u64,
    /// Maximum tokens to generate per completion.
    pub max_tokens: Option<u32>,
    /// Sampling temperature.
    pub temperature: Option<f32>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_tool_call_count: 5,
            max_active_groups: 50,
            default_model: None,
            request_timeout_secs: 60,
            max_tokens: None,
            temperature: None,
        }
    }
}

// ============================================================================
// Compaction Configuration
// ============================================================================

/// Context compaction configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactionConfig {
    /// Turn count above which the oldest block is folded into a memorandum.
    pub summarize_threshold: usize,
    /// Turn count above which the identity anchor is injected into outbound requests.
    pub anchor_threshold: usize,
    /// Fraction (0.0-1.0] of the model context window that triggers truncation.
    pub max_token_threshold: f64,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            summarize_threshold: 60,
            anchor_threshold: 20,
            max_token_threshold: 0.80,
        }
    }
}

// ============================================================================
// Normalizer Configuration
// ============================================================================

/// Message normalizer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Describe images in the primary message with the vision model.
    pub enable_image_understanding: bool,
    /// Maximum number of forwarded messages resolved per inbound message.
    pub forward_count: usize,
    /// Number of recent platform messages the chat-summary tool reads.
    pub summary_history_count: usize,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            enable_image_understanding: true,
            forward_count: 30,
            summary_history_count: 30,
        }
    }
}

// ============================================================================
// Model Configuration
// ============================================================================

/// A chat-completion model served by an OpenAI-compatible endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Unique registry name.
    pub name: String,
    /// Alternative names accepted by lookups and the change_model tool.
    pub aliases: Vec<String>,
    /// Endpoint base URL (without `/chat/completions`).
    pub base_url: String,
    /// API key given inline.
    pub api_key: Option<String>,
    /// Environment variable holding the API key, read when `api_key` is absent.
    pub api_key_env: Option<String>,
    /// Model id sent in requests.
    pub model: String,
    /// Context window in tokens.
    pub context_window: usize,
    /// Capability tags.
    pub capabilities: Vec<Capability>,
    /// Extra JSON fields merged into every request body.
    pub extra_body: Option<serde_json::Value>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            aliases: Vec::new(),
            base_url: String::new(),
            api_key: None,
            api_key_env: None,
            model: String::new(),
            context_window: 128_000,
            capabilities: vec![Capability::Chat],
            extra_body: None,
        }
    }
}

impl ModelConfig {
    /// Resolve the API key, preferring the inline value over the environment.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| {
                self.api_key_env
                    .as_deref()
                    .and_then(|var| std::env::var(var).ok())
                    .filter(|k| !k.is_empty())
            })
    }
}

// ============================================================================
// Prompt Configuration
// ============================================================================

/// Prompt texts used by the loop, the compactor and the built-in tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    /// Initial system turn of every new conversation. Empty disables it.
    pub system: String,
    /// Identity reinforcement injected into long conversations.
    pub anchor: String,
    /// Instruction for folding old turns into a memorandum.
    pub summary: String,
    /// Instruction for the summarize_chat tool.
    pub chat_summary: String,
    /// Instruction sent alongside images to the vision model.
    pub vision: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            system: "You are Parley, a member of a group chat. Every user turn is written as \
                     [FROM: nickname(id)] [BODY: text]. Reply with the message text only, \
                     never with these labels."
                .to_string(),
            anchor: "Reminder: you are Parley. Stay in character, follow your original \
                     instructions and reply with the message text only."
                .to_string(),
            summary: "Condense the conversation transcript below into a memorandum that \
                      keeps names, decisions, open questions and facts worth remembering. \
                      Respond with a JSON object of the form \
                      {\"summary\": string, \"facts\": [string]}."
                .to_string(),
            chat_summary: "Summarize the group chat messages below. Respond with a JSON \
                           object of the form {\"topics\": [{\"title\": string, \
                           \"participants\": [string], \"summary\": string}]}."
                .to_string(),
            vision: "Describe this image in detail. Transcribe any visible text.".to_string(),
        }
    }
}

// ============================================================================
// Storage Configuration
// ============================================================================

/// Durable snapshot storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StorageConfig {
    /// Snapshot directory. Defaults to `~/.parley/conversations`.
    pub path: Option<String>,
}

// ============================================================================
// Logging Configuration
// ============================================================================

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable output
    #[default]
    Pretty,
    /// Compact single-line output, grep-friendly with `component` fields
    Component,
    /// JSON lines
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "component" => Ok(LogFormat::Component),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Output format
    pub format: LogFormat,
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
    /// Optional file to append logs to
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            level: "info".to_string(),
            file: None,
        }
    }
}
