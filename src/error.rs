//! Error types for Parley
//!
//! This module defines all error types used throughout the gateway.
//! Uses `thiserror` for ergonomic error handling with automatic `Display` and
//! `Error` trait implementations.

use std::fmt;
use thiserror::Error;

// ============================================================================
// Provider Error Classification
// ============================================================================

/// Structured classification of chat-completion endpoint failures.
///
/// The orchestration loop never retries a failed completion call; the
/// classification only decides how loudly the failure is logged and what
/// text reaches the user.
#[derive(Debug)]
pub enum ProviderError {
    /// 401 - Invalid API key or authentication failure
    Auth(String),
    /// 429 - Rate limit or quota exceeded
    RateLimit(String),
    /// 402 - Payment required or billing issue
    Billing(String),
    /// 500/502/503/504 - Server-side errors
    ServerError(String),
    /// 400 - Bad request, invalid JSON, malformed parameters
    InvalidRequest(String),
    /// 404 - Model not found or endpoint not available
    ModelNotFound(String),
    /// Connection or read timeout
    Timeout(String),
    /// Catch-all for unrecognized errors
    Unknown(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Auth(msg) => write!(f, "Authentication error: {}", msg),
            ProviderError::RateLimit(msg) => write!(f, "Rate limit error: {}", msg),
            ProviderError::Billing(msg) => write!(f, "Billing error: {}", msg),
            ProviderError::ServerError(msg) => write!(f, "Server error: {}", msg),
            ProviderError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            ProviderError::ModelNotFound(msg) => write!(f, "Model not found: {}", msg),
            ProviderError::Timeout(msg) => write!(f, "Timeout: {}", msg),
            ProviderError::Unknown(msg) => write!(f, "Unknown provider error: {}", msg),
        }
    }
}

impl ProviderError {
    /// Returns `true` for failures that would likely succeed if the user tried again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimit(_) | ProviderError::ServerError(_) | ProviderError::Timeout(_)
        )
    }
}

impl From<ProviderError> for ParleyError {
    fn from(err: ProviderError) -> Self {
        ParleyError::ProviderTyped(err)
    }
}

// ============================================================================
// Primary Error Type
// ============================================================================

/// The primary error type for Parley operations.
#[derive(Error, Debug)]
pub enum ParleyError {
    /// Configuration-related errors (invalid config, missing capability, no active model)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Free-form provider errors (undecodable responses, empty choices)
    #[error("Provider error: {0}")]
    Provider(String),

    /// Provider HTTP failures with a status classification.
    #[error("Provider error: {0}")]
    ProviderTyped(ProviderError),

    /// The model requested a tool that is not registered.
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// Tool arguments were not a JSON object or lacked a required key.
    #[error("Invalid arguments for tool '{tool}': {reason}")]
    InvalidToolArguments { tool: String, reason: String },

    /// Tool execution failures
    #[error("Tool error: {0}")]
    Tool(String),

    /// The model kept requesting tools past the per-reply round limit.
    #[error("Too many tool calls: more than {0} tool rounds in a single reply")]
    ToolLimit(usize),

    /// Context store errors (snapshot corruption, invalid keys)
    #[error("Session error: {0}")]
    Session(String),

    /// Image description failures
    #[error("Vision error: {0}")]
    Vision(String),

    /// Platform message-history lookups (forwards, replies, recent messages)
    #[error("Message source error: {0}")]
    Source(String),

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Message bus channel closed unexpectedly
    #[error("Bus error: channel closed")]
    BusClosed,

    /// Resource not found (conversations, models)
    #[error("Not found: {0}")]
    NotFound(String),
}

/// A specialized `Result` type for Parley operations.
pub type Result<T> = std::result::Result<T, ParleyError>;
