//! Providers module - chat-completion models and the endpoint client
//!
//! This module defines the `LLMProvider` trait, the model registry with
//! capability selection, and the OpenAI-compatible HTTP client that serves
//! every registered model.
//!
//! # Example
//!
//! ```rust,ignore
//! use parley::providers::{Capability, ChatOptions, LLMProvider, ModelRegistry};
//! use parley::session::Turn;
//!
//! async fn example(registry: &ModelRegistry, provider: &dyn LLMProvider) {
//!     let model = registry.select(Capability::Chat).unwrap();
//!     let options = ChatOptions::new().with_max_tokens(1000);
//!
//!     let response = provider
//!         .chat(&model, vec![Turn::user("Hello!")], vec![], options)
//!         .await
//!         .unwrap();
//!     println!("Response: {}", response.content);
//! }
//! ```

pub mod openai;
mod registry;
mod types;

pub use openai::OpenAIProvider;
pub use registry::{
    ActiveModel, Capability, ModelDescriptor, ModelPreset, ModelRegistry, MODEL_PRESETS,
};
pub use types::{ChatOptions, LLMProvider, LLMResponse, LLMToolCall, ToolDefinition, Usage};

use crate::error::ProviderError;

/// Classify an HTTP error status from a chat-completion endpoint.
pub fn parse_provider_error(status: u16, body: &str) -> ProviderError {
    match status {
        401 => ProviderError::Auth(body.to_string()),
        402 => ProviderError::Billing(body.to_string()),
        404 => ProviderError::ModelNotFound(body.to_string()),
        429 => ProviderError::RateLimit(body.to_string()),
        400 => ProviderError::InvalidRequest(body.to_string()),
        408 | 504 => ProviderError::Timeout(body.to_string()),
        500..=599 => ProviderError::ServerError(body.to_string()),
        _ => ProviderError::Unknown(format!("HTTP {}: {}", status, body)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_provider_error_auth() {
        let err = parse_provider_error(401, "invalid api key");
        assert!(matches!(err, ProviderError::Auth(_)));
    }

    #[test]
    fn test_parse_provider_error_billing() {
        assert!(matches!(
            parse_provider_error(402, "payment required"),
            ProviderError::Billing(_)
        ));
    }

    #[test]
    fn test_parse_provider_error_rate_limit() {
        let err = parse_provider_error(429, "rate limited");
        assert!(matches!(err, ProviderError::RateLimit(_)));
        assert!(err.is_transient());
    }

    #[test]
    fn test_parse_provider_error_timeouts() {
        assert!(matches!(
            parse_provider_error(504, "gateway timeout"),
            ProviderError::Timeout(_)
        ));
        assert!(matches!(
            parse_provider_error(408, "request timeout"),
            ProviderError::Timeout(_)
        ));
    }

    #[test]
    fn test_parse_provider_error_server() {
        assert!(matches!(
            parse_provider_error(503, "unavailable"),
            ProviderError::ServerError(_)
        ));
    }

    #[test]
    fn test_parse_provider_error_unknown() {
        let err = parse_provider_error(418, "teapot");
        assert!(matches!(err, ProviderError::Unknown(_)));
        assert!(err.to_string().contains("HTTP 418"));
    }
}
