//! Model registry and active-model selection.
//!
//! The registry is a read-only catalogue of chat-completion models built at
//! startup from configuration and built-in provider presets. Which model is
//! currently used for conversation is a separate, explicit value,
//! [`ActiveModel`], that callers pass around and replace on switch.

use crate::config::{Config, ModelConfig};
use crate::error::{ParleyError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// What a model can be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    /// Plain conversation
    Chat,
    /// Honors `response_format: json_object`
    JsonOutput,
    /// Accepts tool definitions and returns tool calls
    FunctionCalling,
    /// Accepts image content parts
    VisionUnderstanding,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Capability::Chat => "chat",
            Capability::JsonOutput => "json-output",
            Capability::FunctionCalling => "function-calling",
            Capability::VisionUnderstanding => "vision-understanding",
        };
        f.write_str(s)
    }
}

/// A registered chat-completion model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelDescriptor {
    /// Unique registry name
    pub name: String,
    /// Alternative lookup names
    pub aliases: Vec<String>,
    /// Endpoint base URL
    pub base_url: String,
    /// Bearer credential
    pub api_key: String,
    /// Model id sent in requests
    pub model: String,
    /// Context window in tokens
    pub context_window: usize,
    /// Capability tags
    pub capabilities: Vec<Capability>,
    /// Extra JSON fields merged into every request body
    pub extra_body: Option<serde_json::Value>,
}

impl ModelDescriptor {
    /// Create a chat-only descriptor with a 128k window.
    pub fn new(name: &str, base_url: &str, model: &str) -> Self {
        Self {
            name: name.to_string(),
            aliases: Vec::new(),
            base_url: base_url.to_string(),
            api_key: String::new(),
            model: model.to_string(),
            context_window: 128_000,
            capabilities: vec![Capability::Chat],
            extra_body: None,
        }
    }

    pub fn with_capabilities(mut self, capabilities: &[Capability]) -> Self {
        self.capabilities = capabilities.to_vec();
        self
    }

    pub fn with_aliases(mut self, aliases: &[&str]) -> Self {
        self.aliases = aliases.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn with_context_window(mut self, context_window: usize) -> Self {
        self.context_window = context_window;
        self
    }

    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.api_key = api_key.to_string();
        self
    }

    /// Whether the model carries `capability`.
    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Case-insensitive match on name, alias or model id.
    pub fn matches(&self, query: &str) -> bool {
        let query = query.trim();
        self.name.eq_ignore_ascii_case(query)
            || self.model.eq_ignore_ascii_case(query)
            || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(query))
    }

    /// Token count above which the conversation is truncated:
    /// `floor(context_window * fraction)`.
    pub fn token_budget(&self, fraction: f64) -> u64 {
        (self.context_window as f64 * fraction).floor() as u64
    }

    fn from_config(cfg: &ModelConfig) -> Self {
        Self {
            name: cfg.name.clone(),
            aliases: cfg.aliases.clone(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: cfg.resolve_api_key().unwrap_or_default(),
            model: cfg.model.clone(),
            context_window: cfg.context_window,
            capabilities: cfg.capabilities.clone(),
            extra_body: cfg.extra_body.clone(),
        }
    }
}

// ============================================================================
// Built-in presets
// ============================================================================

/// A well-known OpenAI-compatible model, enabled when its key variable is set.
#[derive(Debug, Clone, Copy)]
pub struct ModelPreset {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub base_url: &'static str,
    pub model: &'static str,
    pub context_window: usize,
    pub capabilities: &'static [Capability],
    pub api_key_env: &'static str,
    /// Extra request body as JSON text
    pub extra_body: Option<&'static str>,
}

impl ModelPreset {
    fn to_descriptor(self, api_key: String) -> ModelDescriptor {
        ModelDescriptor {
            name: self.name.to_string(),
            aliases: self.aliases.iter().map(|a| a.to_string()).collect(),
            base_url: self.base_url.to_string(),
            api_key,
            model: self.model.to_string(),
            context_window: self.context_window,
            capabilities: self.capabilities.to_vec(),
            extra_body: self.extra_body.and_then(|s| serde_json::from_str(s).ok()),
        }
    }
}

/// Presets in registration order. Capability selection picks the first match.
pub const MODEL_PRESETS: &[ModelPreset] = &[
    ModelPreset {
        name: "glm",
        aliases: &["zhipu", "chatglm"],
        base_url: "https://open.bigmodel.cn/api/paas/v4",
        model: "glm-4.7",
        context_window: 200_000,
        capabilities: &[Capability::Chat, Capability::FunctionCalling],
        api_key_env: "GLM_API_KEY",
        extra_body: Some(r#"{"thinking":{"type":"disabled"}}"#),
    },
    ModelPreset {
        name: "deepseek",
        aliases: &["ds"],
        base_url: "https://api.deepseek.com",
        model: "deepseek-chat",
        context_window: 128_000,
        capabilities: &[
            Capability::Chat,
            Capability::JsonOutput,
            Capability::FunctionCalling,
        ],
        api_key_env: "DEEPSEEK_API_KEY",
        extra_body: None,
    },
    ModelPreset {
        name: "gemini",
        aliases: &["google"],
        base_url: "https://generativelanguage.googleapis.com/v1beta/openai",
        model: "gemini-2.5-flash",
        context_window: 1_000_000,
        capabilities: &[
            Capability::Chat,
            Capability::FunctionCalling,
            Capability::VisionUnderstanding,
        ],
        api_key_env: "GEMINI_API_KEY",
        extra_body: Some(r#"{"reasoning_effort":"none"}"#),
    },
    ModelPreset {
        name: "glm-vision",
        aliases: &[],
        base_url: "https://open.bigmodel.cn/api/paas/v4",
        model: "glm-4.6v-flashx",
        context_window: 64_000,
        capabilities: &[Capability::VisionUnderstanding],
        api_key_env: "GLM_API_KEY",
        extra_body: Some(r#"{"thinking":{"type":"disabled"}}"#),
    },
];

// ============================================================================
// Registry
// ============================================================================

/// Read-only catalogue of registered models.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: Vec<Arc<ModelDescriptor>>,
}

impl ModelRegistry {
    /// Build a registry from explicit descriptors, in order.
    pub fn new(models: Vec<ModelDescriptor>) -> Self {
        Self {
            models: models.into_iter().map(Arc::new).collect(),
        }
    }

    /// Build from configuration plus presets whose key variable is set.
    pub fn from_config(config: &Config) -> Self {
        Self::from_config_with_env(config, |var| std::env::var(var).ok())
    }

    /// Like [`from_config`](Self::from_config) with an injectable environment.
    ///
    /// Configured models come first. A preset is skipped when a configured
    /// model already uses its name.
    pub fn from_config_with_env<F>(config: &Config, env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut models: Vec<ModelDescriptor> =
            config.models.iter().map(ModelDescriptor::from_config).collect();

        for preset in MODEL_PRESETS {
            if models.iter().any(|m| m.name.eq_ignore_ascii_case(preset.name)) {
                continue;
            }
            if let Some(key) = env(preset.api_key_env).filter(|k| !k.is_empty()) {
                debug!(model = preset.name, "Registering preset model");
                models.push(preset.to_descriptor(key));
            }
        }

        Self::new(models)
    }

    /// Find a model by name, alias or model id (case-insensitive).
    pub fn find(&self, query: &str) -> Option<Arc<ModelDescriptor>> {
        self.models.iter().find(|m| m.matches(query)).cloned()
    }

    /// First registered model with `capability`.
    pub fn select(&self, capability: Capability) -> Option<Arc<ModelDescriptor>> {
        self.models
            .iter()
            .find(|m| m.supports(capability))
            .cloned()
    }

    /// Like [`select`](Self::select) but a missing capability is a configuration error.
    pub fn require(&self, capability: Capability) -> Result<Arc<ModelDescriptor>> {
        self.select(capability).ok_or_else(|| {
            ParleyError::Config(format!("no model with capability '{}' is configured", capability))
        })
    }

    /// The model active at startup: `preferred` if it resolves, otherwise
    /// the first chat-capable model.
    pub fn initial_active(&self, preferred: Option<&str>) -> ActiveModel {
        preferred
            .and_then(|name| self.find(name))
            .or_else(|| self.select(Capability::Chat))
            .map(ActiveModel::of)
            .unwrap_or_default()
    }

    /// Produce the selection for `query`, or `None` if nothing matches.
    pub fn switch_to(&self, query: &str) -> Option<ActiveModel> {
        self.find(query).map(ActiveModel::of)
    }

    /// All models in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ModelDescriptor>> {
        self.models.iter()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

// ============================================================================
// Active model
// ============================================================================

/// The model currently used for conversation.
///
/// An immutable value: switching creates a new `ActiveModel` rather than
/// mutating shared state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActiveModel(Option<Arc<ModelDescriptor>>);

impl ActiveModel {
    pub fn of(model: Arc<ModelDescriptor>) -> Self {
        Self(Some(model))
    }

    pub fn none() -> Self {
        Self(None)
    }

    pub fn get(&self) -> Option<&Arc<ModelDescriptor>> {
        self.0.as_ref()
    }

    /// The descriptor, or a configuration error if nothing is active.
    pub fn require(&self) -> Result<Arc<ModelDescriptor>> {
        self.0
            .clone()
            .ok_or_else(|| ParleyError::Config("no active chat model configured".to_string()))
    }

    /// Name of the active model, or `"none"`.
    pub fn name(&self) -> &str {
        self.0.as_ref().map(|m| m.name.as_str()).unwrap_or("none")
    }
}
