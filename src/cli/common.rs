//! Shared CLI helpers used across multiple command handlers.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use parley::agent::AgentLoop;
use parley::bus::MessageBus;
use parley::config::Config;
use parley::normalize::{NoMessageSource, Normalizer, VisionModelDescriber, VisionService};
use parley::providers::{Capability, LLMProvider, ModelRegistry, OpenAIProvider};
use parley::session::ContextStore;

/// File-backed conversation store at the configured location.
pub(crate) fn open_store(config: &Config) -> Result<ContextStore> {
    let dir = config.storage_dir();
    ContextStore::with_path(dir.clone(), config.agent.max_active_groups)
        .with_context(|| format!("Failed to open conversation store at {}", dir.display()))
}

/// Assemble a fully wired agent from configuration.
pub(crate) async fn create_agent(config: Config) -> Result<Arc<AgentLoop>> {
    let registry = Arc::new(ModelRegistry::from_config(&config));
    if registry.is_empty() {
        warn!("No models configured; set a provider API key or add models to the config");
    }

    let timeout = Duration::from_secs(config.agent.request_timeout_secs);
    let provider: Arc<dyn LLMProvider> = Arc::new(OpenAIProvider::new(timeout)?);

    let vision: Option<Arc<dyn VisionService>> = registry
        .select(Capability::VisionUnderstanding)
        .map(|model| {
            info!(model = %model.name, "Image understanding model");
            let client = reqwest::Client::builder().timeout(timeout).build()?;
            Ok::<_, reqwest::Error>(Arc::new(VisionModelDescriber::new(
                Arc::clone(&provider),
                model,
                client,
                &config.prompts.vision,
            )) as Arc<dyn VisionService>)
        })
        .transpose()?;
    let normalizer = Arc::new(Normalizer::new(Arc::new(NoMessageSource), vision));

    let store = open_store(&config)?;
    let agent = AgentLoop::new(
        config,
        store,
        registry,
        provider,
        normalizer,
        Arc::new(MessageBus::new()),
    );
    agent.register_builtin_tools().await;
    Ok(Arc::new(agent))
}
