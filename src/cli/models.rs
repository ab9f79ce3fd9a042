//! Model listing command handler.

use anyhow::Result;

use parley::config::Config;
use parley::providers::ModelRegistry;

/// List registered models, marking the one active at startup.
pub(crate) fn cmd_models(config: &Config) -> Result<()> {
    let registry = ModelRegistry::from_config(config);
    if registry.is_empty() {
        println!("No models configured.");
        println!();
        println!("Set GLM_API_KEY, DEEPSEEK_API_KEY or GEMINI_API_KEY, or add models to the config.");
        return Ok(());
    }

    let active = registry.initial_active(config.agent.default_model.as_deref());
    for model in registry.iter() {
        let marker = if model.name == active.name() { "*" } else { " " };
        let capabilities: Vec<String> = model.capabilities.iter().map(|c| c.to_string()).collect();
        println!(
            "{} {:<12} {:<24} {:>8}  {}",
            marker,
            model.name,
            model.model,
            model.context_window,
            capabilities.join(", ")
        );
    }
    Ok(())
}
