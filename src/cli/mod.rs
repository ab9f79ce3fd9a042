//! CLI module: command parsing and dispatch
//!
//! All CLI logic lives here. `main.rs` calls `cli::run()`.

pub mod chat;
pub mod common;
pub mod config;
pub mod history;
pub mod models;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "parley")]
#[command(version)]
#[command(about = "Conversational agent gateway", long_about = None)]
struct Cli {
    /// Config file (defaults to ~/.parley/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one message through the gateway and print the reply
    Chat {
        /// Conversation key
        #[arg(long, default_value = "cli:local")]
        conversation: String,
        /// Sender nickname
        #[arg(long, default_value = "user")]
        sender: String,
        /// Message text
        #[arg(required = true)]
        text: Vec<String>,
    },
    /// Print the stored turns of a conversation
    History {
        /// Conversation key
        key: String,
    },
    /// List registered models and their capabilities
    Models,
    /// Load and validate the configuration
    Check,
}

/// Entry point for the CLI, called from main().
pub async fn run() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(parley::config::Config::path);

    if let Commands::Check = cli.command {
        return config::cmd_check(&config_path);
    }

    let config = parley::config::Config::load_from_path(&config_path)?;
    parley::utils::logging::init_logging(&config.logging)?;
    for warning in config.validate()? {
        tracing::warn!("{}", warning);
    }

    match cli.command {
        Commands::Chat {
            conversation,
            sender,
            text,
        } => chat::cmd_chat(config, &conversation, &sender, &text.join(" ")).await,
        Commands::History { key } => history::cmd_history(&config, &key).await,
        Commands::Models => models::cmd_models(&config),
        Commands::Check => Ok(()),
    }
}
