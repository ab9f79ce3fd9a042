//! Config check command handler.

use std::path::Path;

use anyhow::{Context, Result};

use parley::config::validate::{validate_raw, validate_values, DiagnosticLevel};
use parley::config::Config;

/// Validate the configuration file at `path`.
pub(crate) fn cmd_check(path: &Path) -> Result<()> {
    println!("Config file: {}", path.display());

    let mut diagnostics = Vec::new();
    if path.exists() {
        let content = std::fs::read_to_string(path).context("Failed to read config file")?;
        let raw: serde_json::Value = match serde_json::from_str(&content) {
            Ok(v) => v,
            Err(e) => {
                println!("[ERROR] Invalid JSON: {}", e);
                anyhow::bail!("configuration is invalid");
            }
        };
        diagnostics.extend(validate_raw(&raw));
    } else {
        println!("[OK] No config file found (using defaults)");
    }

    let config = Config::load_from_path(path)?;
    diagnostics.extend(validate_values(&config));
    for diag in &diagnostics {
        println!("{}", diag);
    }

    let errors = diagnostics
        .iter()
        .filter(|d| d.level == DiagnosticLevel::Error)
        .count();
    if errors > 0 {
        anyhow::bail!("{} configuration error(s)", errors);
    }
    println!("Configuration OK");
    Ok(())
}
