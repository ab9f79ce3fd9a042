//! Conversation history command handler.

use anyhow::Result;

use parley::config::Config;
use parley::utils::string::turn_preview;

use super::common::open_store;

const PREVIEW_CHARS: usize = 200;

/// Print the stored turns of conversation `key`.
pub(crate) async fn cmd_history(config: &Config, key: &str) -> Result<()> {
    let store = open_store(config)?;
    let Some(turns) = store.peek(key).await? else {
        println!("No conversation stored for '{}'.", key);
        let keys = store.stored_keys().await?;
        if !keys.is_empty() {
            println!();
            println!("Stored conversations:");
            for key in keys {
                println!("  {}", key);
            }
        }
        return Ok(());
    };

    println!("Conversation {} ({} turns)", key, turns.len());
    println!();
    for (i, turn) in turns.iter().enumerate() {
        println!("{:>4} {:<9} {}", i, turn.role, turn_preview(turn, PREVIEW_CHARS));
    }
    Ok(())
}
