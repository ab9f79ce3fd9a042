//! Slash commands answered directly, without a completion request.
//!
//! A message whose text starts with `/` is a command. Commands never touch
//! the stored conversation.

use crate::bus::{PlatformMessage, Segment};
use crate::providers::{Capability, ModelRegistry};

/// A parsed slash command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    /// `/model [name]`: switch the chat model, or list models without a name
    Model { name: Option<String> },
    /// `/summary [count]`: summarize recent group messages
    Summary { count: Option<u64> },
    /// `/help` or any unrecognized command
    Help,
}

/// `(usage, description)` for every command, in help order.
pub const COMMANDS: &[(&str, &str)] = &[
    ("/model <name>", "Switch the chat model"),
    ("/summary [count]", "Summarize recent group messages"),
    ("/help", "List commands"),
];

/// Parse the text segments of `message` as a slash command.
///
/// Mentions are ignored so that `@bot /model glm` works in group chats.
///
/// # Examples
///
/// ```
/// use parley::agent::commands::{parse_command, SlashCommand};
/// use parley::bus::{PlatformMessage, Sender};
///
/// let msg = PlatformMessage::text("m1", Sender::new("1", "amy"), "/model glm");
/// assert_eq!(
///     parse_command(&msg),
///     Some(SlashCommand::Model { name: Some("glm".into()) })
/// );
///
/// let msg = PlatformMessage::text("m2", Sender::new("1", "amy"), "hello /model");
/// assert_eq!(parse_command(&msg), None);
/// ```
pub fn parse_command(message: &PlatformMessage) -> Option<SlashCommand> {
    let text: String = message
        .segments
        .iter()
        .filter_map(|segment| match segment {
            Segment::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    let rest = text.trim().strip_prefix('/')?;

    let mut words = rest.split_whitespace();
    let name = words.next()?.to_lowercase();
    let command = match name.as_str() {
        "model" => SlashCommand::Model {
            name: words.next().map(str::to_string),
        },
        "summary" => SlashCommand::Summary {
            count: words.next().and_then(|w| w.parse().ok()),
        },
        _ => SlashCommand::Help,
    };
    Some(command)
}

/// The command list.
pub fn help_text() -> String {
    let mut text = String::from("Available commands:");
    for (i, (usage, description)) in COMMANDS.iter().enumerate() {
        text.push_str(&format!("\n{}. {} - {}", i + 1, usage, description));
    }
    text
}

/// Numbered chat models with their aliases, followed by the current one.
pub fn model_list(registry: &ModelRegistry, current: &str) -> String {
    let mut text = String::from("Available models:");
    let chat_models = registry.iter().filter(|m| m.supports(Capability::Chat));
    for (i, model) in chat_models.enumerate() {
        text.push_str(&format!("\n{}. {}", i + 1, model.name));
        if !model.aliases.is_empty() {
            text.push_str(&format!(" ({})", model.aliases.join(", ")));
        }
    }
    text.push_str(&format!("\nCurrent model: {}", current));
    text
}
