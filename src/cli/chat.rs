//! One-shot chat command handler.

use anyhow::Result;

use parley::bus::{InboundMessage, PlatformMessage, ReplyKind, Sender};
use parley::config::Config;

use super::common::create_agent;

/// Run `text` through the gateway as one inbound message and print the reply.
pub(crate) async fn cmd_chat(
    config: Config,
    conversation: &str,
    sender: &str,
    text: &str,
) -> Result<()> {
    let agent = create_agent(config).await?;

    let (channel, chat_id) = conversation.split_once(':').unwrap_or(("cli", conversation));
    let message_id = uuid::Uuid::new_v4().to_string();
    let msg = PlatformMessage::text(&message_id, Sender::new(sender, sender), text);
    let inbound = InboundMessage::new(channel, chat_id, msg);

    let outbound = agent.handle_inbound(&inbound).await;
    match outbound.kind {
        ReplyKind::Error => anyhow::bail!("{}", outbound.content),
        _ => println!("{}", outbound.content),
    }
    Ok(())
}
