//! Message Bus Module
//!
//! Queues between chat platforms and the gateway loop. Platform adapters
//! publish [`InboundMessage`]s; the agent loop consumes them, spawns one
//! invocation per message and publishes [`OutboundMessage`] replies.
//!
//! ```text
//! ┌─────────────┐  inbound   ┌─────────────┐
//! │  Platform   │───────────>│  AgentLoop  │
//! │  adapter    │<───────────│             │
//! └─────────────┘  outbound  └─────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use parley::bus::{InboundMessage, MessageBus, PlatformMessage, Sender};
//!
//! #[tokio::main]
//! async fn main() {
//!     let bus = MessageBus::new();
//!
//!     let msg = PlatformMessage::text("m1", Sender::new("42", "bob"), "Hello");
//!     bus.publish_inbound(InboundMessage::new("qq", "group1", msg)).await.unwrap();
//!
//!     let received = bus.consume_inbound().await.unwrap();
//!     assert_eq!(received.conversation_key, "qq:group1");
//! }
//! ```

pub mod message;

pub use message::{
    InboundMessage, OutboundMessage, PlatformMessage, ReplyKind, Segment, Sender,
};

use crate::error::{ParleyError, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::Mutex;

/// Default buffer size for each queue.
const DEFAULT_BUFFER_SIZE: usize = 100;

/// Bounded inbound/outbound queues.
///
/// Clones share the same queues. Receivers sit behind a mutex so any clone
/// can consume.
pub struct MessageBus {
    inbound_tx: mpsc::Sender<InboundMessage>,
    inbound_rx: Arc<Mutex<mpsc::Receiver<InboundMessage>>>,
    outbound_tx: mpsc::Sender<OutboundMessage>,
    outbound_rx: Arc<Mutex<mpsc::Receiver<OutboundMessage>>>,
}

impl MessageBus {
    pub fn new() -> Self {
        Self::with_buffer_size(DEFAULT_BUFFER_SIZE)
    }

    pub fn with_buffer_size(buffer_size: usize) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(buffer_size);
        let (outbound_tx, outbound_rx) = mpsc::channel(buffer_size);

        Self {
            inbound_tx,
            inbound_rx: Arc::new(Mutex::new(inbound_rx)),
            outbound_tx,
            outbound_rx: Arc::new(Mutex::new(outbound_rx)),
        }
    }

    /// Queue a message from a platform. Waits while the buffer is full.
    pub async fn publish_inbound(&self, msg: InboundMessage) -> Result<()> {
        self.inbound_tx
            .send(msg)
            .await
            .map_err(|_| ParleyError::BusClosed)
    }

    /// Next inbound message, or `None` once every sender is gone.
    pub async fn consume_inbound(&self) -> Option<InboundMessage> {
        self.inbound_rx.lock().await.recv().await
    }

    /// Queue a reply for a platform.
    pub async fn publish_outbound(&self, msg: OutboundMessage) -> Result<()> {
        self.outbound_tx
            .send(msg)
            .await
            .map_err(|_| ParleyError::BusClosed)
    }

    /// Next outbound reply, or `None` once every sender is gone.
    pub async fn consume_outbound(&self) -> Option<OutboundMessage> {
        self.outbound_rx.lock().await.recv().await
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MessageBus {
    fn clone(&self) -> Self {
        Self {
            inbound_tx: self.inbound_tx.clone(),
            inbound_rx: Arc::clone(&self.inbound_rx),
            outbound_tx: self.outbound_tx.clone(),
            outbound_rx: Arc::clone(&self.outbound_rx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inbound(text: &str) -> InboundMessage {
        let msg = PlatformMessage::text("m1", Sender::new("42", "bob"), text);
        InboundMessage::new("qq", "group1", msg)
    }

    #[tokio::test]
    async fn test_bus_inbound_flow() {
        let bus = MessageBus::new();
        bus.publish_inbound(inbound("Hello")).await.unwrap();

        let received = bus.consume_inbound().await.unwrap();
        assert_eq!(received.channel, "qq");
        assert_eq!(received.message.sender.nickname, "bob");
    }

    #[tokio::test]
    async fn test_bus_outbound_flow() {
        let bus = MessageBus::new();
        bus.publish_outbound(OutboundMessage::new("qq", "group1", "Hi", ReplyKind::Text))
            .await
            .unwrap();

        let received = bus.consume_outbound().await.unwrap();
        assert_eq!(received.content, "Hi");
        assert_eq!(received.kind, ReplyKind::Text);
    }

    #[tokio::test]
    async fn test_bus_preserves_order() {
        let bus = MessageBus::new();
        for text in ["one", "two", "three"] {
            bus.publish_inbound(inbound(text)).await.unwrap();
        }
        for expected in ["one", "two", "three"] {
            let received = bus.consume_inbound().await.unwrap();
            assert_eq!(
                received.message.segments,
                vec![Segment::Text {
                    text: expected.into()
                }]
            );
        }
    }

    #[tokio::test]
    async fn test_clone_shares_queues() {
        let bus1 = MessageBus::new();
        let bus2 = bus1.clone();
        bus1.publish_inbound(inbound("shared")).await.unwrap();
        assert!(bus2.consume_inbound().await.is_some());
    }
}
