//! Platform message-history lookups used by the normalizer and tools.

use crate::bus::PlatformMessage;
use crate::error::{ParleyError, Result};
use async_trait::async_trait;

/// Access to platform-side message history.
///
/// Implemented by platform adapters. All lookups may fail; callers degrade
/// instead of aborting.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Messages bundled in a forward, in order.
    async fn forwarded(&self, forward_id: &str) -> Result<Vec<PlatformMessage>>;

    /// A single message by id (target of a reply).
    async fn message(&self, message_id: &str) -> Result<PlatformMessage>;

    /// The last `count` messages of a conversation, oldest first.
    async fn recent(&self, conversation_key: &str, count: usize) -> Result<Vec<PlatformMessage>>;
}

/// A source with no history: every lookup fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMessageSource;

#[async_trait]
impl MessageSource for NoMessageSource {
    async fn forwarded(&self, forward_id: &str) -> Result<Vec<PlatformMessage>> {
        Err(ParleyError::Source(format!(
            "forward {} unavailable: no message history",
            forward_id
        )))
    }

    async fn message(&self, message_id: &str) -> Result<PlatformMessage> {
        Err(ParleyError::Source(format!(
            "message {} unavailable: no message history",
            message_id
        )))
    }

    async fn recent(&self, conversation_key: &str, _count: usize) -> Result<Vec<PlatformMessage>> {
        Err(ParleyError::Source(format!(
            "history of {} unavailable: no message history",
            conversation_key
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_no_source_always_fails() {
        let source = NoMessageSource;
        assert!(source.forwarded("f").await.is_err());
        assert!(source.message("m").await.is_err());
        let err = source.recent("qq:1", 10).await.unwrap_err();
        assert!(matches!(err, ParleyError::Source(_)));
    }
}
