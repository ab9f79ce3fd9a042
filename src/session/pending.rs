//! Per-conversation single-flight guard.
//!
//! A conversation key is "pending" while an orchestration invocation owns it.
//! A second invocation for the same key is rejected, never queued.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// Set of conversation keys with an in-flight invocation.
#[derive(Debug, Default)]
pub struct PendingSet {
    keys: Mutex<HashSet<String>>,
}

impl PendingSet {
    /// Create an empty pending set.
    pub fn new() -> Self {
        Self::default()
    }

    // Insert/remove cannot leave the set half-updated, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.keys.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claim `key` for the caller.
    ///
    /// Returns `None` if the key is already pending. The key is released
    /// when the returned guard is dropped, on every exit path.
    ///
    /// # Example
    /// ```
    /// use std::sync::Arc;
    /// use parley::session::PendingSet;
    ///
    /// let pending = Arc::new(PendingSet::new());
    /// let guard = pending.try_acquire("qq:1").unwrap();
    /// assert!(pending.try_acquire("qq:1").is_none());
    /// drop(guard);
    /// assert!(pending.try_acquire("qq:1").is_some());
    /// ```
    pub fn try_acquire(self: &Arc<Self>, key: &str) -> Option<PendingGuard> {
        if !self.lock().insert(key.to_string()) {
            return None;
        }
        Some(PendingGuard {
            set: Arc::clone(self),
            key: key.to_string(),
        })
    }

    /// Whether `key` currently has an in-flight invocation.
    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains(key)
    }

    /// Number of pending keys.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Releases its conversation key from the [`PendingSet`] on drop.
#[derive(Debug)]
pub struct PendingGuard {
    set: Arc<PendingSet>,
    key: String,
}

impl PendingGuard {
    /// The claimed conversation key.
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.set.lock().remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_and_release() {
        let pending = Arc::new(PendingSet::new());
        let guard = pending.try_acquire("a").unwrap();
        assert_eq!(guard.key(), "a");
        assert!(pending.contains("a"));
        assert!(pending.try_acquire("a").is_none());

        drop(guard);
        assert!(!pending.contains("a"));
        assert!(pending.is_empty());
    }

    #[test]
    fn test_keys_are_independent() {
        let pending = Arc::new(PendingSet::new());
        let _a = pending.try_acquire("a").unwrap();
        let _b = pending.try_acquire("b").unwrap();
        assert_eq!(pending.len(), 2);
    }

    #[tokio::test]
    async fn test_released_when_task_fails() {
        let pending = Arc::new(PendingSet::new());
        let p = Arc::clone(&pending);
        let result = tokio::spawn(async move {
            let _guard = p.try_acquire("a").unwrap();
            Err::<(), &str>("boom")
        })
        .await
        .unwrap();

        assert!(result.is_err());
        assert!(!pending.contains("a"));
    }
}
