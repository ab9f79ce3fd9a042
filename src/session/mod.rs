//! Session module - per-conversation context storage
//!
//! This module provides the context store for Parley:
//! - In-memory conversations with async access
//! - Read-through loading and write-through persistence of snapshots
//! - A single-flight pending set guarding concurrent invocations
//! - Bounded residency with least-recently-updated eviction
//!
//! # Example
//!
//! ```
//! use parley::session::{ContextStore, Turn};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = ContextStore::new_memory(10);
//!
//!     // Load or create a conversation, seeding new ones with a system turn
//!     let turns = store.get("qq:group1", || vec![Turn::system("be nice")]).await.unwrap();
//!     assert_eq!(turns.len(), 1);
//!
//!     store.append("qq:group1", vec![Turn::user("hi")]).await.unwrap();
//!     store.persist("qq:group1").await.unwrap();
//! }
//! ```

pub mod pending;
pub mod snapshot;
pub mod types;

pub use pending::{PendingGuard, PendingSet};
pub use snapshot::{FileSnapshotStore, MemorySnapshotStore, SnapshotStore};
pub use types::{Content, ContentPart, Conversation, ImageUrl, Role, ToolCall, Turn};

use crate::error::Result;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Keyed store of live conversations.
///
/// At most `max_active` conversations stay resident. When the cap is
/// exceeded, the least-recently-updated conversation that is not pending is
/// persisted and dropped from memory; it is reloaded from its snapshot on
/// next access.
///
/// # Thread Safety
///
/// The store uses `Arc<RwLock>` internally, so clones share state and can be
/// used across async tasks.
pub struct ContextStore {
    /// Resident conversations
    conversations: Arc<RwLock<HashMap<String, Conversation>>>,
    /// Durable backend
    snapshots: Arc<dyn SnapshotStore>,
    /// Keys with an in-flight invocation; never evicted
    pending: Arc<PendingSet>,
    /// Residency cap
    max_active: usize,
}

impl ContextStore {
    /// Create a store over the given snapshot backend.
    pub fn new(snapshots: Arc<dyn SnapshotStore>, max_active: usize) -> Self {
        Self {
            conversations: Arc::new(RwLock::new(HashMap::new())),
            snapshots,
            pending: Arc::new(PendingSet::new()),
            max_active: max_active.max(1),
        }
    }

    /// Create a store with in-process snapshots only.
    pub fn new_memory(max_active: usize) -> Self {
        Self::new(Arc::new(MemorySnapshotStore::new()), max_active)
    }

    /// Create a store persisting JSON snapshots under `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn with_path(dir: impl Into<PathBuf>, max_active: usize) -> Result<Self> {
        Ok(Self::new(
            Arc::new(FileSnapshotStore::new(dir)?),
            max_active,
        ))
    }

    /// The pending set shared with the orchestration loop.
    pub fn pending(&self) -> Arc<PendingSet> {
        Arc::clone(&self.pending)
    }

    /// Residency cap.
    pub fn max_active(&self) -> usize {
        self.max_active
    }

    /// Return the live turns for `key`.
    ///
    /// Loads from the snapshot if the conversation is not resident, or
    /// creates it from `initial()` if no snapshot exists. Bringing a
    /// conversation into memory may evict another one.
    pub async fn get<F>(&self, key: &str, initial: F) -> Result<Vec<Turn>>
    where
        F: FnOnce() -> Vec<Turn>,
    {
        {
            let conversations = self.conversations.read().await;
            if let Some(conv) = conversations.get(key) {
                return Ok(conv.turns.clone());
            }
        }

        let loaded = self.snapshots.load(key).await?;

        let mut conversations = self.conversations.write().await;
        // Another task may have loaded it while we waited for the lock.
        if let Some(conv) = conversations.get(key) {
            return Ok(conv.turns.clone());
        }

        let conv = match loaded {
            Some(mut conv) => {
                debug!(key = %key, turns = conv.len(), "Conversation loaded from snapshot");
                conv.touch();
                conv
            }
            None => {
                debug!(key = %key, "Conversation created");
                Conversation::new(key, initial())
            }
        };
        let turns = conv.turns.clone();
        conversations.insert(key.to_string(), conv);
        drop(conversations);

        if let Err(e) = self.evict(Some(key)).await {
            warn!(error = %e, "Eviction after load failed");
        }
        Ok(turns)
    }

    /// Append turns at the tail of `key`, loading it first if needed.
    ///
    /// Returns the new turn count.
    pub async fn append(&self, key: &str, turns: Vec<Turn>) -> Result<usize> {
        self.get(key, Vec::new).await?;
        let mut conversations = self.conversations.write().await;
        let conv = conversations
            .entry(key.to_string())
            .or_insert_with(|| Conversation::new(key, Vec::new()));
        conv.append(turns);
        Ok(conv.len())
    }

    /// Commit a whole turn sequence for `key`.
    ///
    /// Used to publish the working copy of a completed invocation, which may
    /// have been compacted.
    pub async fn replace(&self, key: &str, turns: Vec<Turn>) {
        let mut conversations = self.conversations.write().await;
        match conversations.get_mut(key) {
            Some(conv) => conv.replace(turns),
            None => {
                conversations.insert(key.to_string(), Conversation::new(key, turns));
            }
        }
    }

    /// Write the resident state of `key` to its durable snapshot.
    ///
    /// Does nothing if the conversation is not resident.
    pub async fn persist(&self, key: &str) -> Result<()> {
        let conv = {
            let conversations = self.conversations.read().await;
            match conversations.get(key) {
                Some(conv) => conv.clone(),
                None => return Ok(()),
            }
        };
        self.snapshots.save(&conv).await
    }

    /// Read the turns of `key` without making it resident.
    pub async fn peek(&self, key: &str) -> Result<Option<Vec<Turn>>> {
        {
            let conversations = self.conversations.read().await;
            if let Some(conv) = conversations.get(key) {
                return Ok(Some(conv.turns.clone()));
            }
        }
        Ok(self.snapshots.load(key).await?.map(|conv| conv.turns))
    }

    /// Evict least-recently-updated, non-pending conversations until at
    /// most `max_active` remain resident.
    ///
    /// Each evicted conversation is persisted before it is dropped. Returns
    /// the evicted keys.
    pub async fn evict_if_over_capacity(&self) -> Result<Vec<String>> {
        self.evict(None).await
    }

    /// Evict until the cap is met.
    ///
    /// The victim is copied out under the lock and saved without holding
    /// it, so other conversations are never blocked on snapshot I/O. It is
    /// removed only if it was neither updated nor claimed while saving.
    async fn evict(&self, protect: Option<&str>) -> Result<Vec<String>> {
        let mut evicted = Vec::new();

        loop {
            let victim = {
                let conversations = self.conversations.read().await;
                if conversations.len() <= self.max_active {
                    break;
                }
                let victim = conversations
                    .values()
                    .filter(|conv| Some(conv.key.as_str()) != protect)
                    .filter(|conv| !self.pending.contains(&conv.key))
                    .min_by(|a, b| a.updated_at.cmp(&b.updated_at).then(a.key.cmp(&b.key)))
                    .cloned();
                match victim {
                    Some(victim) => victim,
                    None => {
                        warn!(
                            resident = conversations.len(),
                            cap = self.max_active,
                            "Over capacity but every resident conversation is pending"
                        );
                        break;
                    }
                }
            };

            self.snapshots.save(&victim).await?;

            let mut conversations = self.conversations.write().await;
            let unchanged = conversations
                .get(&victim.key)
                .is_some_and(|conv| conv.updated_at == victim.updated_at);
            if unchanged && !self.pending.contains(&victim.key) {
                conversations.remove(&victim.key);
                info!(key = %victim.key, resident = conversations.len(), "Conversation evicted");
                evicted.push(victim.key);
            } else {
                debug!(key = %victim.key, "Conversation changed while saving, kept resident");
            }
        }

        Ok(evicted)
    }

    /// Number of resident conversations.
    pub async fn resident_count(&self) -> usize {
        self.conversations.read().await.len()
    }

    /// Whether `key` is resident in memory.
    pub async fn is_resident(&self, key: &str) -> bool {
        self.conversations.read().await.contains_key(key)
    }

    /// Keys with durable snapshots.
    pub async fn stored_keys(&self) -> Result<Vec<String>> {
        self.snapshots.keys().await
    }
}

impl Clone for ContextStore {
    fn clone(&self) -> Self {
        Self {
            conversations: Arc::clone(&self.conversations),
            snapshots: Arc::clone(&self.snapshots),
            pending: Arc::clone(&self.pending),
            max_active: self.max_active,
        }
    }
}
