//! Durable conversation snapshots.
//!
//! The context store keeps live conversations in memory and writes them
//! through a [`SnapshotStore`] when they change or are evicted. The file
//! implementation writes one pretty-printed JSON document per conversation.

use super::Conversation;
use crate::error::{ParleyError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;

/// Backend for durable per-conversation snapshots.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Load the snapshot for `key`, or `None` if none was ever saved.
    async fn load(&self, key: &str) -> Result<Option<Conversation>>;

    /// Save (overwrite) the snapshot of `conversation`.
    async fn save(&self, conversation: &Conversation) -> Result<()>;

    /// Keys of all saved snapshots.
    async fn keys(&self) -> Result<Vec<String>>;
}

// ============================================================================
// File-backed snapshots
// ============================================================================

/// Snapshots stored as `<dir>/<sanitized key>.json`.
pub struct FileSnapshotStore {
    dir: PathBuf,
}

impl FileSnapshotStore {
    /// Use `dir` for snapshots, creating it if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Snapshot directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_key(key)))
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn load(&self, key: &str) -> Result<Option<Conversation>> {
        let path = self.file_path(key);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let conversation: Conversation = serde_json::from_str(&content).map_err(|e| {
            ParleyError::Session(format!("corrupt snapshot {}: {}", path.display(), e))
        })?;
        Ok(Some(conversation))
    }

    async fn save(&self, conversation: &Conversation) -> Result<()> {
        let path = self.file_path(&conversation.key);
        let tmp = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(conversation)?;

        // Rename over the old file so a crash never leaves a truncated snapshot.
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!(key = %conversation.key, turns = conversation.len(), "Snapshot written");
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    keys.push(unsanitize_key(stem));
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// Percent-encode characters that are problematic in file names.
///
/// The mapping is reversible with [`unsanitize_key`].
pub fn sanitize_key(key: &str) -> String {
    let mut result = String::with_capacity(key.len() * 3);
    for c in key.chars() {
        match c {
            '/' => result.push_str("%2F"),
            '\\' => result.push_str("%5C"),
            ':' => result.push_str("%3A"),
            '*' => result.push_str("%2A"),
            '?' => result.push_str("%3F"),
            '"' => result.push_str("%22"),
            '<' => result.push_str("%3C"),
            '>' => result.push_str("%3E"),
            '|' => result.push_str("%7C"),
            '.' => result.push_str("%2E"),
            '%' => result.push_str("%25"),
            c => result.push(c),
        }
    }
    result
}

/// Reverse [`sanitize_key`].
pub fn unsanitize_key(sanitized: &str) -> String {
    let mut result = String::with_capacity(sanitized.len());
    let mut chars = sanitized.chars();

    while let Some(c) = chars.next() {
        if c != '%' {
            result.push(c);
            continue;
        }
        let hex: String = chars.by_ref().take(2).collect();
        match u8::from_str_radix(&hex, 16) {
            Ok(byte) if hex.len() == 2 => result.push(byte as char),
            _ => {
                result.push('%');
                result.push_str(&hex);
            }
        }
    }
    result
}

// ============================================================================
// In-memory snapshots
// ============================================================================

/// Snapshot store that lives only as long as the process. Used in tests and
/// one-shot runs.
#[derive(Default)]
pub struct MemorySnapshotStore {
    snapshots: RwLock<HashMap<String, Conversation>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn load(&self, key: &str) -> Result<Option<Conversation>> {
        Ok(self.snapshots.read().await.get(key).cloned())
    }

    async fn save(&self, conversation: &Conversation) -> Result<()> {
        self.snapshots
            .write()
            .await
            .insert(conversation.key.clone(), conversation.clone());
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self.snapshots.read().await.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}
