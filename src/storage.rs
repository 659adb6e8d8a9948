//! Single-slot persistence used by the checkpoint manager and the state
//! manager
//!
//! The host environment owns the real storage area (browser extension
//! storage in production); the core only needs named string slots with
//! read/write/clear. Two implementations ship with the crate: an
//! in-memory store for tests and transient sessions, and a file-backed
//! store mapping each slot to one JSON file.

use async_trait::async_trait;
use dashmap::DashMap;
use std::path::PathBuf;

/// Well-known slot names
pub mod slots {
    /// Pagination-resume checkpoint (single slot, overwritten)
    pub const CHECKPOINT: &str = "checkpoint";
    /// Persisted settings record, merged over defaults on load
    pub const SETTINGS: &str = "settings";
    /// Incrementally persisted collected-image list for crash recovery
    /// of observer views (distinct from the checkpoint)
    pub const COLLECTED_IMAGES: &str = "collected_images";
}

/// Errors from slot persistence
///
/// Callers treat these as fail-open: a failed read or write is logged
/// and handled as "no data" rather than aborting a run.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("slot name '{0}' is not a valid identifier")]
    InvalidSlot(String),
}

/// Named single-value string slots
#[async_trait]
pub trait SlotStore: Send + Sync {
    /// Read a slot; `None` when the slot has never been written or was
    /// cleared
    async fn read(&self, slot: &str) -> Result<Option<String>, StorageError>;

    /// Write a slot, overwriting any prior value
    async fn write(&self, slot: &str, value: &str) -> Result<(), StorageError>;

    /// Remove a slot; clearing an absent slot is not an error
    async fn clear(&self, slot: &str) -> Result<(), StorageError>;
}

/// In-memory store for tests and transient sessions
#[derive(Debug, Default)]
pub struct MemorySlotStore {
    slots: DashMap<String, String>,
}

impl MemorySlotStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SlotStore for MemorySlotStore {
    async fn read(&self, slot: &str) -> Result<Option<String>, StorageError> {
        Ok(self.slots.get(slot).map(|v| v.value().clone()))
    }

    async fn write(&self, slot: &str, value: &str) -> Result<(), StorageError> {
        self.slots.insert(slot.to_string(), value.to_string());
        Ok(())
    }

    async fn clear(&self, slot: &str) -> Result<(), StorageError> {
        self.slots.remove(slot);
        Ok(())
    }
}

/// File-backed store: each slot is one `<slot>.json` file in a directory
#[derive(Debug, Clone)]
pub struct FileSlotStore {
    dir: PathBuf,
}

impl FileSlotStore {
    #[must_use]
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn slot_path(&self, slot: &str) -> Result<PathBuf, StorageError> {
        // Slot names come from the `slots` module, but guard against a
        // caller smuggling path separators into a file name.
        if slot.is_empty()
            || !slot
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(StorageError::InvalidSlot(slot.to_string()));
        }
        Ok(self.dir.join(format!("{slot}.json")))
    }
}

#[async_trait]
impl SlotStore for FileSlotStore {
    async fn read(&self, slot: &str) -> Result<Option<String>, StorageError> {
        let path = self.slot_path(slot)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, slot: &str, value: &str) -> Result<(), StorageError> {
        let path = self.slot_path(slot)?;
        tokio::fs::create_dir_all(&self.dir).await?;
        // Write-then-rename keeps the slot readable if the process dies
        // mid-write.
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, value).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn clear(&self, slot: &str) -> Result<(), StorageError> {
        let path = self.slot_path(slot)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_round_trip() {
        let store = MemorySlotStore::new();
        assert!(store.read("checkpoint").await.unwrap().is_none());
        store.write("checkpoint", "{}").await.unwrap();
        assert_eq!(store.read("checkpoint").await.unwrap().unwrap(), "{}");
        store.clear("checkpoint").await.unwrap();
        assert!(store.read("checkpoint").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_store_rejects_bad_slot_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSlotStore::new(dir.path().to_path_buf());
        assert!(matches!(
            store.read("../etc/passwd").await,
            Err(StorageError::InvalidSlot(_))
        ));
    }
}
