//! Checkpoint persistence for resumable runs
//!
//! A single versioned slot holds the latest pagination snapshot. Saves
//! overwrite the slot and fail soft; loads treat stale (>24 h) or
//! version-mismatched records as absent, clearing them as a side effect.
//! The checkpoint is pagination-resume-specific and distinct from the
//! incrementally persisted collected-image list.

use crate::config::Settings;
use crate::pagination::types::{ImageRecord, PaginationMethod, PaginationState};
use crate::storage::{SlotStore, slots};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Current checkpoint schema version; a mismatch invalidates the slot
pub const CHECKPOINT_VERSION: u32 = 1;

/// A checkpoint older than this is treated as absent
pub const CHECKPOINT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Pagination progress captured in a checkpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointData {
    pub current_page: u32,
    pub collected_images: Vec<ImageRecord>,
    pub method: PaginationMethod,
    pub settings: Settings,
    pub total_pages: u32,
    pub state: PaginationState,
}

/// Durable snapshot of a pagination run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Milliseconds since the Unix epoch at save time
    pub timestamp: i64,
    pub version: u32,
    pub data: CheckpointData,
}

impl Checkpoint {
    #[must_use]
    pub fn new(data: CheckpointData) -> Self {
        Self {
            timestamp: chrono::Utc::now().timestamp_millis(),
            version: CHECKPOINT_VERSION,
            data,
        }
    }

    /// Age relative to now; zero for timestamps in the future
    #[must_use]
    pub fn age(&self) -> Duration {
        let elapsed_ms = chrono::Utc::now().timestamp_millis() - self.timestamp;
        Duration::from_millis(elapsed_ms.max(0) as u64)
    }

    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.age() > CHECKPOINT_TTL
    }
}

/// Manages the single checkpoint slot
pub struct CheckpointManager {
    store: Arc<dyn SlotStore>,
    interval: u32,
}

impl CheckpointManager {
    /// # Arguments
    /// * `store` - slot persistence backend
    /// * `interval` - checkpoint every N pages (minimum 1)
    #[must_use]
    pub fn new(store: Arc<dyn SlotStore>, interval: u32) -> Self {
        Self {
            store,
            interval: interval.max(1),
        }
    }

    /// True when `page` is a checkpoint multiple
    #[must_use]
    pub fn should_checkpoint(&self, page: u32) -> bool {
        page > 0 && page % self.interval == 0
    }

    /// Persist a snapshot, overwriting any prior one
    ///
    /// Fails soft: persistence trouble is logged and reported as `false`
    /// rather than aborting the run.
    pub async fn save_checkpoint(&self, data: CheckpointData) -> bool {
        let checkpoint = Checkpoint::new(data);
        let raw = match serde_json::to_string(&checkpoint) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Failed to serialize checkpoint: {e}");
                return false;
            }
        };
        match self.store.write(slots::CHECKPOINT, &raw).await {
            Ok(()) => {
                debug!(
                    "Checkpoint saved at page {} ({} images)",
                    checkpoint.data.current_page,
                    checkpoint.data.collected_images.len()
                );
                true
            }
            Err(e) => {
                warn!("Failed to persist checkpoint: {e}");
                false
            }
        }
    }

    /// Load the checkpoint, returning `None` when it is absent, stale, or
    /// carries a different schema version. Invalid records are cleared as
    /// a side effect so later loads do not re-examine them.
    pub async fn load_checkpoint(&self) -> Option<Checkpoint> {
        let raw = match self.store.read(slots::CHECKPOINT).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                // Fail open: a broken store means a fresh run, not an abort.
                warn!("Failed to read checkpoint slot: {e}");
                return None;
            }
        };

        let checkpoint: Checkpoint = match serde_json::from_str(&raw) {
            Ok(cp) => cp,
            Err(e) => {
                warn!("Checkpoint record is malformed, clearing: {e}");
                self.clear_checkpoint().await;
                return None;
            }
        };

        if checkpoint.version != CHECKPOINT_VERSION {
            info!(
                "Checkpoint schema version {} does not match current {}, clearing",
                checkpoint.version, CHECKPOINT_VERSION
            );
            self.clear_checkpoint().await;
            return None;
        }

        if checkpoint.is_stale() {
            info!(
                "Checkpoint is {}s old, past the {}s TTL, clearing",
                checkpoint.age().as_secs(),
                CHECKPOINT_TTL.as_secs()
            );
            self.clear_checkpoint().await;
            return None;
        }

        Some(checkpoint)
    }

    /// Remove the checkpoint slot; errors are logged, not surfaced
    pub async fn clear_checkpoint(&self) {
        if let Err(e) = self.store.clear(slots::CHECKPOINT).await {
            warn!("Failed to clear checkpoint slot: {e}");
        }
    }

    /// Whether a record occupies the slot (without validating it)
    pub async fn has_checkpoint(&self) -> bool {
        matches!(self.store.read(slots::CHECKPOINT).await, Ok(Some(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemorySlotStore;

    fn sample_data(page: u32) -> CheckpointData {
        CheckpointData {
            current_page: page,
            collected_images: Vec::new(),
            method: PaginationMethod::NextButton,
            settings: Settings::default(),
            total_pages: 50,
            state: PaginationState::Running,
        }
    }

    fn manager() -> CheckpointManager {
        CheckpointManager::new(Arc::new(MemorySlotStore::new()), 5)
    }

    #[test]
    fn checkpoint_interval_multiples() {
        let mgr = manager();
        assert!(!mgr.should_checkpoint(0));
        assert!(!mgr.should_checkpoint(4));
        assert!(mgr.should_checkpoint(5));
        assert!(mgr.should_checkpoint(10));
    }

    #[tokio::test]
    async fn save_load_round_trip() {
        let mgr = manager();
        assert!(mgr.save_checkpoint(sample_data(7)).await);
        let loaded = mgr.load_checkpoint().await.expect("checkpoint present");
        assert_eq!(loaded.data.current_page, 7);
        assert_eq!(loaded.version, CHECKPOINT_VERSION);
    }

    #[tokio::test]
    async fn stale_checkpoint_is_cleared_and_absent() {
        let store = Arc::new(MemorySlotStore::new());
        let mgr = CheckpointManager::new(Arc::clone(&store) as Arc<dyn SlotStore>, 5);

        let mut checkpoint = Checkpoint::new(sample_data(3));
        checkpoint.timestamp = chrono::Utc::now().timestamp_millis() - 25 * 60 * 60 * 1000;
        store
            .write(slots::CHECKPOINT, &serde_json::to_string(&checkpoint).unwrap())
            .await
            .unwrap();

        assert!(mgr.load_checkpoint().await.is_none());
        // Auto-cleared: the slot is now empty
        assert!(!mgr.has_checkpoint().await);
    }

    #[tokio::test]
    async fn fresh_checkpoint_survives_ttl_check() {
        let store = Arc::new(MemorySlotStore::new());
        let mgr = CheckpointManager::new(Arc::clone(&store) as Arc<dyn SlotStore>, 5);

        let mut checkpoint = Checkpoint::new(sample_data(3));
        checkpoint.timestamp = chrono::Utc::now().timestamp_millis() - 60 * 60 * 1000;
        store
            .write(slots::CHECKPOINT, &serde_json::to_string(&checkpoint).unwrap())
            .await
            .unwrap();

        assert!(mgr.load_checkpoint().await.is_some());
    }

    #[tokio::test]
    async fn version_mismatch_invalidates() {
        let store = Arc::new(MemorySlotStore::new());
        let mgr = CheckpointManager::new(Arc::clone(&store) as Arc<dyn SlotStore>, 5);

        let mut checkpoint = Checkpoint::new(sample_data(3));
        checkpoint.version = CHECKPOINT_VERSION + 1;
        store
            .write(slots::CHECKPOINT, &serde_json::to_string(&checkpoint).unwrap())
            .await
            .unwrap();

        assert!(mgr.load_checkpoint().await.is_none());
        assert!(!mgr.has_checkpoint().await);
    }

    #[tokio::test]
    async fn clear_then_absent() {
        let mgr = manager();
        mgr.save_checkpoint(sample_data(5)).await;
        assert!(mgr.has_checkpoint().await);
        mgr.clear_checkpoint().await;
        assert!(!mgr.has_checkpoint().await);
        assert!(mgr.load_checkpoint().await.is_none());
    }
}
