//! Shared run state owned by the coordinator
//!
//! One authoritative copy of the collected images, settings, current tab
//! and pagination status lives here. All mutation goes through named
//! locks with a bounded acquisition timeout. The locks are cooperative:
//! they order mutators because every mutator in this codebase honors
//! them. Readers get the latest committed snapshot without contending.

use crate::config::Settings;
use crate::coordination::errors::CoordinationError;
use crate::pagination::types::{ImageRecord, PaginationMethod, PaginationState};
use crate::storage::{SlotStore, slots};
use dashmap::DashMap;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

/// Default named-lock acquisition deadline
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(5000);

/// Well-known lock names
pub mod lock_names {
    pub const IMAGES: &str = "images";
    pub const SETTINGS: &str = "settings";
    pub const TAB: &str = "tab";
}

/// Result of offering an image batch to the shared collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestOutcome {
    /// Records appended (previously unseen `file_url`s)
    pub added: usize,
    /// Records dropped as already present
    pub duplicates: usize,
    /// Collection size after the ingest
    pub total: usize,
}

/// Latest pagination status committed by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatus {
    pub state: PaginationState,
    pub method: PaginationMethod,
    pub current_page: u32,
    pub images_collected: usize,
}

/// Ordered image collection with a URL index for O(1) dedup
#[derive(Debug, Default)]
struct ImageSet {
    records: Vec<ImageRecord>,
    seen_urls: HashSet<String>,
}

/// Coordinator-owned shared state
pub struct StateManager {
    locks: DashMap<String, Arc<Mutex<()>>>,
    lock_timeout: Duration,
    images: RwLock<ImageSet>,
    settings: RwLock<Settings>,
    current_tab: RwLock<Option<u32>>,
    status: RwLock<Option<RunStatus>>,
    /// Optional persistence for settings and the incremental image list
    store: Option<Arc<dyn SlotStore>>,
}

impl StateManager {
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        Self {
            locks: DashMap::new(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            images: RwLock::new(ImageSet::default()),
            settings: RwLock::new(settings),
            current_tab: RwLock::new(None),
            status: RwLock::new(None),
            store: None,
        }
    }

    /// Attach a persistence backend for the settings record and the
    /// incrementally saved collected-image list
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn SlotStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Override the lock-acquisition deadline (tests shrink it)
    #[must_use]
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Run `op` while holding the named lock
    ///
    /// Acquisition is bounded by the configured timeout and fails with
    /// [`CoordinationError::LockTimeout`] instead of waiting forever. The
    /// guard is RAII: it is released on every exit path, including when
    /// `op`'s future panics or is dropped mid-flight.
    pub async fn with_lock<T, F>(&self, name: &str, op: F) -> Result<T, CoordinationError>
    where
        F: Future<Output = T>,
    {
        let mutex = self
            .locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let guard = tokio::time::timeout(self.lock_timeout, mutex.lock())
            .await
            .map_err(|_| CoordinationError::LockTimeout {
                name: name.to_string(),
                timeout_ms: self.lock_timeout.as_millis() as u64,
            })?;

        let out = op.await;
        drop(guard);
        Ok(out)
    }

    /// Offer a batch to the shared collection, deduplicating by
    /// `file_url` against everything already present. Insertion order of
    /// survivors is preserved for export ordering.
    pub async fn ingest_images(
        &self,
        batch: Vec<ImageRecord>,
    ) -> Result<IngestOutcome, CoordinationError> {
        self.ingest_images_returning_new(batch)
            .await
            .map(|(outcome, _)| outcome)
    }

    /// Like [`Self::ingest_images`], additionally returning the records
    /// that survived dedup (for download enqueueing)
    pub async fn ingest_images_returning_new(
        &self,
        batch: Vec<ImageRecord>,
    ) -> Result<(IngestOutcome, Vec<ImageRecord>), CoordinationError> {
        let (outcome, fresh) = self
            .with_lock(lock_names::IMAGES, async {
                let mut set = self.images.write().await;
                let offered = batch.len();
                let mut fresh = Vec::new();
                for record in batch {
                    if set.seen_urls.insert(record.file_url.clone()) {
                        set.records.push(record.clone());
                        fresh.push(record);
                    }
                }
                let outcome = IngestOutcome {
                    added: fresh.len(),
                    duplicates: offered - fresh.len(),
                    total: set.records.len(),
                };
                if !fresh.is_empty() {
                    self.persist_images(&set.records).await;
                }
                (outcome, fresh)
            })
            .await?;

        debug!(
            "Ingested image batch: {} added, {} duplicates, {} total",
            outcome.added, outcome.duplicates, outcome.total
        );
        Ok((outcome, fresh))
    }

    /// Snapshot of the collected images in insertion order
    pub async fn collected_images(&self) -> Vec<ImageRecord> {
        self.images.read().await.records.clone()
    }

    pub async fn image_count(&self) -> usize {
        self.images.read().await.records.len()
    }

    /// Drop the shared collection (fresh run or explicit reset) and its
    /// persisted copy
    pub async fn clear_images(&self) -> Result<(), CoordinationError> {
        self.with_lock(lock_names::IMAGES, async {
            let mut set = self.images.write().await;
            set.records.clear();
            set.seen_urls.clear();
            if let Some(store) = &self.store
                && let Err(e) = store.clear(slots::COLLECTED_IMAGES).await
            {
                warn!("Failed to clear persisted image list: {e}");
            }
        })
        .await
    }

    /// Current settings snapshot
    pub async fn settings(&self) -> Settings {
        self.settings.read().await.clone()
    }

    /// Replace the settings record and persist it
    pub async fn update_settings(&self, settings: Settings) -> Result<(), CoordinationError> {
        self.with_lock(lock_names::SETTINGS, async {
            *self.settings.write().await = settings.clone();
            if let Some(store) = &self.store {
                match serde_json::to_string(&settings) {
                    Ok(raw) => {
                        if let Err(e) = store.write(slots::SETTINGS, &raw).await {
                            warn!("Failed to persist settings: {e}");
                        }
                    }
                    Err(e) => warn!("Failed to serialize settings: {e}"),
                }
            }
        })
        .await
    }

    /// Restore settings and the collected-image list from the store
    ///
    /// Missing or malformed records fail open: settings fall back to the
    /// documented defaults, the image list starts empty.
    pub async fn load_persisted(&self) -> Result<(), CoordinationError> {
        let Some(store) = self.store.clone() else {
            return Ok(());
        };

        if let Ok(Some(raw)) = store.read(slots::SETTINGS).await {
            let merged = Settings::merged_from_json(&raw);
            self.with_lock(lock_names::SETTINGS, async {
                *self.settings.write().await = merged;
            })
            .await?;
        }

        if let Ok(Some(raw)) = store.read(slots::COLLECTED_IMAGES).await {
            match serde_json::from_str::<Vec<ImageRecord>>(&raw) {
                Ok(records) => {
                    let restored = records.len();
                    self.ingest_images(records).await?;
                    debug!("Restored {restored} persisted image records");
                }
                Err(e) => warn!("Persisted image list is malformed, ignoring: {e}"),
            }
        }
        Ok(())
    }

    pub async fn set_current_tab(&self, tab: Option<u32>) -> Result<(), CoordinationError> {
        self.with_lock(lock_names::TAB, async {
            *self.current_tab.write().await = tab;
        })
        .await
    }

    pub async fn current_tab(&self) -> Option<u32> {
        *self.current_tab.read().await
    }

    /// Commit the latest pagination status (readers poll this without
    /// taking a lock)
    pub async fn set_status(&self, status: RunStatus) {
        *self.status.write().await = Some(status);
    }

    pub async fn status(&self) -> Option<RunStatus> {
        *self.status.read().await
    }

    /// Fail-soft incremental persistence of the image list; called with
    /// the images lock held
    async fn persist_images(&self, records: &[ImageRecord]) {
        let Some(store) = &self.store else {
            return;
        };
        match serde_json::to_string(records) {
            Ok(raw) => {
                if let Err(e) = store.write(slots::COLLECTED_IMAGES, &raw).await {
                    warn!("Failed to persist collected images: {e}");
                }
            }
            Err(e) => warn!("Failed to serialize collected images: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(url: &str) -> ImageRecord {
        ImageRecord::new(url.to_string(), "https://example.com/g".to_string(), 1)
    }

    #[tokio::test]
    async fn ingest_accounting_adds_up() {
        let mgr = StateManager::new(Settings::default());
        let outcome = mgr
            .ingest_images(vec![
                record("https://cdn.example.com/a.jpg"),
                record("https://cdn.example.com/b.jpg"),
                record("https://cdn.example.com/a.jpg"),
            ])
            .await
            .unwrap();
        assert_eq!(outcome.added, 2);
        assert_eq!(outcome.duplicates, 1);
        assert_eq!(outcome.total, 2);
        assert_eq!(outcome.added + outcome.duplicates, 3);
    }

    #[tokio::test]
    async fn dedup_spans_batches_and_preserves_order() {
        let mgr = StateManager::new(Settings::default());
        mgr.ingest_images(vec![record("https://cdn.example.com/a.jpg")])
            .await
            .unwrap();
        mgr.ingest_images(vec![
            record("https://cdn.example.com/a.jpg"),
            record("https://cdn.example.com/b.jpg"),
        ])
        .await
        .unwrap();

        let images = mgr.collected_images().await;
        let urls: Vec<&str> = images.iter().map(|r| r.file_url.as_str()).collect();
        assert_eq!(
            urls,
            vec!["https://cdn.example.com/a.jpg", "https://cdn.example.com/b.jpg"]
        );
    }
}
