//! Pagination run orchestration
//!
//! The engine owns the run lifecycle: it probes the page, resolves the
//! pagination method, then repeats fingerprint, advance, settle,
//! duplicate check, extract, checkpoint and delay until a ceiling, a
//! duplicate, exhaustion, a cancel, or an error stops it. Control calls
//! (`pause`, `resume`, `cancel`) flip a shared atomic state cell that the
//! loop observes at its checkpoints; they never interrupt an in-flight
//! page action.

use crate::config::{Settings, TimingMode};
use crate::coordination::{RunStatus, StateManager, StatusBus, StatusEvent, ToastLevel};
use crate::download::{DownloadManager, DownloadQueueItem};
use crate::errors::PaginationError;
use crate::extraction::{GalleryDetector, ImageExtractor};
use crate::pagination::adaptive_timer::AdaptiveTimer;
use crate::pagination::checkpoint::{CheckpointData, CheckpointManager};
use crate::pagination::content_hash::{ContentHasher, fingerprint};
use crate::pagination::memory_monitor::{MemoryMonitor, MemoryProbe, NoopMemoryProbe};
use crate::pagination::methods::{PageDriver, select_method};
use crate::pagination::types::{
    LazyLoadOptions, PaginationMethod, PaginationState, RunSummary, StateCell, StopReason,
};
use crate::storage::{MemorySlotStore, SlotStore};
use log::{debug, info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Orchestrates pagination runs over host-supplied page capabilities
pub struct PaginationEngine {
    driver: Arc<dyn PageDriver>,
    extractor: Arc<dyn ImageExtractor>,
    detector: Option<Arc<dyn GalleryDetector>>,
    shared: Arc<StateManager>,
    store: Arc<dyn SlotStore>,
    bus: StatusBus,
    downloads: Option<Arc<DownloadManager>>,
    probe: Arc<dyn MemoryProbe>,
    monitor: MemoryMonitor,
    /// Set by the monitor callback, consumed by the loop's memory guard
    memory_pressure: Arc<AtomicBool>,
    state: StateCell,
    /// Freshest checkpoint-shaped snapshot, so `pause()` can persist
    /// immediately without waiting for a checkpoint multiple
    latest_snapshot: Mutex<Option<CheckpointData>>,
}

impl PaginationEngine {
    #[must_use]
    pub fn builder(
        driver: Arc<dyn PageDriver>,
        extractor: Arc<dyn ImageExtractor>,
    ) -> PaginationEngineBuilder {
        PaginationEngineBuilder::new(driver, extractor)
    }

    #[must_use]
    pub fn state(&self) -> PaginationState {
        self.state.get()
    }

    #[must_use]
    pub fn status_bus(&self) -> &StatusBus {
        &self.bus
    }

    #[must_use]
    pub fn shared_state(&self) -> &Arc<StateManager> {
        &self.shared
    }

    /// Checkpoint slot access with the interval currently in shared
    /// settings, so a checkpoint restore also restores the save cadence
    async fn checkpoints(&self) -> CheckpointManager {
        let interval = self.shared.settings().await.pagination.checkpoint_interval;
        CheckpointManager::new(Arc::clone(&self.store), interval)
    }

    /// Run pagination to completion
    ///
    /// Resumes from a valid checkpoint when one exists, otherwise starts
    /// fresh at page 1. Returns the run summary; run-time trouble ends the
    /// run with [`StopReason::Error`] in the summary rather than an `Err`.
    ///
    /// # Arguments
    /// * `requested` - pagination method, or `Auto` to probe for one
    pub async fn start(
        &self,
        requested: PaginationMethod,
    ) -> Result<RunSummary, PaginationError> {
        let current = self.state.get();
        if matches!(current, PaginationState::Running | PaginationState::Paused)
            || !self.state.transition(current, PaginationState::Running)
        {
            self.bus.notify(StatusEvent::toast(
                ToastLevel::Warning,
                "A pagination run is already active",
            ));
            return Err(PaginationError::AlreadyRunning);
        }

        let run_id = Uuid::new_v4();
        let started = Instant::now();
        info!("Pagination run {run_id} starting");

        if let Some(detector) = &self.detector {
            match detector.detect_gallery().await {
                Ok(result) => {
                    self.bus.notify(StatusEvent::gallery_detected(
                        result.gallery_type.clone(),
                        result.confidence,
                    ));
                    if !result.is_gallery {
                        info!("Page is not a gallery, ending run {run_id}");
                        self.bus.notify(StatusEvent::toast(
                            ToastLevel::Info,
                            "This page does not look like an image gallery",
                        ));
                        return Ok(self
                            .finish(run_id, StopReason::NotAGallery, None, 1, 0, started)
                            .await);
                    }
                }
                // The probe is advisory; a broken detector must not
                // block a user-initiated run.
                Err(e) => warn!("Gallery probe failed, proceeding: {e:#}"),
            }
        }

        let mut current_page = 1u32;
        let mut resume_method = None;
        if let Some(checkpoint) = self.checkpoints().await.load_checkpoint().await {
            current_page = checkpoint.data.current_page;
            resume_method = Some(checkpoint.data.method);
            let restored_images = checkpoint.data.collected_images.len();
            if let Err(e) = self
                .shared
                .update_settings(checkpoint.data.settings.clone())
                .await
            {
                warn!("Could not restore checkpointed settings: {e}");
            }
            if let Err(e) = self
                .shared
                .ingest_images(checkpoint.data.collected_images)
                .await
            {
                return Ok(self
                    .finish(
                        run_id,
                        StopReason::Error(e.to_string()),
                        resume_method,
                        current_page,
                        0,
                        started,
                    )
                    .await);
            }
            info!(
                "Resuming run {run_id} from page {current_page} with {restored_images} images"
            );
            self.bus.notify(StatusEvent::toast(
                ToastLevel::Info,
                format!("Resuming from page {current_page}"),
            ));
        } else if let Err(e) = self.shared.clear_images().await {
            warn!("Could not clear prior image collection: {e}");
        }

        // Snapshot after the checkpoint restore so every tunable below,
        // checkpoint cadence and memory guard included, reflects the
        // settings the run was checkpointed under.
        let settings = self.shared.settings().await;
        let checkpoints = CheckpointManager::new(
            Arc::clone(&self.store),
            settings.pagination.checkpoint_interval,
        );

        let method = match select_method(
            self.driver.as_ref(),
            resume_method.unwrap_or(requested),
        )
        .await
        {
            Ok(Some(method)) => method,
            Ok(None) => {
                self.bus.notify(StatusEvent::toast(
                    ToastLevel::Info,
                    "No pagination controls found on this page",
                ));
                return Ok(self
                    .finish(
                        run_id,
                        StopReason::NoMethodAvailable,
                        None,
                        current_page,
                        0,
                        started,
                    )
                    .await);
            }
            Err(e) => {
                self.report_failure("Probing pagination controls failed", &e);
                return Ok(self
                    .finish(
                        run_id,
                        StopReason::Error(e.to_string()),
                        None,
                        current_page,
                        0,
                        started,
                    )
                    .await);
            }
        };

        if settings.memory.enabled {
            let pressure = Arc::clone(&self.memory_pressure);
            let bus = self.bus.clone();
            self.monitor.start(&settings.memory, move |ratio| {
                pressure.store(true, Ordering::SeqCst);
                bus.notify(StatusEvent::memory_warning(ratio));
            });
        }

        let mut timer = AdaptiveTimer::from_settings(&settings.pagination);
        let mut hasher = ContentHasher::new(settings.pagination.lookback_size);
        let lazy = LazyLoadOptions {
            scroll_delay_ms: settings.pagination.scroll_delay_ms,
            max_scroll_steps: settings.pagination.max_scroll_steps,
        };
        let pause_poll = Duration::from_millis(settings.pagination.pause_poll_ms.max(1));
        let settle = Duration::from_millis(settings.pagination.settle_delay_ms);
        let mut attempts = 0u32;
        let mut pages_visited = 0u32;

        let stop_reason = loop {
            while self.state.get() == PaginationState::Paused {
                tokio::time::sleep(pause_poll).await;
            }
            if self.state.get() == PaginationState::Cancelled {
                break StopReason::Cancelled;
            }

            if settings.memory.enabled
                && self.memory_pressure.load(Ordering::SeqCst)
                && let Some(reason) = self.wait_out_memory_pressure(&settings).await
            {
                break reason;
            }

            if current_page >= settings.pagination.max_pages {
                info!("Page ceiling {} reached", settings.pagination.max_pages);
                break StopReason::MaxPages;
            }
            if attempts >= settings.pagination.max_attempts {
                warn!("Attempt ceiling {} reached", settings.pagination.max_attempts);
                break StopReason::MaxAttempts;
            }

            let iteration_started = Instant::now();

            let before = match self.driver.snapshot_content().await {
                Ok(content) => fingerprint(&content),
                Err(e) => {
                    self.report_failure("Reading page content failed", &e);
                    break StopReason::Error(e.to_string());
                }
            };
            hasher.add_hash(before);

            attempts += 1;
            let advanced = match self.driver.advance(method, current_page).await {
                Ok(advanced) => advanced,
                Err(e) => {
                    self.report_failure("Page navigation failed", &e);
                    break StopReason::Error(e.to_string());
                }
            };
            if !advanced {
                info!("No further pages after page {current_page}");
                break StopReason::NoFurtherPages;
            }

            tokio::time::sleep(settle).await;

            let after = match self.driver.snapshot_content().await {
                Ok(content) => fingerprint(&content),
                Err(e) => {
                    self.report_failure("Reading page content failed", &e);
                    break StopReason::Error(e.to_string());
                }
            };
            if hasher.is_duplicate(&after) {
                info!("Navigation looped back to previously seen content");
                break StopReason::DuplicateContent;
            }
            hasher.add_hash(after);

            current_page += 1;
            pages_visited += 1;

            let records = match self
                .extractor
                .extract_images_with_lazy_loading(&lazy)
                .await
            {
                Ok(records) => records,
                Err(e) => {
                    self.report_failure("Image extraction failed", &e);
                    break StopReason::Error(e.to_string());
                }
            };
            let found = records.len();
            let (outcome, fresh) = match self.shared.ingest_images_returning_new(records).await
            {
                Ok(result) => result,
                Err(e) => {
                    warn!("Could not record extracted images: {e}");
                    break StopReason::Error(e.to_string());
                }
            };
            debug!(
                "Page {current_page}: {found} images found, {} new ({} total)",
                outcome.added, outcome.total
            );
            if let Some(downloads) = &self.downloads
                && !fresh.is_empty()
            {
                let items = fresh
                    .iter()
                    .map(|r| DownloadQueueItem::new(r.file_url.clone(), r.filename.clone()))
                    .collect();
                downloads.enqueue(items).await;
            }

            timer.record(iteration_started.elapsed());

            let snapshot = CheckpointData {
                current_page,
                collected_images: self.shared.collected_images().await,
                method,
                settings: settings.clone(),
                total_pages: settings.pagination.max_pages,
                state: PaginationState::Running,
            };
            if checkpoints.should_checkpoint(current_page) {
                checkpoints.save_checkpoint(snapshot.clone()).await;
            }
            *self.latest_snapshot.lock().await = Some(snapshot);

            self.shared
                .set_status(RunStatus {
                    state: self.state.get(),
                    method,
                    current_page,
                    images_collected: outcome.total,
                })
                .await;
            self.bus.notify(StatusEvent::pagination(
                run_id,
                self.state.get(),
                method,
                current_page,
                outcome.total,
            ));

            let delay = match settings.pagination.timing_mode {
                TimingMode::Fixed => Duration::from_millis(settings.pagination.page_delay_ms),
                TimingMode::Adaptive => timer.optimal_delay(),
            };
            debug!("Sleeping {delay:?} before next page");
            tokio::time::sleep(delay).await;
        };

        Ok(self
            .finish(
                run_id,
                stop_reason,
                Some(method),
                current_page,
                pages_visited,
                started,
            )
            .await)
    }

    /// Pause an active run
    ///
    /// Takes effect at the loop's next checkpoint. Persists the freshest
    /// snapshot immediately so a later session can resume even if this one
    /// dies while paused. Returns whether a running run was paused.
    pub async fn pause(&self) -> bool {
        if !self
            .state
            .transition(PaginationState::Running, PaginationState::Paused)
        {
            debug!("Pause ignored: no active run");
            return false;
        }
        if let Some(mut data) = self.latest_snapshot.lock().await.clone() {
            data.state = PaginationState::Paused;
            self.checkpoints().await.save_checkpoint(data).await;
        }
        info!("Pagination paused");
        self.bus
            .notify(StatusEvent::toast(ToastLevel::Info, "Pagination paused"));
        true
    }

    /// Resume a paused run; no-op from any other state
    pub async fn resume(&self) -> bool {
        if !self
            .state
            .transition(PaginationState::Paused, PaginationState::Running)
        {
            debug!("Resume ignored: run is not paused");
            return false;
        }
        info!("Pagination resumed");
        self.bus
            .notify(StatusEvent::toast(ToastLevel::Info, "Pagination resumed"));
        true
    }

    /// Cancel the run and discard the checkpoint
    ///
    /// Valid from `Idle`, `Running` and `Paused`; a run that already
    /// reached a terminal state keeps it, and an errored run keeps its
    /// resume checkpoint. An active loop observes the cancel at its next
    /// checkpoint and finishes with a `Cancelled` summary.
    pub async fn cancel(&self) {
        let cancelled = self
            .state
            .transition(PaginationState::Running, PaginationState::Cancelled)
            || self
                .state
                .transition(PaginationState::Paused, PaginationState::Cancelled)
            || self
                .state
                .transition(PaginationState::Idle, PaginationState::Cancelled);
        if !cancelled {
            debug!("Cancel ignored: run already {:?}", self.state.get());
            return;
        }
        self.checkpoints().await.clear_checkpoint().await;
        info!("Pagination cancelled");
    }

    /// Self-pause until the heap-usage ratio drops back under the
    /// threshold. Returns a stop reason only when cancelled while waiting.
    async fn wait_out_memory_pressure(&self, settings: &Settings) -> Option<StopReason> {
        let was_running = self
            .state
            .transition(PaginationState::Running, PaginationState::Paused);
        warn!("Pausing pagination under memory pressure");
        self.bus.notify(StatusEvent::toast(
            ToastLevel::Warning,
            "Pausing while memory pressure clears",
        ));

        let cooldown = Duration::from_millis(settings.memory.cooldown_ms.max(1));
        let recheck = Duration::from_millis(settings.memory.poll_interval_ms.max(1));
        tokio::time::sleep(cooldown).await;
        loop {
            if self.state.get() == PaginationState::Cancelled {
                return Some(StopReason::Cancelled);
            }
            match self.probe.usage_ratio().await {
                Some(ratio) if ratio >= settings.memory.threshold => {
                    debug!("Memory pressure persists at {ratio:.2}");
                    tokio::time::sleep(recheck).await;
                }
                _ => break,
            }
        }

        self.memory_pressure.store(false, Ordering::SeqCst);
        if was_running {
            self.state
                .transition(PaginationState::Paused, PaginationState::Running);
        }
        info!("Memory pressure cleared, resuming pagination");
        self.bus.notify(StatusEvent::toast(
            ToastLevel::Info,
            "Memory pressure cleared, resuming",
        ));
        None
    }

    fn report_failure(&self, what: &str, err: &anyhow::Error) {
        warn!("{what}: {err:#}");
        self.bus
            .notify(StatusEvent::toast(ToastLevel::Error, what.to_string()));
    }

    /// Seal the run: final state, monitor teardown, checkpoint cleanup,
    /// summary emission
    async fn finish(
        &self,
        run_id: Uuid,
        stop_reason: StopReason,
        method: Option<PaginationMethod>,
        current_page: u32,
        pages_visited: u32,
        started: Instant,
    ) -> RunSummary {
        let final_state = match &stop_reason {
            StopReason::Cancelled => PaginationState::Cancelled,
            StopReason::Error(_) => PaginationState::Error,
            _ => PaginationState::Complete,
        };
        self.state.set(final_state);
        self.monitor.stop();
        self.memory_pressure.store(false, Ordering::SeqCst);

        // The checkpoint survives only an errored run, so the next start
        // can resume from where things broke.
        if final_state != PaginationState::Error {
            self.checkpoints().await.clear_checkpoint().await;
        }

        let images_collected = self.shared.image_count().await;
        let summary = RunSummary {
            run_id,
            final_state,
            stop_reason,
            current_page,
            pages_visited,
            images_collected,
            duration: started.elapsed(),
        };

        let method = method.unwrap_or(PaginationMethod::Auto);
        self.shared
            .set_status(RunStatus {
                state: final_state,
                method,
                current_page,
                images_collected,
            })
            .await;
        self.bus.notify(StatusEvent::pagination(
            run_id,
            final_state,
            method,
            current_page,
            images_collected,
        ));
        match final_state {
            PaginationState::Complete => self.bus.notify(StatusEvent::toast(
                ToastLevel::Success,
                format!("Collected {images_collected} images across {current_page} pages"),
            )),
            PaginationState::Cancelled => self
                .bus
                .notify(StatusEvent::toast(ToastLevel::Info, "Pagination cancelled")),
            _ => {}
        }
        info!(
            "Run {run_id} finished: {:?} after {} pages, {} images in {:?}",
            summary.stop_reason, summary.pages_visited, images_collected, summary.duration
        );
        summary
    }
}

/// Builder for [`PaginationEngine`]
pub struct PaginationEngineBuilder {
    driver: Arc<dyn PageDriver>,
    extractor: Arc<dyn ImageExtractor>,
    detector: Option<Arc<dyn GalleryDetector>>,
    store: Option<Arc<dyn SlotStore>>,
    bus: Option<StatusBus>,
    shared: Option<Arc<StateManager>>,
    downloads: Option<Arc<DownloadManager>>,
    probe: Option<Arc<dyn MemoryProbe>>,
    settings: Settings,
}

impl PaginationEngineBuilder {
    #[must_use]
    pub fn new(driver: Arc<dyn PageDriver>, extractor: Arc<dyn ImageExtractor>) -> Self {
        Self {
            driver,
            extractor,
            detector: None,
            store: None,
            bus: None,
            shared: None,
            downloads: None,
            probe: None,
            settings: Settings::default(),
        }
    }

    #[must_use]
    pub fn detector(mut self, detector: Arc<dyn GalleryDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    #[must_use]
    pub fn store(mut self, store: Arc<dyn SlotStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn status_bus(mut self, bus: StatusBus) -> Self {
        self.bus = Some(bus);
        self
    }

    #[must_use]
    pub fn shared_state(mut self, shared: Arc<StateManager>) -> Self {
        self.shared = Some(shared);
        self
    }

    #[must_use]
    pub fn downloads(mut self, downloads: Arc<DownloadManager>) -> Self {
        self.downloads = Some(downloads);
        self
    }

    #[must_use]
    pub fn memory_probe(mut self, probe: Arc<dyn MemoryProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    #[must_use]
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn build(self) -> PaginationEngine {
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemorySlotStore::new()) as Arc<dyn SlotStore>);
        let shared = self
            .shared
            .unwrap_or_else(|| Arc::new(StateManager::new(self.settings.clone())));
        let probe = self
            .probe
            .unwrap_or_else(|| Arc::new(NoopMemoryProbe) as Arc<dyn MemoryProbe>);
        let monitor = MemoryMonitor::new(Arc::clone(&probe));
        PaginationEngine {
            driver: self.driver,
            extractor: self.extractor,
            detector: self.detector,
            shared,
            store,
            bus: self.bus.unwrap_or_default(),
            downloads: self.downloads,
            probe,
            monitor,
            memory_pressure: Arc::new(AtomicBool::new(false)),
            state: StateCell::new(PaginationState::Idle),
            latest_snapshot: Mutex::new(None),
        }
    }
}
