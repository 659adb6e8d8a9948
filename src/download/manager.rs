//! Bounded-concurrency download queue with linear retry backoff
//!
//! At most `concurrent_downloads` transfers run at once. A failed item
//! goes back on the queue after a backoff of `retry_delay_ms * retries`;
//! once its retry count passes the ceiling it is counted as a permanent
//! failure exactly once and never retried again. An optional batch gate
//! pauses dispatch every `batch_size` completions until the confirmer
//! approves the next batch.

use crate::config::DownloadSettings;
use crate::coordination::{StatusBus, StatusEvent, ToastLevel};
use crate::download::types::{Confirmer, DownloadFetcher, DownloadQueueItem};
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use log::{debug, error, info, warn};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Notify};

/// What a finished in-flight transfer means for the queue
enum ItemOutcome {
    Done,
    Retry(DownloadQueueItem),
    Failed(DownloadQueueItem),
}

/// Point-in-time queue gauges
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadGauges {
    pub queued: usize,
    pub active: usize,
    pub completed: usize,
    pub permanent_failures: usize,
}

/// Summary of one drain of the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadRunReport {
    pub completed: usize,
    pub permanent_failures: usize,
    pub duration: Duration,
    /// True when the batch gate halted dispatch before the queue drained
    pub halted: bool,
}

pub struct DownloadManager {
    settings: DownloadSettings,
    fetcher: Arc<dyn DownloadFetcher>,
    confirmer: Arc<dyn Confirmer>,
    bus: StatusBus,
    queue: Mutex<VecDeque<DownloadQueueItem>>,
    active: AtomicUsize,
    completed: AtomicUsize,
    permanent_failures: AtomicUsize,
    /// Completions since the last batch-gate approval
    completed_in_batch: AtomicUsize,
    halted: AtomicBool,
    /// Wakes a parked [`Self::run_until_shutdown`] loop on new work
    work_added: Notify,
}

impl DownloadManager {
    #[must_use]
    pub fn new(
        settings: DownloadSettings,
        fetcher: Arc<dyn DownloadFetcher>,
        confirmer: Arc<dyn Confirmer>,
        bus: StatusBus,
    ) -> Self {
        Self {
            settings,
            fetcher,
            confirmer,
            bus,
            queue: Mutex::new(VecDeque::new()),
            active: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            permanent_failures: AtomicUsize::new(0),
            completed_in_batch: AtomicUsize::new(0),
            halted: AtomicBool::new(false),
            work_added: Notify::new(),
        }
    }

    /// Append items to the tail of the queue
    ///
    /// Enqueueing does not dispatch by itself: a caller either drives the
    /// queue with [`Self::run_until_idle`] after enqueueing, or keeps a
    /// [`Self::run_until_shutdown`] task serving the queue, which this
    /// call wakes.
    pub async fn enqueue(&self, items: Vec<DownloadQueueItem>) {
        if items.is_empty() {
            return;
        }
        let queued = {
            let mut queue = self.queue.lock().await;
            queue.extend(items);
            queue.len()
        };
        debug!("Download queue now holds {queued} items");
        self.work_added.notify_one();
        self.publish_progress().await;
    }

    /// Clear the batch-gate halt so the next drain dispatches again
    pub fn restart(&self) {
        self.halted.store(false, Ordering::SeqCst);
        self.completed_in_batch.store(0, Ordering::SeqCst);
        self.work_added.notify_one();
    }

    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    pub async fn gauges(&self) -> DownloadGauges {
        DownloadGauges {
            queued: self.queue.lock().await.len(),
            active: self.active.load(Ordering::SeqCst),
            completed: self.completed.load(Ordering::SeqCst),
            permanent_failures: self.permanent_failures.load(Ordering::SeqCst),
        }
    }

    /// Keep serving the queue until the status bus signals shutdown
    ///
    /// Drains the queue, then parks until [`Self::enqueue`] or
    /// [`Self::restart`] signals new work, so items enqueued while
    /// pagination is still running are picked up without polling. Spawn
    /// this on its own task alongside the pagination run.
    pub async fn run_until_shutdown(&self) {
        loop {
            // Skip empty drains so idle wakeups do not emit empty
            // completion summaries.
            if !self.queue.lock().await.is_empty() {
                self.run_until_idle().await;
            }
            tokio::select! {
                () = self.bus.wait_for_shutdown() => break,
                () = self.work_added.notified() => {}
            }
        }
        info!("Download service stopped on shutdown signal");
    }

    /// Drive the queue until it is empty or the batch gate halts dispatch
    ///
    /// Returns as soon as the queue is idle; work enqueued afterwards
    /// waits for the next call (or use [`Self::run_until_shutdown`] for a
    /// long-lived serving loop). Reentrant by construction: call again
    /// after [`Self::restart`] to resume a halted queue, or after
    /// [`Self::enqueue`] to drain new work. Emits a completion summary
    /// event when the queue drains.
    pub async fn run_until_idle(&self) -> DownloadRunReport {
        let started = Instant::now();
        let completed_at_start = self.completed.load(Ordering::SeqCst);
        let failures_at_start = self.permanent_failures.load(Ordering::SeqCst);
        let mut in_flight = FuturesUnordered::new();

        loop {
            while !self.is_halted() && in_flight.len() < self.settings.concurrent_downloads {
                if self.queue.lock().await.is_empty() {
                    break;
                }
                if !self.pass_batch_gate().await {
                    break;
                }
                let Some(item) = self.queue.lock().await.pop_front() else {
                    break;
                };
                self.active.fetch_add(1, Ordering::SeqCst);
                in_flight.push(self.run_item(item));
            }

            let Some(outcome) = in_flight.next().await else {
                break;
            };
            self.active.fetch_sub(1, Ordering::SeqCst);
            match outcome {
                ItemOutcome::Done => {
                    self.completed.fetch_add(1, Ordering::SeqCst);
                    self.completed_in_batch.fetch_add(1, Ordering::SeqCst);
                }
                ItemOutcome::Retry(item) => {
                    self.queue.lock().await.push_back(item);
                }
                ItemOutcome::Failed(item) => {
                    self.permanent_failures.fetch_add(1, Ordering::SeqCst);
                    error!(
                        "Giving up on '{}' after {} attempts",
                        item.url,
                        item.retries
                    );
                }
            }
            self.publish_progress().await;
        }

        let report = DownloadRunReport {
            completed: self.completed.load(Ordering::SeqCst) - completed_at_start,
            permanent_failures: self.permanent_failures.load(Ordering::SeqCst)
                - failures_at_start,
            duration: started.elapsed(),
            halted: self.is_halted(),
        };

        if report.halted {
            info!(
                "Download dispatch halted by batch gate: {} completed so far",
                report.completed
            );
        } else {
            self.completed_in_batch.store(0, Ordering::SeqCst);
            info!(
                "Download queue drained: {} completed, {} permanent failures in {:?}",
                report.completed, report.permanent_failures, report.duration
            );
            self.bus.notify(StatusEvent::download_complete(
                report.completed,
                report.permanent_failures,
                report.duration,
            ));
            if report.permanent_failures > 0 {
                self.bus.notify(StatusEvent::toast(
                    ToastLevel::Warning,
                    format!(
                        "Downloads finished: {} saved, {} failed permanently",
                        report.completed, report.permanent_failures
                    ),
                ));
            }
        }
        report
    }

    /// Returns false (and halts) when the confirmer declines the next
    /// batch. Without a configured batch size the gate is always open.
    async fn pass_batch_gate(&self) -> bool {
        let Some(batch_size) = self.settings.batch_size else {
            return true;
        };
        if self.completed_in_batch.load(Ordering::SeqCst) < batch_size.max(1) {
            return true;
        }
        let completed = self.completed_in_batch.load(Ordering::SeqCst);
        let queued = self.queue.lock().await.len();
        if self.confirmer.confirm_continue(completed, queued).await {
            self.completed_in_batch.store(0, Ordering::SeqCst);
            debug!("Batch gate approved, {queued} items remaining");
            true
        } else {
            self.halted.store(true, Ordering::SeqCst);
            info!("Batch gate declined with {queued} items remaining");
            false
        }
    }

    async fn run_item(&self, mut item: DownloadQueueItem) -> ItemOutcome {
        if self.settings.download_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.settings.download_delay_ms)).await;
        }
        match self.fetcher.fetch(&item.url, &item.filename).await {
            Ok(()) => {
                debug!("Downloaded '{}'", item.filename);
                ItemOutcome::Done
            }
            Err(e) => {
                item.retries += 1;
                if item.retries <= self.settings.max_retries {
                    let backoff = Duration::from_millis(
                        self.settings.retry_delay_ms * u64::from(item.retries),
                    );
                    warn!(
                        "Download of '{}' failed (attempt {}): {e:#}; retrying in {backoff:?}",
                        item.url, item.retries
                    );
                    tokio::time::sleep(backoff).await;
                    ItemOutcome::Retry(item)
                } else {
                    ItemOutcome::Failed(item)
                }
            }
        }
    }

    async fn publish_progress(&self) {
        let gauges = self.gauges().await;
        self.bus.notify(StatusEvent::download_progress(
            gauges.completed,
            gauges.permanent_failures,
            gauges.queued,
            gauges.active,
        ));
    }
}
