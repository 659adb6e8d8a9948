//! Status broadcast fan-out
//!
//! Every status-bearing message (gallery detection, pagination status,
//! download progress and completion, toasts, memory warnings) is
//! rebroadcast to all observers (UI panels, badge indicators). Delivery
//! is best-effort: a send with no listeners or a lagging listener never
//! blocks or fails the sender. Must-succeed traffic goes through the
//! message router instead.

use crate::pagination::types::{PaginationMethod, PaginationState};
use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, broadcast};
use uuid::Uuid;

/// Severity for user-visible toast messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Why the bus is shutting down
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShutdownReason {
    RunComplete,
    Cancelled,
    Error(String),
}

/// Events fanned out to observers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StatusEvent {
    /// One-shot gallery probe outcome at session start
    GalleryDetected {
        gallery_type: Option<String>,
        confidence: f64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    /// Per-iteration pagination progress
    Pagination {
        run_id: Uuid,
        state: PaginationState,
        method: PaginationMethod,
        current_page: u32,
        images_collected: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    /// Download queue gauge snapshot
    DownloadProgress {
        completed: usize,
        failed: usize,
        queued: usize,
        active: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    /// Queue drained: summary for the finished batch
    DownloadComplete {
        completed: usize,
        permanent_failures: usize,
        duration: Duration,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    /// Memory guard crossed its threshold
    MemoryWarning {
        usage_ratio: f64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    /// Short human-readable notice; never a raw error chain
    Toast {
        level: ToastLevel,
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    /// Observers should exit their receive loops
    Shutdown {
        reason: ShutdownReason,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl StatusEvent {
    #[must_use]
    pub fn gallery_detected(gallery_type: Option<String>, confidence: f64) -> Self {
        Self::GalleryDetected {
            gallery_type,
            confidence,
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn pagination(
        run_id: Uuid,
        state: PaginationState,
        method: PaginationMethod,
        current_page: u32,
        images_collected: usize,
    ) -> Self {
        Self::Pagination {
            run_id,
            state,
            method,
            current_page,
            images_collected,
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn download_progress(completed: usize, failed: usize, queued: usize, active: usize) -> Self {
        Self::DownloadProgress {
            completed,
            failed,
            queued,
            active,
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn download_complete(completed: usize, permanent_failures: usize, duration: Duration) -> Self {
        Self::DownloadComplete {
            completed,
            permanent_failures,
            duration,
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn memory_warning(usage_ratio: f64) -> Self {
        Self::MemoryWarning {
            usage_ratio,
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn toast(level: ToastLevel, message: impl Into<String>) -> Self {
        Self::Toast {
            level,
            message: message.into(),
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn shutdown(reason: ShutdownReason) -> Self {
        Self::Shutdown {
            reason,
            timestamp: chrono::Utc::now(),
        }
    }
}

/// Lock-free counters for bus observability
#[derive(Debug, Clone)]
pub struct BusMetrics {
    published: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
    active_subscribers: Arc<AtomicUsize>,
    peak_subscribers: Arc<AtomicUsize>,
}

impl BusMetrics {
    fn new() -> Self {
        Self {
            published: Arc::new(AtomicU64::new(0)),
            dropped: Arc::new(AtomicU64::new(0)),
            active_subscribers: Arc::new(AtomicUsize::new(0)),
            peak_subscribers: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn record_publish(&self, subscriber_count: usize) {
        self.published.fetch_add(1, Ordering::SeqCst);
        self.active_subscribers.store(subscriber_count, Ordering::SeqCst);
        let _ = self.peak_subscribers.fetch_max(subscriber_count, Ordering::SeqCst);
        if subscriber_count == 0 {
            self.dropped.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> BusMetricsSnapshot {
        BusMetricsSnapshot {
            published: self.published.load(Ordering::SeqCst),
            dropped: self.dropped.load(Ordering::SeqCst),
            active_subscribers: self.active_subscribers.load(Ordering::SeqCst),
            peak_subscribers: self.peak_subscribers.load(Ordering::SeqCst),
        }
    }
}

/// Point-in-time coherent view of the counters
#[derive(Debug, Clone, Copy)]
pub struct BusMetricsSnapshot {
    pub published: u64,
    /// Events published while no observer was subscribed
    pub dropped: u64,
    pub active_subscribers: usize,
    pub peak_subscribers: usize,
}

/// Broadcast bus for status events
#[derive(Debug)]
pub struct StatusBus {
    sender: broadcast::Sender<StatusEvent>,
    metrics: BusMetrics,
    shutdown: Arc<Notify>,
    shutdown_flag: Arc<AtomicBool>,
    /// Instance count so only the last clone signals shutdown on drop
    num_instances: Arc<AtomicUsize>,
}

impl StatusBus {
    /// Create a bus buffering up to `capacity` events per subscriber
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            metrics: BusMetrics::new(),
            shutdown: Arc::new(Notify::new()),
            shutdown_flag: Arc::new(AtomicBool::new(false)),
            num_instances: Arc::new(AtomicUsize::new(1)),
        }
    }

    /// Best-effort notify: failures are swallowed and counted, never
    /// surfaced to the sender
    pub fn notify(&self, event: StatusEvent) {
        match self.sender.send(event) {
            Ok(subscriber_count) => {
                self.metrics.record_publish(subscriber_count);
            }
            Err(_) => {
                // No active subscribers; the event is dropped by design.
                self.metrics.record_publish(0);
                debug!("Status event published with no active observers");
            }
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.sender.subscribe()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    #[must_use]
    pub fn has_subscribers(&self) -> bool {
        self.subscriber_count() > 0
    }

    #[must_use]
    pub fn metrics(&self) -> &BusMetrics {
        &self.metrics
    }

    /// Publish the shutdown event and wake anything blocked on
    /// [`Self::wait_for_shutdown`]. Idempotent.
    pub fn shutdown(&self, reason: ShutdownReason) {
        if self.shutdown_flag.swap(true, Ordering::SeqCst) {
            return;
        }
        self.notify(StatusEvent::shutdown(reason));
        self.shutdown.notify_waiters();
        debug!("Status bus shutdown signaled");
    }

    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown_flag.load(Ordering::SeqCst)
    }

    /// Resolve when shutdown has been signaled on any clone of this bus
    pub async fn wait_for_shutdown(&self) {
        if self.is_shutdown() {
            return;
        }
        self.shutdown.notified().await;
    }
}

impl Default for StatusBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Clone for StatusBus {
    fn clone(&self) -> Self {
        self.num_instances.fetch_add(1, Ordering::Relaxed);
        Self {
            sender: self.sender.clone(),
            metrics: self.metrics.clone(),
            shutdown: Arc::clone(&self.shutdown),
            shutdown_flag: Arc::clone(&self.shutdown_flag),
            num_instances: Arc::clone(&self.num_instances),
        }
    }
}

impl Drop for StatusBus {
    fn drop(&mut self) {
        // fetch_sub returns the value before decrementing
        if 1 == self.num_instances.fetch_sub(1, Ordering::AcqRel) {
            self.shutdown_flag.store(true, Ordering::SeqCst);
            self.shutdown.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn notify_without_observers_is_swallowed() {
        let bus = StatusBus::new(8);
        bus.notify(StatusEvent::toast(ToastLevel::Info, "hello"));
        let snapshot = bus.metrics().snapshot();
        assert_eq!(snapshot.published, 1);
        assert_eq!(snapshot.dropped, 1);
    }

    #[tokio::test]
    async fn all_observers_receive_broadcasts() {
        let bus = StatusBus::new(8);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        bus.notify(StatusEvent::memory_warning(0.91));

        for rx in [&mut rx1, &mut rx2] {
            match rx.recv().await.unwrap() {
                StatusEvent::MemoryWarning { usage_ratio, .. } => {
                    assert!((usage_ratio - 0.91).abs() < f64::EPSILON);
                }
                other => panic!("unexpected event: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn shutdown_is_idempotent_and_observable() {
        let bus = StatusBus::new(8);
        let mut rx = bus.subscribe();
        bus.shutdown(ShutdownReason::RunComplete);
        bus.shutdown(ShutdownReason::Cancelled);
        assert!(bus.is_shutdown());
        // Only the first shutdown published an event
        assert!(matches!(rx.recv().await.unwrap(), StatusEvent::Shutdown { reason: ShutdownReason::RunComplete, .. }));
        assert!(rx.try_recv().is_err());
        bus.wait_for_shutdown().await;
    }
}
