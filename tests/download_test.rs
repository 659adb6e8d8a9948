//! Download queue behavior through the public API

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use galleryhound::{
    AlwaysContinue, Confirmer, DownloadFetcher, DownloadManager, DownloadQueueItem,
    DownloadSettings, StatusBus, StatusEvent,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Tracks how many transfers run at the same moment
struct ConcurrencyMeter {
    active: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl DownloadFetcher for ConcurrencyMeter {
    async fn fetch(&self, _url: &str, _filename: &str) -> Result<()> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Fails every fetch, counting attempts per URL
struct AlwaysFailing {
    attempts: AtomicUsize,
}

#[async_trait]
impl DownloadFetcher for AlwaysFailing {
    async fn fetch(&self, _url: &str, _filename: &str) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(anyhow!("connection reset"))
    }
}

fn settings() -> DownloadSettings {
    DownloadSettings {
        concurrent_downloads: 3,
        max_retries: 3,
        retry_delay_ms: 1,
        download_delay_ms: 0,
        batch_size: None,
    }
}

fn items(count: usize) -> Vec<DownloadQueueItem> {
    (0..count)
        .map(|n| DownloadQueueItem::new(format!("https://x/{n}"), format!("{n}.jpg")))
        .collect()
}

#[tokio::test]
async fn concurrency_never_exceeds_the_limit() {
    let meter = Arc::new(ConcurrencyMeter {
        active: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
    });
    let mgr = DownloadManager::new(
        settings(),
        Arc::clone(&meter) as Arc<dyn DownloadFetcher>,
        Arc::new(AlwaysContinue),
        StatusBus::default(),
    );
    mgr.enqueue(items(10)).await;
    let report = mgr.run_until_idle().await;

    assert_eq!(report.completed, 10);
    let peak = meter.peak.load(Ordering::SeqCst);
    assert!(peak <= 3, "peak concurrency was {peak}");
    assert!(peak >= 2, "downloads never overlapped");
}

#[tokio::test]
async fn hopeless_item_fails_permanently_exactly_once() {
    let fetcher = Arc::new(AlwaysFailing {
        attempts: AtomicUsize::new(0),
    });
    let mgr = DownloadManager::new(
        settings(),
        Arc::clone(&fetcher) as Arc<dyn DownloadFetcher>,
        Arc::new(AlwaysContinue),
        StatusBus::default(),
    );
    mgr.enqueue(items(1)).await;
    let report = mgr.run_until_idle().await;

    // 1 initial attempt + 3 retries, then a single permanent failure
    assert_eq!(fetcher.attempts.load(Ordering::SeqCst), 4);
    assert_eq!(report.permanent_failures, 1);
    assert_eq!(report.completed, 0);

    // Re-running over the drained queue does not fail it again
    let again = mgr.run_until_idle().await;
    assert_eq!(again.permanent_failures, 0);
    assert_eq!(mgr.gauges().await.permanent_failures, 1);
}

#[tokio::test]
async fn confirmer_sees_batch_progress_and_can_halt() {
    /// Declines as soon as it is consulted, recording what it saw
    struct Recorder {
        consulted: AtomicUsize,
        last_completed: AtomicUsize,
    }

    #[async_trait]
    impl Confirmer for Recorder {
        async fn confirm_continue(&self, completed: usize, _queued: usize) -> bool {
            self.consulted.fetch_add(1, Ordering::SeqCst);
            self.last_completed.store(completed, Ordering::SeqCst);
            false
        }
    }

    let recorder = Arc::new(Recorder {
        consulted: AtomicUsize::new(0),
        last_completed: AtomicUsize::new(0),
    });
    let mut settings = settings();
    settings.concurrent_downloads = 1;
    settings.batch_size = Some(3);

    let meter = Arc::new(ConcurrencyMeter {
        active: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
    });
    let mgr = DownloadManager::new(
        settings,
        meter as Arc<dyn DownloadFetcher>,
        Arc::clone(&recorder) as Arc<dyn Confirmer>,
        StatusBus::default(),
    );
    mgr.enqueue(items(7)).await;
    let report = mgr.run_until_idle().await;

    assert!(report.halted);
    assert_eq!(report.completed, 3);
    assert_eq!(recorder.consulted.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.last_completed.load(Ordering::SeqCst), 3);
    assert!(mgr.is_halted());
    assert_eq!(mgr.gauges().await.queued, 4);
}

#[tokio::test]
async fn serving_loop_picks_up_items_enqueued_after_it_starts() {
    let bus = StatusBus::default();
    let meter = Arc::new(ConcurrencyMeter {
        active: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
    });
    let mgr = Arc::new(DownloadManager::new(
        settings(),
        meter as Arc<dyn DownloadFetcher>,
        Arc::new(AlwaysContinue),
        bus.clone(),
    ));

    let server = tokio::spawn({
        let mgr = Arc::clone(&mgr);
        async move { mgr.run_until_shutdown().await }
    });

    // The loop is already parked on an empty queue when work arrives
    tokio::time::sleep(Duration::from_millis(10)).await;
    mgr.enqueue(items(3)).await;

    let mut drained = false;
    for _ in 0..200 {
        if mgr.gauges().await.completed == 3 {
            drained = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(drained, "late-enqueued items were never dispatched");

    bus.shutdown(galleryhound::coordination::ShutdownReason::RunComplete);
    tokio::time::timeout(Duration::from_secs(1), server)
        .await
        .expect("serving loop did not stop on shutdown")
        .unwrap();
}

#[tokio::test]
async fn progress_events_reach_bus_observers() {
    let bus = StatusBus::default();
    let mut rx = bus.subscribe();
    let meter = Arc::new(ConcurrencyMeter {
        active: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
    });
    let mgr = DownloadManager::new(
        settings(),
        meter as Arc<dyn DownloadFetcher>,
        Arc::new(AlwaysContinue),
        bus.clone(),
    );
    mgr.enqueue(items(2)).await;
    mgr.run_until_idle().await;

    let mut progress_events = 0;
    let mut complete_events = 0;
    while let Ok(event) = rx.try_recv() {
        match event {
            StatusEvent::DownloadProgress { .. } => progress_events += 1,
            StatusEvent::DownloadComplete { completed, .. } => {
                assert_eq!(completed, 2);
                complete_events += 1;
            }
            _ => {}
        }
    }
    assert!(progress_events >= 2);
    assert_eq!(complete_events, 1);
}
