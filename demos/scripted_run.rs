//! Scripted pagination run against an in-memory gallery
//!
//! Usage: cargo run --example scripted_run
//!
//! Drives the full engine (detection, auto method selection, the
//! pagination loop, download queue, JSON export) with fake page
//! capabilities, so the whole pipeline can be watched without a browser.

use anyhow::Result;
use async_trait::async_trait;
use galleryhound::{
    AlwaysContinue, DetectionResult, DownloadFetcher, DownloadManager, ExportFormat,
    ExportOptions, Exporter, GalleryDetector, ImageExtractor, ImageRecord, JsonExporter,
    LazyLoadOptions, PageDriver, PaginationEngine, PaginationMethod, Settings, StatusBus,
    StatusEvent, TimingMode,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Five pages of three images each, then the next button disappears
struct ScriptedGallery {
    position: AtomicUsize,
}

const PAGE_COUNT: usize = 5;

#[async_trait]
impl PageDriver for ScriptedGallery {
    async fn snapshot_content(&self) -> Result<String> {
        Ok(format!("gallery page {}", self.position.load(Ordering::SeqCst)))
    }

    async fn method_available(&self, method: PaginationMethod) -> Result<bool> {
        Ok(method == PaginationMethod::NextButton)
    }

    async fn advance(&self, _method: PaginationMethod, _page: u32) -> Result<bool> {
        let pos = self.position.load(Ordering::SeqCst);
        if pos + 1 < PAGE_COUNT {
            self.position.store(pos + 1, Ordering::SeqCst);
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

struct ScriptedExtractor {
    page: AtomicUsize,
}

#[async_trait]
impl ImageExtractor for ScriptedExtractor {
    async fn extract_images(&self) -> Result<Vec<ImageRecord>> {
        self.extract_images_with_lazy_loading(&LazyLoadOptions {
            scroll_delay_ms: 0,
            max_scroll_steps: 0,
        })
        .await
    }

    async fn extract_images_with_lazy_loading(
        &self,
        _options: &LazyLoadOptions,
    ) -> Result<Vec<ImageRecord>> {
        let page = self.page.fetch_add(1, Ordering::SeqCst) + 2;
        Ok((0..3)
            .map(|i| {
                ImageRecord::new(
                    format!("https://cdn.example.com/p{page}/img-{i}.jpg"),
                    format!("https://example.com/gallery?page={page}"),
                    page as u32,
                )
            })
            .collect())
    }
}

struct GridDetector;

#[async_trait]
impl GalleryDetector for GridDetector {
    async fn detect_gallery(&self) -> Result<DetectionResult> {
        Ok(DetectionResult::gallery("grid", 0.92))
    }
}

struct LoggingFetcher;

#[async_trait]
impl DownloadFetcher for LoggingFetcher {
    async fn fetch(&self, url: &str, filename: &str) -> Result<()> {
        log::info!("⬇️  {filename} <- {url}");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut settings = Settings::default();
    settings.pagination.page_delay_ms = 100;
    settings.pagination.settle_delay_ms = 50;
    settings.pagination.timing_mode = TimingMode::Fixed;
    settings.memory.enabled = false;

    let bus = StatusBus::default();
    let downloads = Arc::new(DownloadManager::new(
        settings.download.clone(),
        Arc::new(LoggingFetcher),
        Arc::new(AlwaysContinue),
        bus.clone(),
    ));

    let engine = PaginationEngine::builder(
        Arc::new(ScriptedGallery {
            position: AtomicUsize::new(0),
        }),
        Arc::new(ScriptedExtractor {
            page: AtomicUsize::new(0),
        }),
    )
    .detector(Arc::new(GridDetector))
    .downloads(Arc::clone(&downloads))
    .status_bus(bus.clone())
    .settings(settings)
    .build();

    // Mirror status traffic the way a UI panel would
    let mut events = bus.subscribe();
    let observer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                StatusEvent::Pagination {
                    current_page,
                    images_collected,
                    ..
                } => log::info!("📄 page {current_page}, {images_collected} images"),
                StatusEvent::Toast { level, message, .. } => {
                    log::info!("💬 [{level:?}] {message}");
                }
                StatusEvent::Shutdown { .. } => break,
                _ => {}
            }
        }
    });

    log::info!("🚀 Starting scripted pagination run");
    let summary = engine.start(PaginationMethod::Auto).await?;
    log::info!(
        "🏁 {:?} after {} pages: {} images in {:?}",
        summary.stop_reason,
        summary.pages_visited,
        summary.images_collected,
        summary.duration
    );

    let report = downloads.run_until_idle().await;
    log::info!(
        "⬇️  Downloads: {} completed, {} failed",
        report.completed,
        report.permanent_failures
    );

    let records = engine.shared_state().collected_images().await;
    let export = JsonExporter
        .export(
            &records,
            ExportFormat::Json,
            &ExportOptions {
                fields: Some(vec!["fileUrl".to_string(), "pageNumber".to_string()]),
                pretty: true,
            },
        )
        .await?;
    println!("{}", String::from_utf8_lossy(&export.bytes));

    drop(engine);
    bus.shutdown(galleryhound::coordination::ShutdownReason::RunComplete);
    observer.await?;
    Ok(())
}
