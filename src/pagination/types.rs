//! Core types for pagination runs

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use uuid::Uuid;

/// Lifecycle state of a pagination run
///
/// `Idle` is initial; `Cancelled`, `Complete` and `Error` are terminal
/// for the run. A new `start()` call begins a fresh or resumed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaginationState {
    Idle,
    Running,
    Paused,
    Cancelled,
    Complete,
    Error,
}

impl PaginationState {
    /// Terminal states end the run; only a fresh `start()` leaves them
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled | Self::Complete | Self::Error)
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Running,
            2 => Self::Paused,
            3 => Self::Cancelled,
            4 => Self::Complete,
            5 => Self::Error,
            _ => Self::Idle,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Running => 1,
            Self::Paused => 2,
            Self::Cancelled => 3,
            Self::Complete => 4,
            Self::Error => 5,
        }
    }
}

/// Atomic cell holding the run state, shared between the engine loop and
/// the control surface (pause/resume/cancel)
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new(state: PaginationState) -> Self {
        Self(AtomicU8::new(state.as_u8()))
    }

    pub(crate) fn get(&self) -> PaginationState {
        PaginationState::from_u8(self.0.load(Ordering::SeqCst))
    }

    pub(crate) fn set(&self, state: PaginationState) {
        self.0.store(state.as_u8(), Ordering::SeqCst);
    }

    /// Transition only if the current state matches; returns whether the
    /// swap happened
    pub(crate) fn transition(&self, from: PaginationState, to: PaginationState) -> bool {
        self.0
            .compare_exchange(
                from.as_u8(),
                to.as_u8(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }
}

/// How the engine advances from one page to the next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PaginationMethod {
    /// Probe detectors in priority order and use the first available
    Auto,
    NextButton,
    LoadMore,
    InfiniteScroll,
    Arrow,
    UrlPattern,
    Api,
}

impl PaginationMethod {
    /// Probe order for auto mode: explicit UI affordances are trusted
    /// over passive inference, so infinite scroll is the catch-all tried
    /// last (it is ambiguous with content that simply has not finished
    /// rendering on-screen).
    pub const AUTO_PRIORITY: [PaginationMethod; 6] = [
        PaginationMethod::NextButton,
        PaginationMethod::LoadMore,
        PaginationMethod::Arrow,
        PaginationMethod::UrlPattern,
        PaginationMethod::Api,
        PaginationMethod::InfiniteScroll,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::NextButton => "nextButton",
            Self::LoadMore => "loadMore",
            Self::InfiniteScroll => "infiniteScroll",
            Self::Arrow => "arrow",
            Self::UrlPattern => "urlPattern",
            Self::Api => "api",
        }
    }
}

/// One discovered image
///
/// `file_url` is the unique key within a run; insertion order is
/// preserved for export ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRecord {
    /// Absolute URL of the image file; dedup key
    pub file_url: String,
    pub filename: String,
    #[serde(default)]
    pub caption: String,
    /// Human-readable dimensions string, e.g. "1920x1080"
    #[serde(default)]
    pub dimensions: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    /// URL of the page the image was found on
    pub source_page: String,
    /// 1-based page number within the run
    pub page_number: u32,
    pub extracted_at: chrono::DateTime<chrono::Utc>,
}

impl ImageRecord {
    /// Build a record for an image found on `source_page`, deriving the
    /// filename from the URL path when possible
    #[must_use]
    pub fn new(file_url: String, source_page: String, page_number: u32) -> Self {
        let filename = url::Url::parse(&file_url)
            .ok()
            .and_then(|u| {
                u.path_segments()
                    .and_then(|mut segments| segments.next_back().map(str::to_string))
            })
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "image".to_string());
        Self {
            file_url,
            filename,
            caption: String::new(),
            dimensions: String::new(),
            width: 0,
            height: 0,
            source_page,
            page_number,
            extracted_at: chrono::Utc::now(),
        }
    }
}

/// Options handed to the lazy-load extractor once per page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LazyLoadOptions {
    pub scroll_delay_ms: u64,
    pub max_scroll_steps: u32,
}

/// Why the main loop exited
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// Page ceiling reached
    MaxPages,
    /// Attempt ceiling reached
    MaxAttempts,
    /// The pagination method reported no further pages (normal completion)
    NoFurtherPages,
    /// Post-action fingerprint matched the lookback history
    DuplicateContent,
    /// No pagination method was available on the page
    NoMethodAvailable,
    /// The gallery detector declined the page at session start
    NotAGallery,
    /// User cancel observed at a loop checkpoint
    Cancelled,
    /// Unrecoverable navigation or extraction failure
    Error(String),
}

/// Final accounting for one run, emitted by `stop()`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub final_state: PaginationState,
    pub stop_reason: StopReason,
    /// Last page number reached (1-based)
    pub current_page: u32,
    pub pages_visited: u32,
    pub images_collected: usize,
    pub duration: Duration,
}
