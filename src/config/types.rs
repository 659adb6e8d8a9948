//! Settings types for the scraping agent
//!
//! `Settings` is the single source of truth for every tunable in the
//! system: pagination delays, duplicate lookback, checkpoint cadence,
//! download concurrency, and the memory guard. Components read a snapshot
//! from the shared state manager instead of holding long-lived copies.
//!
//! Every field carries a serde default so a partial stored record merges
//! over the documented defaults when loaded.

use serde::{Deserialize, Serialize};

/// Delay policy for the inter-page wait
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TimingMode {
    /// Always sleep `page_delay_ms` between pages
    Fixed,
    /// Derive the delay from recent observed latencies
    #[default]
    Adaptive,
}

/// Tunables for the pagination engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationSettings {
    /// Hard ceiling on pages visited in one run
    ///
    /// Default: 50
    pub max_pages: u32,

    /// Ceiling on pagination attempts per run
    ///
    /// Default: 100
    pub max_attempts: u32,

    /// Delay policy between pages
    pub timing_mode: TimingMode,

    /// Fixed inter-page delay in milliseconds (used in `Fixed` mode and
    /// as the adaptive default before any latency samples exist)
    ///
    /// Default: 2000
    pub page_delay_ms: u64,

    /// Settle delay after a navigation action, letting content stabilize
    /// before the post-action fingerprint is taken
    ///
    /// Default: 1500
    pub settle_delay_ms: u64,

    /// Scroll pause handed to the lazy-load extractor
    ///
    /// Default: 800
    pub scroll_delay_ms: u64,

    /// Maximum scroll steps for lazy-load triggering
    ///
    /// Default: 10
    pub max_scroll_steps: u32,

    /// Capacity of the duplicate-content fingerprint history (FIFO)
    ///
    /// Default: 10
    pub lookback_size: usize,

    /// Persist a checkpoint every N pages
    ///
    /// Default: 5
    pub checkpoint_interval: u32,

    /// Lower clamp for the adaptive delay in milliseconds
    ///
    /// Default: 1000
    pub min_delay_ms: u64,

    /// Upper clamp for the adaptive delay in milliseconds
    ///
    /// Default: 5000
    pub max_delay_ms: u64,

    /// Multiplier applied to the average observed latency
    ///
    /// Default: 1.5
    pub delay_multiplier: f64,

    /// Number of recent latency samples the adaptive timer keeps
    ///
    /// Default: 5
    pub latency_window: usize,

    /// Poll interval while the run sits in `Paused`
    ///
    /// Pause and resume are rare, user-driven events, so a coarse poll
    /// is acceptable here instead of an event-driven wake.
    ///
    /// Default: 1000
    pub pause_poll_ms: u64,
}

impl Default for PaginationSettings {
    fn default() -> Self {
        Self {
            max_pages: 50,
            max_attempts: 100,
            timing_mode: TimingMode::Adaptive,
            page_delay_ms: 2000,
            settle_delay_ms: 1500,
            scroll_delay_ms: 800,
            max_scroll_steps: 10,
            lookback_size: 10,
            checkpoint_interval: 5,
            min_delay_ms: 1000,
            max_delay_ms: 5000,
            delay_multiplier: 1.5,
            latency_window: 5,
            pause_poll_ms: 1000,
        }
    }
}

/// Tunables for the download queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadSettings {
    /// Maximum downloads in flight at once
    ///
    /// Default: 3
    pub concurrent_downloads: usize,

    /// Retry ceiling per item; beyond this the item is counted as a
    /// permanent failure and never retried again
    ///
    /// Default: 3
    pub max_retries: u32,

    /// Base retry delay in milliseconds; the actual wait grows linearly
    /// as `retry_delay_ms * attempt_number`
    ///
    /// Default: 1000
    pub retry_delay_ms: u64,

    /// Optional per-item delay before each dispatch
    ///
    /// Default: 0 (no delay)
    pub download_delay_ms: u64,

    /// When set, the manager suspends after this many successful
    /// dispatches and asks the confirmer whether to continue
    ///
    /// Default: None (no batch gate)
    pub batch_size: Option<usize>,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            concurrent_downloads: 3,
            max_retries: 3,
            retry_delay_ms: 1000,
            download_delay_ms: 0,
            batch_size: None,
        }
    }
}

/// Tunables for the memory-pressure guard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemorySettings {
    /// Whether the engine self-pauses under memory pressure
    ///
    /// Default: true
    pub enabled: bool,

    /// How often the heap-usage ratio is polled, in milliseconds
    ///
    /// Default: 5000
    pub poll_interval_ms: u64,

    /// Usage ratio at which a warning fires
    ///
    /// Default: 0.8
    pub threshold: f64,

    /// Minimum gap between warnings; the callback fires at most once per
    /// cooldown window
    ///
    /// Default: 30000
    pub cooldown_ms: u64,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: 5000,
            threshold: 0.8,
            cooldown_ms: 30_000,
        }
    }
}

/// Top-level settings record
///
/// Serializes to the persisted settings slot; deserializing a partial
/// record fills the gaps from the documented defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub pagination: PaginationSettings,
    pub download: DownloadSettings,
    pub memory: MemorySettings,
}

impl Settings {
    /// Deserialize a stored settings record, merging missing fields over
    /// the documented defaults. Returns defaults on a malformed record
    /// (fail-open: bad persisted settings never block a run).
    #[must_use]
    pub fn merged_from_json(raw: &str) -> Self {
        match serde_json::from_str(raw) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("Stored settings record is malformed, using defaults: {e}");
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_record_merges_over_defaults() {
        let settings =
            Settings::merged_from_json(r#"{"pagination":{"max_pages":7},"download":{}}"#);
        assert_eq!(settings.pagination.max_pages, 7);
        assert_eq!(settings.pagination.checkpoint_interval, 5);
        assert_eq!(settings.download.concurrent_downloads, 3);
        assert!(settings.memory.enabled);
    }

    #[test]
    fn malformed_record_falls_back_to_defaults() {
        let settings = Settings::merged_from_json("not json");
        assert_eq!(settings, Settings::default());
    }
}
