//! Builder for programmatic settings construction
//!
//! Hosts embedding the agent usually load settings from the persisted
//! slot; the builder exists for tests and for callers that configure a
//! run in code.

use super::types::{DownloadSettings, MemorySettings, PaginationSettings, Settings, TimingMode};

/// Fluent builder over [`Settings`]
///
/// Starts from the documented defaults; every setter overrides one
/// tunable. Validation clamps rather than errors: a zero lookback or
/// checkpoint interval is nonsensical and is raised to 1.
#[derive(Debug, Clone, Default)]
pub struct SettingsBuilder {
    settings: Settings,
}

impl SettingsBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn max_pages(mut self, max_pages: u32) -> Self {
        self.settings.pagination.max_pages = max_pages.max(1);
        self
    }

    #[must_use]
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.settings.pagination.max_attempts = max_attempts.max(1);
        self
    }

    #[must_use]
    pub fn timing_mode(mut self, mode: TimingMode) -> Self {
        self.settings.pagination.timing_mode = mode;
        self
    }

    #[must_use]
    pub fn page_delay_ms(mut self, delay: u64) -> Self {
        self.settings.pagination.page_delay_ms = delay;
        self
    }

    #[must_use]
    pub fn settle_delay_ms(mut self, delay: u64) -> Self {
        self.settings.pagination.settle_delay_ms = delay;
        self
    }

    #[must_use]
    pub fn lookback_size(mut self, size: usize) -> Self {
        self.settings.pagination.lookback_size = size.max(1);
        self
    }

    #[must_use]
    pub fn checkpoint_interval(mut self, interval: u32) -> Self {
        self.settings.pagination.checkpoint_interval = interval.max(1);
        self
    }

    #[must_use]
    pub fn delay_bounds_ms(mut self, min: u64, max: u64) -> Self {
        self.settings.pagination.min_delay_ms = min;
        self.settings.pagination.max_delay_ms = max.max(min);
        self
    }

    #[must_use]
    pub fn pause_poll_ms(mut self, poll: u64) -> Self {
        self.settings.pagination.pause_poll_ms = poll.max(1);
        self
    }

    #[must_use]
    pub fn concurrent_downloads(mut self, limit: usize) -> Self {
        self.settings.download.concurrent_downloads = limit.max(1);
        self
    }

    #[must_use]
    pub fn download_retries(mut self, max_retries: u32, retry_delay_ms: u64) -> Self {
        self.settings.download.max_retries = max_retries;
        self.settings.download.retry_delay_ms = retry_delay_ms;
        self
    }

    #[must_use]
    pub fn download_batch_size(mut self, batch_size: Option<usize>) -> Self {
        self.settings.download.batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn memory_guard(mut self, enabled: bool) -> Self {
        self.settings.memory.enabled = enabled;
        self
    }

    #[must_use]
    pub fn memory_thresholds(mut self, threshold: f64, cooldown_ms: u64) -> Self {
        self.settings.memory.threshold = threshold.clamp(0.0, 1.0);
        self.settings.memory.cooldown_ms = cooldown_ms;
        self
    }

    #[must_use]
    pub fn build(self) -> Settings {
        self.settings
    }
}

impl Settings {
    /// Start a builder from the documented defaults
    #[must_use]
    pub fn builder() -> SettingsBuilder {
        SettingsBuilder::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_and_clamps() {
        let settings = Settings::builder()
            .max_pages(3)
            .lookback_size(0)
            .checkpoint_interval(0)
            .delay_bounds_ms(500, 100)
            .build();
        assert_eq!(settings.pagination.max_pages, 3);
        assert_eq!(settings.pagination.lookback_size, 1);
        assert_eq!(settings.pagination.checkpoint_interval, 1);
        assert_eq!(settings.pagination.max_delay_ms, 500);
    }
}
