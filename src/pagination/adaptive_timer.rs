//! Adaptive inter-page delay derived from observed latencies
//!
//! The goal is to converge toward "just slow enough" on sluggish sites
//! while running fast on responsive ones, without manual tuning. The
//! timer keeps the last K iteration latencies and returns the clamped
//! average scaled by a multiplier.

use crate::config::PaginationSettings;
use std::collections::VecDeque;
use std::time::Duration;

/// Windowed-average delay calculator
#[derive(Debug, Clone)]
pub struct AdaptiveTimer {
    samples: VecDeque<Duration>,
    window: usize,
    multiplier: f64,
    min_delay: Duration,
    max_delay: Duration,
    default_delay: Duration,
}

impl AdaptiveTimer {
    /// Create a timer with explicit bounds
    ///
    /// # Arguments
    /// * `window` - number of recent samples kept (minimum 1)
    /// * `multiplier` - factor applied to the average latency
    /// * `min_delay` / `max_delay` - clamp bounds for the output
    /// * `default_delay` - returned until the first sample is recorded
    #[must_use]
    pub fn new(
        window: usize,
        multiplier: f64,
        min_delay: Duration,
        max_delay: Duration,
        default_delay: Duration,
    ) -> Self {
        let window = window.max(1);
        Self {
            samples: VecDeque::with_capacity(window),
            window,
            multiplier,
            min_delay,
            max_delay: max_delay.max(min_delay),
            default_delay,
        }
    }

    /// Build from the pagination settings snapshot
    #[must_use]
    pub fn from_settings(settings: &PaginationSettings) -> Self {
        Self::new(
            settings.latency_window,
            settings.delay_multiplier,
            Duration::from_millis(settings.min_delay_ms),
            Duration::from_millis(settings.max_delay_ms),
            Duration::from_millis(settings.page_delay_ms),
        )
    }

    /// Record one observed iteration latency, evicting the oldest sample
    /// once the window is full
    pub fn record(&mut self, latency: Duration) {
        if self.samples.len() >= self.window {
            self.samples.pop_front();
        }
        self.samples.push_back(latency);
    }

    /// The delay to sleep before the next page:
    /// `clamp(min, max, round(average * multiplier))`, or the fixed
    /// default when no samples exist yet
    #[must_use]
    pub fn optimal_delay(&self) -> Duration {
        if self.samples.is_empty() {
            return self.default_delay;
        }
        let total_ms: f64 = self.samples.iter().map(|d| d.as_millis() as f64).sum();
        let average_ms = total_ms / self.samples.len() as f64;
        let raw = Duration::from_millis((average_ms * self.multiplier).round() as u64);
        raw.clamp(self.min_delay, self.max_delay)
    }

    #[must_use]
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timer() -> AdaptiveTimer {
        AdaptiveTimer::new(
            5,
            1.5,
            Duration::from_millis(1000),
            Duration::from_millis(5000),
            Duration::from_millis(2000),
        )
    }

    #[test]
    fn no_samples_returns_default() {
        assert_eq!(timer().optimal_delay(), Duration::from_millis(2000));
    }

    #[test]
    fn average_times_multiplier_within_bounds() {
        let mut t = timer();
        for _ in 0..3 {
            t.record(Duration::from_millis(1000));
        }
        // 1000 average * 1.5 = 1500, inside [1000, 5000]
        assert_eq!(t.optimal_delay(), Duration::from_millis(1500));
    }

    #[test]
    fn output_is_clamped_to_bounds() {
        let mut t = timer();
        t.record(Duration::from_millis(10));
        assert_eq!(t.optimal_delay(), Duration::from_millis(1000));

        let mut t = timer();
        t.record(Duration::from_millis(60_000));
        assert_eq!(t.optimal_delay(), Duration::from_millis(5000));
    }

    #[test]
    fn window_evicts_oldest_sample() {
        let mut t = timer();
        t.record(Duration::from_millis(60_000));
        for _ in 0..5 {
            t.record(Duration::from_millis(1000));
        }
        assert_eq!(t.sample_count(), 5);
        // The 60s outlier has been evicted; average is back to 1000
        assert_eq!(t.optimal_delay(), Duration::from_millis(1500));
    }
}
