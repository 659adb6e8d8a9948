//! Memory-pressure backpressure signal
//!
//! The monitor polls a host-supplied heap-usage probe on a fixed interval
//! while active. When the usage ratio crosses the threshold and the
//! cooldown since the last warning has elapsed, it invokes the caller's
//! callback exactly once per cooldown window. The pagination engine wires
//! that callback to its self-pause path.

use crate::config::MemorySettings;
use async_trait::async_trait;
use log::{debug, warn};
use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Host capability: report current heap usage as a ratio in 0.0 to 1.0
///
/// `None` means the host cannot measure memory (the guard then never
/// fires).
#[async_trait]
pub trait MemoryProbe: Send + Sync {
    async fn usage_ratio(&self) -> Option<f64>;
}

/// Probe for hosts without memory introspection; never reports pressure
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMemoryProbe;

#[async_trait]
impl MemoryProbe for NoopMemoryProbe {
    async fn usage_ratio(&self) -> Option<f64> {
        None
    }
}

/// Interval-polling memory guard
///
/// Must be explicitly started and stopped; `stop()` clears the poll task
/// and is idempotent.
pub struct MemoryMonitor {
    probe: Arc<dyn MemoryProbe>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl MemoryMonitor {
    #[must_use]
    pub fn new(probe: Arc<dyn MemoryProbe>) -> Self {
        Self {
            probe,
            task: Mutex::new(None),
        }
    }

    /// Start polling; replaces any previous poll task
    ///
    /// Tunables come in per start so a run restored from a checkpoint
    /// polls with the settings it was checkpointed under.
    ///
    /// # Arguments
    /// * `settings` - poll cadence, threshold and cooldown for this run
    /// * `on_pressure` - invoked with the observed ratio at most once per
    ///   cooldown window while the threshold is exceeded
    pub fn start<F>(&self, settings: &MemorySettings, on_pressure: F)
    where
        F: Fn(f64) + Send + Sync + 'static,
    {
        self.stop();

        let probe = Arc::clone(&self.probe);
        let threshold = settings.threshold;
        let cooldown = Duration::from_millis(settings.cooldown_ms);
        let poll_interval = Duration::from_millis(settings.poll_interval_ms.max(1));

        let handle = tokio::spawn(async move {
            let mut last_warning: Option<Instant> = None;
            let mut interval = tokio::time::interval(poll_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it so the guard
            // samples on the configured cadence.
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(ratio) = probe.usage_ratio().await else {
                    continue;
                };
                if ratio < threshold {
                    continue;
                }
                let cooled_down = last_warning.is_none_or(|at| at.elapsed() >= cooldown);
                if cooled_down {
                    warn!("Memory usage ratio {ratio:.2} crossed threshold {threshold:.2}");
                    last_warning = Some(Instant::now());
                    on_pressure(ratio);
                } else {
                    debug!("Memory pressure ongoing ({ratio:.2}), within cooldown window");
                }
            }
        });

        match self.task.lock() {
            Ok(mut slot) => *slot = Some(handle),
            Err(poisoned) => *poisoned.into_inner() = Some(handle),
        }
    }

    /// Stop polling; safe to call repeatedly or without a prior start
    pub fn stop(&self) {
        let previous = match self.task.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = previous {
            handle.abort();
            debug!("Memory monitor stopped");
        }
    }

    /// Whether a poll task is currently installed
    #[must_use]
    pub fn is_running(&self) -> bool {
        match self.task.lock() {
            Ok(slot) => slot.as_ref().is_some_and(|h| !h.is_finished()),
            Err(poisoned) => poisoned.into_inner().as_ref().is_some_and(|h| !h.is_finished()),
        }
    }
}

impl Drop for MemoryMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedProbe(f64);

    #[async_trait]
    impl MemoryProbe for FixedProbe {
        async fn usage_ratio(&self) -> Option<f64> {
            Some(self.0)
        }
    }

    fn fast_settings(cooldown_ms: u64) -> MemorySettings {
        MemorySettings {
            enabled: true,
            poll_interval_ms: 5,
            threshold: 0.8,
            cooldown_ms,
        }
    }

    #[tokio::test]
    async fn fires_once_per_cooldown_window() {
        let monitor = MemoryMonitor::new(Arc::new(FixedProbe(0.95)));
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        monitor.start(&fast_settings(10_000), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(60)).await;
        monitor.stop();
        // Several polls crossed the threshold but the cooldown admits one
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn below_threshold_never_fires() {
        let monitor = MemoryMonitor::new(Arc::new(FixedProbe(0.5)));
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        monitor.start(&fast_settings(1), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        tokio::time::sleep(Duration::from_millis(40)).await;
        monitor.stop();
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let monitor = MemoryMonitor::new(Arc::new(NoopMemoryProbe));
        monitor.stop();
        monitor.start(&fast_settings(1), |_| {});
        assert!(monitor.is_running());
        monitor.stop();
        monitor.stop();
        assert!(!monitor.is_running());
    }
}
