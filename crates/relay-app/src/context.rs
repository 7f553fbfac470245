//! Shared state handed to the notification handlers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use relay_core::{DuplicateCheck, Messenger, TaskDict, UnwantedFileCleaner};
use relay_telemetry::Metrics;

/// Cooperative shutdown flag; once set, handlers stop scheduling engine work.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    /// Raise the flag.
    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether shutdown is in progress.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Settle delays absorbing the engine's eventual-consistency windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerTimings {
    /// Wait before re-reading a freshly started download.
    pub started_settle: Duration,
    /// Wait before acting on a bittorrent completion.
    pub bt_complete_settle: Duration,
    /// Wait before treating a stop as a dead torrent.
    pub stopped_settle: Duration,
    /// Interval between metadata resolution polls.
    pub metadata_poll: Duration,
    /// Lifetime of last-resort error notices.
    pub notice_ttl: Duration,
}

impl Default for ListenerTimings {
    fn default() -> Self {
        Self {
            started_settle: Duration::from_secs(1),
            bt_complete_settle: Duration::from_secs(1),
            stopped_settle: Duration::from_secs(4),
            metadata_poll: Duration::from_millis(500),
            notice_ttl: Duration::from_secs(60),
        }
    }
}

/// Collaborators and shared state for [`crate::Aria2Listener`].
#[derive(Clone)]
pub struct ListenerContext {
    /// Live task dictionary.
    pub tasks: TaskDict,
    /// Chat delivery.
    pub messenger: Arc<dyn Messenger>,
    /// Duplicate-download detection.
    pub duplicates: Arc<dyn DuplicateCheck>,
    /// Sweeps deselected leftovers.
    pub cleaner: Arc<dyn UnwantedFileCleaner>,
    /// Public index URL; selection prompts are only offered when set.
    pub base_url: Option<String>,
    /// Shutdown flag.
    pub stop: StopSignal,
    /// Settle delays.
    pub timings: ListenerTimings,
    /// Metrics registry.
    pub metrics: Metrics,
}

impl ListenerContext {
    /// Context with default timings, no index URL and a fresh stop flag.
    #[must_use]
    pub fn new(
        tasks: TaskDict,
        messenger: Arc<dyn Messenger>,
        duplicates: Arc<dyn DuplicateCheck>,
        cleaner: Arc<dyn UnwantedFileCleaner>,
        metrics: Metrics,
    ) -> Self {
        Self {
            tasks,
            messenger,
            duplicates,
            cleaner,
            base_url: None,
            stop: StopSignal::default(),
            timings: ListenerTimings::default(),
            metrics,
        }
    }

    /// Enable selection prompts linking to `base_url`.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into().trim_end_matches('/').to_string());
        self
    }

    /// Override the settle delays.
    #[must_use]
    pub const fn with_timings(mut self, timings: ListenerTimings) -> Self {
        self.timings = timings;
        self
    }

    /// Share an existing stop flag.
    #[must_use]
    pub fn with_stop(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_signal_is_shared_between_clones() {
        let stop = StopSignal::default();
        let observer = stop.clone();
        assert!(!observer.is_set());
        stop.set();
        assert!(observer.is_set());
    }

    #[test]
    fn default_timings_match_engine_windows() {
        let timings = ListenerTimings::default();
        assert_eq!(timings.stopped_settle, Duration::from_secs(4));
        assert_eq!(timings.metadata_poll, Duration::from_millis(500));
    }
}
