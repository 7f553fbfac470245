//! Prometheus-backed metrics registry.
//!
//! # Design
//! - Collector registration stays private; callers get intent-named methods.
//! - Labels are bounded: notification kinds and the two engine names.

use std::sync::Arc;

use prometheus::{Encoder, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};
use serde::Serialize;

use crate::error::{Result, TelemetryError};

/// Metrics registry shared by the connector and the listener.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    engine_notifications_total: IntCounterVec,
    listener_failures_total: IntCounterVec,
    engine_connected: IntGaugeVec,
    engine_connect_attempts_total: IntCounterVec,
}

/// Point-in-time view of the engine gauges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Whether the websocket engine is connected.
    pub aria2_connected: bool,
    /// Whether the REST engine is connected.
    pub qbit_connected: bool,
}

fn collector<T>(name: &'static str, built: prometheus::Result<T>) -> Result<T> {
    built.map_err(|source| TelemetryError::MetricsCollector { name, source })
}

fn register<T>(registry: &Registry, name: &'static str, collector: &T) -> Result<()>
where
    T: prometheus::core::Collector + Clone + 'static,
{
    registry
        .register(Box::new(collector.clone()))
        .map_err(|source| TelemetryError::MetricsRegister { name, source })
}

impl Metrics {
    /// Construct a registry with every relay collector registered.
    ///
    /// # Errors
    ///
    /// Returns an error if a collector cannot be built or registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let engine_notifications_total = collector(
            "engine_notifications_total",
            IntCounterVec::new(
                Opts::new(
                    "engine_notifications_total",
                    "Push notifications received from the download engine",
                ),
                &["kind"],
            ),
        )?;
        let listener_failures_total = collector(
            "listener_failures_total",
            IntCounterVec::new(
                Opts::new(
                    "listener_failures_total",
                    "Notification handlers that ended in an unexpected error",
                ),
                &["kind"],
            ),
        )?;
        let engine_connected = collector(
            "engine_connected",
            IntGaugeVec::new(
                Opts::new("engine_connected", "1 when the engine handle is live"),
                &["engine"],
            ),
        )?;
        let engine_connect_attempts_total = collector(
            "engine_connect_attempts_total",
            IntCounterVec::new(
                Opts::new(
                    "engine_connect_attempts_total",
                    "Connection attempts made per engine",
                ),
                &["engine"],
            ),
        )?;

        register(
            &registry,
            "engine_notifications_total",
            &engine_notifications_total,
        )?;
        register(&registry, "listener_failures_total", &listener_failures_total)?;
        register(&registry, "engine_connected", &engine_connected)?;
        register(
            &registry,
            "engine_connect_attempts_total",
            &engine_connect_attempts_total,
        )?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                engine_notifications_total,
                listener_failures_total,
                engine_connected,
                engine_connect_attempts_total,
            }),
        })
    }

    /// Count one received notification of `kind`.
    pub fn inc_notification(&self, kind: &str) {
        self.inner
            .engine_notifications_total
            .with_label_values(&[kind])
            .inc();
    }

    /// Count one handler of `kind` that failed unexpectedly.
    pub fn inc_listener_failure(&self, kind: &str) {
        self.inner
            .listener_failures_total
            .with_label_values(&[kind])
            .inc();
    }

    /// Count one connection attempt to `engine`.
    pub fn inc_connect_attempt(&self, engine: &str) {
        self.inner
            .engine_connect_attempts_total
            .with_label_values(&[engine])
            .inc();
    }

    /// Flip the connected gauge for `engine`.
    pub fn set_engine_connected(&self, engine: &str, connected: bool) {
        self.inner
            .engine_connected
            .with_label_values(&[engine])
            .set(i64::from(connected));
    }

    /// Current value of the notification counter for `kind`.
    #[must_use]
    pub fn notifications(&self, kind: &str) -> u64 {
        self.inner
            .engine_notifications_total
            .with_label_values(&[kind])
            .get()
    }

    /// Current value of the failure counter for `kind`.
    #[must_use]
    pub fn listener_failures(&self, kind: &str) -> u64 {
        self.inner
            .listener_failures_total
            .with_label_values(&[kind])
            .get()
    }

    /// Current value of the attempt counter for `engine`.
    #[must_use]
    pub fn connect_attempts(&self, engine: &str) -> u64 {
        self.inner
            .engine_connect_attempts_total
            .with_label_values(&[engine])
            .get()
    }

    /// Render the registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails or the output is not UTF-8.
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.inner.registry.gather(), &mut buffer)
            .map_err(|source| TelemetryError::MetricsEncode { source })?;
        String::from_utf8(buffer).map_err(|source| TelemetryError::MetricsUtf8 { source })
    }

    /// Take a snapshot of the engine gauges.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let connected = |engine: &str| {
            self.inner
                .engine_connected
                .with_label_values(&[engine])
                .get()
                > 0
        };
        MetricsSnapshot {
            aria2_connected: connected("aria2"),
            qbit_connected: connected("qbittorrent"),
        }
    }
}
