//! Engine bootstrap and supervision.
//!
//! # Design
//! - Each engine connects independently with bounded exponential backoff; a
//!   failed engine leaves its handle unset while the other stays usable.
//! - The REST engine has no resilience of its own, so its handle is always
//!   wrapped in the retry policy before being published.
//! - Teardown never fails: close and removal errors are logged and swallowed.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use relay_config::{Aria2Settings, QbitSettings};
use relay_core::{
    Aria2Api, DownloadOptions, DownloadSnapshot, DownloadStatus, EngineError, EngineResult,
    MemoryReclaim, QbitApi, RetryPolicy, with_retry,
};
use relay_telemetry::Metrics;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Attempts per engine during [`EngineConnector::initiate`].
pub const CONNECT_ATTEMPTS: u32 = 5;

/// aria2 options that only make sense per download and never become defaults.
pub const PER_DOWNLOAD_ONLY: &[&str] = &["checksum", "index-out", "out", "pause", "select-file"];

const ARIA2: &str = "aria2";
const QBIT: &str = "qbittorrent";
const WAITING_PAGE: u32 = 1_000;

/// Opens connections to the two engines.
#[async_trait]
pub trait EngineFactory: Send + Sync {
    /// Connect the websocket JSON-RPC engine.
    async fn connect_aria2(&self) -> EngineResult<Arc<dyn Aria2Api>>;
    /// Connect the REST engine.
    async fn connect_qbit(&self) -> EngineResult<Arc<dyn QbitApi>>;
}

/// Factory backed by the real clients.
#[derive(Debug, Clone)]
pub struct LiveEngineFactory {
    aria2: Aria2Settings,
    qbit: QbitSettings,
}

impl LiveEngineFactory {
    /// Factory for the configured endpoints.
    #[must_use]
    pub const fn new(aria2: Aria2Settings, qbit: QbitSettings) -> Self {
        Self { aria2, qbit }
    }
}

#[async_trait]
impl EngineFactory for LiveEngineFactory {
    async fn connect_aria2(&self) -> EngineResult<Arc<dyn Aria2Api>> {
        let client = relay_aria2::Aria2Client::connect(&self.aria2).await?;
        Ok(Arc::new(client))
    }

    async fn connect_qbit(&self) -> EngineResult<Arc<dyn QbitApi>> {
        let client = relay_qbit::QbitClient::connect(&self.qbit).await?;
        Ok(Arc::new(client))
    }
}

/// In-memory mirror of the engine's global options.
#[derive(Clone, Default)]
pub struct OptionsCache {
    inner: Arc<RwLock<DownloadOptions>>,
}

impl OptionsCache {
    /// Value cached for `key`.
    pub async fn get(&self, key: &str) -> Option<String> {
        self.inner.read().await.get(key).cloned()
    }

    /// Copy of every cached option.
    pub async fn snapshot(&self) -> DownloadOptions {
        self.inner.read().await.clone()
    }

    async fn replace(&self, options: DownloadOptions) {
        *self.inner.write().await = options;
    }

    async fn insert(&self, key: &str, value: &str) {
        self.inner
            .write()
            .await
            .insert(key.to_string(), value.to_string());
    }
}

/// Which engines came up during [`EngineConnector::initiate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineAvailability {
    /// The websocket engine is connected.
    pub aria2: bool,
    /// The REST engine is connected.
    pub qbit: bool,
}

/// Owner of the two long-lived engine handles.
pub struct EngineConnector {
    factory: Arc<dyn EngineFactory>,
    aria2: RwLock<Option<Arc<dyn Aria2Api>>>,
    qbit: RwLock<Option<Arc<dyn QbitApi>>>,
    options: OptionsCache,
    retry: RetryPolicy,
    reclaim: Arc<dyn MemoryReclaim>,
    metrics: Metrics,
}

impl EngineConnector {
    /// Connector with no live handles yet.
    #[must_use]
    pub fn new(
        factory: Arc<dyn EngineFactory>,
        reclaim: Arc<dyn MemoryReclaim>,
        metrics: Metrics,
    ) -> Self {
        Self {
            factory,
            aria2: RwLock::new(None),
            qbit: RwLock::new(None),
            options: OptionsCache::default(),
            retry: RetryPolicy::default(),
            reclaim,
            metrics,
        }
    }

    /// Override the retry policy applied to the REST engine.
    #[must_use]
    pub const fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Connect both engines, tolerating the failure of either.
    pub async fn initiate(&self) -> EngineAvailability {
        let (aria2, qbit) = tokio::join!(
            connect_with_backoff(ARIA2, &self.metrics, || self.factory.connect_aria2()),
            connect_with_backoff(QBIT, &self.metrics, || self.factory.connect_qbit()),
        );

        if let Some(aria2) = &aria2 {
            match aria2.get_global_option().await {
                Ok(options) => self.options.replace(options).await,
                Err(err) => warn!(error = %err, "could not seed aria2 options cache"),
            }
        }
        let qbit = qbit.map(|client| with_retry(client, self.retry));

        let availability = EngineAvailability {
            aria2: aria2.is_some(),
            qbit: qbit.is_some(),
        };
        self.metrics.set_engine_connected(ARIA2, availability.aria2);
        self.metrics.set_engine_connected(QBIT, availability.qbit);
        *self.aria2.write().await = aria2;
        *self.qbit.write().await = qbit;

        match (availability.aria2, availability.qbit) {
            (true, true) => info!("all engines connected"),
            (true, false) => warn!(failed = QBIT, "engine unavailable; continuing without it"),
            (false, true) => warn!(failed = ARIA2, "engine unavailable; continuing without it"),
            (false, false) => warn!("no download engine could be connected"),
        }
        availability
    }

    /// Live aria2 handle, if connected.
    pub async fn aria2(&self) -> Option<Arc<dyn Aria2Api>> {
        self.aria2.read().await.clone()
    }

    /// Live (retrying) qBittorrent handle, if connected.
    pub async fn qbit(&self) -> Option<Arc<dyn QbitApi>> {
        self.qbit.read().await.clone()
    }

    /// Global options mirrored from aria2.
    #[must_use]
    pub fn options(&self) -> OptionsCache {
        self.options.clone()
    }

    /// Close both handles concurrently, then run the memory reclaim hook.
    pub async fn close_all(&self) {
        let aria2 = self.aria2.write().await.take();
        let qbit = self.qbit.write().await.take();

        let close_aria2 = async {
            if let Some(client) = aria2
                && let Err(err) = client.close().await
            {
                warn!(engine = ARIA2, error = %err, "engine close failed");
            }
        };
        let close_qbit = async {
            if let Some(client) = qbit
                && let Err(err) = client.close().await
            {
                warn!(engine = QBIT, error = %err, "engine close failed");
            }
        };
        tokio::join!(close_aria2, close_qbit);

        self.metrics.set_engine_connected(ARIA2, false);
        self.metrics.set_engine_connected(QBIT, false);
        self.reclaim.reclaim();
        info!("engine connections closed");
    }

    /// Pause, then remove, everything on both engines. Best effort.
    pub async fn remove_all(&self) {
        let aria2 = self.aria2().await;
        let qbit = self.qbit().await;

        let pause_aria2 = async {
            if let Some(client) = &aria2 {
                log_failure(ARIA2, "force_pause_all", client.force_pause_all().await);
            }
        };
        let pause_qbit = async {
            if let Some(client) = &qbit {
                log_failure(QBIT, "torrents_stop", client.torrents_stop("all").await);
            }
        };
        tokio::join!(pause_aria2, pause_qbit);

        let delete_qbit = async {
            if let Some(client) = &qbit {
                log_failure(
                    QBIT,
                    "torrents_delete",
                    client.torrents_delete("all", true).await,
                );
            }
        };
        let delete_aria2 = async {
            if let Some(client) = &aria2 {
                let downloads = listed_downloads(client.as_ref()).await;
                let removals = downloads.iter().map(|download| async move {
                    if let Err(err) = client.force_remove(&download.gid).await {
                        debug!(gid = %download.gid, error = %err, "bulk removal skipped download");
                    }
                });
                join_all(removals).await;
                log_failure(
                    ARIA2,
                    "purge_download_result",
                    client.purge_download_result().await,
                );
            }
        };
        tokio::join!(delete_qbit, delete_aria2);
        info!("all downloads removed");
    }

    /// Apply an aria2 option to every unfinished download and, unless it is a
    /// per-download key, as the new global default.
    ///
    /// # Errors
    ///
    /// Returns an error when aria2 is not connected or the global update fails.
    pub async fn change_aria2_option(&self, key: &str, value: &str) -> EngineResult<()> {
        let client = self
            .aria2()
            .await
            .ok_or(EngineError::Unavailable { engine: ARIA2 })?;
        let mut options = DownloadOptions::new();
        options.insert(key.to_string(), value.to_string());

        let downloads = listed_downloads(client.as_ref()).await;
        let updates = downloads
            .iter()
            .filter(|download| download.status != DownloadStatus::Complete)
            .map(|download| {
                let client = Arc::clone(&client);
                let options = &options;
                async move {
                    if let Err(err) = client.change_option(&download.gid, options).await {
                        warn!(gid = %download.gid, key, error = %err, "per-download option change failed");
                    }
                }
            });
        join_all(updates).await;

        if PER_DOWNLOAD_ONLY.contains(&key) {
            return Ok(());
        }
        client.change_global_option(&options).await?;
        self.options.insert(key, value).await;
        Ok(())
    }
}

async fn connect_with_backoff<T, F, Fut>(
    engine: &'static str,
    metrics: &Metrics,
    connect: F,
) -> Option<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = EngineResult<T>>,
{
    for attempt in 0..CONNECT_ATTEMPTS {
        metrics.inc_connect_attempt(engine);
        match connect().await {
            Ok(client) => {
                info!(engine, attempt = attempt + 1, "engine connected");
                return Some(client);
            }
            Err(err) => {
                warn!(engine, attempt = attempt + 1, error = %err, "engine connection failed");
                if attempt + 1 < CONNECT_ATTEMPTS {
                    tokio::time::sleep(Duration::from_secs(1_u64 << attempt)).await;
                }
            }
        }
    }
    warn!(engine, attempts = CONNECT_ATTEMPTS, "giving up on engine");
    None
}

/// Active and waiting downloads, deduplicated; listing failures yield what was read.
async fn listed_downloads(client: &dyn Aria2Api) -> Vec<DownloadSnapshot> {
    let mut downloads = Vec::new();
    match client.tell_active().await {
        Ok(active) => downloads.extend(active),
        Err(err) => warn!(error = %err, "could not list active downloads"),
    }
    match client.tell_waiting(0, WAITING_PAGE).await {
        Ok(waiting) => downloads.extend(waiting),
        Err(err) => warn!(error = %err, "could not list waiting downloads"),
    }
    let mut seen = BTreeSet::new();
    downloads.retain(|download| seen.insert(download.gid.clone()));
    downloads
}

fn log_failure(engine: &'static str, operation: &'static str, outcome: EngineResult<()>) {
    if let Err(err) = outcome {
        warn!(engine, operation, error = %err, "engine call failed");
    }
}
