//! Shared harness wiring the recording fakes into a connector and listener.
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use relay_app::{Aria2Listener, EngineConnector, EngineFactory, ListenerContext};
use relay_core::{
    Aria2Api, EngineError, EngineResult, Gid, QbitApi, TaskDict, TaskEntry, TaskListener,
};
use relay_telemetry::Metrics;
use relay_test_support::mocks::{
    CountingReclaim, MockAria2, MockQbit, RecordingCleaner, RecordingListener, RecordingMessenger,
    StaticDuplicateCheck,
};

/// Factory handing out the same fakes, optionally failing the first attempts.
pub struct StaticFactory {
    pub aria2: Arc<MockAria2>,
    pub qbit: Arc<MockQbit>,
    aria2_failures: AtomicUsize,
    qbit_failures: AtomicUsize,
    pub aria2_attempts: AtomicUsize,
    pub qbit_attempts: AtomicUsize,
}

impl StaticFactory {
    pub fn new(aria2: Arc<MockAria2>, qbit: Arc<MockQbit>) -> Self {
        Self {
            aria2,
            qbit,
            aria2_failures: AtomicUsize::new(0),
            qbit_failures: AtomicUsize::new(0),
            aria2_attempts: AtomicUsize::new(0),
            qbit_attempts: AtomicUsize::new(0),
        }
    }

    pub fn failing_aria2(self, times: usize) -> Self {
        self.aria2_failures.store(times, Ordering::SeqCst);
        self
    }

    pub fn failing_qbit(self, times: usize) -> Self {
        self.qbit_failures.store(times, Ordering::SeqCst);
        self
    }
}

fn take_failure(budget: &AtomicUsize) -> bool {
    budget
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl EngineFactory for StaticFactory {
    async fn connect_aria2(&self) -> EngineResult<Arc<dyn Aria2Api>> {
        self.aria2_attempts.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.aria2_failures) {
            return Err(EngineError::Connection {
                engine: "aria2",
                message: "refused".to_string(),
            });
        }
        Ok(self.aria2.clone())
    }

    async fn connect_qbit(&self) -> EngineResult<Arc<dyn QbitApi>> {
        self.qbit_attempts.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.qbit_failures) {
            return Err(EngineError::Connection {
                engine: "qbittorrent",
                message: "refused".to_string(),
            });
        }
        Ok(self.qbit.clone())
    }
}

/// Connected connector and listener over recording fakes.
pub struct Harness {
    pub aria2: Arc<MockAria2>,
    pub qbit: Arc<MockQbit>,
    pub tasks: TaskDict,
    pub messenger: Arc<RecordingMessenger>,
    pub duplicates: Arc<StaticDuplicateCheck>,
    pub cleaner: Arc<RecordingCleaner>,
    pub reclaim: Arc<CountingReclaim>,
    pub metrics: Metrics,
    pub ctx: ListenerContext,
    pub connector: Arc<EngineConnector>,
    pub listener: Aria2Listener,
}

impl Harness {
    pub async fn new() -> Self {
        Self::build(StaticDuplicateCheck::unique(), None).await
    }

    pub async fn with_base_url(base_url: &str) -> Self {
        Self::build(StaticDuplicateCheck::unique(), Some(base_url)).await
    }

    pub async fn build(duplicates: StaticDuplicateCheck, base_url: Option<&str>) -> Self {
        let aria2 = Arc::new(MockAria2::new());
        let qbit = Arc::new(MockQbit::new());
        let tasks = TaskDict::new();
        let messenger = Arc::new(RecordingMessenger::new());
        let duplicates = Arc::new(duplicates);
        let cleaner = Arc::new(RecordingCleaner::new());
        let reclaim = Arc::new(CountingReclaim::default());
        let metrics = Metrics::new().expect("metrics");

        let mut ctx = ListenerContext::new(
            tasks.clone(),
            messenger.clone(),
            duplicates.clone(),
            cleaner.clone(),
            metrics.clone(),
        );
        if let Some(base_url) = base_url {
            ctx = ctx.with_base_url(base_url);
        }
        let factory = Arc::new(StaticFactory::new(aria2.clone(), qbit.clone()));
        let connector = Arc::new(EngineConnector::new(
            factory,
            reclaim.clone(),
            metrics.clone(),
        ));
        let availability = connector.initiate().await;
        assert!(availability.aria2 && availability.qbit);
        let listener = Aria2Listener::new(connector.clone(), ctx.clone());

        Self {
            aria2,
            qbit,
            tasks,
            messenger,
            duplicates,
            cleaner,
            reclaim,
            metrics,
            ctx,
            connector,
            listener,
        }
    }

    /// Register `listener` under `message_id`, bound to `gid`.
    pub async fn add_task(
        &self,
        message_id: i64,
        gid: &str,
        listener: RecordingListener,
    ) -> Arc<RecordingListener> {
        self.add_entry(message_id, gid, listener, |entry| entry).await
    }

    /// Like [`Harness::add_task`] with a hook to adjust the entry.
    pub async fn add_entry(
        &self,
        message_id: i64,
        gid: &str,
        listener: RecordingListener,
        adjust: impl FnOnce(TaskEntry) -> TaskEntry,
    ) -> Arc<RecordingListener> {
        let listener = Arc::new(listener);
        let facade: Arc<dyn TaskListener> = listener.clone();
        self.tasks
            .insert(message_id, adjust(TaskEntry::new(Gid::from(gid), facade)))
            .await;
        listener
    }
}
