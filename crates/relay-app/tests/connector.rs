mod support;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use relay_app::{EngineConnector, ListenerContext, Relay};
use relay_core::{DownloadOptions, DownloadStatus, EngineError, Gid, RetryPolicy, TaskDict};
use relay_telemetry::Metrics;
use relay_test_support::fixtures::http_snapshot;
use relay_test_support::mocks::{
    Aria2Call, CountingReclaim, Failure, MockAria2, MockQbit, RecordingCleaner, RecordingMessenger,
    StaticDuplicateCheck,
};
use support::{Harness, StaticFactory};

fn connector(factory: StaticFactory) -> (Arc<StaticFactory>, EngineConnector, Metrics) {
    let factory = Arc::new(factory);
    let metrics = Metrics::new().expect("metrics");
    let connector = EngineConnector::new(
        factory.clone(),
        Arc::new(CountingReclaim::default()),
        metrics.clone(),
    );
    (factory, connector, metrics)
}

fn option(key: &str, value: &str) -> DownloadOptions {
    let mut options = DownloadOptions::new();
    options.insert(key.to_string(), value.to_string());
    options
}

#[tokio::test(start_paused = true)]
async fn initiate_retries_with_doubling_backoff() {
    let (factory, connector, metrics) = connector(
        StaticFactory::new(Arc::new(MockAria2::new()), Arc::new(MockQbit::new())).failing_aria2(3),
    );

    let started = tokio::time::Instant::now();
    let availability = connector.initiate().await;

    assert!(availability.aria2 && availability.qbit);
    assert_eq!(factory.aria2_attempts.load(Ordering::SeqCst), 4);
    assert_eq!(factory.qbit_attempts.load(Ordering::SeqCst), 1);
    assert_eq!(started.elapsed(), Duration::from_secs(1 + 2 + 4));
    assert_eq!(metrics.connect_attempts("aria2"), 4);
    assert!(metrics.snapshot().aria2_connected);
}

#[tokio::test(start_paused = true)]
async fn failed_engine_is_left_unset_while_the_other_works() {
    let (factory, connector, metrics) = connector(
        StaticFactory::new(Arc::new(MockAria2::new()), Arc::new(MockQbit::new())).failing_qbit(10),
    );

    let started = tokio::time::Instant::now();
    let availability = connector.initiate().await;

    assert!(availability.aria2);
    assert!(!availability.qbit);
    assert_eq!(factory.qbit_attempts.load(Ordering::SeqCst), 5);
    assert_eq!(started.elapsed(), Duration::from_secs(1 + 2 + 4 + 8));
    assert!(connector.aria2().await.is_some());
    assert!(connector.qbit().await.is_none());
    let snapshot = metrics.snapshot();
    assert!(snapshot.aria2_connected);
    assert!(!snapshot.qbit_connected);
}

#[tokio::test(start_paused = true)]
async fn options_cache_is_seeded_from_global_options() {
    let aria2 = Arc::new(MockAria2::new());
    aria2.set_global_options(option("max-concurrent-downloads", "3"));
    let (_factory, connector, _metrics) =
        connector(StaticFactory::new(aria2, Arc::new(MockQbit::new())));

    connector.initiate().await;

    assert_eq!(
        connector.options().get("max-concurrent-downloads").await,
        Some("3".to_string())
    );
}

#[tokio::test(start_paused = true)]
async fn qbit_handle_is_retry_wrapped() {
    let qbit = Arc::new(MockQbit::new());
    qbit.flaky("transfer_info", 2);
    let (_factory, connector, _metrics) = connector(StaticFactory::new(
        Arc::new(MockAria2::new()),
        qbit.clone(),
    ));
    let connector = connector.with_retry_policy(RetryPolicy {
        max_attempts: 3,
        ..RetryPolicy::default()
    });
    connector.initiate().await;

    let client = connector.qbit().await.expect("qbit connected");
    assert!(client.is_retrying());
    client.transfer_info().await.expect("third attempt succeeds");
    assert_eq!(qbit.count("transfer_info"), 3);
}

#[tokio::test(start_paused = true)]
async fn change_option_updates_unfinished_downloads_and_defaults() {
    let harness = Harness::new().await;
    let active = http_snapshot("active", DownloadStatus::Active, "/dl", "a/1.bin");
    let done = http_snapshot("done", DownloadStatus::Complete, "/dl", "a/2.bin");
    let waiting = http_snapshot("waiting", DownloadStatus::Waiting, "/dl", "a/3.bin");
    harness.aria2.set_active(vec![active, done]);
    harness.aria2.set_waiting(vec![waiting]);
    harness
        .aria2
        .fail_for("change_option", &Gid::from("waiting"), Failure::Transient);

    harness
        .connector
        .change_aria2_option("max-download-limit", "1M")
        .await
        .expect("global update");

    let limit = option("max-download-limit", "1M");
    let aria2 = &harness.aria2;
    assert_eq!(
        aria2.count(&Aria2Call::ChangeOption(Gid::from("active"), limit.clone())),
        1
    );
    assert_eq!(
        aria2.count(&Aria2Call::ChangeOption(Gid::from("waiting"), limit.clone())),
        1
    );
    assert_eq!(
        aria2.count(&Aria2Call::ChangeOption(Gid::from("done"), limit.clone())),
        0
    );
    assert_eq!(aria2.count(&Aria2Call::ChangeGlobalOption(limit)), 1);
    assert_eq!(
        harness.connector.options().get("max-download-limit").await,
        Some("1M".to_string())
    );
}

#[tokio::test(start_paused = true)]
async fn per_download_keys_never_become_defaults() {
    let harness = Harness::new().await;
    harness
        .aria2
        .set_active(vec![http_snapshot("a", DownloadStatus::Active, "/dl", "x/1")]);

    for key in ["checksum", "index-out", "out", "pause", "select-file"] {
        harness
            .connector
            .change_aria2_option(key, "1")
            .await
            .expect("per-download change");
    }

    assert!(
        harness
            .aria2
            .calls()
            .iter()
            .all(|call| !matches!(call, Aria2Call::ChangeGlobalOption(_)))
    );
    assert_eq!(harness.connector.options().get("out").await, None);
}

#[tokio::test(start_paused = true)]
async fn change_option_requires_aria2() {
    let (_factory, connector, _metrics) = connector(
        StaticFactory::new(Arc::new(MockAria2::new()), Arc::new(MockQbit::new())).failing_aria2(5),
    );
    connector.initiate().await;

    let err = connector
        .change_aria2_option("max-download-limit", "1M")
        .await
        .expect_err("aria2 unavailable");
    assert!(matches!(err, EngineError::Unavailable { engine: "aria2" }));
}

#[tokio::test(start_paused = true)]
async fn remove_all_pauses_then_removes_everything() {
    let harness = Harness::new().await;
    harness.aria2.set_active(vec![
        http_snapshot("one", DownloadStatus::Active, "/dl", "a/1"),
        http_snapshot("stuck", DownloadStatus::Active, "/dl", "a/2"),
    ]);
    harness
        .aria2
        .set_waiting(vec![http_snapshot("two", DownloadStatus::Waiting, "/dl", "a/3")]);
    harness
        .aria2
        .fail_for("force_remove", &Gid::from("stuck"), Failure::Rejected);

    harness.connector.remove_all().await;

    let aria2 = &harness.aria2;
    assert_eq!(aria2.count(&Aria2Call::ForcePauseAll), 1);
    for gid in ["one", "stuck", "two"] {
        assert_eq!(aria2.count(&Aria2Call::ForceRemove(Gid::from(gid))), 1, "{gid}");
    }
    assert_eq!(aria2.count(&Aria2Call::PurgeDownloadResult), 1);
    assert_eq!(
        harness.qbit.calls(),
        vec![
            "torrents_stop(all)".to_string(),
            "torrents_delete(all,true)".to_string()
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn close_all_swallows_errors_and_reclaims() {
    let harness = Harness::new().await;
    harness.aria2.fail("close", Failure::Transient);

    harness.connector.close_all().await;

    assert_eq!(harness.aria2.count(&Aria2Call::Close), 1);
    assert_eq!(harness.qbit.count("close"), 1);
    assert_eq!(harness.reclaim.runs(), 1);
    assert!(harness.connector.aria2().await.is_none());
    assert!(harness.connector.qbit().await.is_none());
    let snapshot = harness.metrics.snapshot();
    assert!(!snapshot.aria2_connected && !snapshot.qbit_connected);
}

#[tokio::test(start_paused = true)]
async fn relay_registers_listener_and_shuts_down() {
    let aria2 = Arc::new(MockAria2::new());
    let qbit = Arc::new(MockQbit::new());
    let reclaim = Arc::new(CountingReclaim::default());
    let metrics = Metrics::new().expect("metrics");
    let ctx = ListenerContext::new(
        TaskDict::new(),
        Arc::new(RecordingMessenger::new()),
        Arc::new(StaticDuplicateCheck::unique()),
        Arc::new(RecordingCleaner::new()),
        metrics.clone(),
    );
    let stop = ctx.stop.clone();

    let relay = Relay::start(
        Arc::new(StaticFactory::new(aria2.clone(), qbit.clone())),
        ctx,
        reclaim.clone(),
    )
    .await;

    assert!(relay.availability().aria2);
    assert_eq!(aria2.bus().subscriber_count(), 1);
    assert!(!relay.listener().register(&aria2.bus()));

    relay.shutdown().await;

    assert!(stop.is_set());
    assert_eq!(reclaim.runs(), 1);
    assert!(relay.connector().aria2().await.is_none());
}
