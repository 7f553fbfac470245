//! Recording fakes for both engines and every task collaborator.
//!
//! Each fake records what was asked of it so tests assert on interactions,
//! and exposes knobs to script responses or inject failures.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use relay_core::{
    Aria2Api, ButtonMarkup, ChatRef, DownloadOptions, DownloadSnapshot, DuplicateCheck,
    EngineError, EngineResult, EventBus, Gid, GlobalStat, MemoryReclaim, Messenger, QbitApi,
    SentMessage, TaskListener, TransferInfo, UnwantedFileCleaner,
};
use serde_json::{Map, Value};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Kind of failure to inject into a fake engine call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// The engine no longer knows the GID.
    NotFound,
    /// A retryable transport failure.
    Transient,
    /// A non-retryable rejection.
    Rejected,
}

impl Failure {
    fn to_error(self, engine: &'static str, gid: Option<&Gid>) -> EngineError {
        match self {
            Self::NotFound => EngineError::GidNotFound { gid: gid.cloned() },
            Self::Transient => EngineError::Transport {
                engine,
                message: "injected transport failure".to_string(),
            },
            Self::Rejected => EngineError::Rpc {
                code: 1,
                message: "injected rejection".to_string(),
            },
        }
    }
}

/// One scripted `tellStatus` answer.
#[derive(Debug, Clone)]
pub enum Scripted {
    /// Return this snapshot.
    Snapshot(DownloadSnapshot),
    /// Fail with this kind.
    Fail(Failure),
}

/// Every call the aria2 fake received, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Aria2Call {
    /// `tellStatus`.
    TellStatus(Gid),
    /// `getOption`.
    GetOption(Gid),
    /// `changeOption`.
    ChangeOption(Gid, DownloadOptions),
    /// `changeGlobalOption`.
    ChangeGlobalOption(DownloadOptions),
    /// `forceRemove`.
    ForceRemove(Gid),
    /// `forcePause`.
    ForcePause(Gid),
    /// `forcePauseAll`.
    ForcePauseAll,
    /// `removeDownloadResult`.
    RemoveDownloadResult(Gid),
    /// `purgeDownloadResult`.
    PurgeDownloadResult,
    /// `tellActive`.
    TellActive,
    /// `tellWaiting`.
    TellWaiting,
    /// `getGlobalStat`.
    GetGlobalStat,
    /// `getGlobalOption`.
    GetGlobalOption,
    /// `close`.
    Close,
}

impl Aria2Call {
    /// Whether the call changes engine state.
    #[must_use]
    pub const fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::ChangeOption(..)
                | Self::ChangeGlobalOption(_)
                | Self::ForceRemove(_)
                | Self::ForcePause(_)
                | Self::ForcePauseAll
                | Self::RemoveDownloadResult(_)
                | Self::PurgeDownloadResult
        )
    }

    const fn method(&self) -> &'static str {
        match self {
            Self::TellStatus(_) => "tell_status",
            Self::GetOption(_) => "get_option",
            Self::ChangeOption(..) => "change_option",
            Self::ChangeGlobalOption(_) => "change_global_option",
            Self::ForceRemove(_) => "force_remove",
            Self::ForcePause(_) => "force_pause",
            Self::ForcePauseAll => "force_pause_all",
            Self::RemoveDownloadResult(_) => "remove_download_result",
            Self::PurgeDownloadResult => "purge_download_result",
            Self::TellActive => "tell_active",
            Self::TellWaiting => "tell_waiting",
            Self::GetGlobalStat => "get_global_stat",
            Self::GetGlobalOption => "get_global_option",
            Self::Close => "close",
        }
    }
}

/// Scripted, recording aria2 engine.
///
/// Unscripted GIDs answer `tellStatus` with not-found. A script with several
/// answers is consumed front to back and its last answer repeats.
#[derive(Default)]
pub struct MockAria2 {
    statuses: Mutex<HashMap<Gid, VecDeque<Scripted>>>,
    options: Mutex<HashMap<Gid, DownloadOptions>>,
    global_options: Mutex<DownloadOptions>,
    active: Mutex<Vec<DownloadSnapshot>>,
    waiting: Mutex<Vec<DownloadSnapshot>>,
    failures: Mutex<HashMap<&'static str, Failure>>,
    gid_failures: Mutex<HashMap<(&'static str, Gid), Failure>>,
    calls: Mutex<Vec<Aria2Call>>,
    events: EventBus,
}

impl MockAria2 {
    /// Empty engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every `tellStatus` for the snapshot's GID with `snapshot`.
    pub fn set_status(&self, snapshot: DownloadSnapshot) {
        let gid = snapshot.gid.clone();
        self.script_status(&gid, vec![Scripted::Snapshot(snapshot)]);
    }

    /// Replace the `tellStatus` script for `gid`.
    pub fn script_status(&self, gid: &Gid, script: Vec<Scripted>) {
        lock(&self.statuses).insert(gid.clone(), script.into());
    }

    /// Per-download options returned by `getOption`.
    pub fn set_options(&self, gid: &Gid, options: DownloadOptions) {
        lock(&self.options).insert(gid.clone(), options);
    }

    /// Options returned by `getGlobalOption`.
    pub fn set_global_options(&self, options: DownloadOptions) {
        *lock(&self.global_options) = options;
    }

    /// Downloads returned by `tellActive`.
    pub fn set_active(&self, downloads: Vec<DownloadSnapshot>) {
        *lock(&self.active) = downloads;
    }

    /// Downloads returned by `tellWaiting`.
    pub fn set_waiting(&self, downloads: Vec<DownloadSnapshot>) {
        *lock(&self.waiting) = downloads;
    }

    /// Fail every call of `method` (snake case, e.g. `force_remove`).
    pub fn fail(&self, method: &'static str, failure: Failure) {
        lock(&self.failures).insert(method, failure);
    }

    /// Fail calls of `method` that target `gid`.
    pub fn fail_for(&self, method: &'static str, gid: &Gid, failure: Failure) {
        lock(&self.gid_failures).insert((method, gid.clone()), failure);
    }

    /// Bus the fake publishes on; tests push notifications through it.
    #[must_use]
    pub fn bus(&self) -> EventBus {
        self.events.clone()
    }

    /// Every call received so far.
    #[must_use]
    pub fn calls(&self) -> Vec<Aria2Call> {
        lock(&self.calls).clone()
    }

    /// Calls that changed engine state.
    #[must_use]
    pub fn mutations(&self) -> Vec<Aria2Call> {
        self.calls()
            .into_iter()
            .filter(Aria2Call::is_mutation)
            .collect()
    }

    /// Number of calls equal to `call`.
    #[must_use]
    pub fn count(&self, call: &Aria2Call) -> usize {
        lock(&self.calls).iter().filter(|seen| *seen == call).count()
    }

    fn record(&self, call: Aria2Call, gid: Option<&Gid>) -> EngineResult<()> {
        let method = call.method();
        lock(&self.calls).push(call);
        if let Some(gid) = gid
            && let Some(failure) = lock(&self.gid_failures).get(&(method, gid.clone()))
        {
            return Err(failure.to_error("aria2", Some(gid)));
        }
        match lock(&self.failures).get(method) {
            Some(failure) => Err(failure.to_error("aria2", gid)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Aria2Api for MockAria2 {
    async fn tell_status(&self, gid: &Gid) -> EngineResult<DownloadSnapshot> {
        self.record(Aria2Call::TellStatus(gid.clone()), Some(gid))?;
        let mut statuses = lock(&self.statuses);
        let Some(script) = statuses.get_mut(gid) else {
            return Err(EngineError::GidNotFound {
                gid: Some(gid.clone()),
            });
        };
        let answer = if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        };
        match answer {
            Some(Scripted::Snapshot(snapshot)) => Ok(snapshot),
            Some(Scripted::Fail(failure)) => Err(failure.to_error("aria2", Some(gid))),
            None => Err(EngineError::GidNotFound {
                gid: Some(gid.clone()),
            }),
        }
    }

    async fn get_option(&self, gid: &Gid) -> EngineResult<DownloadOptions> {
        self.record(Aria2Call::GetOption(gid.clone()), Some(gid))?;
        Ok(lock(&self.options).get(gid).cloned().unwrap_or_default())
    }

    async fn change_option(&self, gid: &Gid, options: &DownloadOptions) -> EngineResult<()> {
        self.record(Aria2Call::ChangeOption(gid.clone(), options.clone()), Some(gid))
    }

    async fn change_global_option(&self, options: &DownloadOptions) -> EngineResult<()> {
        self.record(Aria2Call::ChangeGlobalOption(options.clone()), None)?;
        lock(&self.global_options).extend(options.clone());
        Ok(())
    }

    async fn force_remove(&self, gid: &Gid) -> EngineResult<()> {
        self.record(Aria2Call::ForceRemove(gid.clone()), Some(gid))
    }

    async fn force_pause(&self, gid: &Gid) -> EngineResult<()> {
        self.record(Aria2Call::ForcePause(gid.clone()), Some(gid))
    }

    async fn force_pause_all(&self) -> EngineResult<()> {
        self.record(Aria2Call::ForcePauseAll, None)
    }

    async fn remove_download_result(&self, gid: &Gid) -> EngineResult<()> {
        self.record(Aria2Call::RemoveDownloadResult(gid.clone()), Some(gid))
    }

    async fn purge_download_result(&self) -> EngineResult<()> {
        self.record(Aria2Call::PurgeDownloadResult, None)
    }

    async fn tell_active(&self) -> EngineResult<Vec<DownloadSnapshot>> {
        self.record(Aria2Call::TellActive, None)?;
        Ok(lock(&self.active).clone())
    }

    async fn tell_waiting(&self, offset: i64, count: u32) -> EngineResult<Vec<DownloadSnapshot>> {
        self.record(Aria2Call::TellWaiting, None)?;
        let waiting = lock(&self.waiting);
        let start = usize::try_from(offset.max(0)).unwrap_or(usize::MAX);
        let count = usize::try_from(count).unwrap_or(usize::MAX);
        Ok(waiting.iter().skip(start).take(count).cloned().collect())
    }

    async fn get_global_stat(&self) -> EngineResult<GlobalStat> {
        self.record(Aria2Call::GetGlobalStat, None)?;
        let active = u64::try_from(lock(&self.active).len()).unwrap_or(u64::MAX);
        let waiting = u64::try_from(lock(&self.waiting).len()).unwrap_or(u64::MAX);
        Ok(GlobalStat {
            num_active: active,
            num_waiting: waiting,
            ..GlobalStat::default()
        })
    }

    async fn get_global_option(&self) -> EngineResult<DownloadOptions> {
        self.record(Aria2Call::GetGlobalOption, None)?;
        Ok(lock(&self.global_options).clone())
    }

    fn notifications(&self) -> EventBus {
        self.events.clone()
    }

    async fn close(&self) -> EngineResult<()> {
        self.record(Aria2Call::Close, None)
    }
}

/// Recording qBittorrent engine with per-method transient failure budgets.
#[derive(Default)]
pub struct MockQbit {
    calls: Mutex<Vec<String>>,
    preferences: Mutex<Map<String, Value>>,
    flaky: Mutex<HashMap<&'static str, usize>>,
    failures: Mutex<HashMap<&'static str, Failure>>,
}

impl MockQbit {
    /// Empty engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `times` calls of `method` with a transient error.
    pub fn flaky(&self, method: &'static str, times: usize) {
        lock(&self.flaky).insert(method, times);
    }

    /// Fail every call of `method`.
    pub fn fail(&self, method: &'static str, failure: Failure) {
        lock(&self.failures).insert(method, failure);
    }

    /// Calls in order, rendered as `method` or `method(args)`.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    /// Number of calls to `method`, regardless of arguments.
    #[must_use]
    pub fn count(&self, method: &str) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|call| call.split('(').next() == Some(method))
            .count()
    }

    fn record(&self, method: &'static str, call: String) -> EngineResult<()> {
        lock(&self.calls).push(call);
        if let Some(failure) = lock(&self.failures).get(method) {
            return Err(failure.to_error("qbittorrent", None));
        }
        let mut flaky = lock(&self.flaky);
        if let Some(remaining) = flaky.get_mut(method)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(Failure::Transient.to_error("qbittorrent", None));
        }
        Ok(())
    }
}

#[async_trait]
impl QbitApi for MockQbit {
    async fn app_preferences(&self) -> EngineResult<Map<String, Value>> {
        self.record("app_preferences", "app_preferences".to_string())?;
        Ok(lock(&self.preferences).clone())
    }

    async fn set_preferences(&self, preferences: &Map<String, Value>) -> EngineResult<()> {
        self.record("set_preferences", "set_preferences".to_string())?;
        lock(&self.preferences).extend(preferences.clone());
        Ok(())
    }

    async fn transfer_info(&self) -> EngineResult<TransferInfo> {
        self.record("transfer_info", "transfer_info".to_string())?;
        Ok(TransferInfo::default())
    }

    async fn torrents_stop(&self, hashes: &str) -> EngineResult<()> {
        self.record("torrents_stop", format!("torrents_stop({hashes})"))
    }

    async fn torrents_delete(&self, hashes: &str, delete_files: bool) -> EngineResult<()> {
        self.record(
            "torrents_delete",
            format!("torrents_delete({hashes},{delete_files})"),
        )
    }

    async fn close(&self) -> EngineResult<()> {
        self.record("close", "close".to_string())
    }
}

#[derive(Debug, Clone)]
struct ListenerState {
    name: String,
    is_torrent: bool,
    select: bool,
    seed: bool,
    cancelled: bool,
    completions: usize,
    download_errors: Vec<(String, Option<ButtonMarkup>)>,
    upload_errors: Vec<String>,
    fail_error_path: bool,
}

type Hook = Box<dyn Fn() + Send + Sync>;

/// Task listener that records every callback.
pub struct RecordingListener {
    chat: ChatRef,
    state: Mutex<ListenerState>,
    on_complete: Option<Hook>,
}

impl RecordingListener {
    /// Listener for a task started by `message_id` in `chat_id`.
    #[must_use]
    pub fn new(chat_id: i64, message_id: i64) -> Self {
        Self {
            chat: ChatRef {
                chat_id,
                message_id,
            },
            state: Mutex::new(ListenerState {
                name: String::new(),
                is_torrent: false,
                select: false,
                seed: false,
                cancelled: false,
                completions: 0,
                download_errors: Vec::new(),
                upload_errors: Vec::new(),
                fail_error_path: false,
            }),
            on_complete: None,
        }
    }

    /// Name already known from submission.
    #[must_use]
    pub fn with_name(self, name: &str) -> Self {
        lock(&self.state).name = name.to_string();
        self
    }

    /// User asked for file selection.
    #[must_use]
    pub fn with_select(self) -> Self {
        lock(&self.state).select = true;
        self
    }

    /// User asked to seed after download.
    #[must_use]
    pub fn with_seed(self) -> Self {
        lock(&self.state).seed = true;
        self
    }

    /// Task was cancelled by the user.
    #[must_use]
    pub fn cancelled(self) -> Self {
        lock(&self.state).cancelled = true;
        self
    }

    /// Make `on_download_error` itself fail.
    #[must_use]
    pub fn failing_error_path(self) -> Self {
        lock(&self.state).fail_error_path = true;
        self
    }

    /// Run `hook` inside `on_download_complete`.
    #[must_use]
    pub fn on_complete(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_complete = Some(Box::new(hook));
        self
    }

    /// Times `on_download_complete` ran.
    #[must_use]
    pub fn completions(&self) -> usize {
        lock(&self.state).completions
    }

    /// Reasons passed to `on_download_error`.
    #[must_use]
    pub fn download_errors(&self) -> Vec<String> {
        lock(&self.state)
            .download_errors
            .iter()
            .map(|(reason, _)| reason.clone())
            .collect()
    }

    /// Buttons passed alongside each download error.
    #[must_use]
    pub fn download_error_buttons(&self) -> Vec<Option<ButtonMarkup>> {
        lock(&self.state)
            .download_errors
            .iter()
            .map(|(_, buttons)| buttons.clone())
            .collect()
    }

    /// Reasons passed to `on_upload_error`.
    #[must_use]
    pub fn upload_errors(&self) -> Vec<String> {
        lock(&self.state).upload_errors.clone()
    }
}

#[async_trait]
impl TaskListener for RecordingListener {
    fn name(&self) -> String {
        lock(&self.state).name.clone()
    }

    fn set_name(&self, name: String) {
        lock(&self.state).name = name;
    }

    fn is_torrent(&self) -> bool {
        lock(&self.state).is_torrent
    }

    fn set_is_torrent(&self, value: bool) {
        lock(&self.state).is_torrent = value;
    }

    fn select(&self) -> bool {
        lock(&self.state).select
    }

    fn seed(&self) -> bool {
        lock(&self.state).seed
    }

    fn is_cancelled(&self) -> bool {
        lock(&self.state).cancelled
    }

    fn message(&self) -> ChatRef {
        self.chat
    }

    async fn on_download_complete(&self) -> anyhow::Result<()> {
        lock(&self.state).completions += 1;
        if let Some(hook) = &self.on_complete {
            hook();
        }
        Ok(())
    }

    async fn on_download_error(
        &self,
        reason: String,
        buttons: Option<ButtonMarkup>,
    ) -> anyhow::Result<()> {
        let mut state = lock(&self.state);
        state.download_errors.push((reason, buttons));
        if state.fail_error_path {
            return Err(anyhow!("error path unavailable"));
        }
        Ok(())
    }

    async fn on_upload_error(&self, reason: String) -> anyhow::Result<()> {
        lock(&self.state).upload_errors.push(reason);
        Ok(())
    }
}

/// Message sent through [`RecordingMessenger`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sent {
    /// Target chat.
    pub chat: ChatRef,
    /// Message text.
    pub text: String,
    /// Attached buttons.
    pub buttons: Option<ButtonMarkup>,
    /// Handle returned to the caller.
    pub message: SentMessage,
}

/// Messenger that records deliveries instead of talking to a chat service.
#[derive(Default)]
pub struct RecordingMessenger {
    next_id: AtomicI64,
    sent: Mutex<Vec<Sent>>,
    deleted: Mutex<Vec<SentMessage>>,
    auto_deletes: Mutex<Vec<(SentMessage, Duration)>>,
    status_updates: Mutex<Vec<i64>>,
}

impl RecordingMessenger {
    /// Empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages sent so far.
    #[must_use]
    pub fn sent(&self) -> Vec<Sent> {
        lock(&self.sent).clone()
    }

    /// Messages deleted so far.
    #[must_use]
    pub fn deleted(&self) -> Vec<SentMessage> {
        lock(&self.deleted).clone()
    }

    /// Auto-deletions scheduled so far.
    #[must_use]
    pub fn auto_deletes(&self) -> Vec<(SentMessage, Duration)> {
        lock(&self.auto_deletes).clone()
    }

    /// Chats whose status message was refreshed.
    #[must_use]
    pub fn status_updates(&self) -> Vec<i64> {
        lock(&self.status_updates).clone()
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send(
        &self,
        chat: ChatRef,
        text: &str,
        buttons: Option<ButtonMarkup>,
    ) -> anyhow::Result<SentMessage> {
        let message = SentMessage {
            chat_id: chat.chat_id,
            message_id: 1_000 + self.next_id.fetch_add(1, Ordering::Relaxed),
        };
        lock(&self.sent).push(Sent {
            chat,
            text: text.to_string(),
            buttons,
            message,
        });
        Ok(message)
    }

    async fn delete(&self, message: SentMessage) -> anyhow::Result<()> {
        lock(&self.deleted).push(message);
        Ok(())
    }

    fn schedule_auto_delete(&self, message: SentMessage, after: Duration) {
        lock(&self.auto_deletes).push((message, after));
    }

    async fn push_status_update(&self, chat_id: i64) -> anyhow::Result<()> {
        lock(&self.status_updates).push(chat_id);
        Ok(())
    }
}

/// Duplicate check with a fixed verdict.
#[derive(Default)]
pub struct StaticDuplicateCheck {
    verdict: Option<(String, Option<ButtonMarkup>)>,
    checked: Mutex<Vec<String>>,
}

impl StaticDuplicateCheck {
    /// Never reports a duplicate.
    #[must_use]
    pub fn unique() -> Self {
        Self::default()
    }

    /// Reports every download as a duplicate with `message`.
    #[must_use]
    pub fn duplicate(message: impl Into<String>, buttons: Option<ButtonMarkup>) -> Self {
        Self {
            verdict: Some((message.into(), buttons)),
            checked: Mutex::new(Vec::new()),
        }
    }

    /// Listener names checked so far.
    #[must_use]
    pub fn checked(&self) -> Vec<String> {
        lock(&self.checked).clone()
    }
}

#[async_trait]
impl DuplicateCheck for StaticDuplicateCheck {
    async fn check(&self, listener: &dyn TaskListener) -> (Option<String>, Option<ButtonMarkup>) {
        lock(&self.checked).push(listener.name());
        match &self.verdict {
            Some((message, buttons)) => (Some(message.clone()), buttons.clone()),
            None => (None, None),
        }
    }
}

/// Unwanted-file cleaner that records the directories it was asked to sweep.
#[derive(Default)]
pub struct RecordingCleaner {
    dirs: Mutex<Vec<String>>,
}

impl RecordingCleaner {
    /// Empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Directories swept so far.
    #[must_use]
    pub fn dirs(&self) -> Vec<String> {
        lock(&self.dirs).clone()
    }
}

#[async_trait]
impl UnwantedFileCleaner for RecordingCleaner {
    async fn clean_unwanted(&self, dir: &str) -> anyhow::Result<()> {
        lock(&self.dirs).push(dir.to_string());
        Ok(())
    }
}

/// Memory reclaim hook that counts invocations.
#[derive(Default)]
pub struct CountingReclaim {
    runs: AtomicUsize,
}

impl CountingReclaim {
    /// Times the hook ran.
    #[must_use]
    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

impl MemoryReclaim for CountingReclaim {
    fn reclaim(&self) {
        self.runs.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::DownloadStatus;

    #[tokio::test]
    async fn scripts_are_consumed_then_repeat() {
        let engine = MockAria2::new();
        let gid = Gid::from("abc");
        engine.script_status(
            &gid,
            vec![
                Scripted::Fail(Failure::Transient),
                Scripted::Snapshot(DownloadSnapshot::new(gid.clone(), DownloadStatus::Active)),
            ],
        );
        assert!(engine.tell_status(&gid).await.is_err());
        for _ in 0..2 {
            let snapshot = engine.tell_status(&gid).await.expect("scripted");
            assert_eq!(snapshot.status, DownloadStatus::Active);
        }
        assert!(
            engine
                .tell_status(&Gid::from("zzz"))
                .await
                .is_err_and(|err| err.is_not_found())
        );
        assert!(engine.mutations().is_empty());
    }

    #[tokio::test]
    async fn injected_failures_still_record() {
        let engine = MockAria2::new();
        let gid = Gid::from("abc");
        engine.fail_for("force_remove", &gid, Failure::NotFound);
        assert!(engine.force_remove(&gid).await.is_err());
        assert!(engine.force_remove(&Gid::from("other")).await.is_ok());
        assert_eq!(engine.count(&Aria2Call::ForceRemove(gid)), 1);
        assert_eq!(engine.mutations().len(), 2);
    }

    #[tokio::test]
    async fn flaky_qbit_recovers_after_budget() {
        let engine = MockQbit::new();
        engine.flaky("transfer_info", 2);
        assert!(engine.transfer_info().await.is_err());
        assert!(engine.transfer_info().await.is_err());
        assert!(engine.transfer_info().await.is_ok());
        assert_eq!(engine.count("transfer_info"), 3);
    }

    #[tokio::test]
    async fn listener_records_callbacks() {
        let listener = RecordingListener::new(1, 2).with_seed().failing_error_path();
        assert!(listener.seed());
        listener.on_download_complete().await.expect("complete");
        assert!(
            listener
                .on_download_error("boom".to_string(), None)
                .await
                .is_err()
        );
        assert_eq!(listener.completions(), 1);
        assert_eq!(listener.download_errors(), vec!["boom".to_string()]);
    }
}
