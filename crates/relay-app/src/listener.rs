//! aria2 notification handlers driving each task through its download phases.
//!
//! Every handler resolves its task before touching the engine, so a GID that
//! no longer maps to a task costs nothing. Engine lookups that fail degrade to
//! what is already known; whatever still escapes a handler is caught by a
//! per-handler catch-all that records the failure and, unless the handler
//! already reported an outcome, drives the task to completion or error itself.

use std::fmt::Write as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use chrono::Utc;
use relay_core::{
    Aria2Api, ButtonMarkup, DownloadEvent, DownloadOptions, DownloadSnapshot, DownloadStatus,
    EngineError, EngineResult, EventBus, Gid, PhaseSignal, TaskHandle, TaskRegistry, aria2_name,
    follow_torrent_disabled, is_metadata,
};
use tracing::{debug, info, warn};

use crate::connector::EngineConnector;
use crate::context::ListenerContext;

/// Reason reported when a download stops without completing.
pub const DEAD_TORRENT: &str = "Dead torrent!";
/// Reason reported when the engine cannot describe a failed download.
pub const ENGINE_STATE_UNAVAILABLE: &str = "Download failed: engine state unavailable";
/// Prompt shown once a magnet resolves and the user asked to pick files.
pub const SELECTION_PROMPT: &str =
    "Your download paused. Choose files then press Done Selecting button to start downloading.";
/// Notice shown while a magnet's metadata is still being fetched.
pub const METADATA_NOTICE: &str =
    "Downloading Metadata, wait then you can select files. Use torrent file to avoid this wait.";

const SEED_LIMIT_KEY: &str = "max-upload-limit";

/// What to do with a torrent whose download phase just completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedingDisposition {
    /// Keep the torrent in the engine and move the task into seeding.
    StartSeeding,
    /// The task was already cleaned up elsewhere; leave everything alone.
    AlreadyResolved,
    /// Remove the torrent from the engine.
    Cleanup,
}

/// Decide the post-completion fate of a torrent.
#[must_use]
pub const fn seeding_disposition(
    seed: bool,
    complete: bool,
    registered: bool,
    cancelled: bool,
) -> SeedingDisposition {
    match (seed && complete, registered, cancelled) {
        (true, false, _) => SeedingDisposition::AlreadyResolved,
        (true, true, false) => SeedingDisposition::StartSeeding,
        _ => SeedingDisposition::Cleanup,
    }
}

/// Outcome the catch-all drives when a handler fails before settling its task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fallback {
    Nothing,
    Complete,
    Error,
}

impl Fallback {
    const fn for_event(event: &DownloadEvent) -> Self {
        match event {
            DownloadEvent::Started { .. } => Self::Nothing,
            DownloadEvent::Completed { .. } | DownloadEvent::BtCompleted { .. } => Self::Complete,
            DownloadEvent::Stopped { .. } | DownloadEvent::Failed { .. } => Self::Error,
        }
    }
}

/// Set once a handler has reported the task's outcome to its listener.
#[derive(Debug, Default)]
struct HandlerProgress {
    settled: AtomicBool,
}

impl HandlerProgress {
    fn settle(&self) {
        self.settled.store(true, Ordering::SeqCst);
    }

    fn is_settled(&self) -> bool {
        self.settled.load(Ordering::SeqCst)
    }
}

struct ListenerInner {
    connector: Arc<EngineConnector>,
    ctx: ListenerContext,
}

/// Dispatcher for the five aria2 download notifications.
#[derive(Clone)]
pub struct Aria2Listener {
    inner: Arc<ListenerInner>,
    registered: Arc<AtomicBool>,
}

impl Aria2Listener {
    /// Listener using `connector` for engine access and `ctx` for collaborators.
    #[must_use]
    pub fn new(connector: Arc<EngineConnector>, ctx: ListenerContext) -> Self {
        Self {
            inner: Arc::new(ListenerInner { connector, ctx }),
            registered: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Subscribe to `bus`, spawning one task per notification.
    ///
    /// Returns `false` without subscribing again when already registered.
    pub fn register(&self, bus: &EventBus) -> bool {
        if self.registered.swap(true, Ordering::SeqCst) {
            warn!("aria2 listener already registered");
            return false;
        }
        let mut stream = bus.subscribe();
        let listener = self.clone();
        tokio::spawn(async move {
            while let Some(envelope) = stream.next().await {
                let worker = listener.clone();
                tokio::spawn(async move { worker.handle(envelope.event).await });
            }
            debug!("aria2 notification stream closed");
        });
        info!("aria2 listener registered");
        true
    }

    /// Run the handler for `event` on its own task and wait for it.
    ///
    /// A panicking handler is logged and does not propagate.
    pub async fn handle(&self, event: DownloadEvent) {
        let worker = self.clone();
        let kind = event.kind();
        if let Err(err) = tokio::spawn(async move { worker.dispatch(event).await }).await {
            warn!(kind, error = %err, "notification handler aborted");
            self.inner.ctx.metrics.inc_listener_failure(kind);
        }
    }

    async fn dispatch(&self, event: DownloadEvent) {
        self.inner.ctx.metrics.inc_notification(event.kind());
        match &event {
            DownloadEvent::Started { gid } => self.on_download_started(gid).await,
            DownloadEvent::Completed { gid } => self.on_download_complete(gid).await,
            DownloadEvent::BtCompleted { gid } => self.on_bt_download_complete(gid).await,
            DownloadEvent::Stopped { gid } => self.on_download_stopped(gid).await,
            DownloadEvent::Failed { gid } => self.on_download_error(gid).await,
        }
    }

    /// `onDownloadStart`.
    pub async fn on_download_started(&self, gid: &Gid) {
        let progress = HandlerProgress::default();
        let outcome = self.download_started(gid).await;
        self.settle(&DownloadEvent::Started { gid: gid.clone() }, outcome, &progress)
            .await;
    }

    /// `onDownloadComplete`.
    pub async fn on_download_complete(&self, gid: &Gid) {
        let progress = HandlerProgress::default();
        let outcome = self.download_complete(gid, &progress).await;
        self.settle(&DownloadEvent::Completed { gid: gid.clone() }, outcome, &progress)
            .await;
    }

    /// `onBtDownloadComplete`.
    pub async fn on_bt_download_complete(&self, gid: &Gid) {
        let progress = HandlerProgress::default();
        let outcome = self.bt_download_complete(gid, &progress).await;
        self.settle(&DownloadEvent::BtCompleted { gid: gid.clone() }, outcome, &progress)
            .await;
    }

    /// `onDownloadStop`.
    pub async fn on_download_stopped(&self, gid: &Gid) {
        let progress = HandlerProgress::default();
        let outcome = self.download_stopped(gid, &progress).await;
        self.settle(&DownloadEvent::Stopped { gid: gid.clone() }, outcome, &progress)
            .await;
    }

    /// `onDownloadError`.
    pub async fn on_download_error(&self, gid: &Gid) {
        let progress = HandlerProgress::default();
        let outcome = self.download_error(gid, &progress).await;
        self.settle(&DownloadEvent::Failed { gid: gid.clone() }, outcome, &progress)
            .await;
    }

    async fn download_started(&self, gid: &Gid) -> Result<()> {
        let settle = self.inner.ctx.timings.started_settle;
        let (task, waited) = match self.inner.ctx.tasks.lookup(gid).await {
            Some(task) => (task, false),
            None => {
                // A content GID can announce itself before the metadata
                // completion has rebound its task.
                tokio::time::sleep(settle).await;
                let Some(task) = self.resolve(gid).await else {
                    return Ok(());
                };
                (task, true)
            }
        };
        let client = self.engine().await?;
        let (snapshot, options) = match fetch(client.as_ref(), gid).await {
            Ok(state) => state,
            Err(err) => {
                debug!(gid = %gid, error = %err, "start notification without engine state");
                return self.cancel_if_duplicate(client.as_ref(), gid, &task).await;
            }
        };
        if follow_torrent_disabled(&options) {
            return Ok(());
        }

        if is_metadata(&snapshot) {
            task.listener.set_is_torrent(true);
            self.advance(&task, PhaseSignal::MetadataStarted).await;
            if task.listener.select() {
                self.await_metadata(client.as_ref(), &task).await;
            }
            return Ok(());
        }

        let snapshot = if waited {
            snapshot
        } else {
            tokio::time::sleep(settle).await;
            match client.tell_status(gid).await {
                Ok(fresh) => fresh,
                Err(err) => {
                    debug!(gid = %gid, error = %err, "using initial snapshot for started download");
                    snapshot
                }
            }
        };
        task.listener.set_name(aria2_name(&snapshot));
        self.advance(&task, PhaseSignal::ContentStarted).await;
        self.cancel_if_duplicate(client.as_ref(), gid, &task).await
    }

    async fn cancel_if_duplicate(
        &self,
        client: &dyn Aria2Api,
        gid: &Gid,
        task: &TaskHandle,
    ) -> Result<()> {
        let (duplicate, buttons) = self
            .inner
            .ctx
            .duplicates
            .check(task.listener.as_ref())
            .await;
        if let Some(message) = duplicate {
            info!(gid = %gid, name = %task.listener.name(), "cancelling duplicate download");
            remove_download(client, gid).await;
            task.listener.on_download_error(message, buttons).await?;
            self.advance(task, PhaseSignal::Failed).await;
        }
        Ok(())
    }

    async fn await_metadata(&self, client: &dyn Aria2Api, task: &TaskHandle) {
        let notice = match self
            .inner
            .ctx
            .messenger
            .send(task.listener.message(), METADATA_NOTICE, None)
            .await
        {
            Ok(notice) => Some(notice),
            Err(err) => {
                warn!(gid = %task.gid, error = %err, "metadata notice not delivered");
                None
            }
        };

        loop {
            tokio::time::sleep(self.inner.ctx.timings.metadata_poll).await;
            if self.inner.ctx.stop.is_set() || !self.inner.ctx.tasks.contains(task.message_id).await
            {
                break;
            }
            match client.tell_status(&task.gid).await {
                Ok(snapshot)
                    if snapshot.followed_by().is_some()
                        || snapshot.status == DownloadStatus::Removed =>
                {
                    break;
                }
                Ok(_) => {}
                Err(err) if err.is_not_found() => break,
                Err(err) if err.is_transient() => {
                    debug!(gid = %task.gid, error = %err, "metadata poll retrying");
                }
                Err(err) => {
                    warn!(gid = %task.gid, error = %err, "metadata poll abandoned");
                    break;
                }
            }
        }

        if let Some(notice) = notice
            && let Err(err) = self.inner.ctx.messenger.delete(notice).await
        {
            debug!(gid = %task.gid, error = %err, "metadata notice not deleted");
        }
    }

    async fn download_complete(&self, gid: &Gid, progress: &HandlerProgress) -> Result<()> {
        let Some(task) = self.resolve(gid).await else {
            return Ok(());
        };
        let client = self.engine().await?;
        let (snapshot, options) = match fetch(client.as_ref(), gid).await {
            Ok(state) => state,
            Err(err) if err.is_not_found() => {
                debug!(gid = %gid, "engine forgot completed download; completing task");
                task.listener.on_download_complete().await?;
                progress.settle();
                self.advance(&task, PhaseSignal::Finished).await;
                return Ok(());
            }
            Err(err) => {
                warn!(gid = %gid, error = %err, "completion ignored; engine state unavailable");
                return Ok(());
            }
        };
        if follow_torrent_disabled(&options) {
            return Ok(());
        }

        if let Some(next) = snapshot.followed_by() {
            self.follow_metadata(client.as_ref(), gid, next).await;
            return Ok(());
        }

        if snapshot.is_bittorrent() {
            if task.is_seeding() {
                remove_download(client.as_ref(), gid).await;
                let ratio = task.ratio(&snapshot).unwrap_or_default();
                let seeded = task
                    .seeding_time(Utc::now())
                    .map_or_else(|| "0s".to_string(), readable_duration);
                info!(gid = %gid, ratio, seeded = %seeded, "seeding finished");
                task.listener
                    .on_upload_error(format!(
                        "Seeding stopped with Ratio: {ratio:.2} and Time: {seeded}"
                    ))
                    .await?;
                progress.settle();
                self.advance(&task, PhaseSignal::SeedingFinished).await;
            }
            return Ok(());
        }

        task.listener.on_download_complete().await?;
        progress.settle();
        self.advance(&task, PhaseSignal::Finished).await;
        if self.inner.ctx.stop.is_set() {
            return Ok(());
        }
        remove_download(client.as_ref(), gid).await;
        Ok(())
    }

    async fn follow_metadata(&self, client: &dyn Aria2Api, old: &Gid, next: &Gid) {
        self.inner.ctx.tasks.rebind_gid(old, next).await;
        let Some(task) = self.resolve(next).await else {
            return;
        };
        info!(old = %old, gid = %next, "metadata resolved");
        task.listener.set_is_torrent(true);
        self.advance(&task, PhaseSignal::MetadataResolved).await;

        let Some(base_url) = self.inner.ctx.base_url.as_deref() else {
            return;
        };
        if !task.listener.select() {
            return;
        }
        if !task.queued
            && let Err(err) = client.force_pause(next).await
        {
            warn!(gid = %next, error = %err, "could not pause download for file selection");
        }
        let buttons = ButtonMarkup::default()
            .url("Select Files", format!("{base_url}/app/files?gid={next}"))
            .callback("Done Selecting", format!("sel done {}", next.short()));
        if let Err(err) = self
            .inner
            .ctx
            .messenger
            .send(task.listener.message(), SELECTION_PROMPT, Some(buttons))
            .await
        {
            warn!(gid = %next, error = %err, "selection prompt not delivered");
        }
    }

    async fn bt_download_complete(&self, gid: &Gid, progress: &HandlerProgress) -> Result<()> {
        let Some(task) = self.resolve(gid).await else {
            return Ok(());
        };
        tokio::time::sleep(self.inner.ctx.timings.bt_complete_settle).await;
        let client = self.engine().await?;
        let snapshot = match client.tell_status(gid).await {
            Ok(snapshot) => snapshot,
            Err(err) if err.is_not_found() => {
                task.listener.set_is_torrent(true);
                task.listener.on_download_complete().await?;
                progress.settle();
                self.advance(&task, PhaseSignal::Finished).await;
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };
        task.listener.set_is_torrent(true);

        if task.listener.select() {
            self.discard_unselected(&snapshot).await;
        }

        let seed = task.listener.seed();
        if seed {
            let mut limit = DownloadOptions::new();
            limit.insert(SEED_LIMIT_KEY.to_string(), "0".to_string());
            if let Err(err) = client.change_option(gid, &limit).await {
                warn!(
                    gid = %gid,
                    error = %err,
                    "seed limit rejected; a global seed-time of zero conflicts with per-task seeding"
                );
            }
        } else if let Err(err) = client.force_pause(gid).await {
            warn!(gid = %gid, error = %err, "could not pause completed torrent");
        }

        task.listener.on_download_complete().await?;
        progress.settle();
        if !seed {
            self.advance(&task, PhaseSignal::Finished).await;
        }
        if self.inner.ctx.stop.is_set() {
            return Ok(());
        }

        let snapshot = match client.tell_status(gid).await {
            Ok(snapshot) => snapshot,
            Err(err) if err.is_not_found() => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        let registered = self.inner.ctx.tasks.contains(task.message_id).await;
        match seeding_disposition(
            seed,
            snapshot.status == DownloadStatus::Complete,
            registered,
            task.listener.is_cancelled(),
        ) {
            SeedingDisposition::AlreadyResolved => {
                debug!(gid = %gid, "task gone before seeding; leaving torrent alone");
            }
            SeedingDisposition::StartSeeding => {
                if self
                    .inner
                    .ctx
                    .tasks
                    .install_seeding(task.message_id, gid, Utc::now())
                    .await
                {
                    info!(gid = %gid, "seeding started");
                    let chat_id = task.listener.message().chat_id;
                    if let Err(err) = self.inner.ctx.messenger.push_status_update(chat_id).await {
                        debug!(gid = %gid, error = %err, "status update not pushed");
                    }
                } else {
                    remove_download(client.as_ref(), gid).await;
                }
            }
            SeedingDisposition::Cleanup => {
                if seed {
                    self.advance(&task, PhaseSignal::Finished).await;
                }
                remove_download(client.as_ref(), gid).await;
            }
        }
        Ok(())
    }

    async fn discard_unselected(&self, snapshot: &DownloadSnapshot) {
        for file in snapshot.files.iter().filter(|file| !file.selected) {
            match tokio::fs::remove_file(&file.path).await {
                Ok(()) => debug!(path = %file.path, "removed unselected file"),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => debug!(path = %file.path, error = %err, "unselected file kept"),
            }
        }
        if let Err(err) = self.inner.ctx.cleaner.clean_unwanted(&snapshot.dir).await {
            warn!(dir = %snapshot.dir, error = %err, "unwanted file cleanup failed");
        }
    }

    async fn download_stopped(&self, gid: &Gid, progress: &HandlerProgress) -> Result<()> {
        tokio::time::sleep(self.inner.ctx.timings.stopped_settle).await;
        let Some(task) = self.resolve(gid).await else {
            return Ok(());
        };
        info!(gid = %gid, "download stopped");
        task.listener
            .on_download_error(DEAD_TORRENT.to_string(), None)
            .await?;
        progress.settle();
        self.advance(&task, PhaseSignal::Failed).await;
        Ok(())
    }

    async fn download_error(&self, gid: &Gid, progress: &HandlerProgress) -> Result<()> {
        let Some(task) = self.resolve(gid).await else {
            return Ok(());
        };
        let state = match self.engine().await {
            Ok(client) => fetch(client.as_ref(), gid).await,
            Err(err) => Err(err),
        };
        let reason = match state {
            Ok((_, options)) if follow_torrent_disabled(&options) => return Ok(()),
            Ok((snapshot, _)) => failure_reason(&snapshot),
            Err(err) => {
                debug!(gid = %gid, error = %err, "failed download without engine state");
                ENGINE_STATE_UNAVAILABLE.to_string()
            }
        };
        info!(gid = %gid, reason = %reason, "download failed");
        self.report_error(&task, reason).await;
        progress.settle();
        self.advance(&task, PhaseSignal::Failed).await;
        Ok(())
    }

    /// Route `reason` through the task's error path, falling back to a plain
    /// notice that deletes itself.
    async fn report_error(&self, task: &TaskHandle, reason: String) {
        let Err(err) = task.listener.on_download_error(reason.clone(), None).await else {
            return;
        };
        warn!(gid = %task.gid, error = %err, "task error path failed; sending notice");
        let messenger = &self.inner.ctx.messenger;
        match messenger.send(task.listener.message(), &reason, None).await {
            Ok(notice) => messenger.schedule_auto_delete(notice, self.inner.ctx.timings.notice_ttl),
            Err(err) => warn!(gid = %task.gid, error = %err, "error notice not delivered"),
        }
    }

    async fn settle(&self, event: &DownloadEvent, outcome: Result<()>, progress: &HandlerProgress) {
        let Err(err) = outcome else {
            return;
        };
        let gid = event.gid();
        warn!(gid = %gid, kind = event.kind(), error = %err, "notification handler failed");
        self.inner.ctx.metrics.inc_listener_failure(event.kind());
        if progress.is_settled() || self.inner.ctx.stop.is_set() {
            return;
        }
        let Some(task) = self.resolve(gid).await else {
            return;
        };
        match Fallback::for_event(event) {
            Fallback::Nothing => {}
            Fallback::Complete => {
                if let Err(err) = task.listener.on_download_complete().await {
                    warn!(gid = %gid, error = %err, "fallback completion failed; dropping notification");
                    return;
                }
                self.advance(&task, PhaseSignal::Finished).await;
            }
            Fallback::Error => {
                self.report_error(&task, ENGINE_STATE_UNAVAILABLE.to_string())
                    .await;
                self.advance(&task, PhaseSignal::Failed).await;
            }
        }
    }

    async fn resolve(&self, gid: &Gid) -> Option<TaskHandle> {
        let task = self.inner.ctx.tasks.lookup(gid).await;
        if task.is_none() {
            debug!(gid = %gid, "no task bound to gid");
        }
        task
    }

    async fn engine(&self) -> EngineResult<Arc<dyn Aria2Api>> {
        self.inner
            .connector
            .aria2()
            .await
            .ok_or(EngineError::Unavailable { engine: "aria2" })
    }

    async fn advance(&self, task: &TaskHandle, signal: PhaseSignal) {
        match self.inner.ctx.tasks.advance(task.message_id, signal).await {
            Some(Ok(phase)) => debug!(gid = %task.gid, ?phase, "task phase advanced"),
            Some(Err(err)) => debug!(gid = %task.gid, error = %err, "phase change skipped"),
            None => {}
        }
    }
}

async fn fetch(
    client: &dyn Aria2Api,
    gid: &Gid,
) -> EngineResult<(DownloadSnapshot, DownloadOptions)> {
    tokio::try_join!(client.tell_status(gid), client.get_option(gid))
}

/// Force-remove `gid` and drop its result. Best effort.
async fn remove_download(client: &dyn Aria2Api, gid: &Gid) {
    if let Err(err) = client.force_remove(gid).await {
        debug!(gid = %gid, error = %err, "force remove failed");
    }
    if let Err(err) = client.remove_download_result(gid).await {
        debug!(gid = %gid, error = %err, "download result not removed");
    }
}

fn failure_reason(snapshot: &DownloadSnapshot) -> String {
    match (&snapshot.error_message, &snapshot.error_code) {
        (Some(message), _) if !message.is_empty() => message.clone(),
        (_, Some(code)) => format!("aria2 error code {code}"),
        _ => ENGINE_STATE_UNAVAILABLE.to_string(),
    }
}

/// Compact `1d2h3m4s` rendering; zero renders as `0s`.
fn readable_duration(duration: chrono::Duration) -> String {
    let mut seconds = duration.num_seconds().max(0);
    if seconds == 0 {
        return "0s".to_string();
    }
    let mut out = String::new();
    for (unit, size) in [("d", 86_400), ("h", 3_600), ("m", 60), ("s", 1)] {
        let count = seconds / size;
        if count > 0 {
            let _ = write!(out, "{count}{unit}");
            seconds %= size;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disposition_covers_every_combination() {
        use SeedingDisposition::{AlreadyResolved, Cleanup, StartSeeding};
        assert_eq!(seeding_disposition(true, true, true, false), StartSeeding);
        assert_eq!(seeding_disposition(true, true, false, false), AlreadyResolved);
        assert_eq!(seeding_disposition(true, true, false, true), AlreadyResolved);
        assert_eq!(seeding_disposition(true, true, true, true), Cleanup);
        assert_eq!(seeding_disposition(true, false, true, false), Cleanup);
        assert_eq!(seeding_disposition(false, true, true, false), Cleanup);
        assert_eq!(seeding_disposition(false, false, false, false), Cleanup);
    }

    #[test]
    fn fallback_matches_event_kind() {
        let gid = Gid::from("a");
        assert_eq!(
            Fallback::for_event(&DownloadEvent::Started { gid: gid.clone() }),
            Fallback::Nothing
        );
        assert_eq!(
            Fallback::for_event(&DownloadEvent::BtCompleted { gid: gid.clone() }),
            Fallback::Complete
        );
        assert_eq!(
            Fallback::for_event(&DownloadEvent::Stopped { gid }),
            Fallback::Error
        );
    }

    #[test]
    fn failure_reason_prefers_engine_message() {
        let mut snapshot = DownloadSnapshot::new(Gid::from("a"), DownloadStatus::Error);
        assert_eq!(failure_reason(&snapshot), ENGINE_STATE_UNAVAILABLE);
        snapshot.error_code = Some("3".to_string());
        assert_eq!(failure_reason(&snapshot), "aria2 error code 3");
        snapshot.error_message = Some("Resource not found".to_string());
        assert_eq!(failure_reason(&snapshot), "Resource not found");
    }

    #[test]
    fn durations_render_compactly() {
        assert_eq!(readable_duration(chrono::Duration::zero()), "0s");
        assert_eq!(readable_duration(chrono::Duration::seconds(59)), "59s");
        assert_eq!(readable_duration(chrono::Duration::seconds(3_661)), "1h1m1s");
        assert_eq!(readable_duration(chrono::Duration::seconds(90_000)), "1d1h");
    }
}
