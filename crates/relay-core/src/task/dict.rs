//! Live task dictionary shared by the submission code and the event pipeline.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relay_events::Gid;
use tokio::sync::Mutex;
use tracing::debug;

use super::{
    DownloadPhase, IllegalTransition, MessageId, PhaseSignal, TaskHandle, TaskListener,
    TaskRegistry,
};

/// One registered task.
#[derive(Clone)]
pub struct TaskEntry {
    /// GID the task is bound to.
    pub gid: Gid,
    /// Listener facade.
    pub listener: Arc<dyn TaskListener>,
    /// Lifecycle phase.
    pub phase: DownloadPhase,
    /// The download was queued instead of started.
    pub queued: bool,
}

impl TaskEntry {
    /// New entry in the `Downloading` phase.
    #[must_use]
    pub fn new(gid: Gid, listener: Arc<dyn TaskListener>) -> Self {
        Self {
            gid,
            listener,
            phase: DownloadPhase::default(),
            queued: false,
        }
    }

    /// Mark the entry as queued.
    #[must_use]
    pub const fn queued(mut self, queued: bool) -> Self {
        self.queued = queued;
        self
    }

    /// Start in an explicit phase.
    #[must_use]
    pub const fn with_phase(mut self, phase: DownloadPhase) -> Self {
        self.phase = phase;
        self
    }

    fn handle(&self, message_id: MessageId) -> TaskHandle {
        TaskHandle {
            message_id,
            gid: self.gid.clone(),
            listener: Arc::clone(&self.listener),
            phase: self.phase,
            queued: self.queued,
        }
    }
}

/// Tasks keyed by the message id that created them.
///
/// Every mutation takes the single dictionary lock, so a read-then-write such
/// as [`TaskDict::install_seeding`] cannot race a concurrent removal.
#[derive(Clone, Default)]
pub struct TaskDict {
    entries: Arc<Mutex<HashMap<MessageId, TaskEntry>>>,
}

impl TaskDict {
    /// Empty dictionary.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task, returning the entry it replaced.
    pub async fn insert(&self, message_id: MessageId, entry: TaskEntry) -> Option<TaskEntry> {
        self.entries.lock().await.insert(message_id, entry)
    }

    /// Drop a task.
    pub async fn remove(&self, message_id: MessageId) -> Option<TaskEntry> {
        self.entries.lock().await.remove(&message_id)
    }

    /// Whether `message_id` is still registered.
    pub async fn contains(&self, message_id: MessageId) -> bool {
        self.entries.lock().await.contains_key(&message_id)
    }

    /// Snapshot of the task registered under `message_id`.
    pub async fn get(&self, message_id: MessageId) -> Option<TaskHandle> {
        self.entries
            .lock()
            .await
            .get(&message_id)
            .map(|entry| entry.handle(message_id))
    }

    /// Number of registered tasks.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Whether no task is registered.
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Move the task bound to `old` onto `new`, returning whether one was found.
    pub async fn rebind_gid(&self, old: &Gid, new: &Gid) -> bool {
        let mut entries = self.entries.lock().await;
        let Some(entry) = entries.values_mut().find(|entry| &entry.gid == old) else {
            return false;
        };
        debug!(old = %old, new = %new, "rebinding task to superseding gid");
        entry.gid = new.clone();
        true
    }

    /// Apply `signal` to the phase of the task under `message_id`.
    ///
    /// Returns `None` when the task is gone. Rejected transitions leave the
    /// phase untouched.
    pub async fn advance(
        &self,
        message_id: MessageId,
        signal: PhaseSignal,
    ) -> Option<Result<DownloadPhase, IllegalTransition>> {
        let mut entries = self.entries.lock().await;
        let entry = entries.get_mut(&message_id)?;
        let outcome = entry.phase.advance(signal);
        if let Ok(next) = outcome {
            entry.phase = next;
        }
        Some(outcome)
    }

    /// Bind the task to `gid` in the seeding phase, stamped at `started_at`.
    ///
    /// Returns `false` without touching anything when `message_id` was removed
    /// concurrently.
    pub async fn install_seeding(
        &self,
        message_id: MessageId,
        gid: &Gid,
        started_at: DateTime<Utc>,
    ) -> bool {
        let mut entries = self.entries.lock().await;
        let Some(entry) = entries.get_mut(&message_id) else {
            return false;
        };
        entry.phase = match entry
            .phase
            .advance(PhaseSignal::SeedingStarted { at: started_at })
        {
            Ok(next) => next,
            Err(err) => {
                debug!(gid = %gid, from = ?err.from, "replacing phase with fresh seeding state");
                DownloadPhase::Seeding { started_at }
            }
        };
        entry.gid = gid.clone();
        true
    }
}

#[async_trait]
impl TaskRegistry for TaskDict {
    async fn lookup(&self, gid: &Gid) -> Option<TaskHandle> {
        self.entries
            .lock()
            .await
            .iter()
            .find(|(_, entry)| &entry.gid == gid)
            .map(|(message_id, entry)| entry.handle(*message_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{ButtonMarkup, ChatRef};

    struct Inert;

    #[async_trait]
    impl TaskListener for Inert {
        fn name(&self) -> String {
            "inert".to_string()
        }
        fn set_name(&self, _name: String) {}
        fn is_torrent(&self) -> bool {
            true
        }
        fn set_is_torrent(&self, _value: bool) {}
        fn select(&self) -> bool {
            false
        }
        fn seed(&self) -> bool {
            true
        }
        fn is_cancelled(&self) -> bool {
            false
        }
        fn message(&self) -> ChatRef {
            ChatRef {
                chat_id: 10,
                message_id: 7,
            }
        }
        async fn on_download_complete(&self) -> anyhow::Result<()> {
            Ok(())
        }
        async fn on_download_error(
            &self,
            _reason: String,
            _buttons: Option<ButtonMarkup>,
        ) -> anyhow::Result<()> {
            Ok(())
        }
        async fn on_upload_error(&self, _reason: String) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn entry(gid: &str) -> TaskEntry {
        TaskEntry::new(Gid::from(gid), Arc::new(Inert))
    }

    #[tokio::test]
    async fn lookup_follows_rebinding() {
        let dict = TaskDict::new();
        dict.insert(7, entry("meta0001")).await;

        assert!(dict.lookup(&Gid::from("content1")).await.is_none());
        assert!(
            dict.rebind_gid(&Gid::from("meta0001"), &Gid::from("content1"))
                .await
        );

        let handle = dict
            .lookup(&Gid::from("content1"))
            .await
            .expect("rebound task");
        assert_eq!(handle.message_id, 7);
        assert!(dict.lookup(&Gid::from("meta0001")).await.is_none());
    }

    #[tokio::test]
    async fn install_seeding_requires_registration() {
        let dict = TaskDict::new();
        let now = Utc::now();
        assert!(!dict.install_seeding(7, &Gid::from("abc"), now).await);

        dict.insert(7, entry("abc")).await;
        assert!(dict.install_seeding(7, &Gid::from("abc"), now).await);
        let handle = dict.get(7).await.expect("registered");
        assert_eq!(handle.phase, DownloadPhase::Seeding { started_at: now });
    }

    #[tokio::test]
    async fn rejected_signal_keeps_phase() {
        let dict = TaskDict::new();
        dict.insert(7, entry("abc").with_phase(DownloadPhase::Terminal))
            .await;

        let outcome = dict.advance(7, PhaseSignal::Finished).await;
        assert!(matches!(outcome, Some(Err(_))));
        assert_eq!(
            dict.get(7).await.map(|handle| handle.phase),
            Some(DownloadPhase::Terminal)
        );
        assert!(dict.advance(99, PhaseSignal::Finished).await.is_none());
    }

    #[tokio::test]
    async fn removal_is_visible_to_lookup() {
        let dict = TaskDict::new();
        dict.insert(7, entry("abc").queued(true)).await;
        assert!(dict.lookup(&Gid::from("abc")).await.is_some_and(|h| h.queued));
        assert!(dict.remove(7).await.is_some());
        assert!(!dict.contains(7).await);
        assert!(dict.is_empty().await);
    }
}
