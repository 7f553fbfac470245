//! Task collaborators consumed by the event pipeline.
//!
//! Tasks themselves are created and destroyed by the surrounding submission
//! code. This module only describes the facade the pipeline calls into, plus
//! the shared dictionary and lifecycle phase attached to every live task.

mod dict;
mod phase;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relay_events::Gid;
use serde::{Deserialize, Serialize};

use crate::model::DownloadSnapshot;

pub use dict::{TaskDict, TaskEntry};
pub use phase::{DownloadPhase, IllegalTransition, PhaseSignal};

/// Identifier of the chat message that owns a task.
pub type MessageId = i64;

/// Chat context a task originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatRef {
    /// Chat the request was sent in.
    pub chat_id: i64,
    /// Message that started the task.
    pub message_id: MessageId,
}

/// Handle to a message the messenger delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentMessage {
    /// Chat the message lives in.
    pub chat_id: i64,
    /// Identifier assigned by the chat service.
    pub message_id: MessageId,
}

/// One inline button attached to a notice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Button {
    /// Opens a link.
    Url {
        /// Visible label.
        label: String,
        /// Target link.
        url: String,
    },
    /// Sends callback data back to the bot.
    Callback {
        /// Visible label.
        label: String,
        /// Payload delivered on press.
        data: String,
    },
}

/// Ordered set of buttons attached to a notice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonMarkup {
    /// Buttons in display order.
    pub buttons: Vec<Button>,
}

impl ButtonMarkup {
    /// Append a link button.
    #[must_use]
    pub fn url(mut self, label: impl Into<String>, url: impl Into<String>) -> Self {
        self.buttons.push(Button::Url {
            label: label.into(),
            url: url.into(),
        });
        self
    }

    /// Append a callback button.
    #[must_use]
    pub fn callback(mut self, label: impl Into<String>, data: impl Into<String>) -> Self {
        self.buttons.push(Button::Callback {
            label: label.into(),
            data: data.into(),
        });
        self
    }

    /// Whether no buttons were added.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.buttons.is_empty()
    }
}

/// Facade over one user-initiated download+upload job.
///
/// Field access goes through `&self`; implementors keep their flags behind
/// interior mutability because handlers for several GIDs may share a task.
#[async_trait]
pub trait TaskListener: Send + Sync {
    /// Display name of the download.
    fn name(&self) -> String;
    /// Replace the display name once the engine knows it.
    fn set_name(&self, name: String);
    /// Whether the download was detected as a torrent.
    fn is_torrent(&self) -> bool;
    /// Record torrent detection.
    fn set_is_torrent(&self, value: bool);
    /// The user asked to pick files before downloading.
    fn select(&self) -> bool;
    /// The user asked to keep seeding after download.
    fn seed(&self) -> bool;
    /// The user cancelled the task.
    fn is_cancelled(&self) -> bool;
    /// Chat context the task reports into.
    fn message(&self) -> ChatRef;

    /// Download phase finished.
    async fn on_download_complete(&self) -> anyhow::Result<()>;
    /// Download failed; `buttons` are attached to the user notice.
    async fn on_download_error(
        &self,
        reason: String,
        buttons: Option<ButtonMarkup>,
    ) -> anyhow::Result<()>;
    /// Post-download stage (upload or seeding) ended with `reason`.
    async fn on_upload_error(&self, reason: String) -> anyhow::Result<()>;
}

/// Live view of one registered task, detached from the dictionary lock.
#[derive(Clone)]
pub struct TaskHandle {
    /// Key in the task dictionary.
    pub message_id: MessageId,
    /// GID the task is currently bound to.
    pub gid: Gid,
    /// Listener facade.
    pub listener: Arc<dyn TaskListener>,
    /// Lifecycle phase at lookup time.
    pub phase: DownloadPhase,
    /// The download was added to the engine's queue rather than started.
    pub queued: bool,
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("message_id", &self.message_id)
            .field("gid", &self.gid)
            .field("phase", &self.phase)
            .field("queued", &self.queued)
            .finish_non_exhaustive()
    }
}

impl TaskHandle {
    /// Whether the task is in the seeding phase.
    #[must_use]
    pub const fn is_seeding(&self) -> bool {
        self.phase.is_seeding()
    }

    /// How long the task has been seeding as of `now`.
    #[must_use]
    pub fn seeding_time(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        match self.phase {
            DownloadPhase::Seeding { started_at } => Some(now - started_at),
            _ => None,
        }
    }

    /// Upload ratio reported by `snapshot`, when it describes this task's GID.
    #[must_use]
    pub fn ratio(&self, snapshot: &DownloadSnapshot) -> Option<f64> {
        (snapshot.gid == self.gid).then(|| snapshot.ratio())
    }
}

/// Lookup contract the pipeline depends on.
#[async_trait]
pub trait TaskRegistry: Send + Sync {
    /// Resolve the task currently bound to `gid`.
    async fn lookup(&self, gid: &Gid) -> Option<TaskHandle>;
}

/// Duplicate-download detection.
#[async_trait]
pub trait DuplicateCheck: Send + Sync {
    /// Returns the rejection message and optional buttons when `listener`
    /// duplicates an existing upload.
    async fn check(&self, listener: &dyn TaskListener) -> (Option<String>, Option<ButtonMarkup>);
}

/// Chat message delivery.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Send `text` into `chat`, replying to its message.
    async fn send(
        &self,
        chat: ChatRef,
        text: &str,
        buttons: Option<ButtonMarkup>,
    ) -> anyhow::Result<SentMessage>;
    /// Delete a previously sent message.
    async fn delete(&self, message: SentMessage) -> anyhow::Result<()>;
    /// Delete `message` after `after` elapses.
    fn schedule_auto_delete(&self, message: SentMessage, after: std::time::Duration);
    /// Refresh the status message shown in `chat_id`.
    async fn push_status_update(&self, chat_id: i64) -> anyhow::Result<()>;
}

/// Removal of deselected files left behind by a torrent.
#[async_trait]
pub trait UnwantedFileCleaner: Send + Sync {
    /// Sweep `dir` for unwanted leftovers.
    async fn clean_unwanted(&self, dir: &str) -> anyhow::Result<()>;
}

/// Hook run after engine connections are torn down.
pub trait MemoryReclaim: Send + Sync {
    /// Release memory held by closed connections.
    fn reclaim(&self);
}
