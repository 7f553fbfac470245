//! Default collaborators used when the relay runs without a chat frontend.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use relay_core::{
    ButtonMarkup, ChatRef, DuplicateCheck, MemoryReclaim, Messenger, SentMessage, TaskListener,
    UnwantedFileCleaner,
};
use tracing::{debug, info};
use walkdir::WalkDir;

/// aria2 control file left next to partially fetched content.
const CONTROL_SUFFIX: &str = ".aria2";

/// Messenger that writes every delivery to the log.
#[derive(Debug, Default)]
pub struct TracingMessenger {
    next_id: AtomicI64,
}

#[async_trait]
impl Messenger for TracingMessenger {
    async fn send(
        &self,
        chat: ChatRef,
        text: &str,
        buttons: Option<ButtonMarkup>,
    ) -> Result<SentMessage> {
        let message_id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let buttons = buttons.map_or(0, |markup| markup.buttons.len());
        info!(
            chat_id = chat.chat_id,
            reply_to = chat.message_id,
            message_id,
            buttons,
            text,
            "message sent"
        );
        Ok(SentMessage {
            chat_id: chat.chat_id,
            message_id,
        })
    }

    async fn delete(&self, message: SentMessage) -> Result<()> {
        debug!(chat_id = message.chat_id, message_id = message.message_id, "message deleted");
        Ok(())
    }

    fn schedule_auto_delete(&self, message: SentMessage, after: Duration) {
        debug!(
            chat_id = message.chat_id,
            message_id = message.message_id,
            after_secs = after.as_secs(),
            "message auto-delete scheduled"
        );
    }

    async fn push_status_update(&self, chat_id: i64) -> Result<()> {
        debug!(chat_id, "status update pushed");
        Ok(())
    }
}

/// Duplicate check that never rejects.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAllDuplicates;

#[async_trait]
impl DuplicateCheck for AcceptAllDuplicates {
    async fn check(&self, _listener: &dyn TaskListener) -> (Option<String>, Option<ButtonMarkup>) {
        (None, None)
    }
}

/// Removes aria2 control files and the empty directories deselected files leave behind.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsUnwantedCleaner;

impl FsUnwantedCleaner {
    fn sweep(root: &Path) -> usize {
        let mut removed = 0usize;
        let mut directories = Vec::new();
        for entry in WalkDir::new(root).into_iter().filter_map(std::result::Result::ok) {
            if entry.path() == root {
                continue;
            }
            if entry.file_type().is_dir() {
                directories.push(entry);
            } else if entry
                .file_name()
                .to_string_lossy()
                .ends_with(CONTROL_SUFFIX)
                && fs::remove_file(entry.path()).is_ok()
            {
                removed += 1;
            }
        }

        directories.sort_by_key(walkdir::DirEntry::depth);
        directories.reverse();
        for entry in directories {
            let empty = entry
                .path()
                .read_dir()
                .map(|mut iter| iter.next().is_none())
                .unwrap_or(false);
            if empty && fs::remove_dir(entry.path()).is_ok() {
                removed += 1;
            }
        }
        removed
    }
}

#[async_trait]
impl UnwantedFileCleaner for FsUnwantedCleaner {
    async fn clean_unwanted(&self, dir: &str) -> Result<()> {
        let root = PathBuf::from(dir);
        if dir.is_empty() || !root.is_dir() {
            return Ok(());
        }
        let removed = tokio::task::spawn_blocking(move || Self::sweep(&root))
            .await
            .with_context(|| format!("unwanted file sweep of '{dir}' did not finish"))?;
        debug!(dir, removed, "unwanted files swept");
        Ok(())
    }
}

/// Reclaim hook for the system allocator, which returns freed pages on its own.
/// Only marks the point where engine payloads were released.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReclaim;

impl MemoryReclaim for TracingReclaim {
    fn reclaim(&self) {
        info!("engine resources released");
    }
}
