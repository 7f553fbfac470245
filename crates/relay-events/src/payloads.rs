//! Download identifiers and the typed notifications pushed by the download engine.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// Identifier assigned to each envelope published on the bus.
pub type EventId = u64;

/// Opaque identifier the download engine assigns to one in-flight transfer.
///
/// A magnet download starts under a metadata GID that is later superseded by a
/// content GID, so a `Gid` is only stable for one phase of a torrent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Gid(String);

impl Gid {
    /// Wrap an engine supplied identifier.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shortened form used in callback payloads (first eight characters).
    #[must_use]
    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl Display for Gid {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl AsRef<str> for Gid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Gid {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Gid {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Push notifications delivered by the engine's websocket channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DownloadEvent {
    /// A transfer (or metadata fetch) started.
    Started {
        /// Engine identifier of the transfer.
        gid: Gid,
    },
    /// A non-bittorrent transfer completed, or a metadata GID resolved.
    Completed {
        /// Engine identifier of the transfer.
        gid: Gid,
    },
    /// A bittorrent content transfer finished downloading.
    BtCompleted {
        /// Engine identifier of the transfer.
        gid: Gid,
    },
    /// A transfer was stopped by the engine or a user.
    Stopped {
        /// Engine identifier of the transfer.
        gid: Gid,
    },
    /// The engine gave up on a transfer.
    Failed {
        /// Engine identifier of the transfer.
        gid: Gid,
    },
}

impl DownloadEvent {
    /// Map a JSON-RPC notification method onto a typed event.
    ///
    /// Methods the listener does not react to (pause, for example) map to `None`.
    #[must_use]
    pub fn from_notification(method: &str, gid: Gid) -> Option<Self> {
        let event = match method {
            "aria2.onDownloadStart" => Self::Started { gid },
            "aria2.onDownloadComplete" => Self::Completed { gid },
            "aria2.onBtDownloadComplete" => Self::BtCompleted { gid },
            "aria2.onDownloadStop" => Self::Stopped { gid },
            "aria2.onDownloadError" => Self::Failed { gid },
            _ => return None,
        };
        Some(event)
    }

    /// Identifier of the transfer the notification refers to.
    #[must_use]
    pub const fn gid(&self) -> &Gid {
        match self {
            Self::Started { gid }
            | Self::Completed { gid }
            | Self::BtCompleted { gid }
            | Self::Stopped { gid }
            | Self::Failed { gid } => gid,
        }
    }

    /// Machine-friendly discriminator used in logs and metrics labels.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Started { .. } => "download_started",
            Self::Completed { .. } => "download_complete",
            Self::BtCompleted { .. } => "bt_download_complete",
            Self::Stopped { .. } => "download_stopped",
            Self::Failed { .. } => "download_error",
        }
    }
}
