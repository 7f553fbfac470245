//! Engine snapshots and the pure helpers derived from them.

use std::collections::BTreeMap;

use relay_events::Gid;
use serde::{Deserialize, Serialize};

/// Path prefix aria2 uses for the placeholder file of a magnet metadata fetch.
pub const METADATA_MARKER: &str = "[METADATA]";

/// Per-download or global option map, keyed by aria2 option name.
pub type DownloadOptions = BTreeMap<String, String>;

/// Lifecycle status reported by the engine for one GID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    /// Transfer is running.
    Active,
    /// Transfer is paused.
    Paused,
    /// Transfer is queued.
    Waiting,
    /// Transfer finished.
    Complete,
    /// Transfer was removed.
    Removed,
    /// Transfer failed.
    Error,
}

impl DownloadStatus {
    /// Parse the engine's status string.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let status = match value {
            "active" => Self::Active,
            "paused" => Self::Paused,
            "waiting" => Self::Waiting,
            "complete" => Self::Complete,
            "removed" => Self::Removed,
            "error" => Self::Error,
            _ => return None,
        };
        Some(status)
    }
}

/// One file of a download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadFile {
    /// 1-based index assigned by the engine.
    pub index: u32,
    /// Absolute on-disk path (or the metadata marker for magnet placeholders).
    pub path: String,
    /// Total size in bytes.
    pub length: u64,
    /// Bytes completed so far.
    pub completed_length: u64,
    /// Whether the file is selected for download.
    pub selected: bool,
}

/// Bittorrent specific metadata; present only for torrent transfers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BittorrentInfo {
    /// Name declared in the torrent's info dictionary, once metadata is known.
    pub name: Option<String>,
}

/// The engine's state for one GID at the moment it was queried.
///
/// Snapshots are never cached: every handler fetches a fresh one because the
/// engine mutates state between calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadSnapshot {
    /// Identifier of the transfer.
    pub gid: Gid,
    /// Current status.
    pub status: DownloadStatus,
    /// Download directory.
    pub dir: String,
    /// Total size in bytes.
    pub total_length: u64,
    /// Bytes downloaded.
    pub completed_length: u64,
    /// Bytes uploaded (seeding).
    pub upload_length: u64,
    /// Files, in engine order.
    pub files: Vec<DownloadFile>,
    /// Present when the transfer is a bittorrent download.
    pub bittorrent: Option<BittorrentInfo>,
    /// GIDs that superseded this one (metadata GID resolved to content GID).
    pub followed_by: Vec<Gid>,
    /// Engine error code, when the transfer failed.
    pub error_code: Option<String>,
    /// Engine error message, when the transfer failed.
    pub error_message: Option<String>,
}

impl DownloadSnapshot {
    /// Empty snapshot for a GID; useful as a base for builders and tests.
    #[must_use]
    pub fn new(gid: Gid, status: DownloadStatus) -> Self {
        Self {
            gid,
            status,
            dir: String::new(),
            total_length: 0,
            completed_length: 0,
            upload_length: 0,
            files: Vec::new(),
            bittorrent: None,
            followed_by: Vec::new(),
            error_code: None,
            error_message: None,
        }
    }

    /// Whether the transfer is a bittorrent download.
    #[must_use]
    pub const fn is_bittorrent(&self) -> bool {
        self.bittorrent.is_some()
    }

    /// First GID that superseded this one.
    #[must_use]
    pub fn followed_by(&self) -> Option<&Gid> {
        self.followed_by.first()
    }

    /// Share ratio (uploaded / downloaded).
    #[must_use]
    pub fn ratio(&self) -> f64 {
        if self.completed_length == 0 {
            0.0
        } else {
            bytes_to_f64(self.upload_length) / bytes_to_f64(self.completed_length)
        }
    }
}

/// Aggregate engine counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalStat {
    /// Overall download speed (bytes/s).
    pub download_speed: u64,
    /// Overall upload speed (bytes/s).
    pub upload_speed: u64,
    /// Number of active downloads.
    pub num_active: u64,
    /// Number of waiting downloads.
    pub num_waiting: u64,
    /// Number of stopped downloads.
    pub num_stopped: u64,
}

/// Transfer counters reported by the REST engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferInfo {
    /// Global download rate (bytes/s).
    #[serde(default)]
    pub dl_info_speed: u64,
    /// Data downloaded this session (bytes).
    #[serde(default)]
    pub dl_info_data: u64,
    /// Global upload rate (bytes/s).
    #[serde(default)]
    pub up_info_speed: u64,
    /// Data uploaded this session (bytes).
    #[serde(default)]
    pub up_info_data: u64,
    /// Connection status (`connected`, `firewalled`, `disconnected`).
    #[serde(default)]
    pub connection_status: String,
}

/// Display name of a download.
///
/// Bittorrent downloads use the declared torrent name. Otherwise the name is the
/// first path segment of the first file relative to the download directory, or
/// the literal marker path while a magnet is still resolving. Empty when the
/// engine reports no files.
#[must_use]
pub fn aria2_name(snapshot: &DownloadSnapshot) -> String {
    if let Some(name) = snapshot
        .bittorrent
        .as_ref()
        .and_then(|info| info.name.as_deref())
        .filter(|name| !name.is_empty())
    {
        return name.to_owned();
    }

    let Some(first) = snapshot.files.first() else {
        return String::new();
    };
    if first.path.starts_with(METADATA_MARKER) {
        return first.path.clone();
    }

    let dir = snapshot.dir.trim_end_matches('/');
    let relative = if dir.is_empty() {
        Some(first.path.as_str())
    } else {
        first.path.strip_prefix(&format!("{dir}/"))
    };
    relative
        .and_then(|relative| relative.trim_start_matches('/').split('/').next())
        .unwrap_or_default()
        .to_owned()
}

/// Whether the snapshot is a magnet metadata placeholder.
#[must_use]
pub fn is_metadata(snapshot: &DownloadSnapshot) -> bool {
    snapshot
        .files
        .iter()
        .any(|file| file.path.starts_with(METADATA_MARKER))
}

/// Whether the caller opted out of metadata-follow semantics for this download.
#[must_use]
pub fn follow_torrent_disabled(options: &DownloadOptions) -> bool {
    options.get("follow-torrent").map(String::as_str) == Some("false")
}

const fn bytes_to_f64(value: u64) -> f64 {
    #[expect(
        clippy::cast_precision_loss,
        reason = "ratios are informational and tolerate precision loss"
    )]
    {
        value as f64
    }
}
