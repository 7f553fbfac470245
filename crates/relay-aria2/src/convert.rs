//! Decoding of aria2's string-typed responses into core DTOs.
//!
//! aria2 encodes every number and boolean as a JSON string, so the raw structs
//! here parse through `numeric` before anything reaches the core model.

use relay_core::{
    BittorrentInfo, DownloadFile, DownloadOptions, DownloadSnapshot, DownloadStatus, EngineError,
    EngineResult, Gid, GlobalStat,
};
use serde::{Deserialize, Deserializer, de};
use serde_json::Value;

/// Keys requested from `tellStatus`/`tellActive`/`tellWaiting`.
pub(crate) const STATUS_KEYS: &[&str] = &[
    "gid",
    "status",
    "dir",
    "totalLength",
    "completedLength",
    "uploadLength",
    "files",
    "bittorrent",
    "followedBy",
    "errorCode",
    "errorMessage",
];

fn numeric<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    raw.parse().map_err(de::Error::custom)
}

fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match String::deserialize(deserializer)?.as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(de::Error::custom(format!("invalid flag `{other}`"))),
    }
}

fn status<'de, D>(deserializer: D) -> Result<DownloadStatus, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    DownloadStatus::parse(&raw).ok_or_else(|| de::Error::custom(format!("unknown status `{raw}`")))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFile {
    #[serde(deserialize_with = "numeric")]
    index: u64,
    path: String,
    #[serde(deserialize_with = "numeric", default)]
    length: u64,
    #[serde(deserialize_with = "numeric", default)]
    completed_length: u64,
    #[serde(deserialize_with = "flag", default)]
    selected: bool,
}

#[derive(Deserialize)]
struct RawInfo {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize)]
struct RawBittorrent {
    #[serde(default)]
    info: Option<RawInfo>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStatus {
    gid: Gid,
    #[serde(deserialize_with = "status")]
    status: DownloadStatus,
    #[serde(default)]
    dir: String,
    #[serde(deserialize_with = "numeric", default)]
    total_length: u64,
    #[serde(deserialize_with = "numeric", default)]
    completed_length: u64,
    #[serde(deserialize_with = "numeric", default)]
    upload_length: u64,
    #[serde(default)]
    files: Vec<RawFile>,
    #[serde(default)]
    bittorrent: Option<RawBittorrent>,
    #[serde(default)]
    followed_by: Vec<Gid>,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
}

impl TryFrom<RawStatus> for DownloadSnapshot {
    type Error = EngineError;

    fn try_from(raw: RawStatus) -> EngineResult<Self> {
        let files = raw
            .files
            .into_iter()
            .map(|file| {
                let index = u32::try_from(file.index).map_err(|_| EngineError::Validation {
                    field: "files.index",
                    reason: format!("index {} out of range", file.index),
                })?;
                Ok(DownloadFile {
                    index,
                    path: file.path,
                    length: file.length,
                    completed_length: file.completed_length,
                    selected: file.selected,
                })
            })
            .collect::<EngineResult<Vec<_>>>()?;
        Ok(Self {
            gid: raw.gid,
            status: raw.status,
            dir: raw.dir,
            total_length: raw.total_length,
            completed_length: raw.completed_length,
            upload_length: raw.upload_length,
            files,
            bittorrent: raw.bittorrent.map(|bt| BittorrentInfo {
                name: bt.info.and_then(|info| info.name),
            }),
            followed_by: raw.followed_by,
            error_code: raw.error_code.filter(|code| code != "0"),
            error_message: raw.error_message.filter(|message| !message.is_empty()),
        })
    }
}

/// Decode a `tellStatus` result.
pub(crate) fn snapshot(value: Value) -> EngineResult<DownloadSnapshot> {
    let raw: RawStatus = serde_json::from_value(value).map_err(|source| EngineError::Decode {
        operation: "tellStatus",
        source,
    })?;
    raw.try_into()
}

/// Decode a `tellActive`/`tellWaiting` result.
pub(crate) fn snapshots(operation: &'static str, value: Value) -> EngineResult<Vec<DownloadSnapshot>> {
    let raw: Vec<RawStatus> =
        serde_json::from_value(value).map_err(|source| EngineError::Decode { operation, source })?;
    raw.into_iter().map(DownloadSnapshot::try_from).collect()
}

/// Decode a `getOption`/`getGlobalOption` result.
pub(crate) fn options(operation: &'static str, value: Value) -> EngineResult<DownloadOptions> {
    serde_json::from_value(value).map_err(|source| EngineError::Decode { operation, source })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawGlobalStat {
    #[serde(deserialize_with = "numeric")]
    download_speed: u64,
    #[serde(deserialize_with = "numeric")]
    upload_speed: u64,
    #[serde(deserialize_with = "numeric")]
    num_active: u64,
    #[serde(deserialize_with = "numeric")]
    num_waiting: u64,
    #[serde(deserialize_with = "numeric")]
    num_stopped: u64,
}

/// Decode a `getGlobalStat` result.
pub(crate) fn global_stat(value: Value) -> EngineResult<GlobalStat> {
    let raw: RawGlobalStat = serde_json::from_value(value).map_err(|source| EngineError::Decode {
        operation: "getGlobalStat",
        source,
    })?;
    Ok(GlobalStat {
        download_speed: raw.download_speed,
        upload_speed: raw.upload_speed,
        num_active: raw.num_active,
        num_waiting: raw.num_waiting,
        num_stopped: raw.num_stopped,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn torrent_status_decodes_with_metadata() -> EngineResult<()> {
        let value = json!({
            "gid": "2089b05ecca3d829",
            "status": "complete",
            "dir": "/downloads/7",
            "totalLength": "1048576",
            "completedLength": "1048576",
            "uploadLength": "2097152",
            "files": [{
                "index": "1",
                "path": "/downloads/7/Show/ep1.mkv",
                "length": "1048576",
                "completedLength": "1048576",
                "selected": "true"
            }],
            "bittorrent": {"info": {"name": "Show"}},
            "errorCode": "0",
            "errorMessage": ""
        });
        let snapshot = snapshot(value)?;
        assert_eq!(snapshot.status, DownloadStatus::Complete);
        assert!(snapshot.is_bittorrent());
        assert_eq!(
            snapshot.bittorrent.and_then(|bt| bt.name).as_deref(),
            Some("Show")
        );
        assert!(snapshot.files[0].selected);
        assert_eq!(snapshot.error_code, None);
        assert_eq!(snapshot.error_message, None);
        Ok(())
    }

    #[test]
    fn metadata_placeholder_keeps_followed_by() -> EngineResult<()> {
        let value = json!({
            "gid": "aaaa000000000001",
            "status": "complete",
            "files": [{"index": "1", "path": "[METADATA]0123abcd", "selected": "true"}],
            "bittorrent": {},
            "followedBy": ["bbbb000000000002"]
        });
        let snapshot = snapshot(value)?;
        assert!(relay_core::is_metadata(&snapshot));
        assert_eq!(
            snapshot.followed_by().map(Gid::as_str),
            Some("bbbb000000000002")
        );
        assert_eq!(snapshot.bittorrent, Some(BittorrentInfo { name: None }));
        Ok(())
    }

    #[test]
    fn error_status_keeps_engine_message() -> EngineResult<()> {
        let value = json!({
            "gid": "cccc000000000003",
            "status": "error",
            "errorCode": "3",
            "errorMessage": "Resource not found"
        });
        let snapshot = snapshot(value)?;
        assert_eq!(snapshot.error_code.as_deref(), Some("3"));
        assert_eq!(snapshot.error_message.as_deref(), Some("Resource not found"));
        Ok(())
    }

    #[test]
    fn bad_numbers_fail_decoding() {
        let value = json!({"gid": "x", "status": "active", "totalLength": "lots"});
        assert!(matches!(
            snapshot(value),
            Err(EngineError::Decode {
                operation: "tellStatus",
                ..
            })
        ));
        let value = json!({"gid": "x", "status": "sleeping"});
        assert!(snapshot(value).is_err());
    }

    #[test]
    fn global_stat_parses_strings() -> EngineResult<()> {
        let stat = global_stat(json!({
            "downloadSpeed": "100",
            "uploadSpeed": "50",
            "numActive": "2",
            "numWaiting": "1",
            "numStopped": "4",
            "numStoppedTotal": "9"
        }))?;
        assert_eq!(stat.num_active, 2);
        assert_eq!(stat.num_stopped, 4);
        Ok(())
    }

    #[test]
    fn option_maps_stay_string_typed() -> EngineResult<()> {
        let options = options(
            "getOption",
            json!({"follow-torrent": "false", "max-upload-limit": "0"}),
        )?;
        assert!(relay_core::follow_torrent_disabled(&options));
        Ok(())
    }
}
