//! Snapshot builders mirroring what aria2 reports for common transfers.

use relay_core::{
    BittorrentInfo, DownloadFile, DownloadSnapshot, DownloadStatus, Gid, METADATA_MARKER,
};

/// Plain HTTP download of one file at `<dir>/<relative>`.
#[must_use]
pub fn http_snapshot(gid: &str, status: DownloadStatus, dir: &str, relative: &str) -> DownloadSnapshot {
    let mut snapshot = DownloadSnapshot::new(Gid::from(gid), status);
    snapshot.dir = dir.to_string();
    snapshot.files.push(DownloadFile {
        index: 1,
        path: format!("{dir}/{relative}"),
        length: 1_024,
        completed_length: 1_024,
        selected: true,
    });
    snapshot.total_length = 1_024;
    snapshot.completed_length = 1_024;
    snapshot
}

/// Bittorrent content download named `name` with the given `(relative path, selected)` files.
#[must_use]
pub fn torrent_snapshot(
    gid: &str,
    status: DownloadStatus,
    dir: &str,
    name: &str,
    files: &[(&str, bool)],
) -> DownloadSnapshot {
    let mut snapshot = DownloadSnapshot::new(Gid::from(gid), status);
    snapshot.dir = dir.to_string();
    snapshot.bittorrent = Some(BittorrentInfo {
        name: Some(name.to_string()),
    });
    snapshot.files = files
        .iter()
        .zip(1_u32..)
        .map(|((relative, selected), index)| DownloadFile {
            index,
            path: format!("{dir}/{relative}"),
            length: 4_096,
            completed_length: if *selected { 4_096 } else { 0 },
            selected: *selected,
        })
        .collect();
    snapshot.completed_length = 4_096;
    snapshot
}

/// Magnet metadata placeholder, optionally already superseded by `followed_by`.
#[must_use]
pub fn metadata_snapshot(
    gid: &str,
    status: DownloadStatus,
    followed_by: Option<&str>,
) -> DownloadSnapshot {
    let mut snapshot = DownloadSnapshot::new(Gid::from(gid), status);
    snapshot.bittorrent = Some(BittorrentInfo::default());
    snapshot.files.push(DownloadFile {
        index: 1,
        path: format!("{METADATA_MARKER}0123456789abcdef"),
        length: 0,
        completed_length: 0,
        selected: true,
    });
    snapshot.followed_by = followed_by.map(Gid::from).into_iter().collect();
    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_match_helper_expectations() {
        let http = http_snapshot("a", DownloadStatus::Complete, "/dl/1", "sub/video.mkv");
        assert_eq!(relay_core::aria2_name(&http), "sub");

        let torrent = torrent_snapshot(
            "b",
            DownloadStatus::Active,
            "/dl/2",
            "Show",
            &[("Show/a.mkv", true), ("Show/b.nfo", false)],
        );
        assert_eq!(relay_core::aria2_name(&torrent), "Show");
        assert_eq!(torrent.files[1].index, 2);

        let metadata = metadata_snapshot("c", DownloadStatus::Complete, Some("d"));
        assert!(relay_core::is_metadata(&metadata));
        assert_eq!(metadata.followed_by().map(Gid::as_str), Some("d"));
    }
}
