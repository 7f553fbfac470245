//! Engine traits implemented by the aria2 and qBittorrent clients.

use async_trait::async_trait;
use relay_events::{EventBus, Gid};
use serde_json::{Map, Value};

use crate::error::EngineResult;
use crate::model::{DownloadOptions, DownloadSnapshot, GlobalStat, TransferInfo};

/// Websocket JSON-RPC engine (aria2).
#[async_trait]
pub trait Aria2Api: Send + Sync {
    /// `aria2.tellStatus`: current state of one download.
    async fn tell_status(&self, gid: &Gid) -> EngineResult<DownloadSnapshot>;

    /// `aria2.getOption`: per-download options.
    async fn get_option(&self, gid: &Gid) -> EngineResult<DownloadOptions>;

    /// `aria2.changeOption`: update options of one download.
    async fn change_option(&self, gid: &Gid, options: &DownloadOptions) -> EngineResult<()>;

    /// `aria2.changeGlobalOption`: update the engine defaults.
    async fn change_global_option(&self, options: &DownloadOptions) -> EngineResult<()>;

    /// `aria2.forceRemove`: drop a download immediately.
    async fn force_remove(&self, gid: &Gid) -> EngineResult<()>;

    /// `aria2.forcePause`: pause a download without waiting for peers.
    async fn force_pause(&self, gid: &Gid) -> EngineResult<()>;

    /// `aria2.forcePauseAll`.
    async fn force_pause_all(&self) -> EngineResult<()>;

    /// `aria2.removeDownloadResult`: forget a stopped download.
    async fn remove_download_result(&self, gid: &Gid) -> EngineResult<()>;

    /// `aria2.purgeDownloadResult`: forget every stopped download.
    async fn purge_download_result(&self) -> EngineResult<()>;

    /// `aria2.tellActive`.
    async fn tell_active(&self) -> EngineResult<Vec<DownloadSnapshot>>;

    /// `aria2.tellWaiting`.
    async fn tell_waiting(&self, offset: i64, count: u32) -> EngineResult<Vec<DownloadSnapshot>>;

    /// `aria2.getGlobalStat`.
    async fn get_global_stat(&self) -> EngineResult<GlobalStat>;

    /// `aria2.getGlobalOption`.
    async fn get_global_option(&self) -> EngineResult<DownloadOptions>;

    /// Bus carrying the engine's push notifications.
    fn notifications(&self) -> EventBus;

    /// Close the underlying connection.
    async fn close(&self) -> EngineResult<()>;
}

/// REST engine (qBittorrent Web API).
#[async_trait]
pub trait QbitApi: Send + Sync {
    /// `GET /app/preferences`.
    async fn app_preferences(&self) -> EngineResult<Map<String, Value>>;

    /// `POST /app/setPreferences`.
    async fn set_preferences(&self, preferences: &Map<String, Value>) -> EngineResult<()>;

    /// `GET /transfer/info`.
    async fn transfer_info(&self) -> EngineResult<TransferInfo>;

    /// `POST /torrents/stop`; `hashes` accepts `all`.
    async fn torrents_stop(&self, hashes: &str) -> EngineResult<()>;

    /// `POST /torrents/delete`; `hashes` accepts `all`.
    async fn torrents_delete(&self, hashes: &str, delete_files: bool) -> EngineResult<()>;

    /// Log out and release the session.
    async fn close(&self) -> EngineResult<()>;

    /// Whether every call is already routed through a retry policy.
    fn is_retrying(&self) -> bool {
        false
    }
}
