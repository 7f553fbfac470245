#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls
)]

//! qBittorrent Web API client.
//!
//! Endpoints are grouped per API section (`auth`, `app`, `transfer`,
//! `torrents`) as inherent methods on [`QbitClient`]; the [`QbitApi`] impl
//! delegates to them. The client has no retry of its own; wrap it with
//! `relay_core::with_retry`.

mod app;
mod auth;
mod client;
mod torrents;
mod transfer;

use async_trait::async_trait;
use relay_core::{EngineResult, QbitApi, TransferInfo};
use serde_json::{Map, Value};

pub use client::{ENGINE, QbitClient};

#[async_trait]
impl QbitApi for QbitClient {
    async fn app_preferences(&self) -> EngineResult<Map<String, Value>> {
        self.preferences().await
    }

    async fn set_preferences(&self, preferences: &Map<String, Value>) -> EngineResult<()> {
        self.apply_preferences(preferences).await
    }

    async fn transfer_info(&self) -> EngineResult<TransferInfo> {
        self.transfer().await
    }

    async fn torrents_stop(&self, hashes: &str) -> EngineResult<()> {
        self.stop(hashes).await
    }

    async fn torrents_delete(&self, hashes: &str, delete_files: bool) -> EngineResult<()> {
        self.delete(hashes, delete_files).await
    }

    async fn close(&self) -> EngineResult<()> {
        self.logout().await
    }
}
