#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls
)]

//! aria2 websocket JSON-RPC client.
//!
//! [`Aria2Client`] is a cheap handle over a background worker that owns the
//! socket. Push notifications are published on the client's [`EventBus`].

mod codec;
mod command;
mod convert;
mod worker;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use relay_config::Aria2Settings;
use relay_core::{
    Aria2Api, DownloadOptions, DownloadSnapshot, EngineError, EngineResult, Gid, GlobalStat,
};
use relay_events::EventBus;
use serde_json::{Value, json};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use command::RpcCommand;

/// Engine label used in errors, logs and metrics.
pub const ENGINE: &str = "aria2";

const COMMAND_BUFFER: usize = 128;

/// Handle to a live aria2 RPC connection.
#[derive(Clone)]
pub struct Aria2Client {
    commands: mpsc::Sender<RpcCommand>,
    events: EventBus,
    secret: Option<Arc<str>>,
    timeout: Duration,
    next_id: Arc<AtomicU64>,
}

impl Aria2Client {
    /// Open the websocket and start the worker.
    ///
    /// # Errors
    ///
    /// Returns a connection error when the handshake fails.
    pub async fn connect(settings: &Aria2Settings) -> EngineResult<Self> {
        let (socket, _) = tokio_tungstenite::connect_async(settings.rpc_url.as_str())
            .await
            .map_err(|err| EngineError::Connection {
                engine: ENGINE,
                message: err.to_string(),
            })?;
        info!(url = %settings.rpc_url, "connected to aria2");

        let events = EventBus::new();
        let (commands, receiver) = mpsc::channel(COMMAND_BUFFER);
        worker::spawn(socket, events.clone(), receiver);
        Ok(Self {
            commands,
            events,
            secret: settings.secret.as_deref().map(Arc::from),
            timeout: settings.request_timeout,
            next_id: Arc::new(AtomicU64::new(1)),
        })
    }

    async fn call(
        &self,
        method: &'static str,
        gid: Option<&Gid>,
        params: Vec<Value>,
    ) -> EngineResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = codec::request(id, method, self.secret.as_deref(), params);
        let (reply, response) = oneshot::channel();
        self.commands
            .send(RpcCommand::Call { id, frame, reply })
            .await
            .map_err(|_| closed())?;

        let outcome = match tokio::time::timeout(self.timeout, response).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(closed()),
            Err(_) => {
                let _ = self.commands.send(RpcCommand::Forget { id }).await;
                return Err(EngineError::Timeout {
                    engine: ENGINE,
                    operation: method,
                });
            }
        };
        outcome.map_err(|err| match err {
            EngineError::Rpc { code, message } => codec::RpcFailure { code, message }
                .into_error(gid.cloned()),
            other => other,
        })
    }

    async fn call_unit(
        &self,
        method: &'static str,
        gid: Option<&Gid>,
        params: Vec<Value>,
    ) -> EngineResult<()> {
        self.call(method, gid, params).await.map(|_| ())
    }
}

fn closed() -> EngineError {
    EngineError::Connection {
        engine: ENGINE,
        message: "websocket closed".to_string(),
    }
}

#[async_trait]
impl Aria2Api for Aria2Client {
    async fn tell_status(&self, gid: &Gid) -> EngineResult<DownloadSnapshot> {
        let value = self
            .call(
                "aria2.tellStatus",
                Some(gid),
                vec![json!(gid), json!(convert::STATUS_KEYS)],
            )
            .await?;
        convert::snapshot(value)
    }

    async fn get_option(&self, gid: &Gid) -> EngineResult<DownloadOptions> {
        let value = self
            .call("aria2.getOption", Some(gid), vec![json!(gid)])
            .await?;
        convert::options("getOption", value)
    }

    async fn change_option(&self, gid: &Gid, options: &DownloadOptions) -> EngineResult<()> {
        self.call_unit(
            "aria2.changeOption",
            Some(gid),
            vec![json!(gid), json!(options)],
        )
        .await
    }

    async fn change_global_option(&self, options: &DownloadOptions) -> EngineResult<()> {
        self.call_unit("aria2.changeGlobalOption", None, vec![json!(options)])
            .await
    }

    async fn force_remove(&self, gid: &Gid) -> EngineResult<()> {
        self.call_unit("aria2.forceRemove", Some(gid), vec![json!(gid)])
            .await
    }

    async fn force_pause(&self, gid: &Gid) -> EngineResult<()> {
        self.call_unit("aria2.forcePause", Some(gid), vec![json!(gid)])
            .await
    }

    async fn force_pause_all(&self) -> EngineResult<()> {
        self.call_unit("aria2.forcePauseAll", None, Vec::new()).await
    }

    async fn remove_download_result(&self, gid: &Gid) -> EngineResult<()> {
        self.call_unit("aria2.removeDownloadResult", Some(gid), vec![json!(gid)])
            .await
    }

    async fn purge_download_result(&self) -> EngineResult<()> {
        self.call_unit("aria2.purgeDownloadResult", None, Vec::new())
            .await
    }

    async fn tell_active(&self) -> EngineResult<Vec<DownloadSnapshot>> {
        let value = self
            .call("aria2.tellActive", None, vec![json!(convert::STATUS_KEYS)])
            .await?;
        convert::snapshots("tellActive", value)
    }

    async fn tell_waiting(&self, offset: i64, count: u32) -> EngineResult<Vec<DownloadSnapshot>> {
        let value = self
            .call(
                "aria2.tellWaiting",
                None,
                vec![json!(offset), json!(count), json!(convert::STATUS_KEYS)],
            )
            .await?;
        convert::snapshots("tellWaiting", value)
    }

    async fn get_global_stat(&self) -> EngineResult<GlobalStat> {
        let value = self.call("aria2.getGlobalStat", None, Vec::new()).await?;
        convert::global_stat(value)
    }

    async fn get_global_option(&self) -> EngineResult<DownloadOptions> {
        let value = self.call("aria2.getGlobalOption", None, Vec::new()).await?;
        convert::options("getGlobalOption", value)
    }

    fn notifications(&self) -> EventBus {
        self.events.clone()
    }

    async fn close(&self) -> EngineResult<()> {
        let (done, finished) = oneshot::channel();
        if self.commands.send(RpcCommand::Close { done }).await.is_err() {
            debug!("aria2 worker already stopped");
            return Ok(());
        }
        let _ = finished.await;
        Ok(())
    }
}
