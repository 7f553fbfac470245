#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls
)]

//! Engine-agnostic download interfaces, DTOs, and the shared task model.
//!
//! Layout: `model` (engine snapshots and pure helpers), `service` (engine
//! traits), `retry` (backoff policy and retrying client), `task` (listener
//! facade, collaborators, live task dictionary and lifecycle phases).

pub mod error;
pub mod model;
pub mod retry;
pub mod service;
pub mod task;

pub use error::{EngineError, EngineResult};
pub use model::{
    BittorrentInfo, DownloadFile, DownloadOptions, DownloadSnapshot, DownloadStatus, GlobalStat,
    METADATA_MARKER, TransferInfo, aria2_name, follow_torrent_disabled, is_metadata,
};
pub use relay_events::{DownloadEvent, EventBus, Gid};
pub use retry::{RetryPolicy, RetryingQbit, with_retry};
pub use service::{Aria2Api, QbitApi};
pub use task::{
    Button, ButtonMarkup, ChatRef, DownloadPhase, DuplicateCheck, IllegalTransition, MemoryReclaim,
    MessageId, Messenger, PhaseSignal, SentMessage, TaskDict, TaskEntry, TaskHandle, TaskListener,
    TaskRegistry, UnwantedFileCleaner,
};
