#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Relay bootstrap wiring: engine connections and the aria2 notification pipeline.
//!
//! Layout: `bootstrap.rs` (process wiring), `connector.rs` (engine lifecycle),
//! `listener.rs` (notification handlers), `context.rs` (shared handler state),
//! `collaborators.rs` (default messenger, duplicate check and cleaners).

/// Application bootstrap and environment loading.
pub mod bootstrap;
/// Default task collaborators.
pub mod collaborators;
/// Engine connection lifecycle.
pub mod connector;
/// Shared state for the notification handlers.
pub mod context;
/// Application error types.
pub mod error;
/// aria2 notification handlers.
pub mod listener;

pub use bootstrap::{Relay, run_app};
pub use connector::{
    EngineAvailability, EngineConnector, EngineFactory, LiveEngineFactory, OptionsCache,
};
pub use context::{ListenerContext, ListenerTimings, StopSignal};
pub use error::{AppError, AppResult};
pub use listener::{Aria2Listener, SeedingDisposition, seeding_disposition};
