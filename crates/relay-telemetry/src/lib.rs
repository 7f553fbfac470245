#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls
)]

//! Logging and metrics shared by the relay binaries.
//!
//! Layout: `init` (subscriber installation and the process span), `metrics`
//! (Prometheus registry for engine and listener counters), `error`.

pub mod error;
pub mod init;
pub mod metrics;

pub use error::{Result, TelemetryError};
pub use init::{
    DEFAULT_LOG_LEVEL, GlobalContextGuard, LogFormat, LoggingConfig, build_sha, init_logging,
};
pub use metrics::{Metrics, MetricsSnapshot};
