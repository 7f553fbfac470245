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

//! Binary entrypoint that connects the download engines and relays their
//! notifications until interrupted.

use relay_app::{AppResult, run_app};

/// Bootstraps the relay and blocks until shutdown.
#[tokio::main]
async fn main() -> AppResult<()> {
    run_app().await
}
