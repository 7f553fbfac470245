#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls
)]

//! Environment-driven configuration for the relay process.
//!
//! Layout: `model` (typed settings), `loader` (environment lookup and
//! defaults), `validate` (field parsers), `error`.

pub mod error;
pub mod loader;
pub mod model;
mod validate;

pub use error::{ConfigError, Result};
pub use model::{Aria2Settings, BotConfig, QbitSettings};
