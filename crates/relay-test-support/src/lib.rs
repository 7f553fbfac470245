#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls
)]

//! Shared test helpers used across integration suites.
//! Layout: fixtures.rs (snapshot builders), mocks.rs (recording engines and collaborators).

pub mod fixtures;
pub mod mocks;
