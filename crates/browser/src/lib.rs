//! # Wayfarer Browser
//!
//! An [`Environment`](wayfarer_core::Environment) that browses over plain
//! HTTP. Pages are fetched with `reqwest`, parsed with `scraper`, and
//! exposed to the agent as indexed interactive elements.
//!
//! There is no script execution and no rendering, so snapshots never carry
//! a visual reference.

pub mod dom;
pub mod environment;
pub mod fetch;

#[cfg(test)]
pub(crate) mod test_support;

pub use environment::HttpEnvironment;
pub use fetch::{FetchedPage, Fetcher, PageRequest, ReqwestFetcher};
