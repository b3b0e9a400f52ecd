//! Album Downloader Core Library
//!
//! This library provides the core functionality for albumdl, which fetches
//! whole albums (or every album of an artist) from myzuka into
//! `"Artist - Title (Year)"` directories, resuming partial files and retrying
//! flaky transfers until they finish or the operator interrupts.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`download`] - HTTP transport, resumable transfers, retry loop and the
//!   bounded-concurrency engine
//! - [`site`] - Album source trait and markup extraction for site pages
//! - [`orchestrator`] - Album and artist batches built on the engine

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod download;
pub mod orchestrator;
pub mod site;
mod user_agent;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use download::{
    DEFAULT_CONCURRENCY, DownloadEngine, DownloadError, DownloadStats, EngineError, FailureType,
    HttpClient, ItemOutcome, ProgressEvent, Reporter, RetryPolicy, SocksProxy, TransferOutcome,
    TransportConfig, WorkItem, classify_error,
};
pub use orchestrator::{BatchResult, Orchestrator, OrchestratorError, Target};
pub use site::{AlbumSource, MyzukaSource};
pub use user_agent::{BROWSER_USER_AGENT, SITE_REFERER};
