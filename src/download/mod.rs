//! Concurrent, resumable HTTP download engine.
//!
//! This module provides everything needed to fetch a batch of files into one
//! directory: a configured HTTP client, a per-file transfer that resumes from
//! whatever is already on disk, a retry loop with randomized delays, and a
//! semaphore-bounded engine that runs a batch and reports per-item outcomes.
//!
//! # Features
//!
//! - Streaming downloads written in fixed-size chunks
//! - Resume through HTTP range requests, with restart when ranges are ignored
//! - Detection of tiny error pages served in place of the real file
//! - Filename resolution from Content-Disposition headers
//! - Optional SOCKS5 proxy with remote DNS
//! - Cooperative cancellation through a shared token
//! - Progress events published over a channel
//!
//! # Example
//!
//! ```no_run
//! use albumdl_core::download::{
//!     DownloadEngine, HttpClient, Reporter, RetryPolicy, TransportConfig, WorkItem,
//! };
//! use std::path::Path;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpClient::new(&TransportConfig::default())?;
//! let engine = DownloadEngine::new(3, RetryPolicy::default())?;
//! let outcomes = engine
//!     .run(
//!         vec![WorkItem::new("http://example.com/track.mp3")],
//!         Path::new("./downloads"),
//!         &client,
//!         &Reporter::disabled(),
//!         &CancellationToken::new(),
//!     )
//!     .await;
//! println!("{:?}", outcomes[0].outcome);
//! # Ok(())
//! # }
//! ```

mod client;
pub mod constants;
mod engine;
mod error;
mod filename;
mod progress;
mod retry;
mod state;
mod transfer;

pub use client::{
    ByteRange, ClientBuildError, HttpClient, ProxySpecError, SocksProxy, TransportConfig,
};
pub use engine::{
    DEFAULT_CONCURRENCY, DownloadEngine, DownloadStats, EngineError, MAX_CONCURRENCY,
    MIN_CONCURRENCY,
};
pub use error::DownloadError;
pub use filename::sanitize_path_component;
pub use progress::{
    ItemId, ProgressEvent, Reporter, Severity, StatusMessage, TransferProgress,
};
pub use retry::{
    FailureType, RetryPolicy, TransferContext, classify_error, transfer_with_retry,
};
pub use state::{ItemOutcome, TransferOutcome, TransferState};
pub use transfer::{ResumePlan, TransferOptions, WorkItem, plan_resume};

// Note: we do NOT define module-local Result aliases.
// Use `Result<T, DownloadError>` explicitly in function signatures.
