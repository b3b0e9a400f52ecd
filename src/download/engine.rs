//! Download engine for running a batch of work items with bounded concurrency.
//!
//! This module provides the `DownloadEngine` which coordinates concurrent
//! transfers using a semaphore-based concurrency control pattern, with
//! retries on transient failures handled per item.
//!
//! # Overview
//!
//! The engine takes a list of [`WorkItem`]s, downloads each with
//! [`transfer_with_retry`] through a shared [`HttpClient`], and returns
//! exactly one [`ItemOutcome`] per item, in submission order.
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
//! let engine = DownloadEngine::new(3, RetryPolicy::default())?;
//! let client = HttpClient::new(&TransportConfig::default())?;
//! let items = vec![WorkItem::new("http://example.com/cover.jpg").with_name("cover.jpg")];
//! let outcomes = engine
//!     .run(items, Path::new("./album"), &client, &Reporter::disabled(), &CancellationToken::new())
//!     .await;
//! println!("{} succeeded", outcomes.iter().filter(|o| o.is_success()).count());
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::progress::{ItemId, Reporter};
use super::retry::{RetryPolicy, TransferContext, transfer_with_retry};
use super::state::{ItemOutcome, TransferOutcome};
use super::transfer::{TransferOptions, WorkItem};
use super::HttpClient;

/// Minimum allowed concurrency value.
pub const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
pub const MAX_CONCURRENCY: usize = 100;

/// Default concurrency if not specified.
pub const DEFAULT_CONCURRENCY: usize = 3;

/// Error type for download engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },
}

/// Counts over the outcomes of one run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DownloadStats {
    completed: usize,
    failed: usize,
    cancelled: usize,
    retried: usize,
}

impl DownloadStats {
    /// Tallies a batch of outcomes.
    #[must_use]
    pub fn from_outcomes(outcomes: &[ItemOutcome]) -> Self {
        let mut stats = Self::default();
        for item in outcomes {
            match item.outcome {
                TransferOutcome::Complete { .. } | TransferOutcome::AlreadyComplete { .. } => {
                    stats.completed += 1;
                }
                TransferOutcome::Cancelled { .. } => stats.cancelled += 1,
                _ => stats.failed += 1,
            }
            stats.retried += item.attempts.saturating_sub(1) as usize;
        }
        stats
    }

    /// Returns the number of items that ended complete or already complete.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed
    }

    /// Returns the number of items that ended in any other non-cancelled outcome.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed
    }

    /// Returns the number of items stopped by cancellation.
    #[must_use]
    pub fn cancelled(&self) -> usize {
        self.cancelled
    }

    /// Returns the total number of items.
    #[must_use]
    pub fn total(&self) -> usize {
        self.completed + self.failed + self.cancelled
    }

    /// Returns the number of retry attempts made across all items.
    #[must_use]
    pub fn retried(&self) -> usize {
        self.retried
    }
}

/// Download engine for concurrent transfers with retry support.
///
/// # Concurrency Model
///
/// - Each item runs in its own Tokio task
/// - A semaphore permit is acquired before spawning each task, so at most
///   `concurrency` transfers (including their retry sleeps) are in flight
/// - Permits are released automatically when a task ends (RAII)
/// - The semaphore is shared across runs of the same engine
///
/// # Cancellation
///
/// The token is checked before each item is admitted and raced against the
/// permit wait. Items never admitted get a cancelled outcome without any
/// request being made; admitted items observe the token themselves.
#[derive(Debug)]
pub struct DownloadEngine {
    /// Semaphore for concurrency control.
    semaphore: Arc<Semaphore>,
    /// Configured concurrency limit.
    concurrency: usize,
    /// Delay policy for failed attempts.
    retry_policy: RetryPolicy,
    /// Shared transfer tunables.
    options: Arc<TransferOptions>,
    /// Source of item identifiers, unique for the engine's lifetime.
    next_id: AtomicUsize,
}

impl DownloadEngine {
    /// Creates a new download engine with default transfer options.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] if the value is outside
    /// the valid range (1-100).
    ///
    /// # Example
    ///
    /// ```
    /// use albumdl_core::download::{DownloadEngine, RetryPolicy};
    ///
    /// let engine = DownloadEngine::new(3, RetryPolicy::default()).unwrap();
    /// assert_eq!(engine.concurrency(), 3);
    /// ```
    pub fn new(concurrency: usize, retry_policy: RetryPolicy) -> Result<Self, EngineError> {
        Self::with_options(concurrency, retry_policy, TransferOptions::default())
    }

    /// Creates a new download engine with explicit transfer options.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] if the value is outside
    /// the valid range (1-100).
    #[instrument(level = "debug", skip(retry_policy, options))]
    pub fn with_options(
        concurrency: usize,
        retry_policy: RetryPolicy,
        options: TransferOptions,
    ) -> Result<Self, EngineError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(EngineError::InvalidConcurrency { value: concurrency });
        }

        debug!(
            concurrency,
            min_delay_ms = retry_policy.min_delay().as_millis(),
            max_delay_ms = retry_policy.max_delay().as_millis(),
            "creating download engine"
        );

        Ok(Self {
            semaphore: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            retry_policy,
            options: Arc::new(options),
            next_id: AtomicUsize::new(1),
        })
    }

    /// Returns the configured concurrency limit.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Returns the configured retry policy.
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Downloads every item into `directory` and returns one outcome per item,
    /// in the order the items were given.
    ///
    /// Individual failures never abort the batch. A task that panics is
    /// logged and recorded as failed.
    #[instrument(skip(self, items, client, reporter, cancel), fields(directory = %directory.display(), items = items.len()))]
    pub async fn run(
        &self,
        items: Vec<WorkItem>,
        directory: &Path,
        client: &HttpClient,
        reporter: &Reporter,
        cancel: &CancellationToken,
    ) -> Vec<ItemOutcome> {
        let ctx = TransferContext::new(
            client.clone(),
            Arc::clone(&self.options),
            self.retry_policy.clone(),
            reporter.clone(),
            cancel.clone(),
        );
        let mut slots: Vec<Slot> = Vec::with_capacity(items.len());

        info!("starting batch");

        for item in items {
            let item_id: ItemId = self.next_id.fetch_add(1, Ordering::Relaxed);

            if cancel.is_cancelled() {
                slots.push(Slot::Done(ItemOutcome::not_started(item_id, item.source_url)));
                continue;
            }

            // Acquire semaphore permit (waits if at concurrency limit)
            let permit = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                permit = Arc::clone(&self.semaphore).acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                slots.push(Slot::Done(ItemOutcome::not_started(item_id, item.source_url)));
                continue;
            };

            debug!(item_id, url = %item.source_url, "admitted item");

            let ctx = ctx.clone();
            let directory = directory.to_path_buf();
            let source_url = item.source_url.clone();
            let handle = tokio::spawn(async move {
                // Permit is dropped when this block exits (RAII)
                let _permit = permit;
                transfer_with_retry(&ctx, item_id, &item, &directory).await
            });
            slots.push(Slot::Running {
                item_id,
                source_url,
                handle,
            });
        }

        debug!(task_count = slots.len(), "waiting for transfers to complete");

        let mut outcomes = Vec::with_capacity(slots.len());
        for slot in slots {
            let outcome = match slot {
                Slot::Done(outcome) => outcome,
                Slot::Running {
                    item_id,
                    source_url,
                    handle,
                } => match handle.await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        warn!(item_id, url = %source_url, error = %e, "download task panicked");
                        ItemOutcome {
                            item_id,
                            source_url,
                            path: None,
                            outcome: TransferOutcome::Failed {
                                reason: format!("task aborted: {e}"),
                            },
                            attempts: 0,
                        }
                    }
                },
            };
            outcomes.push(outcome);
        }

        let stats = DownloadStats::from_outcomes(&outcomes);
        info!(
            completed = stats.completed(),
            failed = stats.failed(),
            cancelled = stats.cancelled(),
            retried = stats.retried(),
            total = stats.total(),
            "batch complete"
        );

        outcomes
    }
}

enum Slot {
    Done(ItemOutcome),
    Running {
        item_id: ItemId,
        source_url: String,
        handle: JoinHandle<ItemOutcome>,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::download::TransportConfig;

    fn outcome(outcome: TransferOutcome, attempts: u32) -> ItemOutcome {
        ItemOutcome {
            item_id: 1,
            source_url: "http://example.com/a.mp3".to_string(),
            path: None,
            outcome,
            attempts,
        }
    }

    // ==================== Construction Tests ====================

    #[test]
    fn test_engine_new_valid_concurrency() {
        let engine = DownloadEngine::new(1, RetryPolicy::default()).unwrap();
        assert_eq!(engine.concurrency(), 1);

        let engine = DownloadEngine::new(DEFAULT_CONCURRENCY, RetryPolicy::default()).unwrap();
        assert_eq!(engine.concurrency(), 3);

        let engine = DownloadEngine::new(100, RetryPolicy::default()).unwrap();
        assert_eq!(engine.concurrency(), 100);
    }

    #[test]
    fn test_engine_new_invalid_concurrency_zero() {
        let result = DownloadEngine::new(0, RetryPolicy::default());
        assert!(matches!(
            result,
            Err(EngineError::InvalidConcurrency { value: 0 })
        ));
    }

    #[test]
    fn test_engine_new_invalid_concurrency_too_high() {
        let result = DownloadEngine::new(101, RetryPolicy::default());
        assert!(matches!(
            result,
            Err(EngineError::InvalidConcurrency { value: 101 })
        ));
    }

    #[test]
    fn test_engine_stores_retry_policy() {
        let policy = RetryPolicy::new(Duration::from_millis(5), Duration::from_millis(9));
        let engine = DownloadEngine::new(2, policy).unwrap();
        assert_eq!(engine.retry_policy().max_delay(), Duration::from_millis(9));
    }

    #[test]
    fn test_engine_error_display() {
        let msg = EngineError::InvalidConcurrency { value: 0 }.to_string();
        assert!(msg.contains("invalid concurrency"));
        assert!(msg.contains('0'));
        assert!(msg.contains("100"));
    }

    // ==================== Stats Tests ====================

    #[test]
    fn test_download_stats_from_outcomes() {
        let outcomes = vec![
            outcome(
                TransferOutcome::Complete {
                    bytes: 10,
                    verified: true,
                },
                3,
            ),
            outcome(TransferOutcome::AlreadyComplete { bytes: 10 }, 1),
            outcome(
                TransferOutcome::Failed {
                    reason: "404".to_string(),
                },
                1,
            ),
            outcome(
                TransferOutcome::Inconsistent {
                    local_size: 2,
                    remote_size: 1,
                },
                1,
            ),
            outcome(TransferOutcome::Cancelled { bytes_done: 0 }, 0),
        ];

        let stats = DownloadStats::from_outcomes(&outcomes);
        assert_eq!(stats.completed(), 2);
        assert_eq!(stats.failed(), 2);
        assert_eq!(stats.cancelled(), 1);
        assert_eq!(stats.retried(), 2);
        assert_eq!(stats.total(), 5);
    }

    #[test]
    fn test_download_stats_default() {
        let stats = DownloadStats::default();
        assert_eq!(stats.total(), 0);
        assert_eq!(stats.retried(), 0);
    }

    // ==================== Run Tests ====================

    #[tokio::test]
    async fn test_run_empty_batch_returns_no_outcomes() {
        let engine = DownloadEngine::new(2, RetryPolicy::default()).unwrap();
        let client = HttpClient::new(&TransportConfig::default()).unwrap();
        let dir = tempfile::TempDir::new().unwrap();
        let outcomes = engine
            .run(
                Vec::new(),
                dir.path(),
                &client,
                &Reporter::disabled(),
                &CancellationToken::new(),
            )
            .await;
        assert!(outcomes.is_empty());
    }

    #[tokio::test]
    async fn test_run_pre_cancelled_marks_every_item_cancelled() {
        let engine = DownloadEngine::new(2, RetryPolicy::default()).unwrap();
        let client = HttpClient::new(&TransportConfig::default()).unwrap();
        let dir = tempfile::TempDir::new().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let items = (1..=4)
            .map(|n| WorkItem::new(format!("http://127.0.0.1:9/{n}.mp3")))
            .collect();
        let outcomes = engine
            .run(items, dir.path(), &client, &Reporter::disabled(), &cancel)
            .await;

        assert_eq!(outcomes.len(), 4);
        for item in &outcomes {
            assert_eq!(item.outcome, TransferOutcome::Cancelled { bytes_done: 0 });
            assert_eq!(item.attempts, 0);
        }
    }

    #[tokio::test]
    async fn test_item_ids_unique_across_runs() {
        let engine = DownloadEngine::new(1, RetryPolicy::default()).unwrap();
        let client = HttpClient::new(&TransportConfig::default()).unwrap();
        let dir = tempfile::TempDir::new().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let first = engine
            .run(
                vec![WorkItem::new("http://127.0.0.1:9/a.mp3")],
                dir.path(),
                &client,
                &Reporter::disabled(),
                &cancel,
            )
            .await;
        let second = engine
            .run(
                vec![WorkItem::new("http://127.0.0.1:9/a.mp3")],
                dir.path(),
                &client,
                &Reporter::disabled(),
                &cancel,
            )
            .await;
        assert_ne!(first[0].item_id, second[0].item_id);
    }
}
