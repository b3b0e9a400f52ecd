//! Retry loop with randomized delays for transient download failures.
//!
//! This module provides the [`RetryPolicy`] and [`FailureType`] types for
//! classifying download errors, and [`transfer_with_retry`], which drives one
//! work item to a terminal outcome.
//!
//! # Overview
//!
//! When an attempt fails, the error is classified into a [`FailureType`]:
//! - [`FailureType::Transient`] - retried after a random delay, with no attempt ceiling
//! - [`FailureType::Fatal`] - reported as a failed outcome immediately
//! - [`FailureType::Cancelled`] - reported as a cancelled outcome immediately
//!
//! An attempt that streams fewer bytes than the server advertised is retried
//! like a transient error. Retrying never stops on its own: the only way out of
//! a server that keeps failing is the cancellation token, which is checked
//! before every attempt and raced against every sleep.
//!
//! # Example
//!
//! ```
//! use albumdl_core::download::{DownloadError, FailureType, classify_error};
//!
//! let error = DownloadError::http_status("http://example.com/a.mp3", 503);
//! assert_eq!(classify_error(&error), FailureType::Transient);
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::constants::{DEFAULT_MAX_RETRY_DELAY, DEFAULT_MIN_RETRY_DELAY};
use super::progress::{ItemId, ProgressEvent, Reporter};
use super::state::{ItemOutcome, StateTracker, TransferOutcome, TransferState};
use super::transfer::{TransferOptions, WorkItem, local_file_size, transfer};
use super::{DownloadError, HttpClient};

/// Classification of download failure types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Temporary failure that may succeed on retry.
    ///
    /// Examples: timeout, connection refused, 5xx server errors.
    Transient,

    /// Failure that won't succeed regardless of retries.
    ///
    /// Examples: malformed URL, unsupported scheme, 404.
    Fatal,

    /// The shared cancellation token fired.
    Cancelled,
}

/// Wait between attempts, sampled uniformly from `[min_delay, max_delay]`.
///
/// # Default Values
///
/// - `min_delay`: 3 seconds
/// - `max_delay`: 10 seconds
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    min_delay: Duration,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            min_delay: DEFAULT_MIN_RETRY_DELAY,
            max_delay: DEFAULT_MAX_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy. Bounds given in the wrong order are swapped.
    #[must_use]
    pub fn new(min_delay: Duration, max_delay: Duration) -> Self {
        if min_delay <= max_delay {
            Self {
                min_delay,
                max_delay,
            }
        } else {
            Self {
                min_delay: max_delay,
                max_delay: min_delay,
            }
        }
    }

    /// Returns the lower delay bound.
    #[must_use]
    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    /// Returns the upper delay bound.
    #[must_use]
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Samples the next delay.
    #[must_use]
    pub fn next_delay(&self) -> Duration {
        let min_ms = u64::try_from(self.min_delay.as_millis()).unwrap_or(u64::MAX);
        let max_ms = u64::try_from(self.max_delay.as_millis()).unwrap_or(u64::MAX);
        let mut rng = rand::thread_rng();
        Duration::from_millis(rng.gen_range(min_ms..=max_ms))
    }

    /// Sleeps for `delay` unless `cancel` fires first.
    ///
    /// Returns `false` when cancelled, including when the token was already
    /// set on entry.
    pub async fn sleep(&self, delay: Duration, cancel: &CancellationToken) -> bool {
        if cancel.is_cancelled() {
            return false;
        }
        tokio::select! {
            biased;
            () = cancel.cancelled() => false,
            () = tokio::time::sleep(delay) => true,
        }
    }

    /// Sleeps for a freshly sampled delay unless `cancel` fires first.
    pub async fn pause(&self, cancel: &CancellationToken) -> bool {
        self.sleep(self.next_delay(), cancel).await
    }
}

/// Classifies a download error into a failure type for retry decisions.
///
/// # HTTP Status Code Classification
///
/// | Status | Type | Rationale |
/// |--------|------|-----------|
/// | 403 | Transient | The site answers 403 while throttling |
/// | 408 | Transient | Request timeout |
/// | 429 | Transient | Rate limited |
/// | other 4xx | Fatal | Resource missing or request wrong |
/// | 5xx | Transient | Server error |
///
/// # Non-HTTP Errors
///
/// | Error | Type | Rationale |
/// |-------|------|-----------|
/// | Timeout | Transient | Network may recover |
/// | Network | Transient | Includes proxy failures and mid-stream resets |
/// | IO | Fatal | Local file system issue |
/// | InvalidUrl / UnsupportedScheme | Fatal | Won't succeed |
/// | Cancelled | Cancelled | Operator asked to stop |
#[must_use]
pub fn classify_error(error: &DownloadError) -> FailureType {
    match error {
        DownloadError::HttpStatus { status, .. } => classify_http_status(*status),
        DownloadError::Timeout { .. } | DownloadError::Network { .. } => FailureType::Transient,
        DownloadError::Io { .. }
        | DownloadError::InvalidUrl { .. }
        | DownloadError::UnsupportedScheme { .. } => FailureType::Fatal,
        DownloadError::Cancelled { .. } => FailureType::Cancelled,
    }
}

#[allow(clippy::match_same_arms)]
fn classify_http_status(status: u16) -> FailureType {
    match status {
        403 => FailureType::Transient,
        408 => FailureType::Transient,
        429 => FailureType::Transient,
        status if (400..500).contains(&status) => FailureType::Fatal,
        status if (500..600).contains(&status) => FailureType::Transient,
        _ => FailureType::Fatal,
    }
}

/// Everything a worker needs besides the item itself.
#[derive(Debug, Clone)]
pub struct TransferContext {
    pub(crate) client: HttpClient,
    pub(crate) options: Arc<TransferOptions>,
    pub(crate) policy: RetryPolicy,
    pub(crate) reporter: Reporter,
    pub(crate) cancel: CancellationToken,
}

impl TransferContext {
    /// Bundles the shared collaborators of a run.
    #[must_use]
    pub fn new(
        client: HttpClient,
        options: Arc<TransferOptions>,
        policy: RetryPolicy,
        reporter: Reporter,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            options,
            policy,
            reporter,
            cancel,
        }
    }
}

/// Drives one work item to exactly one terminal outcome.
///
/// Transient errors and short streams are retried after a random delay from
/// the policy, with no attempt ceiling; each retry starts over from the probe
/// so the local size is measured again. Fatal errors end in
/// [`TransferOutcome::Failed`]. Cancellation, whether observed before an
/// attempt, during the sleep or inside the transfer, ends in
/// [`TransferOutcome::Cancelled`].
#[instrument(skip(ctx, item, directory), fields(url = %item.source_url))]
pub async fn transfer_with_retry(
    ctx: &TransferContext,
    item_id: ItemId,
    item: &WorkItem,
    directory: &Path,
) -> ItemOutcome {
    let mut tracker = StateTracker::new(item_id);
    let mut path: Option<PathBuf> = None;
    let mut attempts = 0u32;

    let outcome = loop {
        if ctx.cancel.is_cancelled() {
            break cancelled_outcome(path.as_deref()).await;
        }
        attempts += 1;
        debug!(attempt = attempts, "starting transfer attempt");

        let reason =
            match transfer(ctx, item_id, item, directory, &mut tracker, &mut path).await {
                Ok(TransferOutcome::Incomplete {
                    bytes_done,
                    bytes_total,
                }) => format!("download incomplete ({bytes_done} of {bytes_total} bytes)"),
                Ok(outcome) => break outcome,
                Err(error) => match classify_error(&error) {
                    FailureType::Cancelled => break cancelled_outcome(path.as_deref()).await,
                    FailureType::Fatal => {
                        ctx.reporter
                            .error(format!("Failed to download {}: {error}", item.label()));
                        break TransferOutcome::Failed {
                            reason: error.to_string(),
                        };
                    }
                    FailureType::Transient => error.to_string(),
                },
            };

        tracker.transition(TransferState::Pending);
        let delay = ctx.policy.next_delay();
        ctx.reporter.warning(format!(
            "Problem downloading {}: {reason}, retrying in {:.1}s",
            item.label(),
            delay.as_secs_f64()
        ));
        if !ctx.policy.sleep(delay, &ctx.cancel).await {
            break cancelled_outcome(path.as_deref()).await;
        }
    };

    tracker.transition(outcome.state());
    ctx.reporter.send(ProgressEvent::Finished {
        item_id,
        success: outcome.is_success(),
    });

    ItemOutcome {
        item_id,
        source_url: item.source_url.clone(),
        path,
        outcome,
        attempts,
    }
}

async fn cancelled_outcome(path: Option<&Path>) -> TransferOutcome {
    let bytes_done = match path {
        Some(path) => local_file_size(path).await.unwrap_or(0),
        None => 0,
    };
    TransferOutcome::Cancelled { bytes_done }
}
