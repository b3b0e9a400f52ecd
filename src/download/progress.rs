//! Progress and status events flowing from workers to the display.
//!
//! # Overview
//!
//! Workers never touch display state. Each one publishes [`ProgressEvent`]s
//! through a [`Reporter`], which wraps the sending half of an unbounded
//! `tokio::sync::mpsc` channel. Whoever owns the receiving half renders the
//! events however it likes; the library has no opinion.
//!
//! Status messages are also mirrored to `tracing` at the matching level, so a
//! run without a display still leaves a complete log.
//!
//! # Example
//!
//! ```
//! use albumdl_core::download::{ProgressEvent, Reporter};
//!
//! let (reporter, mut events) = Reporter::channel();
//! reporter.info("album started");
//! drop(reporter);
//! assert!(matches!(events.try_recv(), Ok(ProgressEvent::Status(_))));
//! ```

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{error, info, warn};

/// Identifier of one work item within a run.
pub type ItemId = usize;

/// Byte counters for one item, owned by the worker transferring it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    /// Item the counters belong to.
    pub item_id: ItemId,
    /// Bytes present in the destination file, including resumed bytes.
    pub bytes_done: u64,
    /// Remote size, or -1 when the server did not report one.
    pub bytes_total: i64,
}

impl TransferProgress {
    /// Fresh counters with unknown total.
    #[must_use]
    pub fn new(item_id: ItemId) -> Self {
        Self {
            item_id,
            bytes_done: 0,
            bytes_total: -1,
        }
    }

    /// Returns the total as `Some(bytes)` when known.
    #[must_use]
    pub fn total(&self) -> Option<u64> {
        u64::try_from(self.bytes_total).ok()
    }
}

/// Severity of a status message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Completions and summaries.
    Info,
    /// Retries and recoverable anomalies.
    Warning,
    /// Failures and inconsistencies.
    Error,
}

/// A terminal or intermediate status line for the display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    /// Message severity.
    pub severity: Severity,
    /// Human-readable text.
    pub text: String,
}

/// Event published by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// A transfer began streaming; `progress.bytes_done` is the resume offset.
    Started {
        /// Resolved destination file name.
        filename: String,
        /// Counters at stream start.
        progress: TransferProgress,
    },
    /// Bytes were written.
    Advanced(TransferProgress),
    /// The item reached a terminal outcome.
    Finished {
        /// Item that finished.
        item_id: ItemId,
        /// Whether the outcome counts as success.
        success: bool,
    },
    /// A status line.
    Status(StatusMessage),
}

/// Sending side of the progress channel.
///
/// Cloned into every worker. Sends never block; events are dropped silently
/// once the receiver is gone.
#[derive(Debug, Clone)]
pub struct Reporter {
    sender: Option<UnboundedSender<ProgressEvent>>,
}

impl Reporter {
    /// Creates a reporter and the receiver the display should drain.
    #[must_use]
    pub fn channel() -> (Self, UnboundedReceiver<ProgressEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                sender: Some(sender),
            },
            receiver,
        )
    }

    /// A reporter that only logs.
    #[must_use]
    pub fn disabled() -> Self {
        Self { sender: None }
    }

    /// Publishes an event.
    pub fn send(&self, event: ProgressEvent) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(event);
        }
    }

    /// Publishes an info-level status line.
    pub fn info(&self, text: impl Into<String>) {
        let text = text.into();
        info!("{text}");
        self.status(Severity::Info, text);
    }

    /// Publishes a warning-level status line.
    pub fn warning(&self, text: impl Into<String>) {
        let text = text.into();
        warn!("{text}");
        self.status(Severity::Warning, text);
    }

    /// Publishes an error-level status line.
    pub fn error(&self, text: impl Into<String>) {
        let text = text.into();
        error!("{text}");
        self.status(Severity::Error, text);
    }

    fn status(&self, severity: Severity, text: String) {
        self.send(ProgressEvent::Status(StatusMessage { severity, text }));
    }
}
