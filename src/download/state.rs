//! Per-item transfer state machine and terminal outcomes.

use std::path::PathBuf;

use tracing::trace;

/// Lifecycle state of one work item.
///
/// ```text
/// Pending -> Probing -> Resuming -> Writing -> Complete | Incomplete | Failed
///               |                     ^
///               +---------------------+
///               +-> AlreadyComplete | Inconsistent | Failed
///
/// Probing | Resuming | Writing -> Pending   (retry edge)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    /// Waiting for a worker or for the next retry.
    Pending,
    /// Unranged probe in flight.
    Probing,
    /// Ranged request in flight.
    Resuming,
    /// Streaming body to disk.
    Writing,
    /// Stream finished and size verified (or accepted as unverified).
    Complete,
    /// Local file already matched the remote size.
    AlreadyComplete,
    /// Stream ended short of the remote size.
    Incomplete,
    /// Local file larger than the remote size.
    Inconsistent,
    /// Gave up, including cancellation.
    Failed,
}

impl TransferState {
    /// Returns true for states an item never leaves.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Complete
                | Self::AlreadyComplete
                | Self::Incomplete
                | Self::Inconsistent
                | Self::Failed
        )
    }

    /// Returns true if `next` is a legal successor.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        use TransferState::{
            AlreadyComplete, Complete, Failed, Incomplete, Inconsistent, Pending, Probing,
            Resuming, Writing,
        };
        match (self, next) {
            (Pending, Probing | Failed)
            | (Probing, Resuming | Writing | AlreadyComplete | Inconsistent | Failed | Pending)
            | (Resuming, Writing | Failed | Pending)
            | (Writing, Complete | Incomplete | Failed | Pending) => true,
            _ => false,
        }
    }
}

/// Tracks the state of one item, enforcing legal transitions.
#[derive(Debug)]
pub(crate) struct StateTracker {
    item_id: usize,
    state: TransferState,
}

impl StateTracker {
    pub(crate) fn new(item_id: usize) -> Self {
        Self {
            item_id,
            state: TransferState::Pending,
        }
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> TransferState {
        self.state
    }

    /// Moves to `next`. Illegal edges are a bug in the caller.
    pub(crate) fn transition(&mut self, next: TransferState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transfer state edge {:?} -> {next:?}",
            self.state
        );
        trace!(item_id = self.item_id, from = ?self.state, to = ?next, "state transition");
        self.state = next;
    }
}

/// Terminal result of one work item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// All bytes written. `verified` is false when the server never reported a size.
    Complete {
        /// Final file size.
        bytes: u64,
        /// Whether the size was checked against the server's.
        verified: bool,
    },
    /// Nothing to do: local file already matched.
    AlreadyComplete {
        /// File size.
        bytes: u64,
    },
    /// Stream ended short.
    Incomplete {
        /// Bytes on disk.
        bytes_done: u64,
        /// Expected size.
        bytes_total: u64,
    },
    /// Local file is larger than the server's copy; needs manual inspection.
    Inconsistent {
        /// Size on disk.
        local_size: u64,
        /// Size reported by the server.
        remote_size: u64,
    },
    /// Gave up.
    Failed {
        /// Why.
        reason: String,
    },
    /// Stopped by the cancellation token.
    Cancelled {
        /// Bytes left on disk when the transfer stopped.
        bytes_done: u64,
    },
}

impl TransferOutcome {
    /// Complete or already complete.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::AlreadyComplete { .. })
    }

    /// Terminal state recorded for this outcome. Cancellation maps to `Failed`.
    #[must_use]
    pub fn state(&self) -> TransferState {
        match self {
            Self::Complete { .. } => TransferState::Complete,
            Self::AlreadyComplete { .. } => TransferState::AlreadyComplete,
            Self::Incomplete { .. } => TransferState::Incomplete,
            Self::Inconsistent { .. } => TransferState::Inconsistent,
            Self::Failed { .. } | Self::Cancelled { .. } => TransferState::Failed,
        }
    }
}

/// Outcome of one work item together with what the engine knows about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemOutcome {
    /// Engine-assigned identifier.
    pub item_id: usize,
    /// URL the item was downloaded from.
    pub source_url: String,
    /// Destination file, once it was resolved.
    pub path: Option<PathBuf>,
    /// Terminal result.
    pub outcome: TransferOutcome,
    /// Attempts made, 0 when the item never started.
    pub attempts: u32,
}

impl ItemOutcome {
    /// Outcome for an item that was never started because the run was cancelled.
    #[must_use]
    pub fn not_started(item_id: usize, source_url: impl Into<String>) -> Self {
        Self {
            item_id,
            source_url: source_url.into(),
            path: None,
            outcome: TransferOutcome::Cancelled { bytes_done: 0 },
            attempts: 0,
        }
    }

    /// Shorthand for `self.outcome.is_success()`.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }
}

#[cfg(test)]
mod tests {
    use super::TransferState::*;
    use super::*;

    const ALL: [TransferState; 9] = [
        Pending,
        Probing,
        Resuming,
        Writing,
        Complete,
        AlreadyComplete,
        Incomplete,
        Inconsistent,
        Failed,
    ];

    #[test]
    fn test_terminal_states_have_no_successors() {
        for from in ALL.into_iter().filter(|s| s.is_terminal()) {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{from:?} -> {to:?}");
            }
        }
    }

    #[test]
    fn test_retry_edge_only_from_active_states() {
        for from in ALL {
            let expected = matches!(from, Probing | Resuming | Writing);
            assert_eq!(from.can_transition_to(Pending), expected, "{from:?}");
        }
    }

    #[test]
    fn test_happy_path_resume_sequence() {
        let mut tracker = StateTracker::new(1);
        for next in [Probing, Resuming, Writing, Complete] {
            tracker.transition(next);
        }
        assert_eq!(tracker.state(), Complete);
    }

    #[test]
    fn test_outcome_state_mapping() {
        assert_eq!(
            TransferOutcome::Cancelled { bytes_done: 5 }.state(),
            TransferState::Failed
        );
        assert!(TransferOutcome::AlreadyComplete { bytes: 1 }.is_success());
        assert!(
            !TransferOutcome::Inconsistent {
                local_size: 2,
                remote_size: 1
            }
            .is_success()
        );
    }
}
