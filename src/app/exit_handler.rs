//! Exit code logic for the albumdl process.
//!
//! Single responsibility: map how the run ended to the process exit outcome.

use crate::ProcessExit;

/// Interrupted runs exit non-zero; finished runs exit zero even when some
/// tracks are missing, since those are reported on screen.
pub(crate) fn determine_exit_outcome(interrupted: bool) -> ProcessExit {
    if interrupted {
        ProcessExit::Interrupted
    } else {
        ProcessExit::Success
    }
}
