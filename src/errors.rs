//! Top-level error type for pagination control

use crate::coordination::CoordinationError;

/// Failures surfaced by the pagination control surface
///
/// Run-time trouble inside an active loop (navigation failures,
/// extraction failures) ends the run with an `Error` state and a
/// [`crate::pagination::StopReason::Error`] in the summary instead of an
/// `Err` here; the summary is the authoritative account of how a run
/// ended.
#[derive(Debug, thiserror::Error)]
pub enum PaginationError {
    /// `start()` while a run is already active
    #[error("a pagination run is already active")]
    AlreadyRunning,

    #[error(transparent)]
    Coordination(#[from] CoordinationError),
}
