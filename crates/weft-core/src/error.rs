//! Error types shared across the weft workspace.
//!
//! Registry and unit-context bookkeeping never fails; errors originate
//! in unit bodies ([`UnitError`]) and surface from the scheduler loop
//! ([`CycleError`]) according to its fault policy.

use std::error::Error;
use std::fmt;

/// Errors from an individual unit body.
///
/// Returned by `Unit::run()` and wrapped in [`CycleError::UnitFailed`]
/// when the scheduler aborts the cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UnitError {
    /// The unit's body failed.
    ExecutionFailed {
        /// Human-readable description of the failure.
        reason: String,
    },
    /// The unit's body panicked; the scheduler caught the unwind.
    Panicked {
        /// The panic payload, if it was a string.
        message: String,
    },
}

impl UnitError {
    /// Convenience constructor for [`UnitError::ExecutionFailed`].
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for UnitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExecutionFailed { reason } => write!(f, "execution failed: {reason}"),
            Self::Panicked { message } => write!(f, "unit panicked: {message}"),
        }
    }
}

impl Error for UnitError {}

/// Errors from the scheduler loop during `run_cycle()`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CycleError {
    /// A unit body failed and the fault policy aborted the cycle.
    UnitFailed {
        /// Name of the failing unit.
        name: String,
        /// The underlying unit error.
        reason: UnitError,
    },
    /// Cycling is disabled after too many consecutive faulting cycles.
    SchedulerDisabled,
}

impl fmt::Display for CycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnitFailed { name, reason } => write!(f, "unit '{name}' failed: {reason}"),
            Self::SchedulerDisabled => {
                write!(f, "scheduler disabled after consecutive faulting cycles")
            }
        }
    }
}

impl Error for CycleError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::UnitFailed { reason, .. } => Some(reason),
            _ => None,
        }
    }
}
