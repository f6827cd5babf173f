//! # Task Error Types
//!
//! This module defines the recoverable execution failure raised by units of
//! work and cleanup handlers.
//!
//! ## Design Philosophy
//!
//! A failure described by [`TaskError`] is always recoverable: the runner that
//! observes it logs it and carries on with its shutdown sequence. The forceful
//! kill path is deliberately absent from this enum, see
//! [`KillSignal`](crate::handle::KillSignal).
//!
//! ## Usage Example
//!
//! ```rust
//! use spindle_api::errors::TaskError;
//!
//! fn describe(error: &TaskError) -> &'static str {
//!     match error {
//!         TaskError::Cancelled => "cancelled",
//!         TaskError::Failed(_) => "failed",
//!         TaskError::Other(_) => "other",
//!     }
//! }
//!
//! assert_eq!(describe(&TaskError::failed("boom")), "failed");
//! ```

use thiserror::Error;

use crate::handle::Cancelled;

/// Recoverable execution failure of a unit of work or a cleanup handler.
#[derive(Error, Debug)]
pub enum TaskError {
    /// A cooperative cancellation request was observed at a blocking point.
    ///
    /// Runners treat this as an orderly exit, not as a failure.
    #[error("Task was cancelled")]
    Cancelled,

    /// The task failed with a message.
    #[error("Task failed: {0}")]
    Failed(String),

    /// Any other error raised by task code.
    #[error("Task error: {0}")]
    Other(#[from] anyhow::Error),
}

impl TaskError {
    /// Shorthand for [`TaskError::Failed`].
    pub fn failed(message: impl Into<String>) -> Self {
        TaskError::Failed(message.into())
    }

    /// Returns true when the error only reports an observed cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaskError::Cancelled)
    }
}

impl From<Cancelled> for TaskError {
    fn from(_: Cancelled) -> Self {
        TaskError::Cancelled
    }
}

/// Result type returned by units of work and cleanup handlers.
pub type TaskResult = Result<(), TaskError>;
