//! # Zone Error Types
//!
//! Usage errors raised by the zone runtime itself.
//!
//! User callback failures are deliberately *not* part of this enum: they
//! travel as [`anyhow::Error`] so that `on_handle_error` hooks and whoever
//! invoked the task receive the original error unchanged. A `ZoneError`
//! always indicates a programming error in an embedder or a hook, never a
//! transient condition, so nothing here is retryable.

use crate::context::ZoneId;
use crate::task::TaskState;

/// Errors produced by zone bookkeeping and the task state machine
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ZoneError {
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Frame Errors
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// The current-zone register did not hold the frame being restored
    ///
    /// Frames are strictly nested; seeing this means something restored
    /// frames out of order.
    #[error("Zone frame mismatch on restore: expected {expected}, found {found:?}")]
    FrameMismatch {
        expected: ZoneId,
        found: Option<ZoneId>,
    },

    /// A hook returned without calling through to the wrapped callback
    #[error("A hook in zone '{zone}' did not invoke the callback")]
    InvocationSkipped { zone: String },

    /// A hook called through to a one-shot callback more than once
    #[error("Callback in zone '{zone}' was invoked more than once")]
    CallbackReentered { zone: String },

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Task Errors
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Illegal move in the task state machine
    #[error("Invalid task transition for '{label}': {from} -> {to}")]
    InvalidTransition {
        label: String,
        from: TaskState,
        to: TaskState,
    },

    /// Task was run, scheduled, or cancelled outside its zone of creation
    #[error("Task '{label}' can only be handled in the zone of creation (creation: {owner}; requested: {requested})")]
    ForeignTask {
        label: String,
        owner: String,
        requested: String,
    },

    /// The callback of a task was re-entered while already executing
    #[error("Task '{label}' is already running")]
    TaskBusy { label: String },

    /// A macrotask reached the root without an underlying primitive
    #[error("Task '{label}' is missing an underlying scheduling primitive")]
    MissingPrimitive { label: String },

    /// Cancellation reached the root but the primitive cannot disarm
    #[error("Task '{label}' is not cancellable")]
    NotCancellable { label: String },

    /// A hook or host refused to schedule the task
    #[error("Scheduling of '{label}' rejected: {reason}")]
    Rejected { label: String, reason: String },

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Patch Registry Errors
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// No primitive with this name has been installed
    #[error("Unknown scheduling primitive: {name}")]
    UnknownPrimitive { name: String },
}

impl ZoneError {
    /// Check if the error is a usage error (programming mistake)
    ///
    /// Only [`ZoneError::Rejected`] can be an expected outcome: a hook may
    /// legitimately refuse work it cannot simulate.
    pub fn is_usage_error(&self) -> bool {
        !matches!(self, Self::Rejected { .. })
    }

    /// Check if the error came from the task state machine
    pub fn is_task_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidTransition { .. }
                | Self::ForeignTask { .. }
                | Self::TaskBusy { .. }
                | Self::MissingPrimitive { .. }
                | Self::NotCancellable { .. }
        )
    }
}

/// Result of zone bookkeeping operations
pub type ZoneResult<T> = Result<T, ZoneError>;

/// Result of user callbacks and of anything that runs them
///
/// Callbacks may fail with any error; the zone runtime passes it through
/// untouched.
pub type TaskResult<T = ()> = anyhow::Result<T>;
