//! Fake Async Error Types

use super::config::ConfigError;
use zonekit_core::ZoneError;

/// Errors returned by fake-async activations and clock operations
#[derive(Debug, thiserror::Error)]
pub enum FakeAsyncError {
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Usage Errors
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    /// An activation was started inside another one
    #[error("fake async activations cannot be nested")]
    NestedActivation,

    /// A clock operation was used outside an active window
    #[error("{operation} must be called inside a fake async activation")]
    NotActive { operation: &'static str },

    /// Invalid configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Zone bookkeeping refused an operation
    #[error(transparent)]
    Zone(#[from] ZoneError),

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Leaked Work
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    /// Periodic timers were still pending when the window closed
    #[error("{0} periodic timer(s) still in the queue.")]
    PendingPeriodicTimers(usize),

    /// One-shot timers were still pending when the window closed
    #[error("{0} timer(s) still in the queue.")]
    PendingTimers(usize),

    /// `drain_all` needed more rounds than allowed
    #[error("flush failed after reaching the limit of {limit} rounds. Does your code use a polling timeout?")]
    FlushLimitExceeded { limit: usize },

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Callback Failures
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    /// A task or the activation body failed and nothing handled the error
    #[error(transparent)]
    Callback(anyhow::Error),
}

impl FakeAsyncError {
    /// Check if the error is a programming mistake rather than a test
    /// failure
    pub fn is_usage_error(&self) -> bool {
        match self {
            Self::NestedActivation | Self::NotActive { .. } | Self::Config(_) => true,
            Self::Zone(err) => err.is_usage_error(),
            _ => false,
        }
    }

    /// Check if the error reports work left behind in the queues
    pub fn is_leak(&self) -> bool {
        matches!(
            self,
            Self::PendingPeriodicTimers(_) | Self::PendingTimers(_) | Self::FlushLimitExceeded { .. }
        )
    }
}

/// Recover typed errors that travelled through user callbacks
impl From<anyhow::Error> for FakeAsyncError {
    fn from(error: anyhow::Error) -> Self {
        let error = match error.downcast::<FakeAsyncError>() {
            Ok(fake) => return fake,
            Err(other) => other,
        };
        match error.downcast::<ZoneError>() {
            Ok(zone) => Self::Zone(zone),
            Err(other) => Self::Callback(other),
        }
    }
}
