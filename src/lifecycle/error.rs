//! Recoverable lifecycle failures
//!
//! These never abort startup or teardown on their own. They are logged and
//! recorded in the Phase 2 and shutdown reports.

use std::time::Duration;
use thiserror::Error;

/// Failure of a single hook or shutdown entry
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Hook body returned an error
    #[error("Hook execution failed for {hook}: {message}")]
    HookFailed {
        /// Name of the hook that failed
        hook: String,
        /// Error message
        message: String,
    },

    /// Hook body panicked
    #[error("Hook panicked: {hook}")]
    HookPanicked {
        /// Name of the hook that panicked
        hook: String,
    },

    /// Hook exceeded its declared timeout
    #[error("Hook {hook} timed out after {timeout:?}")]
    HookTimeout {
        /// Name of the hook
        hook: String,
        /// The declared timeout
        timeout: Duration,
    },

    /// Shutdown entry returned an error or panicked
    #[error("Shutdown entry {entry} failed: {message}")]
    ShutdownEntryFailed {
        /// Name of the shutdown entry
        entry: String,
        /// Error message
        message: String,
    },

    /// Shutdown entry exceeded its time bound
    #[error("Shutdown entry {entry} timed out after {timeout:?}")]
    ShutdownEntryTimeout {
        /// Name of the shutdown entry
        entry: String,
        /// Effective bound (entry timeout clipped to the remaining deadline)
        timeout: Duration,
    },
}

impl LifecycleError {
    /// Create a hook failure error
    pub fn hook_failed(hook: impl Into<String>, message: impl Into<String>) -> Self {
        Self::HookFailed {
            hook: hook.into(),
            message: message.into(),
        }
    }

    /// Create a hook timeout error
    pub fn hook_timeout(hook: impl Into<String>, timeout: Duration) -> Self {
        Self::HookTimeout {
            hook: hook.into(),
            timeout,
        }
    }

    /// Create a shutdown entry failure error
    pub fn shutdown_failed(entry: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ShutdownEntryFailed {
            entry: entry.into(),
            message: message.into(),
        }
    }

    /// Create a shutdown entry timeout error
    pub fn shutdown_timeout(entry: impl Into<String>, timeout: Duration) -> Self {
        Self::ShutdownEntryTimeout {
            entry: entry.into(),
            timeout,
        }
    }
}
