//! Error types for the scheduler.

use thiserror::Error;

/// Errors that can occur in scheduler operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Invalid scheduling policy.
    #[error("invalid schedule policy: {0}")]
    InvalidConfig(String),

    /// A scheduling cycle panicked.
    #[error("scheduling cycle panicked: {0}")]
    CyclePanicked(String),
}
