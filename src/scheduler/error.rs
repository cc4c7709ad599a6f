//! Error types for the scheduler module

use thiserror::Error;

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Scheduler-specific errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// Interval outside 1-24 hours
    #[error("Invalid check interval '{hours}'. Must be 1-24 hours")]
    InvalidInterval { hours: u32 },
}

impl SchedulerError {
    /// Create an invalid interval error
    pub fn invalid_interval(hours: u32) -> Self {
        Self::InvalidInterval { hours }
    }

    /// Check if the error is recoverable
    pub fn is_recoverable(&self) -> bool {
        false
    }
}
