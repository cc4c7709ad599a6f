//! Unified error handling for the epicfree crate
//!
//! Domain modules return their own error enums; this module folds them into
//! a single [`Error`] for callers that cross module boundaries, such as the
//! service layer and the binary.
//!
//! - [`EpicfreeErrorTrait`] - common interface for handling strategies
//! - [`ErrorCategory`] - coarse classification of errors
//! - [`Error`] - unified error enum
//!
//! ```rust,ignore
//! use epicfree::error::{EpicfreeErrorTrait, Error};
//!
//! fn handle_error(err: Error) {
//!     if err.is_recoverable() {
//!         tracing::warn!(category = %err.category(), "Retrying: {err}");
//!     } else {
//!         tracing::error!("Fatal error: {err}");
//!     }
//! }
//! ```

use std::fmt;
use std::io;
use thiserror::Error;

pub use crate::scheduler::error::SchedulerError;
pub use crate::utils::error::{BroadcastError, DeliveryError, DirectoryError, FetchError};

/// Common trait for all epicfree error types
pub trait EpicfreeErrorTrait: std::error::Error {
    /// Check if this error is recoverable (a later attempt may succeed)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Catalog fetch and HTTP errors
    Network,
    /// Message delivery and broadcast errors
    Delivery,
    /// Recipient directory and I/O errors
    Storage,
    /// Malformed payloads
    Parsing,
    /// Configuration and validation errors
    Config,
    /// Scheduler errors
    Scheduler,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Delivery => "delivery",
            Self::Storage => "storage",
            Self::Parsing => "parsing",
            Self::Config => "config",
            Self::Scheduler => "scheduler",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unified error type for the epicfree crate
#[derive(Error, Debug)]
pub enum Error {
    /// Catalog fetch errors
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Single-recipient delivery errors
    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    /// Dispatcher errors
    #[error("Broadcast error: {0}")]
    Broadcast(#[from] BroadcastError),

    /// Recipient directory errors
    #[error("Directory error: {0}")]
    Directory(#[from] DirectoryError),

    /// Scheduler errors
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl EpicfreeErrorTrait for FetchError {
    fn is_recoverable(&self) -> bool {
        FetchError::is_recoverable(self)
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidPayload(_) => ErrorCategory::Parsing,
            Self::NoEndpoints => ErrorCategory::Config,
            _ => ErrorCategory::Network,
        }
    }
}

impl EpicfreeErrorTrait for DeliveryError {
    fn is_recoverable(&self) -> bool {
        !self.is_permanent()
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Delivery
    }
}

impl EpicfreeErrorTrait for DirectoryError {
    fn is_recoverable(&self) -> bool {
        matches!(self, Self::Io { .. })
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Malformed { .. } => ErrorCategory::Parsing,
            _ => ErrorCategory::Storage,
        }
    }
}

impl EpicfreeErrorTrait for BroadcastError {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::AlreadyRunning => true,
            Self::Directory(e) => e.is_recoverable(),
            Self::EmptyPayload => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Directory(e) => e.category(),
            _ => ErrorCategory::Delivery,
        }
    }
}

impl EpicfreeErrorTrait for SchedulerError {
    fn is_recoverable(&self) -> bool {
        SchedulerError::is_recoverable(self)
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Scheduler
    }
}

impl EpicfreeErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Fetch(e) => EpicfreeErrorTrait::is_recoverable(e),
            Self::Delivery(e) => EpicfreeErrorTrait::is_recoverable(e),
            Self::Broadcast(e) => e.is_recoverable(),
            Self::Directory(e) => e.is_recoverable(),
            Self::Scheduler(e) => EpicfreeErrorTrait::is_recoverable(e),
            Self::Io(_) => true,
            Self::Json(_) => false,
            Self::Config(_) => false,
            Self::Other { .. } => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Fetch(e) => e.category(),
            Self::Delivery(e) => e.category(),
            Self::Broadcast(e) => e.category(),
            Self::Directory(e) => e.category(),
            Self::Scheduler(e) => e.category(),
            Self::Io(_) => ErrorCategory::Storage,
            Self::Json(_) => ErrorCategory::Parsing,
            Self::Config(_) => ErrorCategory::Config,
            Self::Other { .. } => ErrorCategory::Other,
        }
    }
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }

    /// Create a generic error with context and source
    pub fn with_source(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Other {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other {
            context: format!("{err:#}"),
            source: None,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T, E = Error> = std::result::Result<T, E>;
