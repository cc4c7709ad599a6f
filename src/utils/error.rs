//! Error types for the epicfree notifier
//!
//! This module defines the domain error types used by the catalog source,
//! the delivery transports, the recipient directory and the dispatcher.

use thiserror::Error;

/// Errors that can occur while fetching the promotion catalog
#[derive(Error, Debug)]
pub enum FetchError {
    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Request timeout
    #[error("Request timeout")]
    Timeout,

    /// Endpoint answered with a non-success status code
    #[error("Unexpected status: {0}")]
    Status(u16),

    /// Endpoint answered with an empty body
    #[error("Empty response body")]
    EmptyBody,

    /// Body could not be read as a catalog payload
    #[error("Invalid catalog payload: {0}")]
    InvalidPayload(String),

    /// No endpoints were configured
    #[error("No catalog endpoints configured")]
    NoEndpoints,

    /// Every configured endpoint failed
    #[error("All {attempts} catalog endpoints failed, last cause: {last_cause}")]
    AllEndpointsFailed {
        attempts: usize,
        #[source]
        last_cause: Box<FetchError>,
    },
}

impl FetchError {
    /// Whether a later attempt could succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Http(_) | Self::Timeout | Self::EmptyBody => true,
            Self::Status(code) => *code == 429 || *code >= 500,
            Self::InvalidPayload(_) | Self::NoEndpoints => false,
            Self::AllEndpointsFailed { last_cause, .. } => last_cause.is_recoverable(),
        }
    }
}

/// Errors returned by a delivery transport for a single recipient
#[derive(Error, Debug)]
pub enum DeliveryError {
    /// Recipient blocked the bot, left the chat or was deactivated
    #[error("Recipient unreachable: {0}")]
    Unreachable(String),

    /// Transport asked us to slow down
    #[error("Rate limited, retry after {retry_after_secs:?}s")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Transport rejected the request
    #[error("API error {code}: {description}")]
    Api { code: u16, description: String },

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Anything else
    #[error("Delivery error: {0}")]
    Other(String),
}

impl DeliveryError {
    /// True when the recipient can never be reached again and should be marked not-live
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Unreachable(_))
    }
}

/// Errors raised by the broadcast dispatcher itself
#[derive(Error, Debug)]
pub enum BroadcastError {
    /// Another broadcast is in flight
    #[error("A broadcast is already running")]
    AlreadyRunning,

    /// Recipient list could not be loaded
    #[error("Failed to load recipients: {0}")]
    Directory(#[from] DirectoryError),

    /// Payload has nothing to send
    #[error("Broadcast payload is empty")]
    EmptyPayload,
}

/// Errors raised by a recipient directory
#[derive(Error, Debug)]
pub enum DirectoryError {
    /// Underlying file could not be read or written
    #[error("Directory I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Stored records are not valid JSON
    #[error("Malformed directory data in {path}: {source}")]
    Malformed {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// Recipient does not exist
    #[error("Unknown recipient: {0}")]
    UnknownRecipient(String),
}
