//! Error types for the mailsync system
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for mailsync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the mailsync system
#[derive(Error, Debug)]
pub enum Error {
    /// A provider call failed or returned an invalid/empty identifier
    #[error("Remote API error ({provider}): {message}")]
    RemoteApi {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// No contact list could be determined for an event
    #[error("{message}")]
    Resolution {
        /// The list name that failed verification, if any
        list_name: Option<String>,
        /// The locale carried by the event, if any
        locale: Option<String>,
        /// Operator-facing message
        message: String,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Local record absent
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Subscriber / list mapping / config store errors
    #[error("Store error: {0}")]
    Store(String),

    /// HTTP client errors (from provider APIs)
    #[error("HTTP error: {0}")]
    Http(String),

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Rate limiting errors
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a remote API error
    pub fn remote_api(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RemoteApi {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a resolution error for a mapped list that failed remote verification
    pub fn unverified_list(list_name: impl Into<String>, locale: impl Into<String>) -> Self {
        let list_name = list_name.into();
        let locale = locale.into();
        let message = format!(
            "Cannot retrieve contact list with name {}. Please modify your configuration for locale {}.",
            list_name, locale
        );
        Self::Resolution {
            list_name: Some(list_name),
            locale: Some(locale),
            message,
        }
    }

    /// Create a resolution error for when no list is configured at all
    pub fn no_list_configured(locale: Option<&str>) -> Self {
        Self::Resolution {
            list_name: None,
            locale: locale.map(str::to_string),
            message: "Cannot retrieve contact list, please check your configuration".to_string(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a rate limit error
    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::RateLimited(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Whether this error is the benign "nothing to do" kind
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
