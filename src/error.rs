//! Error types for the feed extractor.
//!
//! Every failure in the crate is an [`Error`] variant. Components never exit the
//! process themselves; `main` is the only place that turns an error into an exit
//! code via [`Error::exit_code`].

use thiserror::Error;

/// Result type alias for extractor operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the extractor
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid configuration, detected before any network activity
    #[error("configuration error: {message}{}", key_suffix(.key))]
    Config {
        /// Human-readable description of the problem
        message: String,
        /// The configuration key that caused the error (e.g. "#api_token")
        key: Option<String>,
    },

    /// The API rejected the token (HTTP 401)
    #[error("authentication failed")]
    Authentication,

    /// The feed does not exist (HTTP 404 on the first page)
    #[error("invalid feed id: {0}")]
    UnknownFeed(String),

    /// Any other unexpected response status
    #[error("unexpected HTTP status {status} from {url}")]
    Transport {
        /// Request URL
        url: String,
        /// Response status code
        status: u16,
        /// Response body, kept for diagnostics
        body: String,
    },

    /// The response body was not a feed page
    #[error("invalid feed response from {url}: {source}")]
    Decode {
        /// Request URL
        url: String,
        /// Underlying JSON error
        #[source]
        source: serde_json::Error,
    },

    /// A URL returned by the API could not be parsed
    #[error("invalid URL {url:?}: {source}")]
    InvalidUrl {
        /// The offending URL text
        url: String,
        /// Underlying parse error
        #[source]
        source: url::ParseError,
    },

    /// Network-level failure (connection, timeout, TLS)
    #[error("network error: {0}")]
    Http(#[from] reqwest::Error),

    /// An article field held a value that cannot be flattened
    #[error("malformed record at field '{field}': {reason}")]
    MalformedRecord {
        /// Flattened key of the offending field
        field: String,
        /// What was wrong with it
        reason: String,
    },

    /// The persisted state blob could not be interpreted
    #[error("invalid state: {0}")]
    State(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV encoding error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

fn key_suffix(key: &Option<String>) -> String {
    key.as_deref().map(|k| format!(" ({k})")).unwrap_or_default()
}

impl Error {
    /// Shorthand for a configuration error tied to a key.
    pub fn config(message: impl Into<String>, key: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Errors the operator can fix without touching the code.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Error::Config { .. } | Error::Authentication | Error::UnknownFeed(_)
        )
    }

    /// Process exit code for this error: 1 for user errors, 2 otherwise.
    pub fn exit_code(&self) -> u8 {
        if self.is_user_error() { 1 } else { 2 }
    }

    /// Whether a retry of the same request could succeed.
    ///
    /// Only server-side (5xx, 429) statuses and connection-level failures qualify.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Transport { status, .. } => *status >= 500 || *status == 429,
            Error::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }
}
