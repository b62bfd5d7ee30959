//! Error types and handling for imgcache-core operations.
//!
//! The error surface splits into two halves that callers treat very
//! differently:
//!
//! - **Fatal errors** (`Config`, `Storage`, `Io`): surfaced to the build's
//!   error channel; a refresh never starts with an invalid credential.
//! - **Per-ID fetch failures** (`Connect`, `Timeout`, `MalformedPayload`,
//!   `RemoteFailure`, `MissingField`): logged and skipped. The affected cache
//!   entry keeps its previous value and the rest of the batch continues.
//!   Because a failed fetch never advances an entry's fetch timestamp, the ID
//!   is naturally retried on the next build cycle.

use thiserror::Error;

/// The main error type for imgcache-core operations.
///
/// All public fallible functions in this crate return [`Result<T>`]. Fetch
/// failures carry the request URL (or the offending Imgur ID) so callers can
/// log them with enough context to act on.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration is invalid or missing.
    ///
    /// Covers a missing or malformed `client_id` credential and unparseable
    /// config files. Always fatal: a refresh must not issue a single request
    /// with a bad credential.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Could not establish a connection to the Imgur API.
    #[error("unable to connect to {url}: {source}")]
    Connect {
        /// Request URL that could not be reached.
        url: String,
        /// Underlying transport error.
        source: reqwest::Error,
    },

    /// The Imgur API did not reply within the request timeout.
    #[error("timed out waiting for reply from {url}")]
    Timeout {
        /// Request URL that timed out.
        url: String,
    },

    /// The response body was not parseable as the expected JSON envelope.
    #[error("failed to parse JSON from {url}")]
    MalformedPayload {
        /// Request URL that produced the unparseable body.
        url: String,
    },

    /// The payload parsed but the remote call did not succeed.
    ///
    /// Carries the remote-supplied error message when the envelope includes
    /// one, else a generic "not available" marker.
    #[error("query unsuccessful from {url}: {reason}")]
    RemoteFailure {
        /// Request URL of the unsuccessful query.
        url: String,
        /// Remote-supplied reason, or "not available".
        reason: String,
    },

    /// The payload indicated success but lacks a field required to update the
    /// cache entry.
    #[error("Imgur response for {id} missing required field '{field}'")]
    MissingField {
        /// Imgur ID whose response was incomplete.
        id: String,
        /// Name of the missing JSON key.
        field: &'static str,
    },

    /// Persisted snapshot could not be read or written.
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error is a recoverable per-ID fetch failure.
    ///
    /// Fetch failures are non-fatal to a refresh batch: the orchestrator logs
    /// them, leaves the entry untouched, and continues with the remaining
    /// stale IDs. Everything else aborts the operation that produced it.
    #[must_use]
    pub const fn is_fetch_failure(&self) -> bool {
        matches!(
            self,
            Self::Connect { .. }
                | Self::Timeout { .. }
                | Self::MalformedPayload { .. }
                | Self::RemoteFailure { .. }
                | Self::MissingField { .. }
        )
    }

    /// Error category as a static string, for logging and grouping.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Connect { .. } => "connect",
            Self::Timeout { .. } => "timeout",
            Self::MalformedPayload { .. } => "malformed_payload",
            Self::RemoteFailure { .. } => "remote_failure",
            Self::MissingField { .. } => "missing_field",
            Self::Storage(_) => "storage",
            Self::Io(_) => "io",
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

/// Convenience type alias for `std::result::Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
