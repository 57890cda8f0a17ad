//! Client error types
//!
//! Provides the error taxonomy surfaced to callers, with classification
//! metadata for retry and session handling. Cache and store failures on
//! best-effort paths stay inside their modules and never reach this type.

use thiserror::Error;

/// Categories of client errors for retry and session logic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// No response was received - retryable
    Network,
    /// Session is no longer valid - re-authentication required
    Auth,
    /// The server answered with a non-success status - non-retryable here
    Server,
    /// Local problem with the request or response - non-retryable
    Client,
    /// Construction or configuration problem - non-retryable
    Config,
    /// Persistent store failure outside of best-effort cache paths
    Storage,
}

/// Errors surfaced by the StoresGo client
///
/// `Clone` is required so a settled token refresh can be broadcast to every
/// concurrent waiter.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// No response received: timeout, DNS failure, connection refused, or the
    /// client is known offline with no cached fallback.
    #[error("Network error: {0}")]
    Network(String),

    /// Token refresh failed or no refresh token exists. Persisted credentials
    /// have been cleared; the session layer must re-authenticate.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The server produced a response with a 4xx/5xx status (other than the
    /// 401-triggers-refresh case). Status and body are surfaced verbatim.
    #[error("Server returned status {status}: {body}")]
    Server { status: u16, body: String },

    /// A payload could not be serialized or a response body did not match the
    /// caller's expected type.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The client was misconfigured or could not be constructed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The persistent store failed while reading or writing credentials.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A queued request was discarded before it was dispatched.
    #[error("Request cancelled before dispatch")]
    Cancelled,
}

impl ClientError {
    /// Get the error category for this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Network(_) => ErrorCategory::Network,
            Self::Auth(_) => ErrorCategory::Auth,
            Self::Server { .. } => ErrorCategory::Server,
            Self::Serialization(_) | Self::Cancelled => ErrorCategory::Client,
            Self::Config(_) => ErrorCategory::Config,
            Self::Storage(_) => ErrorCategory::Storage,
        }
    }

    /// Check if the failed operation may be retried as-is
    ///
    /// Only network-level failures qualify; an HTTP response (4xx/5xx) means
    /// the request reached the server and retrying verbatim will not help.
    pub fn is_retryable(&self) -> bool {
        matches!(self.category(), ErrorCategory::Network)
    }
}
