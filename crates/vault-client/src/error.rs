//! Error types for `vault-client`.
//!
//! [`ClientError`] is what callers of the API client see. [`RefreshFailure`]
//! describes why a token refresh could not complete; it is cloneable because
//! one failure is delivered to every request that was waiting on the refresh.

use vault_storage::StorageError;

/// All errors that can occur when using the authenticated client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The access token expired and the refresh that should have replaced it
    /// failed. Unless [`RefreshFailure::ends_session`] is false the session
    /// has been cleared; treat the user as logged out.
    #[error("session expired: {0}")]
    AuthExpired(RefreshFailure),

    /// The backend answered with a non-success status.
    #[error("vault API error {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message extracted from the response body.
        message: String,
    },

    /// Network or HTTP client error.
    #[error("vault network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A request or response body could not be (de)serialized.
    #[error("vault json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The session record could not be written or removed.
    #[error("session storage error: {0}")]
    Storage(#[from] StorageError),

    /// A session without both tokens was about to be persisted.
    #[error("refusing to persist incomplete session: missing {field}")]
    IncompleteSession {
        /// The field that was missing or empty.
        field: &'static str,
    },

    /// The client was configured with an unusable value.
    #[error("vault client config error: {0}")]
    Config(String),
}

/// Why a token refresh did not produce a new access token.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefreshFailure {
    /// No refresh token was stored, so no refresh call was attempted.
    #[error("no refresh token available")]
    MissingRefreshToken,

    /// The refresh endpoint answered with a non-success status.
    #[error("refresh rejected with status {status}")]
    Rejected {
        /// HTTP status code returned by the refresh endpoint.
        status: u16,
    },

    /// The refresh call did not reach the backend or timed out.
    #[error("refresh request failed: {0}")]
    Network(String),

    /// The refresh endpoint answered 2xx without a usable access token.
    #[error("malformed refresh response: {0}")]
    MalformedResponse(String),

    /// The session record could not be read, or the refreshed session could
    /// not be persisted. The stored record is left as it was.
    #[error("session storage error during refresh: {0}")]
    Storage(String),

    /// The session was removed while the refresh was in flight, so the new
    /// tokens were discarded.
    #[error("signed out while the refresh was in flight")]
    SignedOut,

    /// The refresh task ended without reporting an outcome.
    #[error("refresh abandoned before completing")]
    Abandoned,
}

impl RefreshFailure {
    /// Whether this failure clears the stored session and fires the login
    /// redirect.
    ///
    /// Storage errors leave the record alone so a transient I/O error does
    /// not log the user out, and [`RefreshFailure::SignedOut`] means the
    /// session is already gone.
    #[must_use]
    pub fn ends_session(&self) -> bool {
        !matches!(self, Self::Storage(_) | Self::SignedOut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_backend_failures_end_the_session() {
        assert!(RefreshFailure::MissingRefreshToken.ends_session());
        assert!(RefreshFailure::Rejected { status: 401 }.ends_session());
        assert!(RefreshFailure::Network("refused".to_owned()).ends_session());
        assert!(RefreshFailure::MalformedResponse("{}".to_owned()).ends_session());
        assert!(RefreshFailure::Abandoned.ends_session());
        assert!(!RefreshFailure::Storage("disk".to_owned()).ends_session());
        assert!(!RefreshFailure::SignedOut.ends_session());
    }
}
