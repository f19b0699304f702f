//! Error types for credential operations

/// Errors from acquiring, refreshing, or validating the OAuth credential.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No credential is held: the authorization flow has not completed
    /// (or the user signed out).
    #[error("no credential present, complete the authorization flow first")]
    Unauthenticated,

    /// The refresh token was revoked; the user must go through the
    /// authorization flow again before any further calls can succeed.
    #[error("credential revoked, user must authorize again")]
    ReauthorizationRequired,

    /// The token endpoint reported the refresh token invalid
    /// (`invalid_grant` or an auth-status rejection). Terminal for the
    /// current credential.
    #[error("refresh token rejected: {0}")]
    RefreshRevoked(String),

    /// The token endpoint rejected an exchange, or returned a body missing
    /// the required token fields.
    #[error("token endpoint rejected the exchange ({status}): {body}")]
    RemoteRejected { status: u16, body: String },

    /// An outbound call exceeded its configured timeout. The stored
    /// credential is left untouched so the next caller can retry.
    #[error("request timed out: {0}")]
    NetworkTimeout(String),

    /// Transport-level failure other than a timeout (connection refused,
    /// TLS, truncated response).
    #[error("transport error: {0}")]
    Transport(String),
}

/// Result alias for credential operations.
pub type Result<T> = std::result::Result<T, AuthError>;
