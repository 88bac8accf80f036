use thiserror::Error;

use crate::store::StoreError;

/// Failures surfaced by the session controller to the presentation layer.
///
/// Cloneable because a single refresh outcome is handed to every caller that
/// was waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("no refresh token available")]
    NoRefreshToken,
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),
    #[error("not authenticated")]
    Unauthenticated,
    #[error("authorization revoked by the backend")]
    AuthorizationRevoked,
    #[error("registration failed: {0}")]
    Registration(String),
    #[error("auth backend unavailable: {0}")]
    Gateway(String),
    #[error("session storage failed: {0}")]
    Storage(String),
}

impl SessionError {
    /// Whether the caller should be sent back to the login screen.
    pub fn requires_login(&self) -> bool {
        matches!(
            self,
            SessionError::NoRefreshToken
                | SessionError::RefreshFailed(_)
                | SessionError::Unauthenticated
                | SessionError::AuthorizationRevoked
        )
    }
}

impl From<StoreError> for SessionError {
    fn from(err: StoreError) -> Self {
        SessionError::Storage(err.to_string())
    }
}
