use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::timeout;

use crate::models::{Credentials, Identity, Registration, TokenGrant};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("backend rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("failed to reach the backend: {0}")]
    Transport(String),
    #[error("backend did not answer within {0:?}")]
    Timeout(Duration),
    #[error("failed to parse backend response: {0}")]
    Decode(String),
}

impl GatewayError {
    /// True when the backend answered with a 4xx status.
    pub fn is_client_rejection(&self) -> bool {
        matches!(self, GatewayError::Rejected { status, .. } if (400..500).contains(status))
    }

    pub fn is_auth_rejection(&self) -> bool {
        matches!(self, GatewayError::Rejected { status: 401 | 403, .. })
    }
}

/// The backend's authentication endpoints, as seen from the client.
#[async_trait]
pub trait AuthGateway: Send + Sync {
    fn get_name(&self) -> &str;
    async fn login(&self, credentials: &Credentials) -> Result<TokenGrant, GatewayError>;
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, GatewayError>;
    async fn register(&self, registration: &Registration) -> Result<TokenGrant, GatewayError>;
    async fn current_user(&self, access_token: &str) -> Result<Identity, GatewayError>;
}

/// Runs a gateway call under `limit`. Running out of time is reported like
/// any other transport failure.
pub async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, GatewayError>
where
    F: Future<Output = Result<T, GatewayError>>,
{
    match timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(GatewayError::Timeout(limit)),
    }
}
