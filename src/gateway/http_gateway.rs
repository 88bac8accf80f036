use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{AuthGateway, GatewayError};
use crate::config::GatewayConfig;
use crate::models::{Credentials, Identity, Registration, TokenGrant};

/// Talks to `{base_url}/auth/*` over HTTP with JSON bodies.
pub struct HttpAuthGateway {
    base_url: String,
    client: Client,
}

impl HttpAuthGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        info!("Creating HttpAuthGateway for '{}'", config.base_url);
        let client = Client::builder()
            .build()
            .map_err(|e| GatewayError::Transport(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self::with_client(config, client))
    }

    pub fn with_client(config: &GatewayConfig, client: Client) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, GatewayError> {
        debug!("POST {}", path);
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(format!("POST {} failed: {}", path, e)))?;
        decode(path, response).await
    }
}

/// Turns a non-2xx response into `Rejected` with the backend's `{"error": ...}`
/// message when present, otherwise parses the body as `T`.
async fn decode<T: DeserializeOwned>(path: &str, response: Response) -> Result<T, GatewayError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
            .unwrap_or(body);
        debug!("{} rejected with {}: {}", path, status, message);
        return Err(GatewayError::Rejected {
            status: status.as_u16(),
            message,
        });
    }

    response
        .json::<T>()
        .await
        .map_err(|e| GatewayError::Decode(format!("{}: {}", path, e)))
}

#[async_trait::async_trait]
impl AuthGateway for HttpAuthGateway {
    fn get_name(&self) -> &str {
        &self.base_url
    }

    async fn login(&self, credentials: &Credentials) -> Result<TokenGrant, GatewayError> {
        self.post("/auth/login", credentials).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, GatewayError> {
        self.post("/auth/refresh", &json!({ "refresh_token": refresh_token }))
            .await
    }

    async fn register(&self, registration: &Registration) -> Result<TokenGrant, GatewayError> {
        self.post("/auth/register", registration).await
    }

    async fn current_user(&self, access_token: &str) -> Result<Identity, GatewayError> {
        let path = "/auth/me";
        let response = self
            .client
            .get(self.url(path))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(format!("GET {} failed: {}", path, e)))?;
        decode(path, response).await
    }
}
