//! Outbound API calls carrying the current session.
//!
//! The bearer token is read from the store at send time, so a refresh that
//! lands between two calls is picked up without any coordination here.

use std::sync::Arc;

use http::StatusCode;
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::config::GatewayConfig;
use crate::session::{SessionController, SessionError};
use crate::store::TokenStore;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("request failed with {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Clone)]
pub struct AuthenticatedClient {
    http: Client,
    base_url: String,
    store: TokenStore,
    session: Arc<SessionController>,
}

impl AuthenticatedClient {
    pub fn new(
        config: &GatewayConfig,
        store: TokenStore,
        session: Arc<SessionController>,
    ) -> Result<Self, ClientError> {
        let http = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            store,
            session,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn authorize(&self, request: RequestBuilder) -> Result<RequestBuilder, ClientError> {
        Ok(match self.store.access_token().await.map_err(SessionError::from)? {
            Some(token) => request.bearer_auth(token),
            None => request,
        })
    }

    /// Sends one request. 401 and 403 end the session and surface as
    /// `AuthorizationRevoked`; there is no retry.
    pub async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<reqwest::Response, ClientError> {
        let mut request = self.http.request(method.clone(), self.url(path));
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = self.authorize(request).await?.send().await?;

        let status = response.status();
        debug!("{} {} -> {}", method, path, status);
        if status.is_success() {
            return Ok(response);
        }

        self.session.check_error(status).await?;
        let body = response.text().await.unwrap_or_default();
        Err(ClientError::Status { status, body })
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let response = self.send::<Value>(Method::GET, path, None).await?;
        Ok(response.json().await?)
    }

    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let response = self.send(Method::POST, path, Some(body)).await?;
        Ok(response.json().await?)
    }

    pub async fn put<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let response = self.send(Method::PUT, path, Some(body)).await?;
        Ok(response.json().await?)
    }

    pub async fn delete(&self, path: &str) -> Result<(), ClientError> {
        self.send::<Value>(Method::DELETE, path, None).await?;
        Ok(())
    }
}
