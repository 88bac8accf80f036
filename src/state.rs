//! Shared application state.
//!
//! Everything the CLI (or an embedding application) needs once the session
//! machinery is wired up.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use crate::client::AuthenticatedClient;
use crate::config::ConfigV1;
use crate::session::{LogoutReason, SessionController, SessionState};
use crate::store::TokenStore;

#[derive(Clone)]
pub struct AppState {
    /// Application configuration loaded at startup.
    pub config: Arc<ConfigV1>,
    pub store: TokenStore,
    pub session: Arc<SessionController>,
    /// API client that carries the session's bearer token.
    pub client: AuthenticatedClient,
}

/// Point-in-time view of the session for display.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub state: SessionState,
    /// Whether the in-memory access token is still inside its lifetime.
    pub authenticated: bool,
    pub expires_at: Option<String>,
    pub refresh_in_secs: Option<u64>,
    pub last_logout: Option<LogoutReason>,
    pub durable: bool,
}

impl AppState {
    /// Reads the session without refreshing or ending it.
    pub async fn status(&self) -> StatusReport {
        let current = self.session.current_session().await;
        StatusReport {
            state: self.session.state().await,
            authenticated: current
                .as_ref()
                .is_some_and(|session| !session.is_expired(Utc::now())),
            expires_at: current.map(|session| session.expires_at.to_rfc3339()),
            refresh_in_secs: self
                .session
                .next_refresh_at()
                .map(|at| at.saturating_duration_since(tokio::time::Instant::now()).as_secs()),
            last_logout: self.session.last_logout().await,
            durable: self.store.is_durable(),
        }
    }
}
