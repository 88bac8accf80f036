//! Durable persistence of the session under three fixed keys.
//!
//! The layout is shared with anything else reading the same backend, so the
//! key names are part of the public contract.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use super::{KeyValueStore, StoreError};
use crate::models::session::to_chrono;
use crate::models::{decode_expiry, Identity, Session};
use crate::utils::log_throttle::LogThrottle;

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
pub const IDENTITY_KEY: &str = "user";

const SESSION_KEYS: [&str; 3] = [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, IDENTITY_KEY];
const FALLBACK_LOG_WINDOW: Duration = Duration::from_secs(60);

/// Reads and writes the persisted session. Tokens are opaque strings here.
#[derive(Clone)]
pub struct TokenStore {
    backend: Arc<dyn KeyValueStore>,
    default_window: Duration,
    throttle: Arc<LogThrottle>,
}

impl TokenStore {
    /// `default_window` is the lifetime assumed for a restored access token
    /// whose expiry cannot be read from the token itself.
    pub fn new(backend: Arc<dyn KeyValueStore>, default_window: Duration) -> Self {
        Self {
            backend,
            default_window,
            throttle: Arc::new(LogThrottle::new(FALLBACK_LOG_WINDOW)),
        }
    }

    pub fn is_durable(&self) -> bool {
        self.backend.is_durable()
    }

    /// Writes all session keys in one batch. A session without a refresh
    /// token removes any stale one.
    pub async fn put(&self, session: &Session) -> Result<(), StoreError> {
        let identity = serde_json::to_string(&session.identity)?;
        let mut entries = vec![
            (ACCESS_TOKEN_KEY, session.access_token.clone()),
            (IDENTITY_KEY, identity),
        ];
        match &session.refresh_token {
            Some(refresh_token) => entries.push((REFRESH_TOKEN_KEY, refresh_token.clone())),
            None => self.backend.remove_many(&[REFRESH_TOKEN_KEY]).await?,
        }
        self.backend.set_many(&entries).await?;
        debug!(
            user_id = session.identity.id,
            expires_at = %session.expires_at,
            "session persisted"
        );
        Ok(())
    }

    /// Restores the persisted session, `None` when no access token is stored.
    ///
    /// The expiry comes from the access token's `exp` claim when it is a JWT,
    /// otherwise it is assumed to be `default_window` from now.
    pub async fn get(&self) -> Result<Option<Session>, StoreError> {
        let Some(access_token) = self.access_token().await? else {
            return Ok(None);
        };
        let identity = self.identity().await?.ok_or(StoreError::Missing(IDENTITY_KEY))?;
        let refresh_token = self.refresh_token().await?;

        let expires_at = match decode_expiry(&access_token) {
            Some(expires_at) => expires_at,
            None => {
                if let Some(suppressed_count) = self.throttle.should_emit("store.expiry.fallback") {
                    warn!(
                        event_name = "store.expiry.fallback",
                        event_domain = "store",
                        default_window_secs = self.default_window.as_secs(),
                        suppressed_count,
                        "access token expiry not decodable, assuming default window"
                    );
                }
                Utc::now() + to_chrono(self.default_window)
            }
        };

        Ok(Some(Session {
            access_token,
            refresh_token,
            expires_at,
            identity,
        }))
    }

    /// Removes every session key; nothing is readable once this returns.
    pub async fn clear(&self) -> Result<(), StoreError> {
        self.backend.remove_many(&SESSION_KEYS).await?;
        debug!("session cleared from store");
        Ok(())
    }

    pub async fn access_token(&self) -> Result<Option<String>, StoreError> {
        self.backend.get(ACCESS_TOKEN_KEY).await
    }

    pub async fn refresh_token(&self) -> Result<Option<String>, StoreError> {
        self.backend.get(REFRESH_TOKEN_KEY).await
    }

    pub async fn identity(&self) -> Result<Option<Identity>, StoreError> {
        match self.backend.get(IDENTITY_KEY).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }
}
