use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use http::StatusCode;
use tracing::{debug, error, info, warn};

use super::coordinator::RefreshCoordinator;
use super::error::SessionError;
use super::lifecycle::{Lifecycle, LogoutReason, Phase, SessionState};
use super::scheduler::RefreshScheduler;
use crate::config::SessionConfig;
use crate::gateway::{bounded, AuthGateway, GatewayError};
use crate::models::{Credentials, Identity, Registration, Session, TokenGrant};
use crate::store::TokenStore;

/// The session state machine and the only surface the application talks to.
///
/// Construct one per application lifetime, call [`hydrate`](Self::hydrate)
/// on load and [`shutdown`](Self::shutdown) (or [`logout`](Self::logout))
/// on teardown.
pub struct SessionController {
    store: TokenStore,
    gateway: Arc<dyn AuthGateway>,
    coordinator: RefreshCoordinator,
    lifecycle: Arc<Lifecycle>,
    gateway_timeout: Duration,
    default_window: Duration,
}

impl SessionController {
    pub fn new(
        store: TokenStore,
        gateway: Arc<dyn AuthGateway>,
        config: &SessionConfig,
        gateway_timeout: Duration,
    ) -> Self {
        let lifecycle = Arc::new(Lifecycle::new());
        let coordinator = RefreshCoordinator::new(
            store.clone(),
            gateway.clone(),
            RefreshScheduler::new(config.refresh_skew()),
            lifecycle.clone(),
            gateway_timeout,
            config.default_window(),
        );
        Self {
            store,
            gateway,
            coordinator,
            lifecycle,
            gateway_timeout,
            default_window: config.default_window(),
        }
    }

    /// Restores a persisted session, if any, and arms its proactive refresh.
    ///
    /// A half-written or unreadable session is cleared and reported as
    /// logged out.
    pub async fn hydrate(&self) -> Result<SessionState, SessionError> {
        let Some(session) = self.stored_session().await? else {
            debug!("no persisted session to restore");
            return Ok(self.state().await);
        };

        let remaining = session.remaining(Utc::now());
        let can_refresh = session.can_refresh();
        info!(
            event_name = "session.hydrated",
            event_domain = "session",
            user_id = session.identity.id,
            remaining_secs = remaining.as_secs(),
            "restored persisted session"
        );

        let mut state = self.lifecycle.lock().await;
        state.establish(session);
        if can_refresh {
            self.coordinator.schedule(remaining);
        }
        drop(state);
        Ok(self.state().await)
    }

    pub async fn login(
        &self,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Identity, SessionError> {
        let credentials = Credentials::new(email, password);
        let previous = self.begin_authenticating().await;
        info!("Logging in '{}'", credentials.email);

        let issued_at = Utc::now();
        match bounded(self.gateway_timeout, self.gateway.login(&credentials)).await {
            Ok(grant) => self.establish(grant, issued_at).await,
            Err(e) => {
                self.abort_authenticating(previous).await;
                warn!("Login for '{}' failed: {}", credentials.email, e);
                Err(if e.is_client_rejection() {
                    SessionError::InvalidCredentials
                } else {
                    SessionError::Gateway(e.to_string())
                })
            }
        }
    }

    /// Creates an account and signs straight into it.
    pub async fn register(&self, registration: Registration) -> Result<Identity, SessionError> {
        let previous = self.begin_authenticating().await;
        info!(
            "Registering '{}' with role '{}'",
            registration.email, registration.role
        );

        let issued_at = Utc::now();
        match bounded(self.gateway_timeout, self.gateway.register(&registration)).await {
            Ok(grant) => self.establish(grant, issued_at).await,
            Err(e) => {
                self.abort_authenticating(previous).await;
                warn!("Registration for '{}' failed: {}", registration.email, e);
                Err(match e {
                    GatewayError::Rejected { message, .. } => SessionError::Registration(message),
                    other => SessionError::Gateway(other.to_string()),
                })
            }
        }
    }

    /// Ends the session. Always succeeds; storage errors are only logged.
    pub async fn logout(&self) {
        self.invalidate(LogoutReason::UserRequested).await;
    }

    /// Succeeds while a usable session is stored.
    ///
    /// An expired session is refreshed first (joining any refresh already
    /// running). A session restored without an armed timer gets one, sized
    /// from the token's remaining lifetime.
    pub async fn check_auth(&self) -> Result<(), SessionError> {
        let Some(stored) = self.stored_session().await? else {
            let state = self.lifecycle.lock().await;
            let was_authenticated = state.is_authenticated();
            drop(state);
            if was_authenticated {
                info!("session disappeared from the store");
                self.invalidate(LogoutReason::SessionLost).await;
            }
            return Err(SessionError::Unauthenticated);
        };

        let mut state = self.lifecycle.lock().await;
        // Our own copy knows the exact expiry; the store only has the token's claim.
        let known = state
            .session
            .as_ref()
            .filter(|current| current.access_token == stored.access_token)
            .cloned();
        let session = match known {
            Some(current) => current,
            None => {
                debug!("adopting session found in the store");
                state.establish(stored.clone());
                stored
            }
        };
        drop(state);

        if session.is_expired(Utc::now()) {
            if !session.can_refresh() {
                self.invalidate(LogoutReason::SessionLost).await;
                return Err(SessionError::Unauthenticated);
            }
            debug!("access token expired, refreshing before answering");
            return self.coordinator.request_refresh().await.map(|_| ());
        }

        if session.can_refresh()
            && !self.coordinator.scheduler().is_armed()
            && !self.coordinator.is_refreshing()
        {
            let remaining = session.remaining(Utc::now());
            debug!(
                remaining_secs = remaining.as_secs(),
                "no refresh timer armed, re-arming"
            );
            self.coordinator.schedule(remaining);
        }
        Ok(())
    }

    /// Reacts to an API error status. 401 and 403 end the session.
    pub async fn check_error(&self, status: StatusCode) -> Result<(), SessionError> {
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            warn!(
                event_name = "session.revoked",
                event_domain = "session",
                status = status.as_u16(),
                "backend rejected the session"
            );
            self.invalidate(LogoutReason::AuthorizationRevoked).await;
            return Err(SessionError::AuthorizationRevoked);
        }
        Ok(())
    }

    pub async fn get_identity(&self) -> Result<Identity, SessionError> {
        self.store
            .identity()
            .await?
            .ok_or(SessionError::Unauthenticated)
    }

    /// The user's role.
    pub async fn get_permissions(&self) -> Result<String, SessionError> {
        self.get_identity().await.map(|identity| identity.role)
    }

    /// Refreshes now, sharing the call with any refresh already running.
    pub async fn refresh(&self) -> Result<Session, SessionError> {
        self.coordinator.request_refresh().await
    }

    /// Re-reads the identity from the backend and stores it.
    pub async fn sync_identity(&self) -> Result<Identity, SessionError> {
        let access_token = self
            .store
            .access_token()
            .await?
            .ok_or(SessionError::Unauthenticated)?;
        let generation = self.lifecycle.lock().await.generation;

        let lookup = self.gateway.current_user(&access_token);
        let identity = match bounded(self.gateway_timeout, lookup).await {
            Ok(identity) => identity,
            Err(e) if e.is_auth_rejection() => {
                self.invalidate(LogoutReason::AuthorizationRevoked).await;
                return Err(SessionError::AuthorizationRevoked);
            }
            Err(e) => return Err(SessionError::Gateway(e.to_string())),
        };

        let mut state = self.lifecycle.lock().await;
        if state.generation != generation {
            return Err(SessionError::Unauthenticated);
        }
        if let Some(mut session) = state.session.clone() {
            session.identity = identity.clone();
            self.store.put(&session).await?;
            state.renew(session);
        }
        Ok(identity)
    }

    pub async fn state(&self) -> SessionState {
        let state = self.lifecycle.lock().await;
        match state.phase {
            Phase::LoggedOut => SessionState::LoggedOut,
            Phase::Authenticating => SessionState::Authenticating,
            Phase::Authenticated if self.coordinator.is_refreshing() => {
                SessionState::RefreshInFlight
            }
            Phase::Authenticated => SessionState::Authenticated,
        }
    }

    /// How the previous session ended, if one has.
    pub async fn last_logout(&self) -> Option<LogoutReason> {
        self.lifecycle.lock().await.last_logout
    }

    /// The in-memory session, if authenticated.
    pub async fn current_session(&self) -> Option<Session> {
        self.lifecycle.lock().await.session.clone()
    }

    /// When the next proactive refresh is due.
    pub fn next_refresh_at(&self) -> Option<tokio::time::Instant> {
        self.coordinator.scheduler().fire_at()
    }

    /// Releases the refresh timer without touching persisted state.
    pub fn shutdown(&self) {
        if self.coordinator.scheduler().disarm() {
            debug!("refresh timer released on shutdown");
        }
    }

    /// Reads the persisted session. Unusable contents end the session with
    /// `SessionLost` and read as nothing stored.
    async fn stored_session(&self) -> Result<Option<Session>, SessionError> {
        match self.store.get().await {
            Ok(session) => Ok(session),
            Err(e) if e.is_corrupt() => {
                warn!(
                    event_name = "session.corrupt",
                    event_domain = "session",
                    error = %e,
                    "persisted session unusable, clearing it"
                );
                self.invalidate(LogoutReason::SessionLost).await;
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn begin_authenticating(&self) -> Phase {
        let mut state = self.lifecycle.lock().await;
        let previous = state.phase;
        state.phase = Phase::Authenticating;
        previous
    }

    async fn abort_authenticating(&self, previous: Phase) {
        let mut state = self.lifecycle.lock().await;
        if state.phase == Phase::Authenticating {
            state.phase = previous;
        }
    }

    async fn establish(
        &self,
        grant: TokenGrant,
        issued_at: chrono::DateTime<Utc>,
    ) -> Result<Identity, SessionError> {
        let lifetime = grant.expires_in.map(|_| grant.lifetime(self.default_window));
        let session = Session::from_grant(grant, issued_at, None, self.default_window);
        let identity = session.identity.clone();

        let mut state = self.lifecycle.lock().await;
        self.coordinator.scheduler().disarm();
        if let Err(e) = self.store.put(&session).await {
            error!("Failed to persist session: {}", e);
            if let Err(e) = self.store.clear().await {
                error!("Failed to clear partial session: {}", e);
            }
            state.end(LogoutReason::SessionLost);
            return Err(e.into());
        }
        // Without a refresh token and a known lifetime there is nothing to schedule.
        if let Some(lifetime) = lifetime.filter(|_| session.can_refresh()) {
            self.coordinator.schedule(lifetime);
        }
        state.establish(session);
        info!(
            event_name = "session.established",
            event_domain = "session",
            user_id = identity.id,
            role = identity.role.as_str(),
            "session established"
        );
        Ok(identity)
    }

    /// Disarms the timer first, then clears storage, then forgets the session.
    async fn invalidate(&self, reason: LogoutReason) {
        let mut state = self.lifecycle.lock().await;
        self.coordinator.scheduler().disarm();
        if let Err(e) = self.store.clear().await {
            error!("Failed to clear session store: {}", e);
        }
        state.end(reason);
        info!(
            event_name = "session.ended",
            event_domain = "session",
            reason = ?reason,
            "session ended"
        );
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.shutdown();
    }
}
