//! Single-flight token refresh.
//!
//! Every refresh request (proactive timer, expired `check_auth`, explicit
//! `refresh`) goes through [`RefreshCoordinator::request_refresh`]. The first
//! caller to find the slot empty installs a shared future and starts the
//! network call; everyone arriving while it runs awaits that same future.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::error::SessionError;
use super::lifecycle::{Lifecycle, LogoutReason};
use super::scheduler::RefreshScheduler;
use crate::gateway::{bounded, AuthGateway};
use crate::models::Session;
use crate::store::TokenStore;

pub type RefreshOutcome = Result<Session, SessionError>;

struct PendingRefresh {
    attempt: Uuid,
    generation: u64,
    outcome: Shared<BoxFuture<'static, RefreshOutcome>>,
}

struct CoordinatorInner {
    store: TokenStore,
    gateway: Arc<dyn AuthGateway>,
    scheduler: RefreshScheduler,
    lifecycle: Arc<Lifecycle>,
    gateway_timeout: Duration,
    default_window: Duration,
    pending: Mutex<Option<PendingRefresh>>,
}

/// Cheap to clone; all clones share one in-flight slot and one scheduler.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl RefreshCoordinator {
    pub(crate) fn new(
        store: TokenStore,
        gateway: Arc<dyn AuthGateway>,
        scheduler: RefreshScheduler,
        lifecycle: Arc<Lifecycle>,
        gateway_timeout: Duration,
        default_window: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                store,
                gateway,
                scheduler,
                lifecycle,
                gateway_timeout,
                default_window,
                pending: Mutex::new(None),
            }),
        }
    }

    /// Refreshes the session, or joins the refresh already running for it.
    pub async fn request_refresh(&self) -> RefreshOutcome {
        let generation = self.inner.lifecycle.lock().await.generation;
        let outcome = {
            let mut pending = self.inner.pending();
            match pending.as_ref() {
                Some(inflight) if inflight.generation == generation => {
                    debug!(attempt = %inflight.attempt, "joining in-flight refresh");
                    inflight.outcome.clone()
                }
                _ => {
                    let attempt = Uuid::new_v4();
                    let task = tokio::spawn(CoordinatorInner::run(
                        Arc::clone(&self.inner),
                        attempt,
                        generation,
                    ));
                    let outcome = async move {
                        task.await.unwrap_or_else(|e| {
                            Err(SessionError::RefreshFailed(format!(
                                "refresh task aborted: {}",
                                e
                            )))
                        })
                    }
                    .boxed()
                    .shared();
                    *pending = Some(PendingRefresh {
                        attempt,
                        generation,
                        outcome: outcome.clone(),
                    });
                    outcome
                }
            }
        };
        outcome.await
    }

    /// Arms the proactive refresh for a token that expires in `expires_in`.
    pub fn schedule(&self, expires_in: Duration) {
        self.inner.schedule(expires_in);
    }

    pub fn scheduler(&self) -> &RefreshScheduler {
        &self.inner.scheduler
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner.pending().is_some()
    }
}

impl CoordinatorInner {
    fn pending(&self) -> MutexGuard<'_, Option<PendingRefresh>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn schedule(self: &Arc<Self>, expires_in: Duration) {
        let coordinator: Weak<CoordinatorInner> = Arc::downgrade(self);
        self.scheduler.arm(expires_in, move || async move {
            // The controller is gone; nothing left to refresh for.
            let Some(inner) = coordinator.upgrade() else {
                return;
            };
            let outcome = RefreshCoordinator { inner }.request_refresh().await;
            if let Err(e) = outcome {
                warn!(
                    event_name = "session.refresh.proactive.failed",
                    event_domain = "session",
                    "proactive refresh failed: {}",
                    e
                );
            }
        });
    }

    async fn run(self: Arc<Self>, attempt: Uuid, generation: u64) -> RefreshOutcome {
        let outcome = self.refresh(attempt, generation).await;
        let mut pending = self.pending();
        if pending.as_ref().is_some_and(|p| p.attempt == attempt) {
            pending.take();
        }
        outcome
    }

    async fn refresh(self: &Arc<Self>, attempt: Uuid, generation: u64) -> RefreshOutcome {
        let refresh_token = match self.store.refresh_token().await {
            Ok(Some(token)) => token,
            Ok(None) => {
                debug!(%attempt, "refresh requested without a refresh token");
                return Err(SessionError::NoRefreshToken);
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            event_name = "session.refresh.started",
            event_domain = "session",
            %attempt,
            gateway = self.gateway.get_name(),
            "refreshing access token"
        );
        let issued_at = Utc::now();
        let result = bounded(self.gateway_timeout, self.gateway.refresh(&refresh_token)).await;

        let mut state = self.lifecycle.lock().await;
        if state.generation != generation {
            info!(%attempt, "session changed while refreshing, discarding result");
            return Err(SessionError::RefreshFailed(
                "session ended while the refresh was in flight".to_string(),
            ));
        }

        let failure = match result {
            Ok(grant) => {
                let lifetime = grant.lifetime(self.default_window);
                let session =
                    Session::from_grant(grant, issued_at, Some(refresh_token), self.default_window);
                match self.store.put(&session).await {
                    Ok(()) => {
                        self.schedule(lifetime);
                        state.renew(session.clone());
                        info!(
                            event_name = "session.refresh.succeeded",
                            event_domain = "session",
                            %attempt,
                            expires_at = %session.expires_at,
                            "access token refreshed"
                        );
                        return Ok(session);
                    }
                    Err(e) => format!("could not persist refreshed session: {}", e),
                }
            }
            Err(e) => e.to_string(),
        };

        warn!(
            event_name = "session.refresh.failed",
            event_domain = "session",
            %attempt,
            reason = failure.as_str(),
            "refresh failed, ending session"
        );
        self.scheduler.disarm();
        if let Err(e) = self.store.clear().await {
            error!("Failed to clear session after refresh failure: {}", e);
        }
        state.end(LogoutReason::RefreshFailed);
        Err(SessionError::RefreshFailed(failure))
    }
}
