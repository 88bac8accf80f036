use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard};

use crate::models::Session;

/// Observable session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    LoggedOut,
    Authenticating,
    Authenticated,
    /// Authenticated with a refresh call outstanding. Callers see no difference.
    RefreshInFlight,
}

/// Why the last session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogoutReason {
    UserRequested,
    RefreshFailed,
    AuthorizationRevoked,
    /// The store no longer held a usable session.
    SessionLost,
}

impl LogoutReason {
    pub fn is_forced(&self) -> bool {
        !matches!(self, LogoutReason::UserRequested)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    LoggedOut,
    Authenticating,
    Authenticated,
}

/// In-memory session state shared by the controller and the refresh coordinator.
///
/// Store writes happen while the guard is held, so the in-memory session and
/// the persisted one change together.
pub(crate) struct Lifecycle {
    state: Mutex<LifecycleState>,
}

pub(crate) struct LifecycleState {
    /// Bumped whenever a session starts or ends. A refresh may only commit
    /// under the generation it started in.
    pub generation: u64,
    pub phase: Phase,
    pub session: Option<Session>,
    pub last_logout: Option<LogoutReason>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LifecycleState {
                generation: 0,
                phase: Phase::LoggedOut,
                session: None,
                last_logout: None,
            }),
        }
    }

    pub async fn lock(&self) -> MutexGuard<'_, LifecycleState> {
        self.state.lock().await
    }
}

impl LifecycleState {
    /// A new session begins (login, register, hydrate).
    pub fn establish(&mut self, session: Session) -> u64 {
        self.generation += 1;
        self.phase = Phase::Authenticated;
        self.session = Some(session);
        self.generation
    }

    /// The current session got new tokens.
    pub fn renew(&mut self, session: Session) {
        self.phase = Phase::Authenticated;
        self.session = Some(session);
    }

    pub fn end(&mut self, reason: LogoutReason) {
        self.generation += 1;
        self.phase = Phase::LoggedOut;
        self.session = None;
        self.last_logout = Some(reason);
    }

    pub fn is_authenticated(&self) -> bool {
        self.phase == Phase::Authenticated
    }
}
