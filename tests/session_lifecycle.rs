mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{controller, grant, rejected, ScriptedGateway};
use futures::future::join_all;
use sessiontron::gateway::GatewayError;
use sessiontron::models::Registration;
use sessiontron::session::{LogoutReason, SessionError, SessionState};
use sessiontron::store::{KeyValueStore, MemoryStore};
use tokio::time::Instant;

const KEYS: [&str; 3] = ["access_token", "refresh_token", "user"];

async fn assert_store_empty(backend: &MemoryStore) {
    for key in KEYS {
        assert!(
            backend.get(key).await.unwrap().is_none(),
            "'{}' still stored",
            key
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_refresh_cycle_until_rejection() {
    let gateway = ScriptedGateway::new();
    gateway.push_refresh(Ok(grant("access-2", Some("refresh-2"), Some(300))));
    gateway.push_refresh(Err(rejected(401, "Invalid refresh token")));
    let backend = Arc::new(MemoryStore::new());
    let (session, _) = controller(backend.clone(), gateway.clone());

    let start = Instant::now();
    let identity = session.login("a@b.com", "secret").await.unwrap();
    assert_eq!(identity.email.as_deref(), Some("a@b.com"));
    assert_eq!(session.state().await, SessionState::Authenticated);
    assert_eq!(
        session.next_refresh_at(),
        Some(start + Duration::from_secs(270))
    );

    tokio::time::sleep(Duration::from_secs(271)).await;
    assert_eq!(gateway.refresh_count(), 1);
    assert_eq!(
        gateway.refresh_times()[0],
        start + Duration::from_secs(270)
    );
    assert_eq!(
        backend.get("access_token").await.unwrap().as_deref(),
        Some("access-2")
    );
    assert_eq!(
        session.next_refresh_at(),
        Some(start + Duration::from_secs(540))
    );

    tokio::time::sleep(Duration::from_secs(270)).await;
    assert_eq!(gateway.refresh_count(), 2);
    assert_eq!(
        gateway.refresh_times()[1],
        start + Duration::from_secs(540)
    );
    assert_eq!(
        *gateway.refresh_tokens_seen.lock().unwrap(),
        vec!["refresh-1".to_string(), "refresh-2".to_string()]
    );

    assert_eq!(session.state().await, SessionState::LoggedOut);
    assert_eq!(session.last_logout().await, Some(LogoutReason::RefreshFailed));
    assert!(session.next_refresh_at().is_none());
    assert_store_empty(&backend).await;
    assert_eq!(session.check_auth().await, Err(SessionError::Unauthenticated));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_refreshes_share_one_call() {
    let gateway = ScriptedGateway::new();
    gateway.delay_refresh(Duration::from_secs(2));
    gateway.push_refresh(Ok(grant("access-2", Some("refresh-2"), Some(300))));
    gateway.push_refresh(Ok(grant("access-3", Some("refresh-3"), Some(300))));
    let (session, _) = controller(Arc::new(MemoryStore::new()), gateway.clone());
    session.login("a@b.com", "secret").await.unwrap();

    let outcomes = join_all((0..8).map(|_| session.refresh())).await;

    assert_eq!(gateway.refresh_count(), 1);
    for outcome in outcomes {
        assert_eq!(outcome.unwrap().access_token, "access-2");
    }
}

#[tokio::test(start_paused = true)]
async fn test_expired_check_auth_refreshes_once() {
    let gateway = ScriptedGateway::new();
    gateway.on_login(Ok(grant("access-1", Some("refresh-1"), Some(0))));
    gateway.delay_refresh(Duration::from_secs(2));
    gateway.push_refresh(Ok(grant("access-2", Some("refresh-2"), Some(300))));
    let backend = Arc::new(MemoryStore::new());
    let (session, _) = controller(backend.clone(), gateway.clone());
    session.login("a@b.com", "secret").await.unwrap();

    let outcomes = join_all((0..5).map(|_| session.check_auth())).await;

    assert!(outcomes.iter().all(Result::is_ok));
    assert_eq!(gateway.refresh_count(), 1);
    assert_eq!(
        backend.get("access_token").await.unwrap().as_deref(),
        Some("access-2")
    );
}

#[tokio::test(start_paused = true)]
async fn test_refresh_in_flight_is_visible_but_transparent() {
    let gateway = ScriptedGateway::new();
    gateway.delay_refresh(Duration::from_secs(3));
    gateway.push_refresh(Ok(grant("access-2", Some("refresh-2"), Some(300))));
    let (session, _) = controller(Arc::new(MemoryStore::new()), gateway.clone());
    session.login("a@b.com", "secret").await.unwrap();

    let refreshing = tokio::spawn({
        let session = session.clone();
        async move { session.refresh().await }
    });
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(session.state().await, SessionState::RefreshInFlight);
    assert!(session.check_auth().await.is_ok());

    refreshing.await.unwrap().unwrap();
    assert_eq!(session.state().await, SessionState::Authenticated);
}

#[tokio::test(start_paused = true)]
async fn test_logout_disarms_refresh() {
    let gateway = ScriptedGateway::new();
    gateway.push_refresh(Ok(grant("access-2", Some("refresh-2"), Some(300))));
    let backend = Arc::new(MemoryStore::new());
    let (session, _) = controller(backend.clone(), gateway.clone());
    session.login("a@b.com", "secret").await.unwrap();

    session.logout().await;
    tokio::time::sleep(Duration::from_secs(600)).await;

    assert_eq!(gateway.refresh_count(), 0);
    assert_eq!(session.last_logout().await, Some(LogoutReason::UserRequested));
    assert_store_empty(&backend).await;
}

#[tokio::test(start_paused = true)]
async fn test_logout_during_refresh_is_not_undone() {
    let gateway = ScriptedGateway::new();
    // Lands well inside the gateway timeout, so the grant really arrives.
    gateway.delay_refresh(Duration::from_secs(3));
    gateway.push_refresh(Ok(grant("access-2", Some("refresh-2"), Some(300))));
    let backend = Arc::new(MemoryStore::new());
    let (session, store) = controller(backend.clone(), gateway.clone());
    session.login("a@b.com", "secret").await.unwrap();

    let refreshing = tokio::spawn({
        let session = session.clone();
        async move { session.refresh().await }
    });
    tokio::time::sleep(Duration::from_secs(1)).await;
    session.logout().await;

    let outcome = refreshing.await.unwrap();
    assert_eq!(
        outcome,
        Err(SessionError::RefreshFailed(
            "session ended while the refresh was in flight".to_string()
        ))
    );
    assert_eq!(gateway.refresh_count(), 1);
    assert!(store.access_token().await.unwrap().is_none());
    assert_store_empty(&backend).await;
    assert_eq!(session.state().await, SessionState::LoggedOut);
    assert_eq!(session.last_logout().await, Some(LogoutReason::UserRequested));
    assert!(session.next_refresh_at().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_refresh_timeout_ends_session() {
    let gateway = ScriptedGateway::new();
    gateway.delay_refresh(Duration::from_secs(60));
    gateway.push_refresh(Ok(grant("access-2", Some("refresh-2"), Some(300))));
    let backend = Arc::new(MemoryStore::new());
    let (session, _) = controller(backend.clone(), gateway.clone());
    session.login("a@b.com", "secret").await.unwrap();

    let outcome = session.refresh().await;

    assert!(matches!(outcome, Err(SessionError::RefreshFailed(_))));
    assert!(outcome.unwrap_err().requires_login());
    assert_eq!(session.last_logout().await, Some(LogoutReason::RefreshFailed));
    assert_store_empty(&backend).await;
}

#[tokio::test]
async fn test_refresh_without_refresh_token() {
    let gateway = ScriptedGateway::new();
    gateway.on_login(Ok(grant("access-1", None, Some(300))));
    let (session, _) = controller(Arc::new(MemoryStore::new()), gateway.clone());
    session.login("a@b.com", "secret").await.unwrap();

    assert!(session.next_refresh_at().is_none());
    assert_eq!(session.refresh().await, Err(SessionError::NoRefreshToken));
    assert_eq!(gateway.refresh_count(), 0);
    assert!(session.check_auth().await.is_ok());
}

#[tokio::test]
async fn test_check_error_revokes_on_401_and_403() {
    for status in [http::StatusCode::UNAUTHORIZED, http::StatusCode::FORBIDDEN] {
        let gateway = ScriptedGateway::new();
        let backend = Arc::new(MemoryStore::new());
        let (session, _) = controller(backend.clone(), gateway);
        session.login("a@b.com", "secret").await.unwrap();

        assert_eq!(
            session.check_error(status).await,
            Err(SessionError::AuthorizationRevoked)
        );
        assert_store_empty(&backend).await;
        assert!(session.next_refresh_at().is_none());
        assert_eq!(
            session.last_logout().await,
            Some(LogoutReason::AuthorizationRevoked)
        );
        assert_eq!(session.check_auth().await, Err(SessionError::Unauthenticated));
    }
}

#[tokio::test]
async fn test_check_error_ignores_other_statuses() {
    let gateway = ScriptedGateway::new();
    let backend = Arc::new(MemoryStore::new());
    let (session, _) = controller(backend.clone(), gateway);
    session.login("a@b.com", "secret").await.unwrap();

    for status in [
        http::StatusCode::INTERNAL_SERVER_ERROR,
        http::StatusCode::NOT_FOUND,
        http::StatusCode::BAD_REQUEST,
    ] {
        assert_eq!(session.check_error(status).await, Ok(()));
    }
    assert!(session.check_auth().await.is_ok());
    assert!(session.next_refresh_at().is_some());
    assert_eq!(
        backend.get("access_token").await.unwrap().as_deref(),
        Some("access-1")
    );
}

#[tokio::test]
async fn test_login_logout_round_trip() {
    let gateway = ScriptedGateway::new();
    let backend = Arc::new(MemoryStore::new());
    let (session, store) = controller(backend.clone(), gateway);

    assert_eq!(session.check_auth().await, Err(SessionError::Unauthenticated));
    session.login("a@b.com", "secret").await.unwrap();

    let persisted = store.get().await.unwrap().expect("session persisted");
    assert_eq!(persisted.access_token, "access-1");
    assert_eq!(persisted.refresh_token.as_deref(), Some("refresh-1"));
    assert!(session.check_auth().await.is_ok());
    assert_eq!(
        session.get_identity().await.unwrap().display_name,
        "Ada Lovelace"
    );
    assert_eq!(session.get_permissions().await.unwrap(), "organizer");

    session.logout().await;
    assert_store_empty(&backend).await;
    assert_eq!(session.check_auth().await, Err(SessionError::Unauthenticated));
    assert_eq!(
        session.get_identity().await,
        Err(SessionError::Unauthenticated)
    );
    assert_eq!(
        session.get_permissions().await,
        Err(SessionError::Unauthenticated)
    );
}

#[tokio::test]
async fn test_login_failures() {
    let gateway = ScriptedGateway::new();
    let backend = Arc::new(MemoryStore::new());
    let (session, _) = controller(backend.clone(), gateway.clone());

    gateway.on_login(Err(rejected(401, "Invalid email or password")));
    assert_eq!(
        session.login("a@b.com", "wrong").await,
        Err(SessionError::InvalidCredentials)
    );
    assert_eq!(session.state().await, SessionState::LoggedOut);

    gateway.on_login(Err(GatewayError::Transport("connection refused".to_string())));
    let err = session.login("a@b.com", "secret").await.unwrap_err();
    assert!(matches!(err, SessionError::Gateway(_)));
    assert!(!err.requires_login());

    assert_store_empty(&backend).await;
    assert_eq!(session.last_logout().await, None);
}

#[tokio::test]
async fn test_register_signs_in() {
    let gateway = ScriptedGateway::new();
    let (session, store) = controller(Arc::new(MemoryStore::new()), gateway.clone());

    let identity = session
        .register(Registration {
            name: "Ada Lovelace".to_string(),
            email: "a@b.com".to_string(),
            password: "secret".to_string(),
            role: "organizer".to_string(),
        })
        .await
        .unwrap();

    assert_eq!(identity.role, "organizer");
    assert_eq!(session.state().await, SessionState::Authenticated);
    assert_eq!(store.access_token().await.unwrap().as_deref(), Some("access-r"));
    assert!(session.next_refresh_at().is_some());
}

#[tokio::test]
async fn test_register_rejection_keeps_backend_message() {
    let gateway = ScriptedGateway::new();
    gateway.on_register(Err(rejected(409, "Email already registered")));
    let (session, _) = controller(Arc::new(MemoryStore::new()), gateway);

    let err = session
        .register(Registration {
            name: "Ada".to_string(),
            email: "a@b.com".to_string(),
            password: "secret".to_string(),
            role: "organizer".to_string(),
        })
        .await
        .unwrap_err();

    assert_eq!(
        err,
        SessionError::Registration("Email already registered".to_string())
    );
    assert_eq!(session.state().await, SessionState::LoggedOut);
}

#[tokio::test]
async fn test_sync_identity_updates_store() {
    let gateway = ScriptedGateway::new();
    let (session, store) = controller(Arc::new(MemoryStore::new()), gateway.clone());
    session.login("a@b.com", "secret").await.unwrap();

    let mut renamed = common::identity();
    renamed.display_name = "Countess of Lovelace".to_string();
    gateway.on_me(Ok(renamed.clone()));

    assert_eq!(session.sync_identity().await.unwrap(), renamed);
    assert_eq!(store.identity().await.unwrap(), Some(renamed));
}

#[tokio::test]
async fn test_sync_identity_rejection_revokes() {
    let gateway = ScriptedGateway::new();
    let backend = Arc::new(MemoryStore::new());
    let (session, _) = controller(backend.clone(), gateway.clone());
    session.login("a@b.com", "secret").await.unwrap();
    gateway.on_me(Err(rejected(401, "Invalid token")));

    assert_eq!(
        session.sync_identity().await,
        Err(SessionError::AuthorizationRevoked)
    );
    assert_store_empty(&backend).await;
}

#[tokio::test]
async fn test_external_clear_is_noticed() {
    let gateway = ScriptedGateway::new();
    let (session, store) = controller(Arc::new(MemoryStore::new()), gateway);
    session.login("a@b.com", "secret").await.unwrap();

    store.clear().await.unwrap();

    assert_eq!(session.check_auth().await, Err(SessionError::Unauthenticated));
    assert_eq!(session.state().await, SessionState::LoggedOut);
    assert_eq!(session.last_logout().await, Some(LogoutReason::SessionLost));
    assert!(session.next_refresh_at().is_none());
}

#[tokio::test]
async fn test_orphaned_access_token_is_cleared_on_hydrate() {
    let backend = Arc::new(MemoryStore::new());
    backend
        .set_many(&[
            ("access_token", "orphan".to_string()),
            ("refresh_token", "refresh-1".to_string()),
        ])
        .await
        .unwrap();
    let (session, _) = controller(backend.clone(), ScriptedGateway::new());

    assert_eq!(session.hydrate().await, Ok(SessionState::LoggedOut));
    assert_eq!(session.last_logout().await, Some(LogoutReason::SessionLost));
    assert!(session.next_refresh_at().is_none());
    assert_store_empty(&backend).await;
    assert_eq!(session.get_identity().await, Err(SessionError::Unauthenticated));
}

#[tokio::test]
async fn test_corrupt_identity_fails_check_auth_cleanly() {
    let gateway = ScriptedGateway::new();
    let backend = Arc::new(MemoryStore::new());
    let (session, _) = controller(backend.clone(), gateway);
    session.login("a@b.com", "secret").await.unwrap();

    backend
        .set_many(&[("user", "{not json".to_string())])
        .await
        .unwrap();

    assert_eq!(session.check_auth().await, Err(SessionError::Unauthenticated));
    assert_eq!(session.state().await, SessionState::LoggedOut);
    assert_eq!(session.last_logout().await, Some(LogoutReason::SessionLost));
    assert!(session.next_refresh_at().is_none());
    assert_store_empty(&backend).await;
}

#[tokio::test]
async fn test_register_without_lifetime_is_not_armed() {
    let gateway = ScriptedGateway::new();
    gateway.on_register(Ok(grant("access-r", None, None)));
    let (session, _) = controller(Arc::new(MemoryStore::new()), gateway);

    session
        .register(Registration {
            name: "Ada".to_string(),
            email: "a@b.com".to_string(),
            password: "secret".to_string(),
            role: "organizer".to_string(),
        })
        .await
        .unwrap();

    assert_eq!(session.state().await, SessionState::Authenticated);
    assert!(session.next_refresh_at().is_none());
    assert!(session.check_auth().await.is_ok());
}
