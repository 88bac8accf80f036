#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::json;
use sessiontron::config::{load_config_from_str, ConfigV1, SessionConfig};
use sessiontron::gateway::{AuthGateway, GatewayError};
use sessiontron::models::{Credentials, Identity, Registration, TokenGrant};
use sessiontron::session::SessionController;
use sessiontron::store::{KeyValueStore, TokenStore};
use tokio::time::Instant;

pub const GATEWAY_TIMEOUT: Duration = Duration::from_secs(5);

pub fn identity() -> Identity {
    Identity {
        id: 1,
        display_name: "Ada Lovelace".to_string(),
        email: Some("a@b.com".to_string()),
        role: "organizer".to_string(),
    }
}

pub fn grant(access: &str, refresh: Option<&str>, expires_in: Option<u64>) -> TokenGrant {
    TokenGrant {
        access_token: access.to_string(),
        refresh_token: refresh.map(str::to_string),
        expires_in,
        user: identity(),
    }
}

pub fn rejected(status: u16, message: &str) -> GatewayError {
    GatewayError::Rejected {
        status,
        message: message.to_string(),
    }
}

/// A signed access token whose `exp` claim lies `secs` from now.
pub fn jwt_expiring_in(secs: i64) -> String {
    encode(
        &Header::default(),
        &json!({"user_id": 1, "role": "organizer", "type": "access", "exp": Utc::now().timestamp() + secs}),
        &EncodingKey::from_secret(b"backend-secret"),
    )
    .expect("test token should encode")
}

pub fn temp_store_path() -> PathBuf {
    std::env::temp_dir().join(format!("sessiontron-it-{}.json", uuid::Uuid::new_v4()))
}

/// In-process stand-in for the auth backend. Refresh answers are served from
/// a queue; an empty queue rejects like an unknown refresh token.
pub struct ScriptedGateway {
    login_response: Mutex<Result<TokenGrant, GatewayError>>,
    register_response: Mutex<Result<TokenGrant, GatewayError>>,
    me_response: Mutex<Result<Identity, GatewayError>>,
    refreshes: Mutex<VecDeque<Result<TokenGrant, GatewayError>>>,
    refresh_delay: Mutex<Duration>,
    pub refresh_tokens_seen: Mutex<Vec<String>>,
    pub refresh_started_at: Mutex<Vec<Instant>>,
    pub login_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
}

impl ScriptedGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            login_response: Mutex::new(Ok(grant("access-1", Some("refresh-1"), Some(300)))),
            register_response: Mutex::new(Ok(grant("access-r", Some("refresh-r"), Some(300)))),
            me_response: Mutex::new(Ok(identity())),
            refreshes: Mutex::new(VecDeque::new()),
            refresh_delay: Mutex::new(Duration::ZERO),
            refresh_tokens_seen: Mutex::new(Vec::new()),
            refresh_started_at: Mutex::new(Vec::new()),
            login_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
        })
    }

    pub fn on_login(&self, response: Result<TokenGrant, GatewayError>) {
        *self.login_response.lock().unwrap() = response;
    }

    pub fn on_register(&self, response: Result<TokenGrant, GatewayError>) {
        *self.register_response.lock().unwrap() = response;
    }

    pub fn on_me(&self, response: Result<Identity, GatewayError>) {
        *self.me_response.lock().unwrap() = response;
    }

    pub fn push_refresh(&self, response: Result<TokenGrant, GatewayError>) {
        self.refreshes.lock().unwrap().push_back(response);
    }

    pub fn delay_refresh(&self, delay: Duration) {
        *self.refresh_delay.lock().unwrap() = delay;
    }

    pub fn refresh_count(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_times(&self) -> Vec<Instant> {
        self.refresh_started_at.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuthGateway for ScriptedGateway {
    fn get_name(&self) -> &str {
        "scripted"
    }

    async fn login(&self, _credentials: &Credentials) -> Result<TokenGrant, GatewayError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        self.login_response.lock().unwrap().clone()
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, GatewayError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.refresh_started_at.lock().unwrap().push(Instant::now());
        self.refresh_tokens_seen
            .lock()
            .unwrap()
            .push(refresh_token.to_string());

        let delay = *self.refresh_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.refreshes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(rejected(401, "Invalid refresh token")))
    }

    async fn register(&self, _registration: &Registration) -> Result<TokenGrant, GatewayError> {
        self.register_response.lock().unwrap().clone()
    }

    async fn current_user(&self, _access_token: &str) -> Result<Identity, GatewayError> {
        self.me_response.lock().unwrap().clone()
    }
}

pub fn controller(
    backend: Arc<dyn KeyValueStore>,
    gateway: Arc<ScriptedGateway>,
) -> (Arc<SessionController>, TokenStore) {
    let config = SessionConfig::default();
    let store = TokenStore::new(backend, config.default_window());
    let controller = Arc::new(SessionController::new(
        store.clone(),
        gateway,
        &config,
        GATEWAY_TIMEOUT,
    ));
    (controller, store)
}

pub fn test_config(base_url: &str) -> ConfigV1 {
    load_config_from_str(&format!(
        r#"
version: "1.0.0"
logging:
  level: "debug"
  format: "console"
gateway:
  base_url: "{}"
  timeout_in_ms: 2000
store:
  enabled: false
"#,
        base_url
    ))
    .expect("test config should parse")
}
