use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Where the auth endpoints live and how long we wait for them.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct GatewayConfig {
    /// API root, e.g. `http://localhost:8080/api/v1`. Auth routes hang off `/auth/*`.
    pub base_url: String,
    #[serde(default = "default_timeout_in_ms")]
    pub timeout_in_ms: u64,
}

impl GatewayConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_in_ms)
    }
}

/// Refresh timing knobs.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct SessionConfig {
    /// How long before access-token expiry the proactive refresh fires.
    #[serde(default = "default_refresh_skew_secs")]
    pub refresh_skew_secs: u64,
    /// Lifetime assumed for a restored access token whose expiry cannot be decoded.
    #[serde(default = "default_window_secs")]
    pub default_window_secs: u64,
}

impl SessionConfig {
    pub fn refresh_skew(&self) -> Duration {
        Duration::from_secs(self.refresh_skew_secs)
    }

    pub fn default_window(&self) -> Duration {
        Duration::from_secs(self.default_window_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            refresh_skew_secs: default_refresh_skew_secs(),
            default_window_secs: default_window_secs(),
        }
    }
}

fn default_timeout_in_ms() -> u64 {
    5000
}

fn default_refresh_skew_secs() -> u64 {
    30
}

fn default_window_secs() -> u64 {
    300
}
