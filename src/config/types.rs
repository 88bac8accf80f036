use std::path::Path;

use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};

use super::logging::LoggingConfig;
use super::session::{GatewayConfig, SessionConfig};
use super::store::StoreConfig;

/// Prefix for environment overrides, e.g. `SESSIONTRON_GATEWAY__BASE_URL`.
pub const ENV_PREFIX: &str = "SESSIONTRON_";

/// A top-level enum for versioned configurations.
#[derive(Deserialize, Serialize, JsonSchema)]
#[serde(tag = "version")]
pub enum Config {
    #[serde(rename = "1.0.0")]
    ConfigV1(ConfigV1),
}

/// Main config for v1.0.0: where the backend lives, how sessions refresh and
/// where tokens are persisted.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct ConfigV1 {
    pub logging: LoggingConfig,
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub session: SessionConfig,
    pub store: StoreConfig,
}

impl Config {
    fn into_latest(self) -> ConfigV1 {
        // handle configuration migration between versions here when necessary
        match self {
            Config::ConfigV1(c) => c,
        }
    }
}

/// Load config from a YAML file, with `SESSIONTRON_*` environment overrides on top.
pub fn load_config(path: impl AsRef<Path>) -> Result<ConfigV1, figment::Error> {
    Figment::new()
        .merge(Yaml::file(path.as_ref()))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract::<Config>()
        .map(Config::into_latest)
}

/// Parse a configuration document held in memory. No environment overrides.
pub fn load_config_from_str(yaml: &str) -> Result<ConfigV1, figment::Error> {
    Figment::new()
        .merge(Yaml::string(yaml))
        .extract::<Config>()
        .map(Config::into_latest)
}

/// Render the JSON schema for the configuration.
pub fn config_schema() -> Result<String, serde_json::Error> {
    let schema = schema_for!(Config);
    serde_json::to_string_pretty(&schema)
}
