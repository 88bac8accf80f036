use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use super::session::Identity;

/// What `/auth/login`, `/auth/refresh` and `/auth/register` hand back.
///
/// Login and refresh always carry `refresh_token` and `expires_in`;
/// registration responses are allowed to omit them.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    pub user: Identity,
}

impl TokenGrant {
    /// Access-token lifetime, `default_window` when the backend did not say.
    pub fn lifetime(&self, default_window: Duration) -> Duration {
        self.expires_in
            .map(Duration::from_secs)
            .unwrap_or(default_window)
    }
}

#[derive(Debug, Deserialize)]
struct ExpiryClaim {
    exp: Option<i64>,
}

/// Reads the `exp` claim of a JWT access token without verifying its signature.
///
/// The client never trusts the token's contents for authorization, only for
/// scheduling. Returns `None` for opaque or malformed tokens.
pub fn decode_expiry(token: &str) -> Option<DateTime<Utc>> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = decode::<ExpiryClaim>(token, &DecodingKey::from_secret(&[]), &validation).ok()?;
    DateTime::from_timestamp(data.claims.exp?, 0)
}
