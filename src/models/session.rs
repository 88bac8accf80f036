use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::token::TokenGrant;

/// The identity record the backend returns alongside tokens.
///
/// Persisted verbatim under the `user` key. Unknown backend fields
/// (`created_at`, `updated_at`, ...) are ignored.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: u64,
    #[serde(rename = "name")]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub role: String,
}

/// The authenticated state: a token pair, its expiry, and who it belongs to.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub identity: Identity,
}

impl Session {
    /// Build a session from a grant issued at `issued_at`.
    ///
    /// `previous_refresh_token` is kept when the backend does not rotate it, and
    /// `default_window` stands in for a missing `expires_in`.
    pub fn from_grant(
        grant: TokenGrant,
        issued_at: DateTime<Utc>,
        previous_refresh_token: Option<String>,
        default_window: Duration,
    ) -> Self {
        let lifetime = grant.lifetime(default_window);
        Session {
            access_token: grant.access_token,
            refresh_token: grant.refresh_token.or(previous_refresh_token),
            expires_at: issued_at
                .checked_add_signed(to_chrono(lifetime))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            identity: grant.user,
        }
    }

    /// Time left before the access token expires, zero once it has.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.is_some()
    }
}

// Tokens stay out of logs.
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("expires_at", &self.expires_at)
            .field("identity", &self.identity)
            .finish()
    }
}

pub(crate) fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}
