use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    error::Error,
    store::{PreferenceStore, TOKEN_KEY},
};

/// Body of a successful token endpoint response.
#[derive(Clone, Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// The persisted token record.  `expires_at` is in milliseconds since the
/// Unix epoch and is computed when the response arrives.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub expires_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: String,
}

impl Credential {
    pub fn issued(response: TokenResponse, now_millis: u64) -> Self {
        Self {
            expires_at: expiry(now_millis, response.expires_in),
            access_token: response.access_token,
            token_type: response.token_type,
            expires_in: response.expires_in,
            refresh_token: response.refresh_token,
            scope: response.scope.unwrap_or_default(),
        }
    }

    /// Merge a refresh response into this record.  Omitted refresh token and
    /// scope mean the previous values still apply.
    pub fn renewed(&self, response: TokenResponse, now_millis: u64) -> Self {
        Self {
            expires_at: expiry(now_millis, response.expires_in),
            access_token: response.access_token,
            token_type: response.token_type,
            expires_in: response.expires_in,
            refresh_token: response.refresh_token.or_else(|| self.refresh_token.clone()),
            scope: response.scope.unwrap_or_else(|| self.scope.clone()),
        }
    }

    /// Usable without renewal: expires strictly more than `margin` from now.
    pub fn is_fresh(&self, now_millis: u64, margin: Duration) -> bool {
        self.expires_at > now_millis.saturating_add(margin.as_millis() as u64)
    }

    /// Load the stored record.  An unreadable record is deleted and treated as
    /// absent.
    pub fn load(store: &dyn PreferenceStore) -> Option<Self> {
        let raw = store.get(TOKEN_KEY)?;
        match serde_json::from_str(&raw) {
            Ok(credential) => Some(credential),
            Err(err) => {
                log::warn!("discarding unreadable stored token: {}", err);
                if let Err(err) = store.remove(TOKEN_KEY) {
                    log::error!("failed to delete unreadable token: {}", err);
                }
                None
            }
        }
    }

    pub fn save(&self, store: &dyn PreferenceStore) -> Result<(), Error> {
        store.set(TOKEN_KEY, &serde_json::to_string(self)?)
    }

    pub fn delete(store: &dyn PreferenceStore) -> Result<(), Error> {
        store.remove(TOKEN_KEY)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("expires_at", &self.expires_at)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

fn expiry(now_millis: u64, expires_in: u64) -> u64 {
    now_millis.saturating_add(expires_in.saturating_mul(1000))
}
