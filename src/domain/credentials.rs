//! Usage: Credential record persisted by the token store, and the in-memory identity it unlocks.

use crate::gateway::oauth::provider_trait::OAuthTokenSet;
use crate::infra::config::DEFAULT_TOKEN_LIFETIME_SECS;
use crate::shared::security::mask_token;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const DEFAULT_TOKEN_TYPE: &str = "Bearer";

/// The sole durable secret. Replaced wholesale on every refresh, never patched in place.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub access_token: String,
    /// Empty when the provider granted no refresh capability.
    #[serde(default)]
    pub refresh_token: String,
    /// Absolute expiry, unix epoch milliseconds.
    pub expires_at: i64,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub scope: BTreeSet<String>,
}

fn default_token_type() -> String {
    DEFAULT_TOKEN_TYPE.to_string()
}

impl CredentialRecord {
    /// Assembles a record from a token endpoint response.
    ///
    /// A missing `expires_in` means the default two-hour lifetime; a missing scope or refresh
    /// token is carried over from the previous grant.
    pub(crate) fn from_token_set(
        tokens: OAuthTokenSet,
        now_ms: i64,
        previous_scope: BTreeSet<String>,
        previous_refresh_token: Option<&str>,
    ) -> Self {
        let lifetime_secs = tokens
            .expires_in
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
        let refresh_token = tokens
            .refresh_token
            .or_else(|| previous_refresh_token.map(str::to_string))
            .unwrap_or_default();

        Self {
            access_token: tokens.access_token,
            refresh_token,
            expires_at: now_ms.saturating_add(lifetime_secs.saturating_mul(1000)),
            token_type: tokens.token_type.unwrap_or_else(default_token_type),
            scope: tokens.scope.unwrap_or(previous_scope),
        }
    }

    pub fn has_refresh_token(&self) -> bool {
        !self.refresh_token.trim().is_empty()
    }

    pub fn millis_until_expiry(&self, now_ms: i64) -> i64 {
        self.expires_at.saturating_sub(now_ms)
    }

    pub fn scope_list(&self) -> Vec<String> {
        self.scope.iter().cloned().collect()
    }
}

impl std::fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("access_token", &mask_token(&self.access_token))
            .field("refresh_token", &mask_token(&self.refresh_token))
            .field("expires_at", &self.expires_at)
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .finish()
    }
}

pub(crate) fn scope_set<'a>(scopes: impl IntoIterator<Item = &'a str>) -> BTreeSet<String> {
    scopes
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Who the held credential belongs to; re-derived after every acquisition, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EphemeralIdentity {
    pub user_id: String,
    pub username: String,
}
