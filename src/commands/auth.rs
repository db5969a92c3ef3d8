//! Usage: Auth/rate tool handlers (`puck_auth_status`, `puck_auth_logout`, `puck_rate_status`).
//!
//! Results are camelCase JSON, ready to hand back to the assistant as tool text.

use crate::app::session::Session;
use crate::gateway::rate_limit::RateLimitStatus;
use crate::infra::config::ApiTier;
use crate::shared::time::unix_millis_to_rfc3339;
use serde::Serialize;
use std::collections::BTreeMap;

pub const NO_RATE_DATA_MESSAGE: &str =
    "No rate limit data tracked yet. Data is populated from API response headers.";
const NOT_AUTHENTICATED: &str = "Not authenticated";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthStatus {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_tier: Option<ApiTier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AuthStatus {
    fn unauthenticated(error: impl Into<String>) -> Self {
        Self {
            authenticated: false,
            username: None,
            user_id: None,
            scopes: None,
            expires_at: None,
            api_tier: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LogoutResult {
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RateStatusReport {
    Windows(BTreeMap<String, RateLimitStatus>),
    Empty { message: &'static str },
}

/// Reports stored credentials; the identity fields are present once a lookup succeeded.
pub async fn auth_status(session: &Session) -> AuthStatus {
    let record = match session.stored_credentials().await {
        Ok(Some(record)) => record,
        Ok(None) => return AuthStatus::unauthenticated(NOT_AUTHENTICATED),
        Err(err) => return AuthStatus::unauthenticated(err.message()),
    };

    let identity = session.identity();
    AuthStatus {
        authenticated: true,
        username: identity.as_ref().map(|i| i.username.clone()),
        user_id: identity.map(|i| i.user_id),
        scopes: Some(record.scope_list()),
        expires_at: Some(unix_millis_to_rfc3339(record.expires_at)),
        api_tier: Some(session.config().api_tier),
        error: None,
    }
}

pub async fn auth_logout(session: &Session) -> LogoutResult {
    LogoutResult {
        success: session.logout().await,
    }
}

pub fn rate_status(session: &Session) -> RateStatusReport {
    let windows = session.governor().snapshot();
    if windows.is_empty() {
        RateStatusReport::Empty {
            message: NO_RATE_DATA_MESSAGE,
        }
    } else {
        RateStatusReport::Windows(windows)
    }
}
