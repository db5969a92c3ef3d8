//! Usage: Unified error model (typed credential/rate kinds, rendered as `CODE: message` strings).

use crate::shared::time::unix_seconds_to_rfc3339;
use serde::Serialize;

pub type AppResult<T> = Result<T, AppError>;

/// Every failure surfaced by the credential subsystem.
///
/// `Clone` is required: single-flight refresh hands the same outcome to every waiter.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AppError {
    /// No usable credential; recoverable by re-authenticating.
    #[error("AUTH_REQUIRED: {0}")]
    AuthRequired(String),
    /// A refresh attempt failed; callers fall back to the interactive flow.
    #[error("REFRESH_FAILED: {0}")]
    RefreshFailure(String),
    #[error("CSRF_STATE_MISMATCH: oauth callback state mismatch, possible CSRF attack")]
    CsrfStateMismatch,
    #[error("AUTH_TIMEOUT: oauth callback timed out after {timeout_secs}s")]
    AuthorizationTimeout { timeout_secs: u64 },
    #[error("AUTH_IN_PROGRESS: another authorization flow is already waiting for its callback")]
    AuthorizationInProgress,
    #[error(
        "RATE_LIMITED: {endpoint} rate limit reached ({limit}/window). Resets at {reset_at_iso}."
    )]
    RateLimited {
        endpoint: String,
        limit: u32,
        reset_at: i64,
        reset_at_iso: String,
        retry_after_secs: u64,
    },
    #[error("STORAGE_CORRUPTED: {0}")]
    StorageCorrupted(String),
    #[error("PROVIDER_ERROR: {message}")]
    Provider { status: Option<u16>, message: String },
    #[error("{code}: {message}")]
    Other { code: String, message: String },
}

pub const AUTH_REQUIRED_DEFAULT_MESSAGE: &str =
    "Authentication required. Use puck_auth_status to check.";

impl AppError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Other {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn auth_required() -> Self {
        Self::AuthRequired(AUTH_REQUIRED_DEFAULT_MESSAGE.to_string())
    }

    pub fn provider(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Provider {
            status,
            message: message.into(),
        }
    }

    /// Builds a `RateLimited` error whose retry hint is derived from `reset_at` (epoch seconds).
    pub fn rate_limited(endpoint: &str, limit: u32, reset_at: i64, now_unix: i64) -> Self {
        let retry_after_secs = u64::try_from(reset_at.saturating_sub(now_unix)).unwrap_or(0);
        Self::RateLimited {
            endpoint: endpoint.to_string(),
            limit,
            reset_at,
            reset_at_iso: unix_seconds_to_rfc3339(reset_at),
            retry_after_secs,
        }
    }

    pub fn code(&self) -> &str {
        match self {
            Self::AuthRequired(_) => "AUTH_REQUIRED",
            Self::RefreshFailure(_) => "REFRESH_FAILED",
            Self::CsrfStateMismatch => "CSRF_STATE_MISMATCH",
            Self::AuthorizationTimeout { .. } => "AUTH_TIMEOUT",
            Self::AuthorizationInProgress => "AUTH_IN_PROGRESS",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::StorageCorrupted(_) => "STORAGE_CORRUPTED",
            Self::Provider { .. } => "PROVIDER_ERROR",
            Self::Other { code, .. } => code.as_str(),
        }
    }

    /// Display text without the leading `CODE:` prefix.
    pub fn message(&self) -> String {
        let full = self.to_string();
        match split_code_message(&full) {
            Some((_, rest)) if !rest.is_empty() => rest.to_string(),
            _ => full,
        }
    }

    /// JSON error shape returned to the assistant by tool handlers.
    pub fn to_tool_error(&self) -> ToolError {
        let (retry_after, endpoint) = match self {
            Self::RateLimited {
                endpoint,
                retry_after_secs,
                ..
            } => (Some(*retry_after_secs), Some(endpoint.clone())),
            _ => (None, None),
        };
        ToolError {
            error: self.code().to_ascii_lowercase(),
            message: self.message(),
            retry_after,
            endpoint,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolError {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

fn split_code_message(raw: &str) -> Option<(&str, &str)> {
    let msg = raw.trim();
    let msg = msg.strip_prefix("Error:").unwrap_or(msg).trim();
    if msg.is_empty() {
        return None;
    }

    let (maybe_code, rest) = msg.split_once(':')?;
    let code = maybe_code.trim();
    if code.is_empty() {
        return None;
    }
    let mut chars = code.chars();
    let first = chars.next()?;
    if !first.is_ascii_uppercase() {
        return None;
    }
    if !chars.all(|ch| ch.is_ascii_uppercase() || ch.is_ascii_digit() || ch == '_') {
        return None;
    }
    Some((code, rest.trim()))
}

impl From<String> for AppError {
    fn from(value: String) -> Self {
        let parsed = split_code_message(&value).map(|(code, rest)| {
            let message = if rest.is_empty() { value.trim() } else { rest };
            (code.to_string(), message.to_string())
        });
        let Some((code, message)) = parsed else {
            return AppError::new("INTERNAL_ERROR", value);
        };
        match code.as_str() {
            "AUTH_REQUIRED" => AppError::AuthRequired(message),
            "REFRESH_FAILED" => AppError::RefreshFailure(message),
            "STORAGE_CORRUPTED" => AppError::StorageCorrupted(message),
            "PROVIDER_ERROR" => AppError::provider(None, message),
            _ => AppError::new(code, message),
        }
    }
}

impl From<&'static str> for AppError {
    fn from(value: &'static str) -> Self {
        AppError::from(value.to_string())
    }
}

impl From<AppError> for String {
    fn from(value: AppError) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_errors_keep_their_code() {
        let err = AppError::from("SYSTEM_ERROR: oauth callback bind failed".to_string());
        assert_eq!(err.code(), "SYSTEM_ERROR");
        assert_eq!(err.message(), "oauth callback bind failed");
    }

    #[test]
    fn known_codes_map_to_typed_variants() {
        let err = AppError::from("AUTH_REQUIRED: please log in".to_string());
        assert!(matches!(err, AppError::AuthRequired(ref m) if m == "please log in"));

        let err = AppError::from("PROVIDER_ERROR: upstream said no".to_string());
        assert!(matches!(err, AppError::Provider { status: None, .. }));
    }

    #[test]
    fn uncoded_strings_become_internal_errors() {
        let err = AppError::from("something broke".to_string());
        assert_eq!(err.code(), "INTERNAL_ERROR");
        assert_eq!(err.to_string(), "INTERNAL_ERROR: something broke");
    }

    #[test]
    fn rate_limited_derives_retry_hint_from_reset() {
        let err = AppError::rate_limited("POST /2/tweets", 100, 1_700_000_900, 1_700_000_000);
        match &err {
            AppError::RateLimited {
                retry_after_secs,
                reset_at_iso,
                ..
            } => {
                assert_eq!(*retry_after_secs, 900);
                assert!(reset_at_iso.starts_with("2023-11-14T22:28:20"));
            }
            other => panic!("unexpected error: {other}"),
        }

        let tool = err.to_tool_error();
        assert_eq!(tool.error, "rate_limited");
        assert_eq!(tool.retry_after, Some(900));
        assert_eq!(tool.endpoint.as_deref(), Some("POST /2/tweets"));
        assert!(tool.message.contains("100/window"));
    }

    #[test]
    fn rate_limited_never_reports_negative_retry() {
        let err = AppError::rate_limited("GET /2/users/me", 75, 100, 200);
        assert!(matches!(
            err,
            AppError::RateLimited {
                retry_after_secs: 0,
                ..
            }
        ));
    }

    #[test]
    fn tool_error_omits_rate_fields_for_other_kinds() {
        let json = serde_json::to_value(AppError::CsrfStateMismatch.to_tool_error())
            .expect("serialize");
        assert_eq!(json["error"], "csrf_state_mismatch");
        assert!(json.get("retryAfter").is_none());
        assert!(json.get("endpoint").is_none());
    }
}
