//! Usage: OAuth token endpoint helpers (authorization_code + refresh_token grants, revocation).

use crate::domain::credentials::scope_set;
use crate::gateway::oauth::provider_trait::{OAuthTokenSet, TokenExchangeRequest};
use crate::shared::error::{AppError, AppResult};
use crate::shared::security::sanitize_error_body_snippet;
use reqwest::StatusCode;
use serde_json::Value;

pub(crate) type Form = Vec<(&'static str, String)>;

pub(crate) fn authorization_code_form(client_id: &str, req: &TokenExchangeRequest) -> Form {
    vec![
        ("grant_type", "authorization_code".to_string()),
        ("code", req.code.trim().to_string()),
        ("redirect_uri", req.redirect_uri.trim().to_string()),
        ("client_id", client_id.trim().to_string()),
        ("code_verifier", req.code_verifier.trim().to_string()),
    ]
}

pub(crate) fn refresh_token_form(client_id: &str, refresh_token: &str) -> Form {
    vec![
        ("grant_type", "refresh_token".to_string()),
        ("refresh_token", refresh_token.trim().to_string()),
        ("client_id", client_id.trim().to_string()),
    ]
}

pub(crate) fn revoke_form(client_id: &str, access_token: &str) -> Form {
    vec![
        ("token", access_token.trim().to_string()),
        ("token_type_hint", "access_token".to_string()),
        ("client_id", client_id.trim().to_string()),
    ]
}

/// Interprets a token endpoint response. Error bodies are redacted before they reach the message.
pub(crate) fn parse_token_body(status: StatusCode, body: &str) -> AppResult<OAuthTokenSet> {
    if !status.is_success() {
        let (error_code, error_message) = parse_oauth_error_details(body);
        let mut msg = format!("oauth token endpoint returned status={}", status.as_u16());
        if let Some(code) = error_code {
            msg.push_str(" code=");
            msg.push_str(code.as_str());
        }
        if let Some(detail) = error_message {
            msg.push_str(" message=");
            msg.push_str(detail.chars().take(240).collect::<String>().as_str());
        }
        msg.push_str(" body=");
        msg.push_str(sanitize_error_body_snippet(body).as_str());
        return Err(AppError::provider(Some(status.as_u16()), msg));
    }

    let value: Value = serde_json::from_str(body).map_err(|e| {
        AppError::provider(
            Some(status.as_u16()),
            format!("oauth token response json invalid: {e}"),
        )
    })?;

    let text = |key: &str| {
        value
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    let access_token = text("access_token").ok_or_else(|| {
        AppError::provider(
            Some(status.as_u16()),
            "oauth token response missing access_token",
        )
    })?;

    Ok(OAuthTokenSet {
        access_token,
        refresh_token: text("refresh_token"),
        expires_in: value
            .get("expires_in")
            .and_then(parse_i64_lossy)
            .filter(|v| *v > 0),
        scope: text("scope").map(|raw| scope_set(raw.split_whitespace())),
        token_type: text("token_type"),
    })
}

fn parse_i64_lossy(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

pub(crate) fn parse_oauth_error_details(body: &str) -> (Option<String>, Option<String>) {
    let value: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) => return (None, None),
    };

    let mut code = value
        .get("error")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);
    let mut message = value
        .get("error_description")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    if let Some(err_obj) = value.get("error").and_then(Value::as_object) {
        if code.is_none() {
            code = err_obj
                .get("code")
                .and_then(Value::as_str)
                .or_else(|| err_obj.get("type").and_then(Value::as_str))
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string);
        }
        if message.is_none() {
            message = err_obj
                .get("message")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string);
        }
    }

    (code, message)
}
