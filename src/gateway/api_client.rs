//! Usage: HTTP client for provider calls; every request is admitted and accounted by the rate-limit governor.
//!
//! The client never looks up credentials itself: callers pass the bearer token in.

use crate::gateway::rate_limit::{normalize_endpoint, parse_window, RateLimitGovernor, HEADER_RESET};
use crate::shared::error::{AppError, AppResult};
use crate::shared::security::sanitize_error_body_snippet;
use crate::shared::time::now_unix_seconds;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Retry hint for a 429 that carries no reset header.
const FALLBACK_RETRY_AFTER_SECS: i64 = 60;

#[derive(Debug, Clone)]
pub(crate) enum RequestBody {
    Empty,
    Form(Vec<(&'static str, String)>),
    Json(Value),
}

#[derive(Debug, Clone)]
pub(crate) struct ApiResponse {
    pub(crate) status: StatusCode,
    pub(crate) body: String,
}

impl ApiResponse {
    /// Non-success statuses become `Provider` errors carrying a redacted body snippet.
    pub(crate) fn error_for_status(self) -> AppResult<Self> {
        if self.status.is_success() {
            return Ok(self);
        }
        let detail = provider_error_detail(&self.body)
            .unwrap_or_else(|| sanitize_error_body_snippet(&self.body));
        Err(AppError::provider(
            Some(self.status.as_u16()),
            format!("provider returned status={} {detail}", self.status.as_u16()),
        ))
    }

    pub(crate) fn json<T: DeserializeOwned>(&self) -> AppResult<T> {
        serde_json::from_str(&self.body).map_err(|e| {
            AppError::provider(
                Some(self.status.as_u16()),
                format!("provider response json invalid: {e}"),
            )
        })
    }
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    governor: Arc<RateLimitGovernor>,
}

impl ApiClient {
    pub fn new(base_url: &str, governor: Arc<RateLimitGovernor>) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(format!("puck/{}", env!("CARGO_PKG_VERSION")))
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| format!("HTTP_CLIENT_INIT: {e}"))?;
        Ok(Self {
            http,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            governor,
        })
    }

    pub fn governor(&self) -> &Arc<RateLimitGovernor> {
        &self.governor
    }

    /// Sends one governed request. Returns the raw response for any status except 429.
    ///
    /// Sequence: refuse when the endpoint's window is exhausted; send; replace the window from
    /// response headers, or consume one unit of the known budget when the response has none.
    pub(crate) async fn send(
        &self,
        method: Method,
        path: &str,
        bearer: Option<&str>,
        body: RequestBody,
    ) -> AppResult<ApiResponse> {
        let endpoint = normalize_endpoint(method.as_str(), path);
        self.governor.check(&endpoint)?;

        let url = format!("{}{}", self.base_url, path);
        let mut request = self.http.request(method, &url);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        request = match body {
            RequestBody::Empty => request,
            RequestBody::Form(fields) => request.form(&fields),
            RequestBody::Json(value) => request.json(&value),
        };

        let response = request.send().await.map_err(|e| {
            AppError::provider(None, format!("request to {endpoint} failed: {e}"))
        })?;
        let status = response.status();
        let window = parse_window(response.headers());
        let reset_header = response
            .headers()
            .get(HEADER_RESET)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<i64>().ok());

        match window {
            Some(window) => self.governor.record_window(&endpoint, window),
            None if status.is_success() => self.governor.decrement(&endpoint),
            None => {}
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let now = now_unix_seconds();
            let (limit, reset_at) = match window {
                Some(w) => (w.limit, w.reset_at),
                None => (
                    0,
                    reset_header.unwrap_or(now.saturating_add(FALLBACK_RETRY_AFTER_SECS)),
                ),
            };
            tracing::warn!(
                endpoint = %endpoint,
                reset_at,
                "provider rejected request with 429"
            );
            return Err(AppError::rate_limited(&endpoint, limit, reset_at, now));
        }

        let body = response.text().await.map_err(|e| {
            AppError::provider(
                Some(status.as_u16()),
                format!("failed to read response from {endpoint}: {e}"),
            )
        })?;
        tracing::debug!(endpoint = %endpoint, status = status.as_u16(), "provider call completed");

        Ok(ApiResponse { status, body })
    }

    /// GET that expects a JSON success body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str, bearer: &str) -> AppResult<T> {
        self.send(Method::GET, path, Some(bearer), RequestBody::Empty)
            .await?
            .error_for_status()?
            .json()
    }

    /// JSON-bodied call (POST/PUT/DELETE) that expects a JSON success body.
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        bearer: &str,
        body: Option<Value>,
    ) -> AppResult<T> {
        let body = body.map(RequestBody::Json).unwrap_or(RequestBody::Empty);
        self.send(method, path, Some(bearer), body)
            .await?
            .error_for_status()?
            .json()
    }
}

/// X API problem bodies: `{"title", "detail"}`, or `{"errors": [{"message"}]}`.
fn provider_error_detail(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let field = |key: &str| {
        value
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };
    field("detail").or_else(|| field("title")).or_else(|| {
        value
            .get("errors")
            .and_then(Value::as_array)
            .and_then(|errors| errors.first())
            .and_then(|first| first.get("message"))
            .and_then(Value::as_str)
            .map(|v| v.trim().chars().take(240).collect())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::rate_limit::RateLimitWindow;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> ApiClient {
        ApiClient::new(&server.uri(), Arc::new(RateLimitGovernor::new())).expect("client")
    }

    #[tokio::test]
    async fn records_window_from_success_headers() {
        let server = MockServer::start().await;
        let reset = now_unix_seconds() + 900;
        Mock::given(method("GET"))
            .and(path("/2/users/me"))
            .and(header("authorization", "Bearer access-1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-rate-limit-limit", "75")
                    .insert_header("x-rate-limit-remaining", "74")
                    .insert_header("x-rate-limit-reset", reset.to_string().as_str())
                    .set_body_json(serde_json::json!({"data": {"id": "1", "username": "puck"}})),
            )
            .mount(&server)
            .await;

        let client = client(&server);
        let value: Value = client.get_json("/2/users/me", "access-1").await.expect("get");
        assert_eq!(value["data"]["username"], "puck");
        assert_eq!(
            client.governor().window("GET /2/users/me"),
            Some(RateLimitWindow {
                limit: 75,
                remaining: 74,
                reset_at: reset,
            })
        );
    }

    #[tokio::test]
    async fn decrements_when_response_has_no_headers() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/2/tweets/1234567890"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": {"deleted": true}})))
            .mount(&server)
            .await;

        let client = client(&server);
        client.governor().record_window(
            "DELETE /2/tweets/:id",
            RateLimitWindow {
                limit: 50,
                remaining: 2,
                reset_at: now_unix_seconds() + 600,
            },
        );
        let _: Value = client
            .send_json(Method::DELETE, "/2/tweets/1234567890", "token", None)
            .await
            .expect("delete");
        assert_eq!(
            client
                .governor()
                .window("DELETE /2/tweets/:id")
                .map(|w| w.remaining),
            Some(1)
        );
    }

    #[tokio::test]
    async fn exhausted_window_never_reaches_the_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2/tweets"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        let client = client(&server);
        client.governor().record_window(
            "POST /2/tweets",
            RateLimitWindow {
                limit: 100,
                remaining: 0,
                reset_at: now_unix_seconds() + 300,
            },
        );
        let err = client
            .send_json::<Value>(
                Method::POST,
                "/2/tweets",
                "token",
                Some(serde_json::json!({"text": "hi"})),
            )
            .await
            .expect_err("refused");
        assert_eq!(err.code(), "RATE_LIMITED");
    }

    #[tokio::test]
    async fn too_many_requests_records_window_and_surfaces_rate_limited() {
        let server = MockServer::start().await;
        let reset = now_unix_seconds() + 120;
        Mock::given(method("GET"))
            .and(path("/2/users/me"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("x-rate-limit-limit", "75")
                    .insert_header("x-rate-limit-remaining", "0")
                    .insert_header("x-rate-limit-reset", reset.to_string().as_str()),
            )
            .mount(&server)
            .await;

        let client = client(&server);
        let err = client
            .get_json::<Value>("/2/users/me", "token")
            .await
            .expect_err("429");
        match err {
            AppError::RateLimited {
                endpoint,
                limit,
                reset_at,
                ..
            } => {
                assert_eq!(endpoint, "GET /2/users/me");
                assert_eq!(limit, 75);
                assert_eq!(reset_at, reset);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(client.governor().check("GET /2/users/me").is_err());
    }

    #[tokio::test]
    async fn error_status_becomes_provider_error_with_detail() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/2/users/me"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "title": "Unauthorized",
                "detail": "Unauthorized",
                "status": 401
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .get_json::<Value>("/2/users/me", "revoked")
            .await
            .expect_err("401");
        assert!(matches!(
            err,
            AppError::Provider {
                status: Some(401),
                ..
            }
        ));
        assert!(err.message().contains("Unauthorized"));
    }

    #[test]
    fn provider_error_detail_prefers_detail_then_errors() {
        assert_eq!(
            provider_error_detail(r#"{"title":"Forbidden","detail":"not allowed"}"#).as_deref(),
            Some("not allowed")
        );
        assert_eq!(
            provider_error_detail(r#"{"errors":[{"message":"bad id"}]}"#).as_deref(),
            Some("bad id")
        );
        assert_eq!(provider_error_detail("<html>"), None);
    }
}
