//! Usage: One-shot localhost callback listener for the OAuth authorization code flow.
//!
//! Serves only the configured callback path (everything else is 404) until one qualifying
//! callback settles the flow or the timeout fires. The listener is torn down on every exit path,
//! including cancellation of the waiting future.

use crate::infra::config::CallbackAddress;
use crate::shared::error::{AppError, AppResult};
use crate::shared::mutex_ext::MutexExt;
use crate::shared::security::constant_time_eq;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

const SUCCESS_HTML: &str = "<html><body><h1>Puck: authorization successful</h1><p>You can close this window and return to your application.</p></body></html>";
const DENIED_HTML: &str =
    "<html><body><h1>Authorization failed</h1><p>You can close this window.</p></body></html>";
const CSRF_HTML: &str = "<html><body><h1>Authorization failed</h1><p>State mismatch, possible CSRF attack.</p><p>You can close this window.</p></body></html>";
const INCOMPLETE_HTML: &str =
    "<html><body><h1>Missing authorization code</h1><p>Waiting for the authorization server.</p></body></html>";
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// How one request to the callback path affects the flow.
#[derive(Debug)]
pub(crate) enum CallbackVerdict {
    Authorized(String),
    Rejected(AppError),
    /// Neither code nor error: answer 400 and keep waiting.
    Incomplete,
}

/// Provider error first, then state (before the code is trusted), then the code itself.
pub(crate) fn classify_callback(
    params: &HashMap<String, String>,
    expected_state: &str,
) -> CallbackVerdict {
    let non_empty = |key: &str| {
        params
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    };

    if let Some(error) = non_empty("error") {
        let message = match non_empty("error_description") {
            Some(description) => format!("oauth authorization failed: {error} ({description})"),
            None => format!("oauth authorization failed: {error}"),
        };
        return CallbackVerdict::Rejected(AppError::provider(None, message));
    }

    let state_matches = params
        .get("state")
        .is_some_and(|state| constant_time_eq(state.as_bytes(), expected_state.as_bytes()));
    if !state_matches {
        return CallbackVerdict::Rejected(AppError::CsrfStateMismatch);
    }

    match non_empty("code") {
        Some(code) => CallbackVerdict::Authorized(code.to_string()),
        None => CallbackVerdict::Incomplete,
    }
}

#[derive(Clone)]
struct CallbackState {
    expected_state: Arc<str>,
    outcome: Arc<Mutex<Option<oneshot::Sender<AppResult<String>>>>>,
}

async fn handle_callback(
    State(state): State<CallbackState>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, Html<&'static str>) {
    let verdict = classify_callback(&params, &state.expected_state);
    let (status, page, settled) = match verdict {
        CallbackVerdict::Authorized(code) => (StatusCode::OK, SUCCESS_HTML, Ok(code)),
        CallbackVerdict::Rejected(err @ AppError::CsrfStateMismatch) => {
            (StatusCode::BAD_REQUEST, CSRF_HTML, Err(err))
        }
        CallbackVerdict::Rejected(err) => (StatusCode::BAD_REQUEST, DENIED_HTML, Err(err)),
        CallbackVerdict::Incomplete => {
            tracing::debug!("oauth callback without code or error, still waiting");
            return (StatusCode::BAD_REQUEST, Html(INCOMPLETE_HTML));
        }
    };

    match state.outcome.lock_or_recover().take() {
        Some(sender) => {
            let _ = sender.send(settled);
        }
        None => tracing::debug!("oauth callback arrived after the flow settled; ignored"),
    }
    (status, Html(page))
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

fn build_router(path: &str, state: CallbackState) -> Router {
    Router::new()
        .route(path, get(handle_callback).fallback(not_found))
        .fallback(not_found)
        .with_state(state)
}

#[derive(Debug)]
pub(crate) struct BoundCallbackListener {
    port: u16,
    path: String,
    listeners: Vec<TcpListener>,
}

impl BoundCallbackListener {
    pub(crate) fn port(&self) -> u16 {
        self.port
    }
}

/// Binds the callback address. `localhost` listens on both loopback families so the browser
/// reaches it whichever one it resolves to; port `0` picks an ephemeral port.
pub(crate) async fn bind_callback_listener(
    address: &CallbackAddress,
) -> AppResult<BoundCallbackListener> {
    let hosts: Vec<&str> = match address.host.as_str() {
        "localhost" => vec!["127.0.0.1", "::1"],
        other => vec![other],
    };

    let mut bind_errors: Vec<String> = Vec::new();
    let mut listeners: Vec<TcpListener> = Vec::new();
    let mut port = address.port;

    for host in hosts {
        match TcpListener::bind((host, port)).await {
            Ok(listener) => {
                if port == 0 {
                    port = listener
                        .local_addr()
                        .map_err(|e| format!("SYSTEM_ERROR: oauth callback local_addr failed: {e}"))?
                        .port();
                }
                listeners.push(listener);
            }
            Err(err) => bind_errors.push(format!("{host}:{port} ({err})")),
        }
    }

    if listeners.is_empty() {
        return Err(format!(
            "SYSTEM_ERROR: oauth callback bind failed: {}",
            bind_errors.join("; ")
        )
        .into());
    }
    if !bind_errors.is_empty() {
        tracing::debug!(errors = %bind_errors.join("; "), "oauth callback partially bound");
    }

    Ok(BoundCallbackListener {
        port,
        path: address.path.clone(),
        listeners,
    })
}

/// Stops the listener tasks when dropped (aborting whatever did not finish gracefully).
struct ServerGuard {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl ServerGuard {
    async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        let tasks = std::mem::take(&mut self.tasks);
        let mut pending = Vec::new();
        for task in tasks {
            let abort = task.abort_handle();
            if tokio::time::timeout(SHUTDOWN_GRACE, task).await.is_err() {
                pending.push(abort);
            }
        }
        for abort in pending {
            abort.abort();
        }
    }
}

impl Drop for ServerGuard {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Serves the callback until it settles with an authorization code or an error.
pub(crate) async fn wait_for_callback(
    bound: BoundCallbackListener,
    expected_state: &str,
    timeout: Duration,
) -> AppResult<String> {
    let (outcome_tx, outcome_rx) = oneshot::channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let router = build_router(
        &bound.path,
        CallbackState {
            expected_state: Arc::from(expected_state),
            outcome: Arc::new(Mutex::new(Some(outcome_tx))),
        },
    );

    let port = bound.port;
    let tasks = bound
        .listeners
        .into_iter()
        .map(|listener| {
            let app = router.clone();
            let mut shutdown_rx = shutdown_rx.clone();
            tokio::spawn(async move {
                let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                    let _ = shutdown_rx.wait_for(|stop| *stop).await;
                });
                if let Err(err) = serve.await {
                    tracing::warn!(port, "oauth callback server error: {}", err);
                }
            })
        })
        .collect();
    let guard = ServerGuard {
        shutdown: shutdown_tx,
        tasks,
    };
    tracing::info!(port, path = %bound.path, "oauth callback listener ready");

    let result = match tokio::time::timeout(timeout, outcome_rx).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(_)) => Err(AppError::new(
            "SYSTEM_ERROR",
            "oauth callback listener stopped before a callback arrived",
        )),
        Err(_) => {
            tracing::warn!(port, timeout_secs = timeout.as_secs(), "oauth callback timed out");
            Err(AppError::AuthorizationTimeout {
                timeout_secs: timeout.as_secs(),
            })
        }
    };

    guard.shutdown().await;
    result
}
