//! Usage: Per-endpoint rate-limit bookkeeping fed by provider response headers.
//!
//! Key: `"<VERB> <path>"` with all-digit path segments of 3+ chars collapsed to `:id`, so
//! `/2/tweets/1234567890` and `/2/tweets/42424242` share one window while `/2/` keeps its version.

use crate::shared::error::{AppError, AppResult};
use crate::shared::mutex_ext::MutexExt;
use crate::shared::time::{now_unix_seconds, unix_seconds_to_rfc3339};
use reqwest::header::HeaderMap;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

pub const HEADER_LIMIT: &str = "x-rate-limit-limit";
pub const HEADER_REMAINING: &str = "x-rate-limit-remaining";
pub const HEADER_RESET: &str = "x-rate-limit-reset";

const ID_PLACEHOLDER: &str = ":id";
const MIN_ID_DIGITS: usize = 3;

pub fn normalize_endpoint(method: &str, path: &str) -> String {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let normalized = path
        .split('/')
        .map(|segment| {
            if segment.len() >= MIN_ID_DIGITS && segment.bytes().all(|b| b.is_ascii_digit()) {
                ID_PLACEHOLDER
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/");
    format!("{} {normalized}", method.trim().to_ascii_uppercase())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitWindow {
    pub limit: u32,
    pub remaining: u32,
    /// Epoch seconds.
    pub reset_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitStatus {
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: i64,
    #[serde(rename = "resetAtISO")]
    pub reset_at_iso: String,
}

/// Reads the three window headers; any missing or unparsable value yields `None`.
pub(crate) fn parse_window(headers: &HeaderMap) -> Option<RateLimitWindow> {
    fn header<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<T>().ok())
    }

    Some(RateLimitWindow {
        limit: header(headers, HEADER_LIMIT)?,
        remaining: header(headers, HEADER_REMAINING)?,
        reset_at: header(headers, HEADER_RESET)?,
    })
}

/// In-memory only: windows are forgotten when the process exits.
#[derive(Debug, Default)]
pub struct RateLimitGovernor {
    windows: Mutex<HashMap<String, RateLimitWindow>>,
}

impl RateLimitGovernor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&self, endpoint: &str) -> AppResult<()> {
        self.check_at(endpoint, now_unix_seconds())
    }

    /// Unknown endpoints are allowed; an expired window is evicted and allowed.
    pub fn check_at(&self, endpoint: &str, now_unix: i64) -> AppResult<()> {
        let mut windows = self.windows.lock_or_recover();
        let Some(window) = windows.get(endpoint).copied() else {
            return Ok(());
        };

        if now_unix >= window.reset_at {
            windows.remove(endpoint);
            tracing::debug!(endpoint = %endpoint, "rate limit window expired");
            return Ok(());
        }

        if window.remaining == 0 {
            tracing::warn!(
                endpoint = %endpoint,
                limit = window.limit,
                reset_at = window.reset_at,
                "rate limit budget exhausted, refusing call"
            );
            return Err(AppError::rate_limited(
                endpoint,
                window.limit,
                window.reset_at,
                now_unix,
            ));
        }
        Ok(())
    }

    /// Replaces the endpoint's window from response headers. Returns whether anything was recorded.
    pub fn record(&self, endpoint: &str, headers: &HeaderMap) -> bool {
        match parse_window(headers) {
            Some(window) => {
                self.record_window(endpoint, window);
                true
            }
            None => false,
        }
    }

    pub fn record_window(&self, endpoint: &str, window: RateLimitWindow) {
        tracing::trace!(
            endpoint = %endpoint,
            limit = window.limit,
            remaining = window.remaining,
            reset_at = window.reset_at,
            "rate limit window updated"
        );
        self.windows
            .lock_or_recover()
            .insert(endpoint.to_string(), window);
    }

    pub fn decrement(&self, endpoint: &str) {
        if let Some(window) = self.windows.lock_or_recover().get_mut(endpoint) {
            window.remaining = window.remaining.saturating_sub(1);
        }
    }

    pub fn window(&self, endpoint: &str) -> Option<RateLimitWindow> {
        self.windows.lock_or_recover().get(endpoint).copied()
    }

    pub fn snapshot(&self) -> BTreeMap<String, RateLimitStatus> {
        self.snapshot_at(now_unix_seconds())
    }

    /// Active windows only; expired ones are hidden but left for `check` to evict.
    pub fn snapshot_at(&self, now_unix: i64) -> BTreeMap<String, RateLimitStatus> {
        self.windows
            .lock_or_recover()
            .iter()
            .filter(|(_, w)| w.reset_at > now_unix)
            .map(|(endpoint, w)| {
                (
                    endpoint.clone(),
                    RateLimitStatus {
                        limit: w.limit,
                        remaining: w.remaining,
                        reset_at: w.reset_at,
                        reset_at_iso: unix_seconds_to_rfc3339(w.reset_at),
                    },
                )
            })
            .collect()
    }

    pub fn clear(&self) {
        self.windows.lock_or_recover().clear();
    }
}
