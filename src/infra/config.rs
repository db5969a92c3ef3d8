//! Usage: Environment-sourced configuration (client id, redirect URI, token path, API tier).

use crate::shared::error::{AppError, AppResult};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_CLIENT_ID: &str = "PUCK_CLIENT_ID";
pub const ENV_REDIRECT_URI: &str = "PUCK_REDIRECT_URI";
pub const ENV_TOKEN_PATH: &str = "PUCK_TOKEN_PATH";
pub const ENV_API_TIER: &str = "PUCK_API_TIER";
pub const ENV_LOG_LEVEL: &str = "PUCK_LOG_LEVEL";
pub const ENV_API_BASE_URL: &str = "PUCK_API_BASE_URL";
pub const ENV_AUTHORIZE_URL: &str = "PUCK_AUTHORIZE_URL";
pub const ENV_AUTH_TIMEOUT_SECS: &str = "PUCK_AUTH_TIMEOUT_SECS";

pub const DEFAULT_CALLBACK_HOST: &str = "localhost";
pub const DEFAULT_CALLBACK_PORT: u16 = 3000;
pub const DEFAULT_CALLBACK_PATH: &str = "/oauth/callback";
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:3000/oauth/callback";
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_API_BASE_URL: &str = "https://api.x.com";
pub const DEFAULT_AUTHORIZE_URL: &str = "https://x.com/i/oauth2/authorize";
/// Used when the token endpoint omits `expires_in`.
pub const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 2 * 60 * 60;
pub const DEFAULT_AUTH_TIMEOUT_SECS: u64 = 120;
pub const APP_DIR_NAME: &str = ".puck";
pub const TOKEN_FILE_NAME: &str = "tokens.json";

/// Capabilities requested during interactive authorization.
pub const REQUESTED_SCOPES: &[&str] = &[
    "tweet.read",
    "tweet.write",
    "users.read",
    "media.write",
    "offline.access",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiTier {
    Free,
    #[default]
    Basic,
    Pro,
    Enterprise,
}

impl ApiTier {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "free" => Some(Self::Free),
            "basic" => Some(Self::Basic),
            "pro" => Some(Self::Pro),
            "enterprise" => Some(Self::Enterprise),
            _ => None,
        }
    }
}

/// Where the transient callback listener binds, derived from the redirect URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackAddress {
    pub host: String,
    /// `0` asks the OS for an ephemeral port; the redirect URI is then rebuilt with the bound port.
    pub port: u16,
    pub path: String,
}

impl Default for CallbackAddress {
    fn default() -> Self {
        Self {
            host: DEFAULT_CALLBACK_HOST.to_string(),
            port: DEFAULT_CALLBACK_PORT,
            path: DEFAULT_CALLBACK_PATH.to_string(),
        }
    }
}

impl CallbackAddress {
    /// Malformed URIs fall back to `localhost:3000/oauth/callback`; a URI without an explicit
    /// port listens on 3000.
    pub fn from_redirect_uri(redirect_uri: &str) -> Self {
        let url = match Url::parse(redirect_uri.trim()) {
            Ok(url) => url,
            Err(err) => {
                tracing::warn!(
                    redirect_uri = redirect_uri,
                    "redirect uri is malformed ({err}); using default callback address"
                );
                return Self::default();
            }
        };

        let host = url
            .host_str()
            .map(|h| h.trim_start_matches('[').trim_end_matches(']'))
            .filter(|h| !h.is_empty())
            .unwrap_or(DEFAULT_CALLBACK_HOST)
            .to_string();
        let port = url.port().unwrap_or(DEFAULT_CALLBACK_PORT);
        let path = match url.path() {
            "" => "/".to_string(),
            p => p.to_string(),
        };

        Self { host, port, path }
    }

    pub fn redirect_uri_for_port(&self, port: u16) -> String {
        if self.host.contains(':') {
            format!("http://[{}]:{port}{}", self.host, self.path)
        } else {
            format!("http://{}:{port}{}", self.host, self.path)
        }
    }
}

/// Immutable process configuration; consumed by every other component.
#[derive(Debug, Clone)]
pub struct Config {
    pub client_id: String,
    pub redirect_uri: String,
    pub token_path: PathBuf,
    pub api_tier: ApiTier,
    pub log_level: String,
    pub api_base_url: String,
    pub authorize_url: String,
    pub auth_timeout: Duration,
}

impl Config {
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolves configuration through `lookup`; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let read = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let client_id = read(ENV_CLIENT_ID).ok_or_else(|| {
            AppError::new(
                "CONFIG_MISSING",
                format!(
                    "{ENV_CLIENT_ID} environment variable is required. Create an X Developer \
                     project with OAuth 2.0 PKCE and set the Client ID."
                ),
            )
        })?;

        let redirect_uri = read(ENV_REDIRECT_URI).unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string());
        let token_path = read(ENV_TOKEN_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(default_token_path);

        let api_tier = match read(ENV_API_TIER) {
            None => ApiTier::default(),
            Some(raw) => ApiTier::parse(&raw).unwrap_or_else(|| {
                tracing::warn!(api_tier = %raw, "unknown api tier; falling back to basic");
                ApiTier::default()
            }),
        };

        let auth_timeout_secs = match read(ENV_AUTH_TIMEOUT_SECS) {
            None => DEFAULT_AUTH_TIMEOUT_SECS,
            Some(raw) => match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => secs,
                _ => {
                    tracing::warn!(value = %raw, "invalid {ENV_AUTH_TIMEOUT_SECS}; using default");
                    DEFAULT_AUTH_TIMEOUT_SECS
                }
            },
        };

        Ok(Self {
            client_id,
            redirect_uri,
            token_path,
            api_tier,
            log_level: read(ENV_LOG_LEVEL).unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            api_base_url: read(ENV_API_BASE_URL)
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            authorize_url: read(ENV_AUTHORIZE_URL)
                .unwrap_or_else(|| DEFAULT_AUTHORIZE_URL.to_string()),
            auth_timeout: Duration::from_secs(auth_timeout_secs),
        })
    }

    pub fn callback_address(&self) -> CallbackAddress {
        CallbackAddress::from_redirect_uri(&self.redirect_uri)
    }

    /// Directory holding the token file (and the log directory).
    pub fn token_dir(&self) -> PathBuf {
        token_dir_of(&self.token_path)
    }
}

pub(crate) fn token_dir_of(token_path: &Path) -> PathBuf {
    match token_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn default_token_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
        .join(TOKEN_FILE_NAME)
}
