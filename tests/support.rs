#![allow(dead_code)]

use std::collections::HashSet;
use std::ffi::OsString;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Duration;

use puck_lib::{
    AppError, Config, CredentialRecord, EphemeralIdentity, OAuthProvider, OAuthTokenSet,
    ProviderFuture, Session, TokenExchangeRequest, TokenStore, UrlPresenter,
};
use reqwest::Url;

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

pub fn env_lock() -> MutexGuard<'static, ()> {
    ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
pub struct EnvRestore {
    saved: Vec<(&'static str, Option<OsString>)>,
}

impl EnvRestore {
    fn save_once(&mut self, key: &'static str) {
        if self.saved.iter().any(|(k, _)| *k == key) {
            return;
        }
        self.saved.push((key, std::env::var_os(key)));
    }

    pub fn set_var(&mut self, key: &'static str, value: impl Into<OsString>) {
        self.save_once(key);
        std::env::set_var(key, value.into());
    }

    pub fn remove_var(&mut self, key: &'static str) {
        self.save_once(key);
        std::env::remove_var(key);
    }
}

impl Drop for EnvRestore {
    fn drop(&mut self) {
        for (key, value) in self.saved.drain(..).rev() {
            match value {
                Some(v) => std::env::set_var(key, v),
                None => std::env::remove_var(key),
            }
        }
    }
}

pub const KEY_MATERIAL: &str = "puck-tester-testhost";
pub const MINUTE_MS: i64 = 60 * 1000;

pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock after epoch")
        .as_millis() as i64
}

/// Config isolated under `dir`, listening on an ephemeral loopback port.
pub fn test_config(dir: &Path, api_base_url: &str, auth_timeout_secs: u64) -> Config {
    let token_path = dir.join("tokens.json").to_string_lossy().into_owned();
    let timeout = auth_timeout_secs.to_string();
    let api_base_url = api_base_url.to_string();
    Config::from_lookup(move |key| match key {
        "PUCK_CLIENT_ID" => Some("test-client".to_string()),
        "PUCK_TOKEN_PATH" => Some(token_path.clone()),
        "PUCK_REDIRECT_URI" => Some("http://127.0.0.1:0/oauth/callback".to_string()),
        "PUCK_API_BASE_URL" => Some(api_base_url.clone()),
        "PUCK_AUTH_TIMEOUT_SECS" => Some(timeout.clone()),
        _ => None,
    })
    .expect("test config")
}

pub fn test_store(config: &Config) -> TokenStore {
    TokenStore::with_key_material(config.token_path.clone(), KEY_MATERIAL)
}

pub fn record(access: &str, refresh: &str, expires_at: i64) -> CredentialRecord {
    CredentialRecord {
        access_token: access.to_string(),
        refresh_token: refresh.to_string(),
        expires_at,
        token_type: "Bearer".to_string(),
        scope: ["tweet.read", "users.read", "offline.access"]
            .into_iter()
            .map(str::to_string)
            .collect(),
    }
}

pub fn token_set(access: &str, refresh: Option<&str>) -> OAuthTokenSet {
    OAuthTokenSet {
        access_token: access.to_string(),
        refresh_token: refresh.map(str::to_string),
        expires_in: Some(7200),
        scope: None,
        token_type: Some("bearer".to_string()),
    }
}

/// Scriptable in-memory provider that counts every call.
pub struct FakeProvider {
    pub exchanges: AtomicUsize,
    pub refreshes: AtomicUsize,
    pub revokes: AtomicUsize,
    pub identity_calls: AtomicUsize,
    pub last_code: Mutex<Option<String>>,
    exchange_result: Mutex<Result<OAuthTokenSet, AppError>>,
    refresh_result: Mutex<Result<OAuthTokenSet, AppError>>,
    refresh_delay: Duration,
    valid_tokens: Mutex<HashSet<String>>,
    revoke_fails: bool,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self {
            exchanges: AtomicUsize::new(0),
            refreshes: AtomicUsize::new(0),
            revokes: AtomicUsize::new(0),
            identity_calls: AtomicUsize::new(0),
            last_code: Mutex::new(None),
            exchange_result: Mutex::new(Ok(token_set("exchanged-access", Some("exchanged-refresh")))),
            refresh_result: Mutex::new(Ok(token_set("refreshed-access", Some("refreshed-refresh")))),
            refresh_delay: Duration::ZERO,
            valid_tokens: Mutex::new(
                ["valid-access", "exchanged-access", "refreshed-access"]
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
            ),
            revoke_fails: false,
        }
    }

    pub fn with_exchange_result(self, result: Result<OAuthTokenSet, AppError>) -> Self {
        *self.exchange_result.lock().expect("lock") = result;
        self
    }

    pub fn with_refresh_result(self, result: Result<OAuthTokenSet, AppError>) -> Self {
        *self.refresh_result.lock().expect("lock") = result;
        self
    }

    pub fn with_refresh_delay(mut self, delay: Duration) -> Self {
        self.refresh_delay = delay;
        self
    }

    pub fn with_revoke_failure(mut self) -> Self {
        self.revoke_fails = true;
        self
    }

    pub fn reject_token(&self, token: &str) {
        self.valid_tokens.lock().expect("lock").remove(token);
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

impl OAuthProvider for FakeProvider {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn exchange_code<'a>(
        &'a self,
        request: &'a TokenExchangeRequest,
    ) -> ProviderFuture<'a, OAuthTokenSet> {
        Box::pin(async move {
            self.exchanges.fetch_add(1, Ordering::SeqCst);
            *self.last_code.lock().expect("lock") = Some(request.code.clone());
            self.exchange_result.lock().expect("lock").clone()
        })
    }

    fn refresh_token<'a>(&'a self, _refresh_token: &'a str) -> ProviderFuture<'a, OAuthTokenSet> {
        Box::pin(async move {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            if !self.refresh_delay.is_zero() {
                tokio::time::sleep(self.refresh_delay).await;
            }
            self.refresh_result.lock().expect("lock").clone()
        })
    }

    fn revoke_token<'a>(&'a self, _access_token: &'a str) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            self.revokes.fetch_add(1, Ordering::SeqCst);
            if self.revoke_fails {
                return Err(AppError::provider(Some(503), "revocation unavailable"));
            }
            Ok(())
        })
    }

    fn fetch_identity<'a>(
        &'a self,
        access_token: &'a str,
    ) -> ProviderFuture<'a, EphemeralIdentity> {
        Box::pin(async move {
            self.identity_calls.fetch_add(1, Ordering::SeqCst);
            if self.valid_tokens.lock().expect("lock").contains(access_token) {
                Ok(EphemeralIdentity {
                    user_id: "42424242".to_string(),
                    username: "puckuser".to_string(),
                })
            } else {
                Err(AppError::provider(Some(401), "Unauthorized"))
            }
        })
    }
}

/// Session wired to `provider`, a fixed-key store and a presenter that never opens a browser.
pub fn fake_session(config: Config, provider: Arc<FakeProvider>, presenter: UrlPresenter) -> Session {
    let store = test_store(&config);
    Session::new(config)
        .expect("session")
        .with_token_store(store)
        .with_provider(provider)
        .with_presenter(presenter)
}

pub fn silent_presenter() -> UrlPresenter {
    Arc::new(|_url: &str| {})
}

/// What a simulated browser should request once it sees the authorization URL.
pub struct BrowserVisit {
    pub path: Option<&'static str>,
    pub query: Vec<(&'static str, String)>,
}

/// Placeholder for "the state from the authorization URL".
pub const ECHO_STATE: &str = "<echo-state>";

/// Presenter that plays the browser: reads `redirect_uri`/`state` from the authorization URL and
/// issues `visits` in order, collecting the HTTP status of each.
pub fn browser_presenter(visits: Vec<BrowserVisit>, statuses: Arc<Mutex<Vec<u16>>>) -> UrlPresenter {
    let visits = Arc::new(visits);
    Arc::new(move |authorization_url: &str| {
        let url = Url::parse(authorization_url).expect("authorization url");
        let mut redirect_uri = None;
        let mut state = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "redirect_uri" => redirect_uri = Some(value.into_owned()),
                "state" => state = Some(value.into_owned()),
                _ => {}
            }
        }
        let redirect = Url::parse(&redirect_uri.expect("redirect_uri")).expect("redirect url");
        let state = state.expect("state");
        let visits = Arc::clone(&visits);
        let statuses = Arc::clone(&statuses);

        tokio::spawn(async move {
            let client = reqwest::Client::new();
            for visit in visits.iter() {
                let mut target = redirect.clone();
                if let Some(path) = visit.path {
                    target.set_path(path);
                }
                {
                    let mut pairs = target.query_pairs_mut();
                    for (key, value) in &visit.query {
                        let value = if value == ECHO_STATE { state.as_str() } else { value };
                        pairs.append_pair(key, value);
                    }
                }
                match client.get(target).send().await {
                    Ok(response) => statuses.lock().expect("lock").push(response.status().as_u16()),
                    Err(_) => statuses.lock().expect("lock").push(0),
                }
            }
        });
    })
}

pub fn visit(query: &[(&'static str, &str)]) -> BrowserVisit {
    BrowserVisit {
        path: None,
        query: query.iter().map(|(k, v)| (*k, v.to_string())).collect(),
    }
}
