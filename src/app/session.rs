//! Usage: Owns the credential lifecycle for one process: store, refresh, interactive login, identity.
//!
//! No process-wide globals: the identity slot, refresh marker and rate windows all live here.

use crate::domain::credentials::{CredentialRecord, EphemeralIdentity};
use crate::gateway::api_client::ApiClient;
use crate::gateway::oauth::adapters::x::XOAuthProvider;
use crate::gateway::oauth::flow::{browser_presenter, AuthorizationFlow, UrlPresenter};
use crate::gateway::oauth::provider_trait::OAuthProvider;
use crate::gateway::oauth::refresh::{needs_refresh, TokenRefreshCoordinator};
use crate::gateway::rate_limit::RateLimitGovernor;
use crate::infra::config::Config;
use crate::infra::token_store::TokenStore;
use crate::shared::blocking;
use crate::shared::error::{AppError, AppResult};
use crate::shared::mutex_ext::MutexExt;
use crate::shared::time::now_unix_millis;
use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Unauthenticated,
    Verifying,
    Authenticated,
    RefreshPending,
    InteractiveFlow,
    LoggedOut,
}

pub struct Session {
    config: Config,
    store: TokenStore,
    api: ApiClient,
    provider: Arc<dyn OAuthProvider>,
    refresh: TokenRefreshCoordinator,
    flow: AuthorizationFlow,
    presenter: UrlPresenter,
    identity: Mutex<Option<EphemeralIdentity>>,
    state: Mutex<SessionState>,
}

impl Session {
    /// Wires the X adapter, the encrypted store at `config.token_path` and a browser presenter.
    pub fn new(config: Config) -> AppResult<Self> {
        let governor = Arc::new(RateLimitGovernor::new());
        let api = ApiClient::new(&config.api_base_url, governor)?;
        let provider: Arc<dyn OAuthProvider> = Arc::new(XOAuthProvider::new(
            config.client_id.clone(),
            api.clone(),
        ));
        let store = TokenStore::new(config.token_path.clone());
        let refresh = TokenRefreshCoordinator::new(store.clone(), Arc::clone(&provider));

        Ok(Self {
            config,
            store,
            api,
            provider,
            refresh,
            flow: AuthorizationFlow::default(),
            presenter: browser_presenter(),
            identity: Mutex::new(None),
            state: Mutex::new(SessionState::Unauthenticated),
        })
    }

    pub fn with_provider(mut self, provider: Arc<dyn OAuthProvider>) -> Self {
        self.refresh = TokenRefreshCoordinator::new(self.store.clone(), Arc::clone(&provider));
        self.provider = provider;
        self
    }

    pub fn with_token_store(mut self, store: TokenStore) -> Self {
        self.refresh = TokenRefreshCoordinator::new(store.clone(), Arc::clone(&self.provider));
        self.store = store;
        self
    }

    pub fn with_presenter(mut self, presenter: UrlPresenter) -> Self {
        self.presenter = presenter;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn governor(&self) -> &Arc<RateLimitGovernor> {
        self.api.governor()
    }

    pub fn token_store(&self) -> &TokenStore {
        &self.store
    }

    pub fn identity(&self) -> Option<EphemeralIdentity> {
        self.identity.lock_or_recover().clone()
    }

    pub fn state(&self) -> SessionState {
        let state = *self.state.lock_or_recover();
        if state == SessionState::Authenticated && self.refresh.is_refreshing() {
            return SessionState::RefreshPending;
        }
        state
    }

    fn set_state(&self, next: SessionState) {
        let mut state = self.state.lock_or_recover();
        if *state != next {
            tracing::debug!(from = ?*state, to = ?next, "session state changed");
            *state = next;
        }
    }

    pub async fn stored_credentials(&self) -> AppResult<Option<CredentialRecord>> {
        let store = self.store.clone();
        blocking::run("token_store.load", move || Ok::<_, AppError>(store.load())).await
    }

    /// Stored token verified, else refreshed and verified, else the interactive flow.
    ///
    /// Returns the resolved identity; `None` means credentials were stored but the identity
    /// lookup failed afterwards (the credential stays valid).
    pub async fn authenticate(&self) -> AppResult<Option<EphemeralIdentity>> {
        self.set_state(SessionState::Verifying);

        if let Some(record) = self.stored_credentials().await? {
            if !needs_refresh(record.expires_at, now_unix_millis()) {
                match self.verify(&record.access_token).await {
                    Ok(identity) => return Ok(Some(identity)),
                    Err(err) => tracing::warn!("stored token failed verification: {}", err),
                }
            }

            if record.has_refresh_token() {
                self.set_state(SessionState::RefreshPending);
                match self.refresh.refresh(&record.refresh_token).await {
                    Ok(refreshed) => match self.verify(&refreshed.access_token).await {
                        Ok(identity) => return Ok(Some(identity)),
                        Err(err) => tracing::warn!("refreshed token failed verification: {}", err),
                    },
                    Err(err) => tracing::warn!(
                        "token refresh failed, starting interactive flow: {}",
                        err
                    ),
                }
            }
        }

        self.set_state(SessionState::InteractiveFlow);
        let record = match self
            .flow
            .run(
                &self.config,
                self.provider.as_ref(),
                &self.store,
                &self.presenter,
            )
            .await
        {
            Ok(record) => record,
            // The running attempt still owns the state.
            Err(err @ AppError::AuthorizationInProgress) => return Err(err),
            Err(err) => {
                self.set_state(SessionState::Unauthenticated);
                return Err(err);
            }
        };

        self.set_state(SessionState::Authenticated);
        match self.verify(&record.access_token).await {
            Ok(identity) => Ok(Some(identity)),
            Err(err) => {
                tracing::warn!("identity lookup after login failed: {}", err);
                Ok(None)
            }
        }
    }

    async fn verify(&self, access_token: &str) -> AppResult<EphemeralIdentity> {
        let identity = self.provider.fetch_identity(access_token).await?;
        tracing::info!(
            user_id = %identity.user_id,
            "authenticated as @{}",
            identity.username
        );
        *self.identity.lock_or_recover() = Some(identity.clone());
        self.set_state(SessionState::Authenticated);
        Ok(identity)
    }

    /// Best-effort revocation, then local clearing, which always happens.
    ///
    /// Returns whether the stored credential is gone.
    pub async fn logout(&self) -> bool {
        match self.stored_credentials().await {
            Ok(Some(record)) if !record.access_token.is_empty() => {
                if let Err(err) = self.provider.revoke_token(&record.access_token).await {
                    tracing::debug!("token revocation failed (ignored): {}", err);
                }
            }
            Ok(_) => {}
            Err(err) => tracing::warn!("could not read credentials before logout: {}", err),
        }

        let store = self.store.clone();
        let cleared = blocking::run("token_store.clear", move || store.clear()).await;
        *self.identity.lock_or_recover() = None;
        self.set_state(SessionState::LoggedOut);

        match cleared {
            Ok(()) => {
                tracing::info!("logged out");
                true
            }
            Err(err) => {
                tracing::error!("failed to clear stored credentials: {}", err);
                false
            }
        }
    }

    pub async fn get_valid_access_token(&self) -> AppResult<String> {
        match self.refresh.get_valid_access_token().await {
            Ok(token) => Ok(token),
            Err(err @ (AppError::AuthRequired(_) | AppError::RefreshFailure(_))) => {
                self.set_state(SessionState::Unauthenticated);
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Governed, authenticated JSON call against the provider API.
    pub async fn call_api(&self, method: Method, path: &str, body: Option<Value>) -> AppResult<Value> {
        let token = self.get_valid_access_token().await?;
        self.api.send_json(method, path, &token, body).await
    }
}
