//! Usage: Access-token validity decisions and de-duplicated refresh execution.

use crate::domain::credentials::CredentialRecord;
use crate::gateway::oauth::provider_trait::OAuthProvider;
use crate::infra::token_store::TokenStore;
use crate::shared::blocking;
use crate::shared::error::{AppError, AppResult};
use crate::shared::single_flight::SingleFlight;
use crate::shared::time::now_unix_millis;
use std::sync::Arc;

/// A stored token with this much life left or less is refreshed before use.
pub const REFRESH_THRESHOLD_MS: i64 = 15 * 60 * 1000;

pub(crate) const EXPIRED_WITHOUT_REFRESH_MESSAGE: &str =
    "Token expired and no refresh token available. Please re-authenticate.";

/// Valid only while strictly more than the threshold remains.
pub fn needs_refresh(expires_at_ms: i64, now_ms: i64) -> bool {
    expires_at_ms.saturating_sub(now_ms) <= REFRESH_THRESHOLD_MS
}

pub struct TokenRefreshCoordinator {
    store: TokenStore,
    provider: Arc<dyn OAuthProvider>,
    flight: SingleFlight<AppResult<CredentialRecord>>,
}

impl TokenRefreshCoordinator {
    pub fn new(store: TokenStore, provider: Arc<dyn OAuthProvider>) -> Self {
        Self {
            store,
            provider,
            flight: SingleFlight::default(),
        }
    }

    pub async fn get_valid_access_token(&self) -> AppResult<String> {
        self.get_valid_access_token_at(now_unix_millis()).await
    }

    pub async fn get_valid_access_token_at(&self, now_ms: i64) -> AppResult<String> {
        let record = load_record(&self.store)
            .await?
            .ok_or_else(AppError::auth_required)?;

        if !needs_refresh(record.expires_at, now_ms) {
            return Ok(record.access_token);
        }
        if !record.has_refresh_token() {
            return Err(AppError::AuthRequired(
                EXPIRED_WITHOUT_REFRESH_MESSAGE.to_string(),
            ));
        }

        tracing::debug!(
            remaining_ms = record.millis_until_expiry(now_ms),
            "access token near expiry, refreshing"
        );
        Ok(self.refresh(&record.refresh_token).await?.access_token)
    }

    /// At most one refresh runs at a time; callers arriving meanwhile share its outcome.
    /// The new record is persisted before anyone observes it.
    pub async fn refresh(&self, refresh_token: &str) -> AppResult<CredentialRecord> {
        let provider = Arc::clone(&self.provider);
        let store = self.store.clone();
        let refresh_token = refresh_token.to_string();
        self.flight
            .run(move || perform_refresh(provider, store, refresh_token))
            .await
    }

    pub fn is_refreshing(&self) -> bool {
        self.flight.is_in_flight()
    }
}

async fn load_record(store: &TokenStore) -> AppResult<Option<CredentialRecord>> {
    let store = store.clone();
    blocking::run("token_store.load", move || Ok::<_, AppError>(store.load())).await
}

async fn perform_refresh(
    provider: Arc<dyn OAuthProvider>,
    store: TokenStore,
    refresh_token: String,
) -> AppResult<CredentialRecord> {
    let tokens = provider
        .refresh_token(&refresh_token)
        .await
        .map_err(|err| {
            tracing::warn!(provider = provider.name(), "token refresh failed: {}", err);
            AppError::RefreshFailure(err.message())
        })?;

    let previous_scope = load_record(&store)
        .await?
        .map(|record| record.scope)
        .unwrap_or_default();
    let record = CredentialRecord::from_token_set(
        tokens,
        now_unix_millis(),
        previous_scope,
        Some(&refresh_token),
    );

    let to_save = record.clone();
    let save_store = store.clone();
    blocking::run("token_store.save", move || save_store.save(&to_save))
        .await
        .map_err(|err| {
            tracing::error!("refreshed credentials could not be persisted: {}", err);
            AppError::RefreshFailure(format!("refreshed credentials not persisted: {}", err.message()))
        })?;

    tracing::info!(
        provider = provider.name(),
        expires_at = record.expires_at,
        "token refreshed"
    );
    Ok(record)
}
