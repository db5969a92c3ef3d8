//! Usage: Interactive PKCE authorization: present URL, await callback, exchange code, persist credentials.

use crate::domain::credentials::{scope_set, CredentialRecord};
use crate::gateway::oauth::callback_server::{bind_callback_listener, wait_for_callback};
use crate::gateway::oauth::pkce::PkceExchange;
use crate::gateway::oauth::provider_trait::{OAuthProvider, TokenExchangeRequest};
use crate::infra::config::{Config, REQUESTED_SCOPES};
use crate::infra::token_store::TokenStore;
use crate::shared::blocking;
use crate::shared::error::{AppError, AppResult};
use crate::shared::time::now_unix_millis;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shows the authorization URL to the user. Must not block.
pub type UrlPresenter = Arc<dyn Fn(&str) + Send + Sync>;

/// Prints the URL on stderr (stdout belongs to the host transport) and tries to open a browser
/// on the blocking pool.
pub fn browser_presenter() -> UrlPresenter {
    Arc::new(|url: &str| {
        eprintln!("[puck] Opening browser for authorization...");
        eprintln!("[puck] If the browser does not open, visit: {url}");
        let url = url.to_string();
        tokio::task::spawn_blocking(move || {
            if let Err(err) = open::that(&url) {
                tracing::warn!("could not open browser automatically: {}", err);
            }
        });
    })
}

#[derive(Debug, Default)]
pub(crate) struct AuthorizationFlow {
    in_progress: AtomicBool,
}

struct InProgressGuard<'a>(&'a AtomicBool);

impl Drop for InProgressGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl AuthorizationFlow {
    /// Runs one interactive attempt end to end and returns the persisted record.
    ///
    /// A second attempt while one is waiting for its callback fails fast with
    /// `AuthorizationInProgress`.
    pub(crate) async fn run(
        &self,
        config: &Config,
        provider: &dyn OAuthProvider,
        store: &TokenStore,
        presenter: &UrlPresenter,
    ) -> AppResult<CredentialRecord> {
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(AppError::AuthorizationInProgress);
        }
        let _guard = InProgressGuard(&self.in_progress);

        let address = config.callback_address();
        let bound = bind_callback_listener(&address).await?;
        let redirect_uri = if address.port == 0 {
            address.redirect_uri_for_port(bound.port())
        } else {
            config.redirect_uri.clone()
        };

        let exchange = PkceExchange::begin(
            &config.authorize_url,
            &config.client_id,
            &redirect_uri,
            REQUESTED_SCOPES,
        )?;
        tracing::info!(
            redirect_uri = %redirect_uri,
            "starting oauth authorization flow: {}",
            exchange.authorization_url
        );
        presenter(&exchange.authorization_url);

        let code = wait_for_callback(bound, &exchange.state, config.auth_timeout).await?;

        let tokens = provider
            .exchange_code(&TokenExchangeRequest {
                code,
                code_verifier: exchange.code_verifier,
                redirect_uri,
            })
            .await?;

        let record = CredentialRecord::from_token_set(
            tokens,
            now_unix_millis(),
            scope_set(REQUESTED_SCOPES.iter().copied()),
            None,
        );
        let to_save = record.clone();
        let store = store.clone();
        blocking::run("token_store.save", move || store.save(&to_save)).await?;

        tracing::info!(expires_at = record.expires_at, "oauth authorization completed");
        Ok(record)
    }
}
