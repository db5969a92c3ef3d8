//! Usage: `OAuthProvider` trait - the seam between credential lifecycle logic and the provider's HTTP endpoints.
//!
//! The trait is object-safe so the session can hold `Arc<dyn OAuthProvider>` and tests can swap in fakes.

use crate::domain::credentials::EphemeralIdentity;
use crate::shared::error::AppResult;
use crate::shared::security::mask_token;
use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;

pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = AppResult<T>> + Send + 'a>>;

/// Token set returned from the token endpoint (code exchange or refresh grant).
#[derive(Clone, PartialEq, Eq)]
pub struct OAuthTokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Lifetime in seconds, as returned by the provider.
    pub expires_in: Option<i64>,
    pub scope: Option<BTreeSet<String>>,
    pub token_type: Option<String>,
}

impl std::fmt::Debug for OAuthTokenSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthTokenSet")
            .field("access_token", &mask_token(&self.access_token))
            .field(
                "refresh_token",
                &self.refresh_token.as_deref().map(mask_token),
            )
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .field("token_type", &self.token_type)
            .finish()
    }
}

/// Authorization-code grant input.
#[derive(Clone)]
pub struct TokenExchangeRequest {
    pub code: String,
    pub code_verifier: String,
    pub redirect_uri: String,
}

impl std::fmt::Debug for TokenExchangeRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenExchangeRequest")
            .field("redirect_uri", &self.redirect_uri)
            .finish_non_exhaustive()
    }
}

pub trait OAuthProvider: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn exchange_code<'a>(
        &'a self,
        request: &'a TokenExchangeRequest,
    ) -> ProviderFuture<'a, OAuthTokenSet>;

    fn refresh_token<'a>(&'a self, refresh_token: &'a str) -> ProviderFuture<'a, OAuthTokenSet>;

    /// Best-effort invalidation of an access token at the provider.
    fn revoke_token<'a>(&'a self, access_token: &'a str) -> ProviderFuture<'a, ()>;

    /// "Who am I" lookup; also serves as a cheap liveness check for a stored token.
    fn fetch_identity<'a>(&'a self, access_token: &'a str)
        -> ProviderFuture<'a, EphemeralIdentity>;
}
