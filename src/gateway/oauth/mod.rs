//! Usage: OAuth 2.0 PKCE login, token exchange/refresh, and the provider adapter seam.
//!
//! `OAuthProvider` is the only thing that knows endpoint shapes; flow and refresh logic stay
//! provider-agnostic and are driven through `Arc<dyn OAuthProvider>`.

pub(crate) mod adapters;
pub(crate) mod callback_server;
pub(crate) mod flow;
pub(crate) mod pkce;
pub(crate) mod provider_trait;
pub(crate) mod refresh;
pub(crate) mod token_exchange;
