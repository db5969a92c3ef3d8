//! Usage: X (api.x.com) OAuth 2.0 adapter.
//!
//! Specializations:
//! - Public PKCE client: `client_id` travels in the form body, no secret
//! - Revocation via `/2/oauth2/revoke` with `token_type_hint=access_token`
//! - Identity via `/2/users/me` (`data.id`, `data.username`)
//!
//! Every call goes through `ApiClient`, so token and identity endpoints are rate governed too.

use crate::domain::credentials::EphemeralIdentity;
use crate::gateway::api_client::{ApiClient, RequestBody};
use crate::gateway::oauth::provider_trait::{
    OAuthProvider, OAuthTokenSet, ProviderFuture, TokenExchangeRequest,
};
use crate::gateway::oauth::token_exchange::{
    authorization_code_form, parse_token_body, refresh_token_form, revoke_form,
};
use crate::shared::error::{AppError, AppResult};
use reqwest::Method;
use serde::Deserialize;

pub(crate) const TOKEN_PATH: &str = "/2/oauth2/token";
pub(crate) const REVOKE_PATH: &str = "/2/oauth2/revoke";
pub(crate) const USERS_ME_PATH: &str = "/2/users/me";

pub struct XOAuthProvider {
    client_id: String,
    api: ApiClient,
}

impl XOAuthProvider {
    pub fn new(client_id: impl Into<String>, api: ApiClient) -> Self {
        Self {
            client_id: client_id.into(),
            api,
        }
    }

    async fn token_grant(&self, form: Vec<(&'static str, String)>) -> AppResult<OAuthTokenSet> {
        let response = self
            .api
            .send(Method::POST, TOKEN_PATH, None, RequestBody::Form(form))
            .await?;
        parse_token_body(response.status, &response.body)
    }
}

#[derive(Debug, Deserialize)]
struct UsersMeEnvelope {
    data: Option<UsersMeData>,
}

#[derive(Debug, Deserialize)]
struct UsersMeData {
    id: String,
    username: String,
}

pub(crate) fn parse_identity(body: &str) -> AppResult<EphemeralIdentity> {
    let envelope: UsersMeEnvelope = serde_json::from_str(body)
        .map_err(|e| AppError::provider(None, format!("users/me response json invalid: {e}")))?;
    let data = envelope
        .data
        .ok_or_else(|| AppError::provider(None, "users/me response missing data"))?;
    Ok(EphemeralIdentity {
        user_id: data.id,
        username: data.username,
    })
}

impl OAuthProvider for XOAuthProvider {
    fn name(&self) -> &'static str {
        "x"
    }

    fn exchange_code<'a>(
        &'a self,
        request: &'a TokenExchangeRequest,
    ) -> ProviderFuture<'a, OAuthTokenSet> {
        Box::pin(async move {
            self.token_grant(authorization_code_form(&self.client_id, request))
                .await
        })
    }

    fn refresh_token<'a>(&'a self, refresh_token: &'a str) -> ProviderFuture<'a, OAuthTokenSet> {
        Box::pin(async move {
            self.token_grant(refresh_token_form(&self.client_id, refresh_token))
                .await
        })
    }

    fn revoke_token<'a>(&'a self, access_token: &'a str) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            let form = revoke_form(&self.client_id, access_token);
            self.api
                .send(Method::POST, REVOKE_PATH, None, RequestBody::Form(form))
                .await?
                .error_for_status()?;
            Ok(())
        })
    }

    fn fetch_identity<'a>(
        &'a self,
        access_token: &'a str,
    ) -> ProviderFuture<'a, EphemeralIdentity> {
        Box::pin(async move {
            let response = self
                .api
                .send(
                    Method::GET,
                    USERS_ME_PATH,
                    Some(access_token),
                    RequestBody::Empty,
                )
                .await?
                .error_for_status()?;
            parse_identity(&response.body)
        })
    }
}
