//! Puck credential & rate-governance core: OAuth 2.0 PKCE login against X, encrypted token
//! storage, single-flight refresh, and per-endpoint rate-limit bookkeeping.

mod app;
mod commands;
mod domain;
mod gateway;
mod infra;
mod shared;

pub use app::logging::{init as init_logging, LoggingGuard};
pub use app::session::{Session, SessionState};
pub use commands::auth::{
    auth_logout, auth_status, rate_status, AuthStatus, LogoutResult, RateStatusReport,
    NO_RATE_DATA_MESSAGE,
};
pub use domain::credentials::{CredentialRecord, EphemeralIdentity};
pub use gateway::api_client::ApiClient;
pub use gateway::oauth::adapters::x::XOAuthProvider;
pub use gateway::oauth::flow::{browser_presenter, UrlPresenter};
pub use gateway::oauth::provider_trait::{
    OAuthProvider, OAuthTokenSet, ProviderFuture, TokenExchangeRequest,
};
pub use gateway::oauth::refresh::{needs_refresh, TokenRefreshCoordinator, REFRESH_THRESHOLD_MS};
pub use gateway::rate_limit::{
    normalize_endpoint, RateLimitGovernor, RateLimitStatus, RateLimitWindow,
};
pub use infra::config::{ApiTier, CallbackAddress, Config, REQUESTED_SCOPES};
pub use infra::token_store::TokenStore;
pub use shared::error::{AppError, AppResult, ToolError};
