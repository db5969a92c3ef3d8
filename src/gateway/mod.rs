//! Usage: Everything that talks to the provider over HTTP: OAuth, governed API calls, rate windows.

pub(crate) mod api_client;
pub(crate) mod oauth;
pub(crate) mod rate_limit;
