mod support;

use std::time::Duration;

use puck_lib::{ApiTier, Config};
use support::{env_lock, EnvRestore};

const KEYS: &[&str] = &[
    "PUCK_CLIENT_ID",
    "PUCK_REDIRECT_URI",
    "PUCK_TOKEN_PATH",
    "PUCK_API_TIER",
    "PUCK_LOG_LEVEL",
    "PUCK_API_BASE_URL",
    "PUCK_AUTHORIZE_URL",
    "PUCK_AUTH_TIMEOUT_SECS",
];

fn clean_env() -> EnvRestore {
    let mut env = EnvRestore::default();
    for key in KEYS {
        env.remove_var(key);
    }
    env
}

#[test]
fn from_env_requires_client_id() {
    let _lock = env_lock();
    let _env = clean_env();

    let err = Config::from_env().expect_err("client id missing");

    assert_eq!(err.code(), "CONFIG_MISSING");
    assert!(err.message().contains("PUCK_CLIENT_ID"));
    let tool = err.to_tool_error();
    assert_eq!(tool.error, "config_missing");
}

#[test]
fn from_env_reads_overrides() {
    let _lock = env_lock();
    let mut env = clean_env();
    let dir = tempfile::tempdir().expect("tempdir");
    let token_path = dir.path().join("nested").join("tokens.json");

    env.set_var("PUCK_CLIENT_ID", "client-from-env");
    env.set_var("PUCK_REDIRECT_URI", "http://localhost:4567/cb");
    env.set_var("PUCK_TOKEN_PATH", token_path.as_os_str());
    env.set_var("PUCK_API_TIER", "enterprise");
    env.set_var("PUCK_LOG_LEVEL", "debug");
    env.set_var("PUCK_AUTH_TIMEOUT_SECS", "30");

    let config = Config::from_env().expect("config");

    assert_eq!(config.client_id, "client-from-env");
    assert_eq!(config.redirect_uri, "http://localhost:4567/cb");
    assert_eq!(config.token_path, token_path);
    assert_eq!(config.token_dir(), dir.path().join("nested"));
    assert_eq!(config.api_tier, ApiTier::Enterprise);
    assert_eq!(config.log_level, "debug");
    assert_eq!(config.auth_timeout, Duration::from_secs(30));

    let address = config.callback_address();
    assert_eq!(address.host, "localhost");
    assert_eq!(address.port, 4567);
    assert_eq!(address.path, "/cb");
}
