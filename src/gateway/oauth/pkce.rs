//! Usage: PKCE verifier/challenge, CSRF state nonce, and the per-attempt authorization URL.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use reqwest::Url;
use sha2::{Digest, Sha256};

const VERIFIER_ENTROPY_BYTES: usize = 64;
const STATE_ENTROPY_BYTES: usize = 32;

#[derive(Debug, Clone)]
pub(crate) struct PkcePair {
    pub(crate) code_verifier: String,
    pub(crate) code_challenge: String,
}

pub(crate) fn generate_pkce_pair() -> PkcePair {
    let code_verifier = random_urlsafe(VERIFIER_ENTROPY_BYTES);
    let code_challenge = code_challenge_s256(&code_verifier);

    PkcePair {
        code_verifier,
        code_challenge,
    }
}

pub(crate) fn code_challenge_s256(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

pub(crate) fn generate_state() -> String {
    random_urlsafe(STATE_ENTROPY_BYTES)
}

fn random_urlsafe(len: usize) -> String {
    let mut random = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut random);
    URL_SAFE_NO_PAD.encode(random)
}

/// Per-attempt secrets; lives only for one interactive flow and is never persisted.
pub(crate) struct PkceExchange {
    pub(crate) code_verifier: String,
    pub(crate) state: String,
    pub(crate) authorization_url: String,
}

impl std::fmt::Debug for PkceExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkceExchange")
            .field("authorization_url", &self.authorization_url)
            .finish_non_exhaustive()
    }
}

impl PkceExchange {
    pub(crate) fn begin(
        authorize_url: &str,
        client_id: &str,
        redirect_uri: &str,
        scopes: &[&str],
    ) -> Result<Self, String> {
        let pkce = generate_pkce_pair();
        let state = generate_state();

        let mut url = Url::parse(authorize_url.trim())
            .map_err(|e| format!("CONFIG_INVALID: invalid authorize url {authorize_url}: {e}"))?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", &scopes.join(" "))
            .append_pair("state", &state)
            .append_pair("code_challenge", &pkce.code_challenge)
            .append_pair("code_challenge_method", "S256");

        Ok(Self {
            code_verifier: pkce.code_verifier,
            state,
            authorization_url: url.to_string(),
        })
    }
}
