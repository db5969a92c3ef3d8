//! Usage: Machine-bound key derivation (Argon2id) and AEAD sealing (ChaCha20-Poly1305) for secrets at rest.
//!
//! Sealed form: `<nonceHex>:<cipherHex>`, a fresh 12-byte nonce per seal.

use crate::shared::error::{AppError, AppResult};
use argon2::Argon2;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use zeroize::Zeroizing;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const KDF_SALT: &[u8] = b"puck-token-store-v1";

/// Symmetric key derived from stable machine/account material; wiped on drop.
pub(crate) struct SealingKey {
    bytes: Zeroizing<[u8; KEY_LEN]>,
}

impl std::fmt::Debug for SealingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SealingKey").finish_non_exhaustive()
    }
}

impl SealingKey {
    /// Slow, salted derivation; the same material always yields the same key.
    pub(crate) fn derive(material: &str) -> AppResult<Self> {
        let mut bytes = Zeroizing::new([0u8; KEY_LEN]);
        Argon2::default()
            .hash_password_into(material.as_bytes(), KDF_SALT, &mut bytes[..])
            .map_err(|e| format!("SYSTEM_ERROR: token key derivation failed: {e}"))?;
        Ok(Self { bytes })
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(Key::from_slice(&self.bytes[..]))
    }
}

/// `puck-<os user>-<host name>`: reproducible across runs, never written anywhere.
pub(crate) fn machine_key_material() -> String {
    let user = ["USER", "USERNAME"]
        .iter()
        .filter_map(|key| std::env::var(key).ok())
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
        .unwrap_or_else(|| "default".to_string());
    let host = hostname::get()
        .ok()
        .map(|h| h.to_string_lossy().into_owned())
        .filter(|h| !h.trim().is_empty())
        .unwrap_or_else(|| "localhost".to_string());
    format!("puck-{user}-{host}")
}

pub(crate) fn seal(key: &SealingKey, plaintext: &[u8]) -> AppResult<String> {
    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);

    let ciphertext = key
        .cipher()
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| AppError::new("SYSTEM_ERROR", "token encryption failed"))?;

    Ok(format!("{}:{}", hex::encode(nonce), hex::encode(ciphertext)))
}

/// Any malformed, truncated, tampered or foreign-key payload is `StorageCorrupted`.
pub(crate) fn open(key: &SealingKey, sealed: &str) -> AppResult<Zeroizing<Vec<u8>>> {
    let (nonce_hex, cipher_hex) = sealed
        .trim()
        .split_once(':')
        .ok_or_else(|| AppError::StorageCorrupted("missing nonce separator".to_string()))?;

    let nonce = hex::decode(nonce_hex)
        .map_err(|e| AppError::StorageCorrupted(format!("nonce is not hex: {e}")))?;
    if nonce.len() != NONCE_LEN {
        return Err(AppError::StorageCorrupted(format!(
            "nonce must be {NONCE_LEN} bytes, got {}",
            nonce.len()
        )));
    }
    let ciphertext = hex::decode(cipher_hex)
        .map_err(|e| AppError::StorageCorrupted(format!("payload is not hex: {e}")))?;

    key.cipher()
        .decrypt(Nonce::from_slice(&nonce), ciphertext.as_slice())
        .map(Zeroizing::new)
        .map_err(|_| AppError::StorageCorrupted("payload failed authentication".to_string()))
}
