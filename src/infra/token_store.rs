//! Usage: Encrypted, atomically written persistence of the single credential record.
//!
//! File content is the sealed form produced by `infra::cipher` (never plaintext JSON).

use crate::domain::credentials::CredentialRecord;
use crate::infra::cipher::{self, SealingKey};
use crate::shared::error::{AppError, AppResult};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

#[cfg(unix)]
const PRIVATE_DIR_MODE: u32 = 0o700;
#[cfg(unix)]
const PRIVATE_FILE_MODE: u32 = 0o600;

/// Distinguishes concurrent writers within one process.
static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Clone)]
pub struct TokenStore {
    inner: Arc<Inner>,
}

struct Inner {
    path: PathBuf,
    key_material: String,
    key: OnceLock<AppResult<SealingKey>>,
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore")
            .field("path", &self.inner.path)
            .finish_non_exhaustive()
    }
}

impl TokenStore {
    /// Store keyed to the current OS user and host.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_key_material(path, cipher::machine_key_material())
    }

    pub fn with_key_material(path: impl Into<PathBuf>, key_material: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                path: path.into(),
                key_material: key_material.into(),
                key: OnceLock::new(),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    // Argon2 is deliberately slow; derive once per store.
    fn key(&self) -> AppResult<&SealingKey> {
        self.inner
            .key
            .get_or_init(|| SealingKey::derive(&self.inner.key_material))
            .as_ref()
            .map_err(Clone::clone)
    }

    /// Replaces the stored record. Readers observe either the previous file or the new one.
    pub fn save(&self, record: &CredentialRecord) -> AppResult<()> {
        let path = self.path();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            ensure_private_dir(parent)?;
        }

        let json = zeroize::Zeroizing::new(
            serde_json::to_vec(record)
                .map_err(|e| format!("SYSTEM_ERROR: failed to serialize credentials: {e}"))?,
        );
        let sealed = cipher::seal(self.key()?, &json)?;

        let file_name = path
            .file_name()
            .and_then(|v| v.to_str())
            .unwrap_or("tokens.json");
        let tmp_path = path.with_file_name(format!(
            "{file_name}.tmp.{}.{}",
            std::process::id(),
            TMP_SEQ.fetch_add(1, Ordering::Relaxed)
        ));

        if let Err(err) = write_private_file(&tmp_path, sealed.as_bytes()) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(err);
        }

        if let Err(e) = std::fs::rename(&tmp_path, path) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(format!(
                "SYSTEM_ERROR: failed to finalize credential file {}: {e}",
                path.display()
            )
            .into());
        }

        tracing::debug!(path = %path.display(), "credentials saved");
        Ok(())
    }

    /// Absent, unreadable, undecryptable or unparsable storage all read as "no credential".
    pub fn load(&self) -> Option<CredentialRecord> {
        match self.try_load() {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!(
                    path = %self.path().display(),
                    "failed to load stored credentials, treating as absent: {}",
                    err
                );
                None
            }
        }
    }

    pub fn try_load(&self) -> AppResult<Option<CredentialRecord>> {
        let path = self.path();
        let sealed = match std::fs::read_to_string(path) {
            Ok(v) => v,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(AppError::StorageCorrupted(format!(
                    "failed to read {}: {e}",
                    path.display()
                )))
            }
        };

        let plaintext = cipher::open(self.key()?, &sealed)?;
        serde_json::from_slice::<CredentialRecord>(&plaintext)
            .map(Some)
            .map_err(|e| AppError::StorageCorrupted(format!("invalid credential payload: {e}")))
    }

    /// Removes the stored record; clearing an empty store is not an error.
    pub fn clear(&self) -> AppResult<()> {
        match std::fs::remove_file(self.path()) {
            Ok(()) => {
                tracing::debug!(path = %self.path().display(), "credentials cleared");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(format!(
                "SYSTEM_ERROR: failed to remove credential file {}: {e}",
                self.path().display()
            )
            .into()),
        }
    }
}

/// Creates `dir` (and parents) readable by the owner only.
pub(crate) fn ensure_private_dir(dir: &Path) -> AppResult<()> {
    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(PRIVATE_DIR_MODE);
    }
    builder
        .create(dir)
        .map_err(|e| format!("SYSTEM_ERROR: failed to create dir {}: {e}", dir.display()))?;
    Ok(())
}

fn write_private_file(path: &Path, bytes: &[u8]) -> AppResult<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(PRIVATE_FILE_MODE);
    }

    let mut file = options
        .open(path)
        .map_err(|e| format!("SYSTEM_ERROR: failed to open temp file {}: {e}", path.display()))?;
    file.write_all(bytes)
        .and_then(|()| file.sync_all())
        .map_err(|e| format!("SYSTEM_ERROR: failed to write temp file {}: {e}", path.display()))?;
    Ok(())
}
