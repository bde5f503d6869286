//! Token storage backends for the singleton X account token.
//!
//! Provides the [`TokenStorage`] trait and several implementations:
//! - [`FileTokenStorage`] - Stores the record as one JSON file (`tokens.json`)
//! - [`MemoryTokenStorage`] - In-memory storage for testing
//! - [`KeyringTokenStorage`] - System keyring storage (requires `system-keyring` feature)
//!
//! Backends implement the two primitives `load` and `store`; the record-level
//! operations (`save`, `get`, `update`) are provided on top of them so every
//! backend shares the same merge rules.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::instrument;

use super::OAuthError;
use super::token::{TokenRecord, TokenUpdate};

// =============================================================================
// TokenStorage trait
// =============================================================================

/// Trait for token storage backends.
///
/// All storage implementations must be thread-safe (`Send + Sync`). There is
/// no locking across `update`'s read-modify-write; concurrent writers race and
/// the last write wins.
pub trait TokenStorage: Send + Sync {
    /// Load the stored record, if any.
    fn load(&self) -> Result<Option<TokenRecord>, OAuthError>;

    /// Replace the stored record. Durable before returning.
    fn store(&self, record: &TokenRecord) -> Result<(), OAuthError>;

    /// Get the name of this storage backend.
    fn name(&self) -> &str;

    /// Overwrite the singleton with a fresh token set.
    fn save(
        &self,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_in_secs: i64,
    ) -> Result<TokenRecord, OAuthError> {
        let record = TokenRecord::new(
            access_token.to_string(),
            refresh_token.map(str::to_string),
            expires_in_secs,
        );
        self.store(&record)?;
        Ok(record)
    }

    /// Current record, or `None` when the account was never connected.
    fn get(&self) -> Result<Option<TokenRecord>, OAuthError> {
        self.load()
    }

    /// Merge a partial update into the existing record.
    ///
    /// Fails with [`OAuthError::NotAuthenticated`] when there is nothing to
    /// update.
    fn update(&self, update: TokenUpdate) -> Result<TokenRecord, OAuthError> {
        let current = self.load()?.ok_or(OAuthError::NotAuthenticated)?;
        let merged = current.merged(update);
        self.store(&merged)?;
        Ok(merged)
    }
}

// Blanket implementation for Arc<T>
impl<T: TokenStorage + ?Sized> TokenStorage for Arc<T> {
    fn load(&self) -> Result<Option<TokenRecord>, OAuthError> {
        (**self).load()
    }
    fn store(&self, record: &TokenRecord) -> Result<(), OAuthError> {
        (**self).store(record)
    }
    fn name(&self) -> &str {
        (**self).name()
    }
}

// Blanket implementation for Box<T>
impl<T: TokenStorage + ?Sized> TokenStorage for Box<T> {
    fn load(&self) -> Result<Option<TokenRecord>, OAuthError> {
        (**self).load()
    }
    fn store(&self, record: &TokenRecord) -> Result<(), OAuthError> {
        (**self).store(record)
    }
    fn name(&self) -> &str {
        (**self).name()
    }
}

// =============================================================================
// Durable file writes
// =============================================================================

/// File permissions for credential files (Unix only): owner read/write.
#[cfg(unix)]
const FILE_MODE: u32 = 0o600;

/// Directory permissions (Unix only): owner read/write/execute.
#[cfg(unix)]
const DIR_MODE: u32 = 0o700;

/// Create `dir` (0700 on Unix) if it does not exist yet.
pub(crate) fn ensure_dir(dir: &Path) -> Result<(), OAuthError> {
    if dir.as_os_str().is_empty() || dir.exists() {
        return Ok(());
    }
    std::fs::create_dir_all(dir).map_err(|e| {
        OAuthError::Storage(format!(
            "Failed to create directory '{}': {}",
            dir.display(),
            e
        ))
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(DIR_MODE);
        std::fs::set_permissions(dir, perms).map_err(|e| {
            OAuthError::Storage(format!(
                "Failed to set directory permissions on '{}': {}",
                dir.display(),
                e
            ))
        })?;
    }
    Ok(())
}

/// Replace `path` with `content` via temp file + fsync + rename.
///
/// A crash leaves either the old or the new document, never a torn one.
pub(crate) fn write_atomic(path: &Path, content: &str) -> Result<(), OAuthError> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }

    // On Unix, set 0600 at creation time so the file is never world-readable.
    let temp_path = path.with_extension("tmp");

    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(FILE_MODE)
            .open(&temp_path)
            .map_err(|e| {
                OAuthError::Storage(format!(
                    "Failed to create temp file '{}': {}",
                    temp_path.display(),
                    e
                ))
            })?;
        file.write_all(content.as_bytes()).map_err(|e| {
            OAuthError::Storage(format!(
                "Failed to write temp file '{}': {}",
                temp_path.display(),
                e
            ))
        })?;
        file.sync_all().map_err(|e| {
            OAuthError::Storage(format!(
                "Failed to sync temp file '{}': {}",
                temp_path.display(),
                e
            ))
        })?;
    }

    #[cfg(not(unix))]
    {
        std::fs::write(&temp_path, content).map_err(|e| {
            OAuthError::Storage(format!(
                "Failed to write temp file '{}': {}",
                temp_path.display(),
                e
            ))
        })?;
    }

    if let Err(e) = std::fs::rename(&temp_path, path) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(OAuthError::Storage(format!(
            "Failed to rename '{}' to '{}': {}",
            temp_path.display(),
            path.display(),
            e
        )));
    }

    Ok(())
}

/// Read a file, mapping "not found" to `None`.
pub(crate) fn read_optional(path: &Path) -> Result<Option<String>, OAuthError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(OAuthError::Storage(format!(
            "Failed to read '{}': {}",
            path.display(),
            e
        ))),
    }
}

// =============================================================================
// FileTokenStorage
// =============================================================================

/// File name of the token document inside the data directory.
pub const TOKEN_FILE: &str = "tokens.json";

/// File-based token storage.
///
/// Stores the record as `{access_token, refresh_token, expires_at}` in
/// `{dir}/tokens.json`.
///
/// # Security
/// - File permissions are set to 0600 (owner read/write only) on Unix
/// - Parent directories are created with 0700 permissions
#[derive(Debug, Clone)]
pub struct FileTokenStorage {
    path: PathBuf,
}

impl FileTokenStorage {
    /// Create a FileTokenStorage rooted at `dir`.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(TOKEN_FILE),
        }
    }

    /// Path of the token document.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStorage for FileTokenStorage {
    #[instrument(skip(self))]
    fn load(&self) -> Result<Option<TokenRecord>, OAuthError> {
        let Some(content) = read_optional(&self.path)? else {
            return Ok(None);
        };

        if content.trim().is_empty() {
            return Ok(None);
        }

        let record: TokenRecord = serde_json::from_str(&content).map_err(|e| {
            OAuthError::Storage(format!(
                "Failed to parse token file '{}': {}",
                self.path.display(),
                e
            ))
        })?;

        Ok(Some(record))
    }

    #[instrument(skip(self, record))]
    fn store(&self, record: &TokenRecord) -> Result<(), OAuthError> {
        let content = serde_json::to_string_pretty(record)
            .map_err(|e| OAuthError::Storage(format!("Failed to serialize token: {}", e)))?;
        write_atomic(&self.path, &content)
    }

    fn name(&self) -> &str {
        "file"
    }
}

// =============================================================================
// KeyringTokenStorage
// =============================================================================

/// Keyring-based token storage.
///
/// Uses the system's native credential store. The record is serialized to
/// JSON under one entry.
///
/// Feature-gated behind `system-keyring`.
#[cfg(feature = "system-keyring")]
#[derive(Debug, Clone)]
pub struct KeyringTokenStorage {
    service: String,
}

#[cfg(feature = "system-keyring")]
impl Default for KeyringTokenStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "system-keyring")]
impl KeyringTokenStorage {
    const SERVICE_NAME: &str = "xreply";
    const ENTRY_NAME: &str = "x-account";

    /// Create a KeyringTokenStorage with the default service name.
    pub fn new() -> Self {
        Self {
            service: Self::SERVICE_NAME.to_string(),
        }
    }

    /// Create a KeyringTokenStorage with a custom service name.
    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self) -> Result<keyring::Entry, OAuthError> {
        keyring::Entry::new(&self.service, Self::ENTRY_NAME)
            .map_err(|e| OAuthError::Storage(format!("Failed to create keyring entry: {}", e)))
    }
}

#[cfg(feature = "system-keyring")]
impl TokenStorage for KeyringTokenStorage {
    #[instrument(skip(self))]
    fn load(&self) -> Result<Option<TokenRecord>, OAuthError> {
        match self.entry()?.get_password() {
            Ok(password) => {
                let record: TokenRecord = serde_json::from_str(&password).map_err(|e| {
                    OAuthError::Storage(format!("Failed to parse token from keyring: {}", e))
                })?;
                Ok(Some(record))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(OAuthError::Storage(format!("Keyring error: {}", e))),
        }
    }

    #[instrument(skip(self, record))]
    fn store(&self, record: &TokenRecord) -> Result<(), OAuthError> {
        let json = serde_json::to_string(record)
            .map_err(|e| OAuthError::Storage(format!("Failed to serialize token: {}", e)))?;
        self.entry()?
            .set_password(&json)
            .map_err(|e| OAuthError::Storage(format!("Keyring error: {}", e)))
    }

    fn name(&self) -> &str {
        "keyring"
    }
}

// =============================================================================
// MemoryTokenStorage
// =============================================================================

/// In-memory token storage.
///
/// Clones share the same slot, so a test can hand one clone to the manager
/// and inspect the other.
#[derive(Debug, Clone, Default)]
pub struct MemoryTokenStorage {
    inner: Arc<RwLock<Option<TokenRecord>>>,
}

impl MemoryTokenStorage {
    /// Create a new empty MemoryTokenStorage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a MemoryTokenStorage holding an initial record.
    pub fn with_token(record: TokenRecord) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Some(record))),
        }
    }

    fn poisoned() -> OAuthError {
        OAuthError::Storage("token store lock poisoned".to_string())
    }
}

impl TokenStorage for MemoryTokenStorage {
    #[instrument(skip(self))]
    fn load(&self) -> Result<Option<TokenRecord>, OAuthError> {
        let guard = self.inner.read().map_err(|_| Self::poisoned())?;
        Ok(guard.clone())
    }

    #[instrument(skip(self, record))]
    fn store(&self, record: &TokenRecord) -> Result<(), OAuthError> {
        let mut guard = self.inner.write().map_err(|_| Self::poisoned())?;
        *guard = Some(record.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
