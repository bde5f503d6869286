//! Pending-authorization store.
//!
//! Between the redirect to X's consent screen and the callback, the PKCE
//! verifier is parked under its `state` token. Records are one-shot: every
//! [`PendingStore::consume`] removes the record, and records older than
//! [`PENDING_TTL_MS`] are treated as absent.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{instrument, warn};

use super::OAuthError;
use super::storage::{read_optional, write_atomic};
use super::token::now_millis;
use crate::db::Database;

/// Pending authorizations expire ten minutes after creation.
pub const PENDING_TTL_MS: i64 = 10 * 60 * 1000;

/// File name of the pending-authorization document inside the data directory.
pub const PENDING_FILE: &str = "pkce-state.json";

/// A started but not yet completed authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAuthorization {
    pub state: String,
    pub code_verifier: String,
    /// Creation instant, Unix milliseconds.
    pub created_at: i64,
}

impl PendingAuthorization {
    /// A record created now.
    pub fn new(state: impl Into<String>, code_verifier: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            code_verifier: code_verifier.into(),
            created_at: now_millis(),
        }
    }

    /// True when the record is older than [`PENDING_TTL_MS`] at `now`.
    pub fn is_expired_at(&self, now: i64) -> bool {
        now - self.created_at > PENDING_TTL_MS
    }
}

// =============================================================================
// PendingStore trait
// =============================================================================

/// Durable map from state token to PKCE verifier.
///
/// Writes are durable before returning. A second `put` for the same state
/// replaces the first.
pub trait PendingStore: Send + Sync {
    /// Insert or replace a record.
    fn put_record(&self, record: PendingAuthorization) -> Result<(), OAuthError>;

    /// Remove the record for `state` and return its verifier.
    ///
    /// Returns `None` when the state is unknown or expired. Either way the
    /// record is gone afterwards.
    fn consume(&self, state: &str) -> Result<Option<String>, OAuthError>;

    /// Get the name of this storage backend.
    fn name(&self) -> &str;

    /// Record a new pending authorization created now.
    fn put(&self, state: &str, code_verifier: &str) -> Result<(), OAuthError> {
        self.put_record(PendingAuthorization::new(state, code_verifier))
    }
}

impl<T: PendingStore + ?Sized> PendingStore for Arc<T> {
    fn put_record(&self, record: PendingAuthorization) -> Result<(), OAuthError> {
        (**self).put_record(record)
    }
    fn consume(&self, state: &str) -> Result<Option<String>, OAuthError> {
        (**self).consume(state)
    }
    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Shared consume rule: a present but expired record yields `None`.
fn live_verifier(record: Option<PendingAuthorization>, state: &str) -> Option<String> {
    let record = record?;
    if record.is_expired_at(now_millis()) {
        warn!(state_prefix = %prefix(state), "Pending authorization expired");
        return None;
    }
    Some(record.code_verifier)
}

fn prefix(state: &str) -> &str {
    state.get(..8).unwrap_or(state)
}

// =============================================================================
// FilePendingStore
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct PendingEntry {
    code_verifier: String,
    #[serde(alias = "createdAt")]
    created_at: i64,
}

/// File-backed store: one JSON object keyed by state in `{dir}/pkce-state.json`.
///
/// An unreadable or corrupt document is treated as empty and overwritten on
/// the next write.
#[derive(Debug, Clone)]
pub struct FilePendingStore {
    path: PathBuf,
}

impl FilePendingStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(PENDING_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<HashMap<String, PendingEntry>, OAuthError> {
        let Some(content) = read_optional(&self.path)? else {
            return Ok(HashMap::new());
        };
        if content.trim().is_empty() {
            return Ok(HashMap::new());
        }
        match serde_json::from_str(&content) {
            Ok(map) => Ok(map),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Discarding corrupt pending-authorization file");
                Ok(HashMap::new())
            }
        }
    }

    fn write_all(&self, entries: &HashMap<String, PendingEntry>) -> Result<(), OAuthError> {
        let content = serde_json::to_string(entries).map_err(|e| {
            OAuthError::Storage(format!("Failed to serialize pending authorizations: {}", e))
        })?;
        write_atomic(&self.path, &content)
    }
}

impl PendingStore for FilePendingStore {
    #[instrument(skip(self, record))]
    fn put_record(&self, record: PendingAuthorization) -> Result<(), OAuthError> {
        let mut entries = self.read_all()?;
        let now = now_millis();
        entries.retain(|_, e| now - e.created_at <= PENDING_TTL_MS);
        entries.insert(
            record.state,
            PendingEntry {
                code_verifier: record.code_verifier,
                created_at: record.created_at,
            },
        );
        self.write_all(&entries)
    }

    #[instrument(skip(self, state))]
    fn consume(&self, state: &str) -> Result<Option<String>, OAuthError> {
        let mut entries = self.read_all()?;
        let Some(entry) = entries.remove(state) else {
            return Ok(None);
        };
        self.write_all(&entries)?;
        Ok(live_verifier(
            Some(PendingAuthorization {
                state: state.to_string(),
                code_verifier: entry.code_verifier,
                created_at: entry.created_at,
            }),
            state,
        ))
    }

    fn name(&self) -> &str {
        "file"
    }
}

// =============================================================================
// SqlitePendingStore
// =============================================================================

/// SQLite-backed store using the `oauth_state` table.
#[derive(Debug, Clone)]
pub struct SqlitePendingStore {
    db: Database,
}

impl SqlitePendingStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Delete records past their TTL. Returns the number removed.
    pub fn cleanup_expired(&self) -> Result<u64, OAuthError> {
        let cutoff = now_millis() - PENDING_TTL_MS;
        self.db
            .with_conn(|conn| {
                let deleted =
                    conn.execute("DELETE FROM oauth_state WHERE created_at < ?1", [cutoff])?;
                Ok(deleted as u64)
            })
            .map_err(|e| OAuthError::Storage(format!("Failed to clean up expired states: {}", e)))
    }
}

impl PendingStore for SqlitePendingStore {
    #[instrument(skip(self, record))]
    fn put_record(&self, record: PendingAuthorization) -> Result<(), OAuthError> {
        self.cleanup_expired()?;
        self.db
            .with_conn(|conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO oauth_state (state_token, code_verifier, created_at) \
                     VALUES (?1, ?2, ?3)",
                    rusqlite::params![record.state, record.code_verifier, record.created_at],
                )?;
                Ok(())
            })
            .map_err(|e| OAuthError::Storage(format!("Failed to store OAuth state: {}", e)))
    }

    #[instrument(skip(self, state))]
    fn consume(&self, state: &str) -> Result<Option<String>, OAuthError> {
        let record = self
            .db
            .with_conn(|conn| {
                let result = conn.query_row(
                    "SELECT code_verifier, created_at FROM oauth_state WHERE state_token = ?1",
                    [state],
                    |row| {
                        Ok(PendingAuthorization {
                            state: state.to_string(),
                            code_verifier: row.get(0)?,
                            created_at: row.get(1)?,
                        })
                    },
                );

                match result {
                    Ok(record) => {
                        // Single-use, expired or not.
                        conn.execute("DELETE FROM oauth_state WHERE state_token = ?1", [state])?;
                        Ok(Some(record))
                    }
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e),
                }
            })
            .map_err(|e| OAuthError::Storage(format!("Database error: {}", e)))?;

        Ok(live_verifier(record, state))
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

// =============================================================================
// MemoryPendingStore
// =============================================================================

/// In-memory store for tests and ephemeral runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryPendingStore {
    inner: Arc<RwLock<HashMap<String, PendingAuthorization>>>,
}

impl MemoryPendingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently held, expired ones included.
    pub fn len(&self) -> usize {
        self.inner.read().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn poisoned() -> OAuthError {
        OAuthError::Storage("pending store lock poisoned".to_string())
    }
}

impl PendingStore for MemoryPendingStore {
    fn put_record(&self, record: PendingAuthorization) -> Result<(), OAuthError> {
        let mut guard = self.inner.write().map_err(|_| Self::poisoned())?;
        guard.insert(record.state.clone(), record);
        Ok(())
    }

    fn consume(&self, state: &str) -> Result<Option<String>, OAuthError> {
        let record = self
            .inner
            .write()
            .map_err(|_| Self::poisoned())?
            .remove(state);
        Ok(live_verifier(record, state))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stale(state: &str, verifier: &str) -> PendingAuthorization {
        PendingAuthorization {
            state: state.into(),
            code_verifier: verifier.into(),
            created_at: now_millis() - PENDING_TTL_MS - 1_000,
        }
    }

    /// Behaviour every backend must share.
    fn exercise(store: &dyn PendingStore) {
        store.put("s1", "v1").unwrap();
        assert_eq!(store.consume("s1").unwrap().as_deref(), Some("v1"));
        assert_eq!(store.consume("s1").unwrap(), None, "consume is one-shot");

        assert_eq!(store.consume("never-stored").unwrap(), None);

        store.put("s2", "first").unwrap();
        store.put("s2", "second").unwrap();
        assert_eq!(store.consume("s2").unwrap().as_deref(), Some("second"));

        store.put_record(stale("s3", "v3")).unwrap();
        assert_eq!(store.consume("s3").unwrap(), None, "expired record is absent");
        assert_eq!(store.consume("s3").unwrap(), None);

        store.put("a", "va").unwrap();
        store.put("b", "vb").unwrap();
        assert_eq!(store.consume("b").unwrap().as_deref(), Some("vb"));
        assert_eq!(store.consume("a").unwrap().as_deref(), Some("va"));
    }

    #[test]
    fn test_expiry_boundary() {
        let now = now_millis();
        let mut record = PendingAuthorization::new("s", "v");
        record.created_at = now - PENDING_TTL_MS;
        assert!(!record.is_expired_at(now));
        record.created_at = now - PENDING_TTL_MS - 1;
        assert!(record.is_expired_at(now));
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryPendingStore::new();
        exercise(&store);
        assert!(store.is_empty());
        assert_eq!(store.name(), "memory");
    }

    #[test]
    fn test_memory_expired_record_is_deleted() {
        let store = MemoryPendingStore::new();
        store.put_record(stale("old", "v")).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.consume("old").unwrap(), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePendingStore::new(dir.path());
        exercise(&store);
        assert_eq!(store.name(), "file");
    }

    #[test]
    fn test_file_store_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        FilePendingStore::new(dir.path()).put("s", "v").unwrap();

        let reopened = FilePendingStore::new(dir.path());
        assert_eq!(reopened.consume("s").unwrap().as_deref(), Some("v"));
        assert_eq!(
            FilePendingStore::new(dir.path()).consume("s").unwrap(),
            None
        );
    }

    #[test]
    fn test_file_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePendingStore::new(dir.path());
        store.put("abc", "verifier").unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["abc"]["code_verifier"], "verifier");
        assert!(json["abc"]["created_at"].as_i64().unwrap() > 0);
    }

    #[test]
    fn test_file_accepts_camel_case_created_at() {
        let dir = tempfile::tempdir().unwrap();
        let created = now_millis();
        std::fs::write(
            dir.path().join(PENDING_FILE),
            format!(r#"{{"s":{{"code_verifier":"v","createdAt":{created}}}}}"#),
        )
        .unwrap();
        let store = FilePendingStore::new(dir.path());
        assert_eq!(store.consume("s").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn test_file_corrupt_document_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(PENDING_FILE), "not json").unwrap();
        let store = FilePendingStore::new(dir.path());
        assert_eq!(store.consume("s").unwrap(), None);
        store.put("s", "v").unwrap();
        assert_eq!(store.consume("s").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn test_file_put_sweeps_expired() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePendingStore::new(dir.path());
        store.put_record(stale("old", "v")).unwrap();
        store.put("new", "v2").unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert!(json.get("old").is_none());
        assert!(json.get("new").is_some());
    }

    #[test]
    fn test_sqlite_store() {
        let store = SqlitePendingStore::new(Database::open_in_memory().unwrap());
        exercise(&store);
        assert_eq!(store.name(), "sqlite");
    }

    #[test]
    fn test_sqlite_expired_row_is_deleted() {
        let db = Database::open_in_memory().unwrap();
        let store = SqlitePendingStore::new(db.clone());
        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO oauth_state (state_token, code_verifier, created_at) VALUES (?1, ?2, ?3)",
                rusqlite::params!["old", "v", now_millis() - PENDING_TTL_MS - 1],
            )
        })
        .unwrap();

        assert_eq!(store.consume("old").unwrap(), None);
        let count: i64 = db
            .with_conn(|conn| conn.query_row("SELECT COUNT(*) FROM oauth_state", [], |r| r.get(0)))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_sqlite_cleanup_expired() {
        let store = SqlitePendingStore::new(Database::open_in_memory().unwrap());
        store.put("fresh", "v").unwrap();
        store.put_record(stale("old1", "v")).unwrap();
        // put_record sweeps before inserting, so the stale row is still there.
        assert_eq!(store.cleanup_expired().unwrap(), 1);
        assert_eq!(store.consume("fresh").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn test_sqlite_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xreply.db");
        SqlitePendingStore::new(Database::open(&path).unwrap())
            .put("s", "v")
            .unwrap();
        let store = SqlitePendingStore::new(Database::open(&path).unwrap());
        assert_eq!(store.consume("s").unwrap().as_deref(), Some("v"));
    }
}
