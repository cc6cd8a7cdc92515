//! Extraction caches keyed by document fingerprint and extractor kind

use crate::StoreError;
use attest_domain::{CacheKey, ExtractedField, FieldCache};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, RwLock};
use std::time::Duration;
use tracing::debug;

/// SHA-256 hex digest of a document, used as its cache identity
pub fn document_fingerprint(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(hex, "{:02x}", byte);
    }
    hex
}

/// Default wait for a busy cache database
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed cache shared across processes
///
/// Reads run concurrently under SQLite's own locking; writers wait up to the
/// busy timeout and then fail with [`StoreError::LockTimeout`].
pub struct SqliteCache {
    conn: Mutex<Connection>,
    path: PathBuf,
    busy_timeout: Duration,
}

impl SqliteCache {
    /// Open or create a cache database
    ///
    /// Use `:memory:` for an in-memory database (useful for testing).
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        Self::with_busy_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    /// Open with a custom busy timeout
    pub fn with_busy_timeout<P: AsRef<Path>>(path: P, busy_timeout: Duration) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref())?;
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS field_cache (
                document_hash TEXT NOT NULL,
                kind TEXT NOT NULL,
                fields TEXT NOT NULL,
                PRIMARY KEY (document_hash, kind)
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: path.as_ref().to_path_buf(),
            busy_timeout,
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn map_busy(&self, err: rusqlite::Error) -> StoreError {
        match err.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => StoreError::LockTimeout {
                path: self.path.clone(),
                waited: self.busy_timeout,
            },
            _ => StoreError::Database(err),
        }
    }

    /// Number of cached entries
    pub fn len(&self) -> Result<usize, StoreError> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM field_cache", [], |row| row.get(0))
            .map_err(|e| self.map_busy(e))?;
        Ok(count as usize)
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

impl FieldCache for SqliteCache {
    type Error = StoreError;

    fn get(&self, key: &CacheKey) -> Result<Option<Vec<ExtractedField>>, StoreError> {
        let raw: Option<String> = self
            .conn()
            .query_row(
                "SELECT fields FROM field_cache WHERE document_hash = ?1 AND kind = ?2",
                params![key.document_hash, key.kind.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| self.map_busy(e))?;

        match raw {
            Some(json) => {
                debug!(%key, "Cache hit");
                Ok(Some(serde_json::from_str(&json)?))
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &CacheKey, fields: &[ExtractedField]) -> Result<(), StoreError> {
        let json = serde_json::to_string(fields)?;
        self.conn()
            .execute(
                "INSERT OR REPLACE INTO field_cache (document_hash, kind, fields) VALUES (?1, ?2, ?3)",
                params![key.document_hash, key.kind.as_str(), json],
            )
            .map_err(|e| self.map_busy(e))?;
        debug!(%key, fields = fields.len(), "Cache entry stored");
        Ok(())
    }

    fn invalidate(&self, key: &CacheKey) -> Result<bool, StoreError> {
        let removed = self
            .conn()
            .execute(
                "DELETE FROM field_cache WHERE document_hash = ?1 AND kind = ?2",
                params![key.document_hash, key.kind.as_str()],
            )
            .map_err(|e| self.map_busy(e))?;
        Ok(removed > 0)
    }

    fn clear(&self) -> Result<usize, StoreError> {
        let removed = self
            .conn()
            .execute("DELETE FROM field_cache", [])
            .map_err(|e| self.map_busy(e))?;
        Ok(removed)
    }
}

/// Process-local cache
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<CacheKey, Vec<ExtractedField>>>,
}

impl MemoryCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or_else(|p| p.into_inner().len())
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FieldCache for MemoryCache {
    type Error = StoreError;

    fn get(&self, key: &CacheKey) -> Result<Option<Vec<ExtractedField>>, StoreError> {
        let entries = self.entries.read().unwrap_or_else(|p| p.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &CacheKey, fields: &[ExtractedField]) -> Result<(), StoreError> {
        let mut entries = self.entries.write().unwrap_or_else(|p| p.into_inner());
        entries.insert(key.clone(), fields.to_vec());
        Ok(())
    }

    fn invalidate(&self, key: &CacheKey) -> Result<bool, StoreError> {
        let mut entries = self.entries.write().unwrap_or_else(|p| p.into_inner());
        Ok(entries.remove(key).is_some())
    }

    fn clear(&self) -> Result<usize, StoreError> {
        let mut entries = self.entries.write().unwrap_or_else(|p| p.into_inner());
        let count = entries.len();
        entries.clear();
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attest_domain::{Confidence, ExtractorKind, SourceRef};

    fn field(value: &str) -> ExtractedField {
        ExtractedField::new(value, "project_start_date", SourceRef::new("plan.pdf", "p1"), Confidence::new(0.9))
    }

    fn exercise<C: FieldCache<Error = StoreError>>(cache: &C) {
        let key = CacheKey::new(document_fingerprint("doc body"), ExtractorKind::Dates);
        let other = CacheKey::new(document_fingerprint("doc body"), ExtractorKind::LandTenure);

        assert!(cache.get(&key).unwrap().is_none());
        cache.set(&key, &[field("2022-01-01")]).unwrap();
        assert_eq!(cache.get(&key).unwrap().unwrap()[0].value.to_string(), "2022-01-01");
        assert!(cache.get(&other).unwrap().is_none());

        cache.set(&other, &[]).unwrap();
        assert!(cache.invalidate(&other).unwrap());
        assert!(!cache.invalidate(&other).unwrap());

        cache.set(&other, &[field("x")]).unwrap();
        assert_eq!(cache.clear().unwrap(), 2);
        assert!(cache.get(&key).unwrap().is_none());
    }

    #[test]
    fn test_memory_cache() {
        exercise(&MemoryCache::new());
    }

    #[test]
    fn test_sqlite_cache() {
        let cache = SqliteCache::open(":memory:").unwrap();
        exercise(&cache);
        assert!(cache.is_empty().unwrap());
    }

    #[test]
    fn test_fingerprint_is_stable_hex() {
        let a = document_fingerprint("hello");
        assert_eq!(a.len(), 64);
        assert_eq!(a, "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824");
        assert_ne!(a, document_fingerprint("hello "));
    }
}
