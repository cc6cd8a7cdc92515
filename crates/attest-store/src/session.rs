//! Per-session JSON state with cross-process locking
//!
//! Each session lives in `<dir>/<key>.json`. Mutations hold an `fs2`
//! exclusive lock on `<dir>/<key>.json.lock`, which also records the owner
//! token. The OS drops the lock if its holder dies, so a marker left behind
//! by a killed process is simply taken over. The marker is removed when the
//! [`SessionLock`] guard drops.

use crate::atomic::{atomic_write_json, load_json};
use crate::ledger::is_contended;
use crate::StoreError;
use fs2::FileExt;
use serde_json::{Map, Value};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

/// Default time to wait for a session lock
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Directory of session state documents
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
    lock_timeout: Duration,
}

/// Exclusive hold on one session, released on drop
#[derive(Debug)]
pub struct SessionLock {
    path: PathBuf,
    token: String,
    file: File,
}

impl SessionLock {
    /// Path of the marker file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        // Unlink before unlocking; only remove a marker we still own
        match fs::read_to_string(&self.path) {
            Ok(owner) if owner.trim() == self.token => {
                if let Err(e) = fs::remove_file(&self.path) {
                    warn!(path = %self.path.display(), error = %e, "Failed to remove session lock");
                }
            }
            Ok(_) => warn!(path = %self.path.display(), "Session lock taken over by another owner"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to read session lock"),
        }
        let _ = FileExt::unlock(&self.file);
    }
}

impl SessionStore {
    /// Open (and create if needed) a session directory
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        })
    }

    /// Use a different default lock timeout for `write`/`update`/`delete`
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Directory holding the session files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn check_key(key: &str) -> Result<(), StoreError> {
        let bad = key.is_empty()
            || key == "."
            || key == ".."
            || key.contains(['/', '\\', '\0'])
            || key.trim() != key;
        if bad {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(())
    }

    fn data_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    fn lock_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json.lock", key))
    }

    /// Acquire the session lock, waiting up to `timeout`
    ///
    /// Not re-entrant: locking a session twice from the same thread waits
    /// for the first guard and times out.
    pub fn lock(&self, key: &str, timeout: Duration) -> Result<SessionLock, StoreError> {
        Self::check_key(key)?;
        let path = self.lock_path(key);
        let token = Uuid::now_v7().to_string();
        let started = Instant::now();

        loop {
            if let Some(file) = Self::try_claim(&path, &token)? {
                debug!(key, waited_ms = started.elapsed().as_millis() as u64, "Session lock acquired");
                return Ok(SessionLock { path, token, file });
            }
            let waited = started.elapsed();
            if waited >= timeout {
                warn!(key, waited_ms = waited.as_millis() as u64, "Session lock timed out");
                return Err(StoreError::LockTimeout { path, waited });
            }
            thread::sleep(POLL_INTERVAL.min(timeout - waited));
        }
    }

    /// One attempt at the lock; `None` while another holder has it
    fn try_claim(path: &Path, token: &str) -> Result<Option<File>, StoreError> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => {}
            Err(e) if is_contended(&e) => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let claimed = file
            .set_len(0)
            .and_then(|_| file.write_all(token.as_bytes()))
            .and_then(|_| file.sync_all());
        if let Err(e) = claimed {
            let _ = FileExt::unlock(&file);
            return Err(e.into());
        }

        // The previous holder may have unlinked the marker we just locked
        match fs::read_to_string(path) {
            Ok(owner) if owner == token => Ok(Some(file)),
            Ok(_) => {
                let _ = FileExt::unlock(&file);
                Ok(None)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let _ = FileExt::unlock(&file);
                Ok(None)
            }
            Err(e) => {
                let _ = FileExt::unlock(&file);
                Err(e.into())
            }
        }
    }

    /// Whether a session document exists
    pub fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Self::check_key(key)?;
        Ok(self.data_path(key).exists())
    }

    /// Read a session document
    ///
    /// Reads see the last completed write; they do not take the lock.
    pub fn read(&self, key: &str) -> Result<Value, StoreError> {
        Self::check_key(key)?;
        load_json(&self.data_path(key))?.ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    /// Replace a session document
    pub fn write(&self, key: &str, data: &Value) -> Result<(), StoreError> {
        let _guard = self.lock(key, self.lock_timeout)?;
        atomic_write_json(&self.data_path(key), data)
    }

    /// Locked read-modify-write; the closure sees `{}` for a new session
    ///
    /// If `f` fails, nothing is written and the lock is still released.
    pub fn update_with<F, E>(&self, key: &str, f: F) -> Result<Value, E>
    where
        F: FnOnce(&mut Value) -> Result<(), E>,
        E: From<StoreError>,
    {
        let _guard = self.lock(key, self.lock_timeout)?;
        let path = self.data_path(key);
        let mut state: Value = load_json(&path)?.unwrap_or_else(|| Value::Object(Map::new()));
        f(&mut state)?;
        atomic_write_json(&path, &state)?;
        Ok(state)
    }

    /// Merge a patch whose keys may be dot paths, returning the merged document
    ///
    /// `{"a.b": 1}` sets `state["a"]["b"]`, creating `a` if needed. A path
    /// with an empty segment rejects the whole patch.
    pub fn update(&self, key: &str, patch: &Map<String, Value>) -> Result<Value, StoreError> {
        self.update_with(key, |state| {
            for (path, value) in patch {
                set_path(state, path, value.clone())?;
            }
            Ok::<(), StoreError>(())
        })
    }

    /// Remove a session document, returning whether it existed
    pub fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let _guard = self.lock(key, self.lock_timeout)?;
        match fs::remove_file(self.data_path(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Set `value` at a dot-separated path, creating intermediate objects
///
/// Intermediates that exist but are not objects are replaced. Empty
/// segments (`"a..b"`, `".a"`) are rejected.
pub fn set_path(state: &mut Value, path: &str, value: Value) -> Result<(), StoreError> {
    if path.split('.').any(str::is_empty) {
        return Err(StoreError::InvalidKey(path.to_string()));
    }
    if !state.is_object() {
        *state = Value::Object(Map::new());
    }
    let mut parts = path.split('.').peekable();
    let mut current = state;
    while let Some(part) = parts.next() {
        let Value::Object(map) = current else {
            return Ok(());
        };
        if parts.peek().is_none() {
            map.insert(part.to_string(), value);
            return Ok(());
        }
        let child = map
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !child.is_object() {
            *child = Value::Object(Map::new());
        }
        current = child;
    }
    Ok(())
}
