//! Persistent cost ledger
//!
//! The ledger file holds a [`CostSummary`] (with every call). Processes
//! coordinate through `fs2` advisory locks on a persistent `<file>.lock`
//! sibling: reads take a shared lock, `record` holds an exclusive lock for
//! the whole read-append-rewrite so concurrent writers never drop records.

use crate::atomic::{atomic_write_json, load_json};
use crate::StoreError;
use attest_domain::{ApiCall, CostSink, CostSummary, PricingTable};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Default time to wait for the ledger lock
pub const DEFAULT_LEDGER_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LockMode {
    Shared,
    Exclusive,
}

/// Held advisory lock; unlocked on drop
struct LedgerLock {
    file: File,
}

impl Drop for LedgerLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// Records API calls and aggregates their cost for one session
///
/// Clones share the same records.
#[derive(Debug, Clone)]
pub struct CostLedger {
    session_id: String,
    path: Option<PathBuf>,
    pricing: PricingTable,
    lock_timeout: Duration,
    // In-process serialization; also the whole store when there is no path
    calls: Arc<Mutex<Vec<ApiCall>>>,
}

impl CostLedger {
    /// Ledger persisted to `path`
    ///
    /// An existing file is loaded so a resumed session keeps its history.
    pub fn open(session_id: impl Into<String>, path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let ledger = Self {
            session_id: session_id.into(),
            path: Some(path.into()),
            pricing: PricingTable::default(),
            lock_timeout: DEFAULT_LEDGER_LOCK_TIMEOUT,
            calls: Arc::new(Mutex::new(Vec::new())),
        };
        // Surface a corrupt or locked file now rather than on first record
        ledger.load_calls()?;
        Ok(ledger)
    }

    /// Ledger held only in memory
    pub fn in_memory(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            path: None,
            pricing: PricingTable::default(),
            lock_timeout: DEFAULT_LEDGER_LOCK_TIMEOUT,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Use a custom pricing table
    pub fn with_pricing(mut self, pricing: PricingTable) -> Self {
        self.pricing = pricing;
        self
    }

    /// Use a custom lock timeout
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Session this ledger belongs to
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Ledger file, if persisted
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn calls(&self) -> MutexGuard<'_, Vec<ApiCall>> {
        self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_path(path: &Path) -> PathBuf {
        let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".lock");
        path.with_file_name(name)
    }

    fn acquire(&self, path: &Path, mode: LockMode) -> Result<LedgerLock, StoreError> {
        let lock_path = Self::lock_path(path);
        if let Some(parent) = lock_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        let started = Instant::now();
        loop {
            let attempt = match mode {
                LockMode::Shared => FileExt::try_lock_shared(&file),
                LockMode::Exclusive => FileExt::try_lock_exclusive(&file),
            };
            match attempt {
                Ok(()) => return Ok(LedgerLock { file }),
                Err(e) if is_contended(&e) => {
                    let waited = started.elapsed();
                    if waited >= self.lock_timeout {
                        warn!(path = %lock_path.display(), ?mode, "Ledger lock timed out");
                        return Err(StoreError::LockTimeout {
                            path: lock_path,
                            waited,
                        });
                    }
                    thread::sleep(POLL_INTERVAL.min(self.lock_timeout - waited));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn read_file(path: &Path) -> Result<Vec<ApiCall>, StoreError> {
        Ok(load_json::<CostSummary>(path)?
            .map(|summary| summary.api_calls)
            .unwrap_or_default())
    }

    fn load_calls(&self) -> Result<Vec<ApiCall>, StoreError> {
        match &self.path {
            Some(path) => {
                let _lock = self.acquire(path, LockMode::Shared)?;
                Self::read_file(path)
            }
            None => Ok(self.calls().clone()),
        }
    }
}

pub(crate) fn is_contended(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

impl CostSink for CostLedger {
    type Error = StoreError;

    fn record(&self, call: ApiCall) -> Result<f64, StoreError> {
        let mut call = call.normalized();
        call.cost = self.pricing.cost(&call);
        let cost = call.cost;

        let mut calls = self.calls();
        match &self.path {
            Some(path) => {
                let _lock = self.acquire(path, LockMode::Exclusive)?;
                let mut on_disk = Self::read_file(path)?;
                on_disk.push(call);
                let summary = CostSummary::from_calls(self.session_id.clone(), on_disk);
                atomic_write_json(path, &summary)?;
                *calls = summary.api_calls;
            }
            None => calls.push(call),
        }

        debug!(session = %self.session_id, cost, total_calls = calls.len(), "Recorded API call");
        Ok(cost)
    }

    fn summary(&self) -> Result<CostSummary, StoreError> {
        Ok(CostSummary::from_calls(self.session_id.clone(), self.load_calls()?))
    }
}
