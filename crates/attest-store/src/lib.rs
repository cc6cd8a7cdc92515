//! Attest Storage Layer
//!
//! Everything the extraction pipeline persists, and the locking that keeps
//! concurrent extractions from corrupting it.
//!
//! # Architecture
//!
//! - `SessionStore`: one JSON document per session, mutated under an
//!   exclusive marker-file lock released by an RAII guard
//! - `CostLedger`: append-only API call records behind `fs2` advisory locks
//! - `SqliteCache` / `MemoryCache`: finished extractions keyed by document
//!   fingerprint and extractor kind
//!
//! All file writes go through a tmp-file + rename so readers never see a
//! partial document.
//!
//! # Examples
//!
//! ```no_run
//! use attest_store::SessionStore;
//! use serde_json::json;
//!
//! let store = SessionStore::new("sessions").unwrap();
//! store.write("run-1", &json!({"status": "started"})).unwrap();
//! ```

#![warn(missing_docs)]

pub mod atomic;
pub mod cache;
mod error;
pub mod ledger;
pub mod session;

pub use cache::{document_fingerprint, MemoryCache, SqliteCache};
pub use error::StoreError;
pub use ledger::CostLedger;
pub use session::{SessionLock, SessionStore};
