//! Atomic JSON file writes
//!
//! Data is written to a `.tmp` sibling and renamed over the target, so a
//! reader never observes a half-written file.

use crate::StoreError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write raw bytes atomically, creating parent directories as needed
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let tmp = tmp_path(path);
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(data)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Serialize to pretty JSON and write atomically
pub fn atomic_write_json<T: Serialize + ?Sized>(path: &Path, data: &T) -> Result<(), StoreError> {
    let json = serde_json::to_vec_pretty(data)?;
    atomic_write(path, &json)
}

/// Load JSON from `path`, or `None` if the file does not exist
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_atomic_write_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a").join("b").join("state.json");
        atomic_write_json(&path, &json!({"k": 1})).unwrap();

        let loaded: serde_json::Value = load_json(&path).unwrap().unwrap();
        assert_eq!(loaded["k"], 1);
    }

    #[test]
    fn test_no_tmp_leftover() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        atomic_write(&path, b"{}").unwrap();
        assert!(!tmp_path(&path).exists());
        assert_eq!(tmp_path(&path).file_name().unwrap(), "state.json.tmp");
    }

    #[test]
    fn test_load_missing_is_none() {
        let dir = TempDir::new().unwrap();
        let loaded: Option<serde_json::Value> = load_json(&dir.path().join("nope.json")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_load_corrupt_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{not json").unwrap();
        let loaded: Result<Option<serde_json::Value>, _> = load_json(&path);
        assert!(matches!(loaded, Err(StoreError::Json(_))));
    }
}
