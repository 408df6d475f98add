//! Durable client-side key-value storage.
//!
//! DESIGN
//! ======
//! The session persists exactly one key: the raw bearer token. Storage is
//! shared, process-wide, and non-transactional. Writes from login, refresh,
//! and logout can interleave with reads and the last writer wins.
//!
//! `FileStore` keeps a flat JSON object on disk and rewrites it whole on
//! every change, so other keys written by other tools survive. Each rewrite
//! goes to a temp file in the same directory that is renamed over the
//! target, so a crash mid-write leaves the previous file intact. The file
//! holds a bearer token and is owner-only (0o600) on unix.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tempfile::NamedTempFile;

use crate::error::SessionError;

/// Persistent string storage surviving process restarts.
pub trait DurableStore: Send + Sync {
    /// Read a key. Missing keys and unreadable backends both yield `None`.
    fn get(&self, key: &str) -> Option<String>;

    /// Write a key, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Storage`] if the backend cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), SessionError>;

    /// Delete a key. Deleting a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Storage`] if the backend cannot be written.
    fn remove(&self, key: &str) -> Result<(), SessionError>;
}

// =============================================================================
// MEMORY STORE
// =============================================================================

/// Volatile store for tests and embedders that persist elsewhere.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with one entry.
    #[must_use]
    pub fn with_entry(key: &str, value: &str) -> Self {
        let store = Self::new();
        store.lock().insert(key.to_owned(), value.to_owned());
        store
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DurableStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SessionError> {
        self.lock().insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), SessionError> {
        self.lock().remove(key);
        Ok(())
    }
}

// =============================================================================
// FILE STORE
// =============================================================================

/// Unix mode of the token file: owner read/write only.
#[cfg(unix)]
const TOKEN_FILE_MODE: u32 = 0o600;

/// JSON-file backed store: `{ "<key>": "<value>", ... }`.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl FileStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), write_lock: Mutex::new(()) }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<HashMap<String, String>, SessionError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => return Err(SessionError::Storage(format!("read {}: {e}", self.path.display()))),
        };
        if raw.trim().is_empty() {
            return Ok(HashMap::new());
        }
        serde_json::from_str(&raw).map_err(|e| SessionError::Storage(format!("parse {}: {e}", self.path.display())))
    }

    fn write_map(&self, map: &HashMap<String, String>) -> Result<(), SessionError> {
        let body = serde_json::to_string_pretty(map).map_err(|e| SessionError::Storage(e.to_string()))?;
        let write_err = |e: std::io::Error| SessionError::Storage(format!("write {}: {e}", self.path.display()));

        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(parent).map_err(write_err)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(tmp.path(), std::fs::Permissions::from_mode(TOKEN_FILE_MODE))
                .map_err(write_err)?;
        }
        tmp.write_all(body.as_bytes()).map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(&self.path).map_err(|e| write_err(e.error))?;
        Ok(())
    }

    fn modify(&self, f: impl FnOnce(&mut HashMap<String, String>)) -> Result<(), SessionError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut map = self.read_map()?;
        f(&mut map);
        self.write_map(&map)
    }
}

impl DurableStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        match self.read_map() {
            Ok(mut map) => map.remove(key),
            Err(e) => {
                tracing::warn!(error = %e, "durable store unreadable");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SessionError> {
        self.modify(|map| {
            map.insert(key.to_owned(), value.to_owned());
        })
    }

    fn remove(&self, key: &str) -> Result<(), SessionError> {
        if !self.path.exists() {
            return Ok(());
        }
        self.modify(|map| {
            map.remove(key);
        })
    }
}

#[cfg(test)]
#[path = "storage_test.rs"]
mod tests;
