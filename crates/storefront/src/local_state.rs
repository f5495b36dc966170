//! Client-local persisted state.
//!
//! A directory of JSON documents, one per key. Survives process restarts and
//! is the only state the storefront keeps outside the knowledge store.
//!
//! Reads never fail: a missing, unreadable, or malformed document is logged
//! and treated as absent.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

/// Keys of the persisted documents.
pub mod keys {
    /// Ordered array of cart lines.
    pub const CART: &str = "cart";

    /// The logged-in user; absence means anonymous.
    pub const LOGGED_IN_USER: &str = "loggedInUser";
}

/// Directory-backed JSON key/value store.
#[derive(Debug, Clone)]
pub struct LocalState {
    dir: PathBuf,
}

impl LocalState {
    /// Use `dir` for persisted documents. The directory is created on first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the documents.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Read and decode a document, or `None` if it is missing or unusable.
    #[must_use]
    pub fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let path = self.path(key);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not read local state");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring malformed local state");
                None
            }
        }
    }

    /// Encode and write a document, replacing any previous version.
    ///
    /// The document is written to a temporary file and renamed into place, so
    /// a crash mid-write leaves the previous version intact.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_vec_pretty(value)?;
        let path = self.path(key);
        let tmp = self.dir.join(format!(".{key}.json.tmp"));
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)
    }

    /// Delete a document. Deleting a missing document is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub fn remove(&self, key: &str) -> io::Result<()> {
        match fs::remove_file(self.path(key)) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let state = LocalState::new(dir.path().join("nested"));

        state.write("numbers", &vec![1, 2, 3]).unwrap();
        assert_eq!(state.read::<Vec<i32>>("numbers"), Some(vec![1, 2, 3]));
        assert!(dir.path().join("nested/numbers.json").exists());
        assert!(!dir.path().join("nested/.numbers.json.tmp").exists());
    }

    #[test]
    fn test_missing_and_malformed_read_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let state = LocalState::new(dir.path());

        assert_eq!(state.read::<Vec<i32>>("absent"), None);

        fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
        assert_eq!(state.read::<Vec<i32>>("broken"), None);

        fs::write(dir.path().join("wrong.json"), r#"{"a":1}"#).unwrap();
        assert_eq!(state.read::<Vec<i32>>("wrong"), None);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let state = LocalState::new(dir.path());

        state.write("k", &true).unwrap();
        state.remove("k").unwrap();
        state.remove("k").unwrap();
        assert_eq!(state.read::<bool>("k"), None);
    }
}
