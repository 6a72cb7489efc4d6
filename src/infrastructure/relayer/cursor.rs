//! Durable event cursors, persisted as a small JSON file so a restarted
//! relayer resumes where it left off instead of replaying history.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub struct CursorStore {
    path: PathBuf,
    cursors: HashMap<String, serde_json::Value>,
}

impl CursorStore {
    /// Load cursors from disk. A missing or corrupt file starts every
    /// cursor at null rather than failing startup.
    pub fn load(path: &Path) -> Self {
        let cursors = match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(map) => map,
                Err(e) => {
                    warn!("Cursor file {} is corrupt ({}), starting fresh", path.display(), e);
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                warn!("Could not read cursor file {} ({}), starting fresh", path.display(), e);
                HashMap::new()
            }
        };
        if !cursors.is_empty() {
            info!("Loaded {} event cursors from {}", cursors.len(), path.display());
        }
        Self {
            path: path.to_path_buf(),
            cursors,
        }
    }

    pub fn get(&self, event_type: &str) -> Option<&serde_json::Value> {
        self.cursors.get(event_type)
    }

    pub fn set(&mut self, event_type: &str, cursor: serde_json::Value) {
        self.cursors.insert(event_type.to_string(), cursor);
    }

    pub fn len(&self) -> usize {
        self.cursors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cursors.is_empty()
    }

    /// Write-then-rename atomic replace: a crash mid-write leaves the old
    /// file intact.
    pub fn persist(&self) -> io::Result<()> {
        let tmp = self.path.with_extension("tmp");
        let contents = serde_json::to_string_pretty(&self.cursors)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(&tmp, contents)?;
        fs::rename(&tmp, &self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_starts_empty() {
        let dir = tempdir().unwrap();
        let store = CursorStore::load(&dir.path().join("cursors.json"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cursors.json");
        fs::write(&path, "{not json").unwrap();
        let store = CursorStore::load(&path);
        assert!(store.is_empty());
    }

    #[test]
    fn test_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cursors.json");

        let mut store = CursorStore::load(&path);
        store.set(
            "0xpkg::portfolio::RebalanceExecuted",
            serde_json::json!({"txDigest": "0xabc", "eventSeq": "4"}),
        );
        store.persist().unwrap();

        let reloaded = CursorStore::load(&path);
        assert_eq!(reloaded.len(), 1);
        assert_eq!(
            reloaded.get("0xpkg::portfolio::RebalanceExecuted").unwrap()["txDigest"],
            "0xabc"
        );
    }

    #[test]
    fn test_persist_replaces_atomically() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cursors.json");

        let mut store = CursorStore::load(&path);
        store.set("a", serde_json::json!(1));
        store.persist().unwrap();
        store.set("a", serde_json::json!(2));
        store.persist().unwrap();

        // No leftover temp file and the final value wins.
        assert!(!path.with_extension("tmp").exists());
        let reloaded = CursorStore::load(&path);
        assert_eq!(reloaded.get("a").unwrap(), &serde_json::json!(2));
    }
}
