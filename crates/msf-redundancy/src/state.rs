//! ---
//! msf_section: "07-resilience-fault-tolerance"
//! msf_subsection: "module"
//! msf_type: "source"
//! msf_scope: "code"
//! msf_description: "Failover decision engine and its collaborators."
//! msf_version: "v0.1.0"
//! msf_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::debug;

use crate::error::Result;

/// Small persisted key/value store backing the mode and throttle state.
pub trait StateStore: Send + Sync + fmt::Debug {
    /// Read a value; `None` when the key has never been written.
    fn read(&self, key: &str) -> Result<Option<String>>;

    fn write(&self, key: &str, value: &str) -> Result<()>;
}

/// One file per key inside a state directory.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    root: PathBuf,
}

impl FileStateStore {
    /// Open the store, creating the directory if necessary.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

impl StateStore for FileStateStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(contents) => Ok(Some(contents.trim().to_owned())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key);
        let tmp = self.root.join(format!(".{key}.tmp"));
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(value.as_bytes())?;
            file.write_all(b"\n")?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        debug!(path = %path.display(), "state persisted");
        Ok(())
    }
}

/// Process-local store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        self.values.lock().insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_store_roundtrips_and_trims() {
        let dir = tempdir().unwrap();
        let store = FileStateStore::open(dir.path().join("state")).unwrap();
        assert_eq!(store.read("mode").unwrap(), None);
        store.write("mode", "force_primary").unwrap();
        assert_eq!(store.read("mode").unwrap().as_deref(), Some("force_primary"));
        assert_eq!(
            fs::read_to_string(dir.path().join("state/mode")).unwrap(),
            "force_primary\n"
        );
    }

    #[test]
    fn file_store_reads_hand_edited_values() {
        let dir = tempdir().unwrap();
        let store = FileStateStore::open(dir.path()).unwrap();
        fs::write(dir.path().join("mode"), "  auto \n\n").unwrap();
        assert_eq!(store.read("mode").unwrap().as_deref(), Some("auto"));
    }

    #[test]
    fn open_fails_when_root_is_a_file() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "x").unwrap();
        assert!(FileStateStore::open(blocker.join("state")).is_err());
    }

    #[test]
    fn memory_store_overwrites() {
        let store = MemoryStateStore::new();
        store.write("last_notify", "1").unwrap();
        store.write("last_notify", "2").unwrap();
        assert_eq!(store.read("last_notify").unwrap().as_deref(), Some("2"));
    }
}
