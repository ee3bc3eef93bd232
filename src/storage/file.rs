//! File-backed storage: a persistent local store kept as one JSON document.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::{MemoryStorage, Storage};
use crate::error::StorageError;

// == File Storage ==
/// A persistent store, the equivalent of browser local storage.
///
/// Records live in memory and every mutation rewrites the backing file
/// (write to a sibling temp file, then rename). A write whose file update
/// fails is rolled back and reported as [`StorageError::Io`].
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    items: MemoryStorage,
    /// Serializes file rewrites
    io: Mutex<()>,
}

impl FileStorage {
    /// Opens (or creates on first write) the store at `path`.
    ///
    /// An unreadable or malformed file is treated as empty; the caches built on
    /// top discard whatever they cannot recover anyway.
    pub fn open(path: impl AsRef<Path>, quota: Option<usize>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();

        let items = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<BTreeMap<String, String>>(&raw) {
                Ok(items) => items,
                Err(err) => {
                    warn!("Ignoring malformed storage file {}: {}", path.display(), err);
                    BTreeMap::new()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(err.into()),
        };
        debug!("Opened storage file {} with {} records", path.display(), items.len());

        Ok(Self {
            path,
            items: MemoryStorage::from_items(items, quota),
            io: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> Result<(), StorageError> {
        let _guard = self.io.lock();
        let raw = serde_json::to_string(&self.items.snapshot())
            .map_err(|err| StorageError::Io(err.to_string()))?;

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, raw)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl Storage for FileStorage {
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let previous = self.items.get_item(key);
        self.items.set_item(key, value)?;

        if let Err(err) = self.persist() {
            match previous {
                Some(old) => {
                    if let Err(rollback) = self.items.set_item(key, &old) {
                        warn!("Failed to roll back '{}': {}", key, rollback);
                    }
                }
                None => self.items.remove_item(key),
            }
            return Err(err);
        }
        Ok(())
    }

    fn get_item(&self, key: &str) -> Option<String> {
        self.items.get_item(key)
    }

    fn remove_item(&self, key: &str) {
        if self.items.get_item(key).is_none() {
            return;
        }
        self.items.remove_item(key);
        if let Err(err) = self.persist() {
            warn!("Failed to persist removal of '{}': {}", key, err);
        }
    }

    /// Rewrites the file once for the whole batch.
    fn remove_items(&self, keys: &[String]) {
        let present: Vec<&String> = keys
            .iter()
            .filter(|key| self.items.get_item(key).is_some())
            .collect();
        if present.is_empty() {
            return;
        }
        for key in &present {
            self.items.remove_item(key);
        }
        if let Err(err) = self.persist() {
            warn!("Failed to persist removal of {} records: {}", present.len(), err);
        }
    }

    fn key(&self, index: usize) -> Option<String> {
        self.items.key(index)
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn keys(&self) -> Vec<String> {
        self.items.keys()
    }
}
