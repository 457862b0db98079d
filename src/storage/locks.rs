//! Per-collection locking
//!
//! In-process coordination uses one reader-writer lock per collection,
//! handed out by a lock-of-locks ([`LockMap`]). Cross-process coordination
//! is opt-in and uses advisory file locks (`fs2`) on
//! `<root>/.locks/<collection>.lock`.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use fs2::FileExt;

/// Directory under the store root holding advisory lock files
pub const LOCK_DIR: &str = ".locks";

/// How an operation holds its collection lock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Writers and deleters
    Exclusive,
    /// Readers when read locking is enabled
    Shared,
    /// No coordination at all
    Unlocked,
}

/// Lock shared by every operation on one collection
pub type CollectionLock = Arc<RwLock<()>>;

/// Lock-of-locks mapping collection names to their lock.
///
/// Entries are never evicted. A lock handed out stays alive for as long as
/// any caller still holds its `Arc`.
#[derive(Debug, Default)]
pub struct LockMap {
    locks: Mutex<HashMap<String, CollectionLock>>,
}

impl LockMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the lock for `collection`, creating it on first use
    pub fn get(&self, collection: &str) -> CollectionLock {
        // The map is only ever inserted into, so a poisoned guard is still consistent
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(lock) = locks.get(collection) {
            return Arc::clone(lock);
        }

        let lock = CollectionLock::default();
        locks.insert(collection.to_string(), Arc::clone(&lock));
        lock
    }

    /// Number of collections that have been locked so far
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Advisory file lock held for the lifetime of the value
#[derive(Debug)]
pub struct ProcessLock {
    file: File,
    path: PathBuf,
}

impl ProcessLock {
    /// Path of the lock file guarding `collection`
    pub fn path_for(root: &Path, collection: &str) -> PathBuf {
        root.join(LOCK_DIR).join(format!("{}.lock", collection))
    }

    /// Blocks until the lock file for `collection` is locked in `mode`.
    ///
    /// Returns `None` for [`LockMode::Unlocked`].
    pub fn acquire(root: &Path, collection: &str, mode: LockMode) -> io::Result<Option<Self>> {
        if mode == LockMode::Unlocked {
            return Ok(None);
        }

        let path = Self::path_for(root, collection);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        match mode {
            LockMode::Exclusive => FileExt::lock_exclusive(&file)?,
            LockMode::Shared => FileExt::lock_shared(&file)?,
            LockMode::Unlocked => {}
        }

        Ok(Some(Self { file, path }))
    }

    /// Returns the lock file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ProcessLock {
    fn drop(&mut self) {
        // Closing the handle releases the lock as well
        let _ = FileExt::unlock(&self.file);
    }
}
