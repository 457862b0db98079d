//! Directory-backed record store
//!
//! Records live at `<root>/<collection>/<resource>.json`. Writes stage the
//! record in `<resource>.json.tmp` and rename it into place, so a record on
//! disk is always either the complete old version or the complete new one.
//! Writers and deleters on the same collection are serialized; different
//! collections never block each other.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use super::config::{ReadLocking, StoreConfig};
use super::locks::{LockMap, LockMode, ProcessLock, LOCK_DIR};
use super::logger::{LogLevel, Logger};
use super::path::{normalize_key, normalize_path, record_path, resolve_record_path, temp_path};

/// Permission bits for directories the store creates
#[cfg(unix)]
const DIR_MODE: u32 = 0o755;

/// Coarse classification of [`StoreError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Io,
    Serialization,
    Deserialization,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Missing collection - no place to save the record")]
    MissingCollection,

    #[error("Missing resource - unable to save the record (no name)")]
    MissingResource,

    #[error("Invalid key '{key}': {reason}")]
    InvalidKey { key: String, reason: &'static str },

    #[error("Unable to find file or directory named {}", key(.collection, .resource))]
    NotFound { collection: String, resource: String },

    #[error("I/O error on {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to serialize record {}", key(.collection, .resource))]
    Serialization {
        collection: String,
        resource: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to parse record {}", .path.display())]
    Deserialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::MissingCollection
            | StoreError::MissingResource
            | StoreError::InvalidKey { .. } => ErrorKind::Validation,
            StoreError::NotFound { .. } => ErrorKind::NotFound,
            StoreError::Io { .. } => ErrorKind::Io,
            StoreError::Serialization { .. } => ErrorKind::Serialization,
            StoreError::Deserialization { .. } => ErrorKind::Deserialization,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    fn not_found(collection: &str, resource: &str) -> Self {
        StoreError::NotFound {
            collection: collection.to_string(),
            resource: resource.to_string(),
        }
    }

    fn io(path: &Path, source: io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

fn key(collection: &str, resource: &str) -> String {
    if resource.is_empty() {
        collection.to_string()
    } else {
        format!("{}/{}", collection, resource)
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Handle to a store rooted at one directory
pub struct Store {
    root: PathBuf,
    locks: LockMap,
    logger: Option<Arc<dyn Logger>>,
    read_locking: ReadLocking,
    process_lock: bool,
}

impl Store {
    /// Opens the store at `root`, creating the directory if needed
    pub fn open(root: impl AsRef<Path>, config: StoreConfig) -> Result<Self> {
        let root = normalize_path(root.as_ref());

        let store = Self {
            root,
            locks: LockMap::new(),
            logger: config.logger,
            read_locking: config.read_locking,
            process_lock: config.process_lock,
        };

        if store.root.is_dir() {
            store.log(
                LogLevel::Debug,
                format_args!("Using '{}' (database already exists)", store.root.display()),
            );
            return Ok(store);
        }

        store.log(
            LogLevel::Debug,
            format_args!("Creating the database at '{}'", store.root.display()),
        );
        create_dir_all(&store.root).map_err(|e| StoreError::io(&store.root, e))?;

        Ok(store)
    }

    /// Opens the store with default options
    pub fn open_default(root: impl AsRef<Path>) -> Result<Self> {
        Self::open(root, StoreConfig::default())
    }

    /// Returns the normalized root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory backing an already validated collection key
    fn collection_dir(&self, collection: &str) -> PathBuf {
        self.root.join(collection)
    }

    /// Writes `value` as the record `collection/resource`, replacing any
    /// previous version atomically
    pub fn write<T>(&self, collection: &str, resource: &str, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let (collection, resource) = validate(collection, resource)?;

        self.with_lock(&collection, LockMode::Exclusive, || {
            self.write_record(&collection, &resource, value)
        })
    }

    /// Reads the record `collection/resource`.
    ///
    /// `resource` may be given with or without its `.json` suffix.
    pub fn read<T>(&self, collection: &str, resource: &str) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let (collection, resource) = validate(collection, resource)?;

        self.with_lock(&collection, self.read_mode(), || {
            self.read_record(&collection, &resource)
        })
    }

    /// Reads the raw text of every file in `collection`, ordered by file name
    pub fn read_all(&self, collection: &str) -> Result<Vec<String>> {
        let collection = collection_key(collection)?;

        let entries = self.with_lock(&collection, self.read_mode(), || {
            self.read_entries(&collection)
        })?;

        Ok(entries.into_iter().map(|(_, content)| content).collect())
    }

    /// Reads and parses every record in `collection`, ordered by file name
    pub fn read_all_as<T>(&self, collection: &str) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let collection = collection_key(collection)?;

        let entries = self.with_lock(&collection, self.read_mode(), || {
            self.read_entries(&collection)
        })?;

        entries
            .into_iter()
            .map(|(path, content)| {
                serde_json::from_str(&content)
                    .map_err(|source| StoreError::Deserialization { path, source })
            })
            .collect()
    }

    /// Deletes the record `collection/resource`.
    ///
    /// If the resource names a directory inside the collection, the whole
    /// directory is removed.
    pub fn delete(&self, collection: &str, resource: &str) -> Result<()> {
        let (collection, resource) = validate(collection, resource)?;

        self.with_lock(&collection, LockMode::Exclusive, || {
            let base = self.collection_dir(&collection).join(&resource);
            self.remove_resolved(&base, &collection, &resource)
        })
    }

    /// Deletes `collection` and every record in it
    pub fn delete_collection(&self, collection: &str) -> Result<()> {
        let collection = collection_key(collection)?;

        self.with_lock(&collection, LockMode::Exclusive, || {
            let base = self.collection_dir(&collection);
            self.remove_resolved(&base, &collection, "")
        })
    }

    /// Reads a record, applies `f` and writes the result back, all under the
    /// collection's exclusive lock. Returns the written value.
    pub fn update<T, F>(&self, collection: &str, resource: &str, f: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(T) -> T,
    {
        let (collection, resource) = validate(collection, resource)?;

        self.with_lock(&collection, LockMode::Exclusive, || {
            let current = self.read_record(&collection, &resource)?;
            let next = f(current);
            self.write_record(&collection, &resource, &next)?;
            Ok(next)
        })
    }

    fn read_mode(&self) -> LockMode {
        match self.read_locking {
            ReadLocking::Shared => LockMode::Shared,
            ReadLocking::None => LockMode::Unlocked,
        }
    }

    /// Runs `op` while holding the collection lock in `mode`.
    ///
    /// The lock map's own mutex is released before `op` starts; guards drop
    /// on every exit path.
    fn with_lock<R>(
        &self,
        collection: &str,
        mode: LockMode,
        op: impl FnOnce() -> Result<R>,
    ) -> Result<R> {
        if mode == LockMode::Unlocked {
            return op();
        }

        let lock = self.locks.get(collection);

        // The lock guards no data, so poisoning carries no broken invariant
        match mode {
            LockMode::Exclusive => {
                let _guard = lock.write().unwrap_or_else(PoisonError::into_inner);
                let _process = self.acquire_process_lock(collection, mode)?;
                op()
            }
            LockMode::Shared => {
                let _guard = lock.read().unwrap_or_else(PoisonError::into_inner);
                let _process = self.acquire_process_lock(collection, mode)?;
                op()
            }
            LockMode::Unlocked => op(),
        }
    }

    fn acquire_process_lock(&self, collection: &str, mode: LockMode) -> Result<Option<ProcessLock>> {
        if !self.process_lock {
            return Ok(None);
        }

        let lock = ProcessLock::acquire(&self.root, collection, mode)
            .map_err(|e| StoreError::io(&ProcessLock::path_for(&self.root, collection), e))?;

        if let Some(lock) = &lock {
            self.log(
                LogLevel::Trace,
                format_args!("Locked '{}' ({:?})", lock.path().display(), mode),
            );
        }

        Ok(lock)
    }

    fn write_record<T>(&self, collection: &str, resource: &str, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let dir = self.collection_dir(collection);
        create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;

        let mut bytes = to_json(value).map_err(|source| StoreError::Serialization {
            collection: collection.to_string(),
            resource: resource.to_string(),
            source,
        })?;
        bytes.push(b'\n');

        let final_path = record_path(&dir, resource);
        let tmp_path = temp_path(&final_path);

        write_synced(&tmp_path, &bytes).map_err(|e| StoreError::io(&tmp_path, e))?;

        if let Err(e) = fs::rename(&tmp_path, &final_path) {
            self.log(
                LogLevel::Warning,
                format_args!(
                    "Failed to move '{}' into place, temp file left behind",
                    tmp_path.display()
                ),
            );
            return Err(StoreError::io(&final_path, e));
        }

        self.log(
            LogLevel::Debug,
            format_args!("Wrote {} ({} bytes)", key(collection, resource), bytes.len()),
        );

        Ok(())
    }

    fn read_record<T>(&self, collection: &str, resource: &str) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let base = self.collection_dir(collection).join(resource);
        let path = resolve_record_path(&base)
            .ok_or_else(|| StoreError::not_found(collection, resource))?;

        let bytes = fs::read(&path).map_err(|e| self.io_or_missing(e, &path, collection, resource))?;

        self.log(
            LogLevel::Trace,
            format_args!("Read {} from '{}'", key(collection, resource), path.display()),
        );

        serde_json::from_slice(&bytes).map_err(|source| StoreError::Deserialization { path, source })
    }

    fn read_entries(&self, collection: &str) -> Result<Vec<(PathBuf, String)>> {
        let base = self.collection_dir(collection);
        let dir = resolve_record_path(&base).ok_or_else(|| StoreError::not_found(collection, ""))?;

        let mut paths = fs::read_dir(&dir)
            .and_then(|entries| {
                entries
                    .map(|entry| entry.map(|e| e.path()))
                    .collect::<io::Result<Vec<_>>>()
            })
            .map_err(|e| StoreError::io(&dir, e))?;
        paths.sort();

        let entries = paths
            .into_iter()
            .map(|path| match fs::read_to_string(&path) {
                Ok(content) => Ok((path, content)),
                Err(e) => Err(StoreError::io(&path, e)),
            })
            .collect::<Result<Vec<_>>>()?;

        self.log(
            LogLevel::Trace,
            format_args!("Read {} records from '{}'", entries.len(), dir.display()),
        );

        Ok(entries)
    }

    fn remove_resolved(&self, base: &Path, collection: &str, resource: &str) -> Result<()> {
        let target = resolve_record_path(base).ok_or_else(|| {
            self.log(
                LogLevel::Debug,
                format_args!("Nothing to delete at {}", key(collection, resource)),
            );
            StoreError::not_found(collection, resource)
        })?;

        let metadata = fs::symlink_metadata(&target)
            .map_err(|e| self.io_or_missing(e, &target, collection, resource))?;

        let removed = if metadata.is_dir() {
            fs::remove_dir_all(&target)
        } else {
            fs::remove_file(&target)
        };
        removed.map_err(|e| self.io_or_missing(e, &target, collection, resource))?;

        self.log(
            LogLevel::Debug,
            format_args!("Deleted '{}'", target.display()),
        );

        Ok(())
    }

    /// A path that vanished after resolution was deleted concurrently
    fn io_or_missing(&self, e: io::Error, path: &Path, collection: &str, resource: &str) -> StoreError {
        if e.kind() == io::ErrorKind::NotFound {
            StoreError::not_found(collection, resource)
        } else {
            self.log(
                LogLevel::Error,
                format_args!("I/O error on '{}': {}", path.display(), e),
            );
            StoreError::io(path, e)
        }
    }

    fn log(&self, level: LogLevel, message: fmt::Arguments<'_>) {
        if let Some(logger) = &self.logger {
            logger.log(level, &message.to_string());
        }
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("root", &self.root)
            .field("locked_collections", &self.locks.len())
            .field("logger", &self.logger.is_some())
            .field("read_locking", &self.read_locking)
            .field("process_lock", &self.process_lock)
            .finish()
    }
}

/// Normalized collection key; the lock map and the directory both use it
fn collection_key(collection: &str) -> Result<String> {
    let key = normalize_key(collection).map_err(|reason| StoreError::InvalidKey {
        key: collection.to_string(),
        reason,
    })?;

    if key.is_empty() {
        return Err(StoreError::MissingCollection);
    }

    if key.split('/').next() == Some(LOCK_DIR) {
        return Err(StoreError::InvalidKey {
            key: collection.to_string(),
            reason: "reserved for lock files",
        });
    }

    Ok(key)
}

fn resource_key(resource: &str) -> Result<String> {
    let key = normalize_key(resource).map_err(|reason| StoreError::InvalidKey {
        key: resource.to_string(),
        reason,
    })?;

    if key.is_empty() {
        return Err(StoreError::MissingResource);
    }

    Ok(key)
}

/// Checks both keys before any lock or I/O and returns their normalized form
fn validate(collection: &str, resource: &str) -> Result<(String, String)> {
    Ok((collection_key(collection)?, resource_key(resource)?))
}

/// Tab-indented JSON
fn to_json<T>(value: &T) -> serde_json::Result<Vec<u8>>
where
    T: Serialize + ?Sized,
{
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut serializer)?;
    Ok(buf)
}

fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;

    file.write_all(bytes)?;
    file.sync_all()
}

fn create_dir_all(path: &Path) -> io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(DIR_MODE);
    }

    builder.create(path)
}
