//! # Storage Layer
//!
//! A directory-backed JSON document store.
//!
//! ## On-disk Layout
//!
//! ```text
//! <root>/
//! ├── users/                # one directory per collection
//! │   ├── john.json         # one file per resource (tab-indented JSON)
//! │   └── jane.json
//! └── .locks/               # advisory lock files (only with process_lock)
//!     └── users.lock
//! ```
//!
//! ## Concurrency Safety
//!
//! - Each collection has one reader-writer lock, created on first use
//! - [`Store::write`], [`Store::delete`] and [`Store::update`] hold it exclusively
//! - Reads hold it shared, or not at all with [`ReadLocking::None`]
//! - All writes are atomic (temp file + rename)
//! - Optional `fs2` file locks extend this across processes
//!
//! ## Key Types
//!
//! - [`Store`] - Entry point for reading and writing records
//! - [`StoreConfig`] - Options for [`Store::open`]
//! - [`Logger`] - Pluggable logging, with [`TracingLogger`] as the `tracing` bridge
//! - [`ConfigFile`] - TOML-backed settings

mod config;
mod locks;
mod logger;
mod path;
mod store;

pub use config::{ConfigError, ConfigFile, ReadLocking, StoreConfig};
pub use logger::{LogLevel, Logger, TracingLogger};
pub use path::{normalize_key, normalize_path, resolve_record_path};
pub use store::{ErrorKind, Result, Store, StoreError};
