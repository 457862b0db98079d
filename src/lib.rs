//! jsondir - A directory-backed JSON document store
//!
//! Records are addressed by a collection name and a resource name and stored
//! as `<root>/<collection>/<resource>.json`. Writes are atomic and serialized
//! per collection.

pub mod storage;
pub mod cli;

pub use storage::{Store, StoreConfig, StoreError};
