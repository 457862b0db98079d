//! # Command-Line Interface
//!
//! Thin CLI over the [`Store`](crate::storage::Store) operations.
//!
//! ## Commands
//!
//! | Command | Purpose |
//! |---------|---------|
//! | `write <collection> <resource> <json>` | Write or replace a record (`-` reads stdin) |
//! | `read <collection> <resource>` | Print one record |
//! | `read-all <collection>` | Print every record in a collection |
//! | `delete <collection> [resource]` | Delete a record, or the whole collection |
//!
//! ## Output Formats
//!
//! All commands support `--format`:
//! - `text` (default) - Human-readable output
//! - `json` - Machine-parseable JSON
//!
//! ## Verbose Mode
//!
//! `--verbose` (or `-v`) enables debug logging from the store:
//! ```bash
//! jsondir --verbose --root ./db read users john
//! ```
//!
//! `RUST_LOG` overrides the log filter when set.

mod app;
mod output;

pub use app::{Cli, Commands, run};
pub use output::{Output, OutputFormat};
