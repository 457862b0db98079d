//! Main CLI application structure

use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use super::output::{Output, OutputFormat};
use crate::storage::{ConfigFile, Store, StoreConfig, TracingLogger};

#[derive(Parser)]
#[command(name = "jsondir")]
#[command(author, version, about = "Directory-backed JSON document store")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Store root directory
    #[arg(long, global = true, env = "JSONDIR_ROOT", default_value = "./db")]
    pub root: PathBuf,

    /// Config file (defaults to the global config.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Enable verbose output for debugging
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a record, replacing any previous version
    Write {
        /// Collection name
        collection: String,

        /// Resource name
        resource: String,

        /// JSON value, or `-` to read it from stdin
        value: String,
    },

    /// Print a record
    Read {
        /// Collection name
        collection: String,

        /// Resource name (with or without `.json`)
        resource: String,
    },

    /// Print every record in a collection
    ReadAll {
        /// Collection name
        collection: String,
    },

    /// Delete a record, or the whole collection when no resource is given
    Delete {
        /// Collection name
        collection: String,

        /// Resource name
        resource: Option<String>,
    },
}

/// Runs the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let output = Output::new(cli.format, cli.verbose);

    let config = load_config(cli.config.as_deref())?;
    output.verbose(&format!(
        "Opening {} (read locking: {}, process lock: {})",
        cli.root.display(),
        config.read_locking.as_str(),
        config.process_lock
    ));

    let store = Store::open(&cli.root, StoreConfig::from(config).with_logger(TracingLogger))
        .with_context(|| format!("Failed to open store at {}", cli.root.display()))?;

    match cli.command {
        Commands::Write {
            collection,
            resource,
            value,
        } => cmd_write(&store, &output, &collection, &resource, &value),
        Commands::Read {
            collection,
            resource,
        } => cmd_read(&store, &output, &collection, &resource),
        Commands::ReadAll { collection } => cmd_read_all(&store, &output, &collection),
        Commands::Delete {
            collection,
            resource,
        } => cmd_delete(&store, &output, &collection, resource.as_deref()),
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "jsondir=debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    // A subscriber may already be installed when embedded
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_target(false)
        .try_init();
}

fn load_config(path: Option<&Path>) -> Result<ConfigFile> {
    match path {
        Some(path) => ConfigFile::load(path),
        None => ConfigFile::load_global(),
    }
}

fn cmd_write(
    store: &Store,
    output: &Output,
    collection: &str,
    resource: &str,
    value: &str,
) -> Result<()> {
    let raw = if value == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read record from stdin")?;
        buf
    } else {
        value.to_string()
    };

    let record: Value = serde_json::from_str(&raw).context("Record value is not valid JSON")?;

    store
        .write(collection, resource, &record)
        .with_context(|| format!("Failed to write {}/{}", collection, resource))?;

    output.success(&format!("Wrote {}/{}", collection, resource));
    Ok(())
}

fn cmd_read(store: &Store, output: &Output, collection: &str, resource: &str) -> Result<()> {
    let record: Value = store
        .read(collection, resource)
        .with_context(|| format!("Failed to read {}/{}", collection, resource))?;

    output.data(&record);
    Ok(())
}

fn cmd_read_all(store: &Store, output: &Output, collection: &str) -> Result<()> {
    if output.is_json() {
        let records: Vec<Value> = store
            .read_all_as(collection)
            .with_context(|| format!("Failed to read collection {}", collection))?;
        output.data(&records);
        return Ok(());
    }

    let records = store
        .read_all(collection)
        .with_context(|| format!("Failed to read collection {}", collection))?;

    output.verbose(&format!("{} records in {}", records.len(), collection));
    for record in &records {
        output.raw(record);
    }

    Ok(())
}

fn cmd_delete(
    store: &Store,
    output: &Output,
    collection: &str,
    resource: Option<&str>,
) -> Result<()> {
    match resource {
        Some(resource) => {
            store
                .delete(collection, resource)
                .with_context(|| format!("Failed to delete {}/{}", collection, resource))?;
            output.success(&format!("Deleted {}/{}", collection, resource));
        }
        None => {
            store
                .delete_collection(collection)
                .with_context(|| format!("Failed to delete collection {}", collection))?;
            output.success(&format!("Deleted collection {}", collection));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_delete_without_resource() {
        let cli = Cli::try_parse_from(["jsondir", "--root", "/tmp/db", "delete", "users"]).unwrap();

        assert_eq!(cli.root, PathBuf::from("/tmp/db"));
        match cli.command {
            Commands::Delete {
                collection,
                resource,
            } => {
                assert_eq!(collection, "users");
                assert!(resource.is_none());
            }
            _ => panic!("expected delete"),
        }
    }

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["jsondir", "read", "users", "john", "-f", "json", "-v"])
            .unwrap();

        assert_eq!(cli.format, OutputFormat::Json);
        assert!(cli.verbose);
    }
}
