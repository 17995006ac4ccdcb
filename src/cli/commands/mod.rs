//! Command implementations.

pub mod auth;
pub mod checkpoint;
pub mod completions;
pub mod status;
pub mod sync;
pub mod version;

use std::path::PathBuf;

use crate::config::resolve_db_path;
use crate::error::{Error, Result};
use crate::storage::SqliteCollection;

/// Open an existing collection; a missing database is `NotInitialized`.
fn open_existing(db_path: Option<&PathBuf>) -> Result<SqliteCollection> {
    let db_path = resolve_db_path(db_path.map(PathBuf::as_path)).ok_or(Error::NotInitialized)?;

    if !db_path.exists() {
        return Err(Error::NotInitialized);
    }
    SqliteCollection::open(&db_path)
}

/// Open the collection, creating the database file and its directory if needed.
fn open_or_create(db_path: Option<&PathBuf>) -> Result<SqliteCollection> {
    let db_path = resolve_db_path(db_path.map(PathBuf::as_path)).ok_or(Error::NotInitialized)?;

    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    SqliteCollection::open(&db_path)
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Error::Other(format!("Failed to create async runtime: {e}")))
}
