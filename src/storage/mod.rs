//! Durable capture history (SQLite)

mod error;
mod export;
mod request_store;

pub use error::{StoreError, StoreResult};
pub use export::{default_export_filename, ExportedHttpData, ExportedRequest, ExportedSession};
pub use request_store::{CleanupReport, RequestStore};

use std::path::PathBuf;

/// Retention applied at startup: requests younger than this are always kept
pub const DEFAULT_KEEP_DAYS: u32 = 7;
/// Retention applied at startup: this many newest requests are always kept
pub const DEFAULT_KEEP_COUNT: u32 = 1000;

/// `~/.mole/history.db`, or `./.mole/history.db` when no home directory is known
pub fn default_db_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".mole")
        .join("history.db")
}
