//! Inspector configuration

use crate::feed::DEFAULT_BASE_URL;
use crate::storage::{default_db_path, DEFAULT_KEEP_COUNT, DEFAULT_KEEP_DAYS};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variables read by the binary's `--api-url` and `--db` flags
pub const ENV_API_URL: &str = "NGROK_API_URL";
pub const ENV_DB_PATH: &str = "MOLE_DB_PATH";

#[derive(Debug, Clone, PartialEq)]
pub struct InspectorConfig {
    /// Base URL of the ngrok agent API
    pub api_url: String,
    /// History database location
    pub db_path: PathBuf,
    /// Retention applied once at startup
    pub keep_days: u32,
    pub keep_count: u32,
    /// Requests pulled from the feed per refresh
    pub fetch_limit: usize,
    /// Refresh cadence while the request list has focus
    pub active_poll: Duration,
    /// Refresh cadence otherwise
    pub idle_poll: Duration,
}

impl Default for InspectorConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_BASE_URL.to_string(),
            db_path: default_db_path(),
            keep_days: DEFAULT_KEEP_DAYS,
            keep_count: DEFAULT_KEEP_COUNT,
            fetch_limit: 50,
            active_poll: Duration::from_millis(300),
            idle_poll: Duration::from_secs(2),
        }
    }
}

impl InspectorConfig {
    /// Apply optional overrides; empty values are ignored
    pub fn with_overrides(mut self, api_url: Option<String>, db_path: Option<PathBuf>) -> Self {
        if let Some(url) = api_url.filter(|u| !u.trim().is_empty()) {
            self.api_url = url;
        }
        if let Some(path) = db_path.filter(|p| !p.as_os_str().is_empty()) {
            self.db_path = path;
        }
        self
    }

    /// Directory holding the database and logs
    pub fn data_dir(&self) -> &Path {
        self.db_path.parent().unwrap_or_else(|| Path::new("."))
    }

    pub fn poll_interval(&self, focused: bool) -> Duration {
        if focused {
            self.active_poll
        } else {
            self.idle_poll
        }
    }
}
