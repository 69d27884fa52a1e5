//! Capture sessions and tunnels

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One monitored run of the tunnel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub tunnel_url: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }
}

/// Token for the session a store is currently writing into.
///
/// Returned by `RequestStore::start_session` and required by every write
/// that attaches requests to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    id: String,
    started_at: DateTime<Utc>,
}

impl SessionHandle {
    pub(crate) fn new(id: String, started_at: DateTime<Utc>) -> Self {
        Self { id, started_at }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

/// Public tunnel reported by the capture feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tunnel {
    pub name: String,
    pub public_url: String,
    pub proto: String,
    /// Local address the tunnel forwards to
    pub local_address: String,
}

/// Row counts for the history database
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub sessions: u64,
    pub requests: u64,
    pub starred: u64,
}
