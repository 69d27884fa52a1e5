//! Working set ownership and history browsing
//!
//! The working set is either the latest live batch from the capture feed or
//! the full request list of one stored session. While a stored session is
//! loaded, live batches are dropped; they are not queued for later.

use crate::models::{CapturedRequest, Session};
use crate::storage::{RequestStore, StoreResult};

#[derive(Debug, Default)]
pub struct SessionManager {
    working_set: Vec<CapturedRequest>,
    viewing: Option<Session>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the working set with a stored session and enter history mode
    pub fn load_session(
        &mut self,
        store: &RequestStore,
        session_id: &str,
    ) -> StoreResult<&[CapturedRequest]> {
        let session = store.get_session(session_id)?;
        let requests = store.get_session_requests(session_id)?;
        tracing::info!(
            "Viewing stored session {} ({} requests)",
            session.id,
            requests.len()
        );
        self.viewing = Some(session);
        self.working_set = requests;
        Ok(&self.working_set)
    }

    /// Leave history mode. The working set is emptied until the next live
    /// batch arrives.
    pub fn exit_history(&mut self) {
        if let Some(session) = self.viewing.take() {
            tracing::info!("Left stored session {}", session.id);
            self.working_set.clear();
        }
    }

    /// Offer a live batch. Returns false when it was dropped because a
    /// stored session is being viewed.
    pub fn apply_live(&mut self, requests: Vec<CapturedRequest>) -> bool {
        if self.viewing.is_some() {
            return false;
        }
        self.working_set = requests;
        true
    }

    pub fn working_set(&self) -> &[CapturedRequest] {
        &self.working_set
    }

    pub fn is_viewing_history(&self) -> bool {
        self.viewing.is_some()
    }

    pub fn viewing_session(&self) -> Option<&Session> {
        self.viewing.as_ref()
    }

    /// Update the starred flag of a request in the working set
    pub fn mark_starred(&mut self, request_id: &str, starred: bool) {
        if let Some(req) = self.working_set.iter_mut().find(|r| r.id == request_id) {
            req.starred = starred;
        }
    }

    /// Stored sessions available for browsing, excluding the live one
    pub fn history_sessions(
        store: &RequestStore,
        current: Option<&str>,
    ) -> StoreResult<Vec<Session>> {
        let mut sessions = store.get_sessions()?;
        if let Some(current) = current {
            sessions.retain(|s| s.id != current);
        }
        Ok(sessions)
    }
}
