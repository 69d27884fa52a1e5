//! JSON export of sessions and hand-picked requests
//!
//! The document shape is the compatibility contract for exported files:
//! there is no version tag, so fields are only ever added.

use crate::inspect::body_text;
use crate::models::{CapturedRequest, HeaderMap, Session};
use crate::storage::error::{StoreError, StoreResult};
use crate::storage::request_store::RequestStore;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedSession {
    pub id: String,
    pub tunnel_url: String,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    pub requests: Vec<ExportedRequest>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedRequest {
    pub id: String,
    pub method: String,
    pub path: String,
    pub status_code: u16,
    pub duration_ms: i64,
    pub timestamp: DateTime<Utc>,
    pub request: ExportedHttpData,
    pub response: ExportedHttpData,
    pub starred: bool,
}

/// Headers plus the decoded textual body of one side of the exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedHttpData {
    pub headers: HeaderMap,
    pub body: String,
}

impl From<&CapturedRequest> for ExportedRequest {
    fn from(req: &CapturedRequest) -> Self {
        Self {
            id: req.id.clone(),
            method: req.method.clone(),
            path: req.path.clone(),
            status_code: req.status_code,
            duration_ms: req.duration_ms,
            timestamp: req.timestamp,
            request: ExportedHttpData {
                headers: req.request_headers.clone(),
                body: body_text(&req.request_body),
            },
            response: ExportedHttpData {
                headers: req.response_headers.clone(),
                body: body_text(&req.response_body),
            },
            starred: req.starred,
        }
    }
}

impl ExportedSession {
    pub fn new(session: &Session, requests: &[CapturedRequest]) -> Self {
        Self {
            id: session.id.clone(),
            tunnel_url: session.tunnel_url.clone(),
            started_at: session.started_at,
            ended_at: session.ended_at,
            requests: requests.iter().map(ExportedRequest::from).collect(),
        }
    }
}

/// `mole_export_YYYY-MM-DD_HH-MM-SS.json` in local time
pub fn default_export_filename() -> String {
    format!("mole_export_{}.json", Local::now().format("%Y-%m-%d_%H-%M-%S"))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> StoreResult<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            fs::create_dir_all(dir)?;
        }
    }
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}

impl RequestStore {
    /// Write a session and its requests, in store order, to `path`.
    /// Returns the number of exported requests.
    pub fn export_session(&self, session_id: &str, path: impl AsRef<Path>) -> StoreResult<usize> {
        if !self.is_enabled() {
            return Ok(0);
        }
        let session = self.get_session(session_id)?;
        let requests = self.get_session_requests(session_id)?;
        let document = ExportedSession::new(&session, &requests);
        write_json(path.as_ref(), &document)?;

        tracing::info!(
            "Exported session {} ({} requests) to {}",
            session_id,
            document.requests.len(),
            path.as_ref().display()
        );
        Ok(document.requests.len())
    }

    /// Export the session currently accepting writes
    pub fn export_current_session(&self, path: impl AsRef<Path>) -> StoreResult<usize> {
        if !self.is_enabled() {
            return Ok(0);
        }
        let session_id = self
            .open_session_id()
            .ok_or(StoreError::NoActiveSession)?
            .to_string();
        self.export_session(&session_id, path)
    }

    /// Write the given requests as a flat array in input order. Unknown ids
    /// are skipped.
    pub fn export_requests(&self, ids: &[String], path: impl AsRef<Path>) -> StoreResult<usize> {
        if !self.is_enabled() {
            return Ok(0);
        }
        let mut exported = Vec::with_capacity(ids.len());
        for id in ids {
            match self.get_request(id)? {
                Some(req) => exported.push(ExportedRequest::from(&req)),
                None => tracing::debug!("Skipping unknown request {} in export", id),
            }
        }
        write_json(path.as_ref(), &exported)?;

        tracing::info!(
            "Exported {} of {} requests to {}",
            exported.len(),
            ids.len(),
            path.as_ref().display()
        );
        Ok(exported.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose, Engine as _};
    use chrono::Duration;
    use tempfile::tempdir;

    fn sample(id: &str, age_secs: i64) -> CapturedRequest {
        let mut req = CapturedRequest::new(id, "POST", format!("/hooks/{id}"));
        req.status_code = 201;
        req.duration_ms = 37;
        req.timestamp = Utc::now() - Duration::seconds(age_secs);
        req.request_headers
            .insert("Content-Type".into(), vec!["application/json".into()]);
        req.response_headers
            .insert("Set-Cookie".into(), vec!["a=1".into(), "b=2".into()]);
        req.request_body = general_purpose::STANDARD
            .encode(format!("POST /hooks/{id} HTTP/1.1\r\n\r\n{{\"id\":\"{id}\"}}"))
            .into_bytes();
        req.response_body = b"plain, not encoded".to_vec();
        req
    }

    #[test]
    fn export_session_round_trips() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("out").join("session.json");

        let mut store = RequestStore::open_in_memory().unwrap();
        let session = store.start_session("https://demo.ngrok.app").unwrap();
        store.save_request(&session, &sample("r1", 20)).unwrap();
        store.save_request(&session, &sample("r2", 10)).unwrap();

        assert_eq!(store.export_session(session.id(), &path).unwrap(), 2);

        let text = fs::read_to_string(&path).unwrap();
        let doc: ExportedSession = serde_json::from_str(&text).unwrap();
        assert_eq!(doc.id, session.id());
        assert_eq!(doc.tunnel_url, "https://demo.ngrok.app");
        assert!(doc.ended_at.is_none());
        assert!(!text.contains("ended_at"));

        let stored = store.get_session_requests(session.id()).unwrap();
        assert_eq!(doc.requests.len(), stored.len());
        for (exported, saved) in doc.requests.iter().zip(&stored) {
            assert_eq!(exported.method, saved.method);
            assert_eq!(exported.path, saved.path);
            assert_eq!(exported.status_code, saved.status_code);
            assert_eq!(exported.request.headers, saved.request_headers);
            assert_eq!(exported.response.headers, saved.response_headers);
            assert_eq!(exported.request.body, body_text(&saved.request_body));
            assert_eq!(exported.response.body, body_text(&saved.response_body));
        }
        assert_eq!(doc.requests[0].id, "r2");
        assert_eq!(doc.requests[0].request.body, "{\"id\":\"r2\"}");
        assert_eq!(doc.requests[0].response.body, "plain, not encoded");
    }

    #[test]
    fn export_unknown_session_is_not_found() {
        let dir = tempdir().expect("tempdir");
        let store = RequestStore::open_in_memory().unwrap();
        let err = store
            .export_session("session_missing", dir.path().join("x.json"))
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert!(!dir.path().join("x.json").exists());
    }

    #[test]
    fn export_requests_keeps_input_order_and_skips_missing() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("picked.json");

        let mut store = RequestStore::open_in_memory().unwrap();
        let session = store.start_session("https://demo.ngrok.app").unwrap();
        for (id, age) in [("a", 30), ("b", 20), ("c", 10)] {
            store.save_request(&session, &sample(id, age)).unwrap();
        }

        let ids: Vec<String> = ["c", "ghost", "a"].iter().map(|s| s.to_string()).collect();
        assert_eq!(store.export_requests(&ids, &path).unwrap(), 2);

        let exported: Vec<ExportedRequest> =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let ids: Vec<_> = exported.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a"]);
    }

    #[test]
    fn export_current_requires_open_session() {
        let dir = tempdir().expect("tempdir");
        let mut store = RequestStore::open_in_memory().unwrap();
        assert!(matches!(
            store.export_current_session(dir.path().join("a.json")),
            Err(StoreError::NoActiveSession)
        ));

        let session = store.start_session("https://demo.ngrok.app").unwrap();
        store.save_request(&session, &sample("r1", 1)).unwrap();
        assert_eq!(store.export_current_session(dir.path().join("a.json")).unwrap(), 1);
    }

    #[test]
    fn disabled_store_does_not_write_exports() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("never.json");
        let store = RequestStore::disabled();
        assert_eq!(store.export_session("session_1", &path).unwrap(), 0);
        assert_eq!(store.export_requests(&["r1".to_string()], &path).unwrap(), 0);
        assert!(!path.exists());
    }

    #[test]
    fn default_filename_shape() {
        let name = default_export_filename();
        assert!(name.starts_with("mole_export_"));
        assert!(name.ends_with(".json"));
        // mole_export_ + YYYY-MM-DD_HH-MM-SS + .json
        assert_eq!(name.len(), "mole_export_".len() + 19 + ".json".len());
    }
}
