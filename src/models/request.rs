//! Captured HTTP request model
//!
//! A single request/response pair observed on the tunnel, either freshly
//! pulled from the capture feed or rebuilt from the history database.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Header multimap: name → ordered values.
///
/// Names are stored exactly as received. The map is ordered by key so that
/// iteration, search and serialization are reproducible.
pub type HeaderMap = BTreeMap<String, Vec<String>>;

/// Case-insensitive header lookup returning the first value of the first
/// matching name.
pub fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, values)| key.eq_ignore_ascii_case(name) && !values.is_empty())
        .map(|(_, values)| values[0].as_str())
}

/// Represents a single captured HTTP transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedRequest {
    /// Unique identifier assigned by the capture feed
    pub id: String,

    /// HTTP method
    pub method: String,

    /// Request URI (path and query)
    pub path: String,

    /// Request headers
    pub request_headers: HeaderMap,
    /// Raw request payload, usually the base64 encoded HTTP message
    pub request_body: Vec<u8>,

    /// Response headers
    pub response_headers: HeaderMap,
    /// Raw response payload, usually the base64 encoded HTTP message
    pub response_body: Vec<u8>,

    /// HTTP status code (0 when the response never completed)
    pub status_code: u16,
    /// Total round trip in milliseconds
    pub duration_ms: i64,
    /// When the request started
    pub timestamp: DateTime<Utc>,

    pub starred: bool,
    /// Owning session; empty for live requests that were never persisted
    pub session_id: String,
}

impl CapturedRequest {
    pub fn new(id: impl Into<String>, method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            method: method.into(),
            path: path.into(),
            request_headers: HeaderMap::new(),
            request_body: Vec::new(),
            response_headers: HeaderMap::new(),
            response_body: Vec::new(),
            status_code: 0,
            duration_ms: 0,
            timestamp: Utc::now(),
            starred: false,
            session_id: String::new(),
        }
    }

    /// First value of a request header, matched case-insensitively
    pub fn request_header(&self, name: &str) -> Option<&str> {
        header_value(&self.request_headers, name)
    }

    /// Get duration as formatted string
    pub fn duration_str(&self) -> String {
        if self.duration_ms < 1000 {
            format!("{}ms", self.duration_ms)
        } else {
            format!("{:.1}s", self.duration_ms as f64 / 1000.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_ignores_case() {
        let mut req = CapturedRequest::new("r1", "GET", "/");
        req.request_headers
            .insert("Content-Type".into(), vec!["application/json".into(), "x".into()]);

        assert_eq!(req.request_header("content-type"), Some("application/json"));
        assert_eq!(req.request_header("CONTENT-TYPE"), Some("application/json"));
        assert_eq!(req.request_header("accept"), None);
    }

    #[test]
    fn header_with_no_values_is_skipped() {
        let mut headers = HeaderMap::new();
        headers.insert("Accept".into(), vec![]);
        headers.insert("accept".into(), vec!["text/html".into()]);
        assert_eq!(header_value(&headers, "ACCEPT"), Some("text/html"));
    }

    #[test]
    fn duration_formatting() {
        let mut req = CapturedRequest::new("r1", "GET", "/");
        req.duration_ms = 250;
        assert_eq!(req.duration_str(), "250ms");
        req.duration_ms = 1500;
        assert_eq!(req.duration_str(), "1.5s");
    }
}
