//! Free-text search over a request's fields

use crate::inspect::body::body_text;
use crate::models::{CapturedRequest, HeaderMap};

/// Case-insensitive substring search. An empty query matches everything.
pub fn matches_search(req: &CapturedRequest, query: &str) -> bool {
    if query.is_empty() {
        return true;
    }
    let query = query.to_lowercase();

    req.method.to_lowercase().contains(&query)
        || req.path.to_lowercase().contains(&query)
        || req.status_code.to_string().contains(&query)
        || headers_contain(&req.request_headers, &query)
        || headers_contain(&req.response_headers, &query)
        || body_text(&req.request_body).to_lowercase().contains(&query)
        || body_text(&req.response_body).to_lowercase().contains(&query)
}

fn headers_contain(headers: &HeaderMap, query: &str) -> bool {
    headers.iter().any(|(key, values)| {
        values
            .iter()
            .any(|value| format!("{key}: {value}").to_lowercase().contains(query))
    })
}
