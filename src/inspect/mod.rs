//! Request inspection: filter chains, free-text search and body decoding
//!
//! The visible set is always `search(filter(working_set))`, keeping the
//! working set's order.

pub mod body;
mod filter;
mod search;

pub use body::{body_size, body_text, decode_message};
pub use filter::{matches, matches_filter};
pub use search::matches_search;

use crate::models::{CapturedRequest, FilterChain};

/// Narrow a working set with a filter chain, then a search query
pub fn visible_set<'a>(
    working_set: &'a [CapturedRequest],
    chain: &FilterChain,
    query: &str,
) -> Vec<&'a CapturedRequest> {
    let filtered: Vec<&CapturedRequest> = working_set
        .iter()
        .filter(|req| matches(req, chain))
        .collect();
    if query.is_empty() {
        return filtered;
    }
    filtered
        .into_iter()
        .filter(|req| matches_search(req, query))
        .collect()
}
