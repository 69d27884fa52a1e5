//! Capture feed: where live tunnels and requests come from
//!
//! The inspector only talks to the [`CaptureFeed`] trait. [`NgrokClient`]
//! implements it against the ngrok agent's local inspection API.

mod ngrok;

pub use ngrok::{NgrokClient, NgrokRequest, NgrokTunnel, DEFAULT_BASE_URL};

use crate::models::{CapturedRequest, Tunnel};
use async_trait::async_trait;
use thiserror::Error;

/// Transport-level failures talking to the capture feed
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("capture feed request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{method} {path}: status {status}: {body}")]
    Status {
        method: &'static str,
        path: String,
        status: u16,
        body: String,
    },

    #[error("no tunnel is running")]
    NoTunnel,
}

/// Source of captured traffic
#[async_trait]
pub trait CaptureFeed: Send + Sync {
    /// Currently running tunnels
    async fn tunnels(&self) -> Result<Vec<Tunnel>, FeedError>;

    /// The most recent `limit` requests, newest first
    async fn requests(&self, limit: usize) -> Result<Vec<CapturedRequest>, FeedError>;

    /// Ask the feed to re-send a captured request
    async fn replay(&self, request_id: &str) -> Result<(), FeedError>;

    /// Whether the feed is reachable at all
    async fn is_available(&self) -> bool;
}
