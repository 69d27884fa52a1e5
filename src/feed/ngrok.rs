//! ngrok agent inspection API client
//!
//! Endpoints used:
//! - `GET /api` (availability)
//! - `GET /api/tunnels`
//! - `GET /api/requests/http?limit=N`
//! - `POST /api/requests/http` with `{"id": ...}` (replay)

use super::{CaptureFeed, FeedError};
use crate::models::{CapturedRequest, HeaderMap, Tunnel};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:4040";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// ngrok sends `null` for empty maps, lists and absent responses
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NgrokTunnel {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub public_url: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub proto: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub config: NgrokTunnelConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NgrokTunnelConfig {
    #[serde(default, deserialize_with = "null_as_default")]
    pub addr: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub inspect: bool,
}

#[derive(Debug, Deserialize)]
struct TunnelsResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    tunnels: Vec<NgrokTunnel>,
}

/// One side of a captured exchange as ngrok reports it
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NgrokHttpData {
    #[serde(default, deserialize_with = "null_as_default")]
    pub method: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub proto: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub headers: HeaderMap,
    #[serde(default, deserialize_with = "null_as_default")]
    pub uri: String,
    /// Base64 encoded raw HTTP message
    #[serde(default, deserialize_with = "null_as_default")]
    pub raw: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NgrokRequest {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tunnel_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub remote_addr: String,
    pub start: DateTime<Utc>,
    /// Nanoseconds
    #[serde(default, deserialize_with = "null_as_default")]
    pub duration: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub request: NgrokHttpData,
    #[serde(default, deserialize_with = "null_as_default")]
    pub response: NgrokHttpData,
    /// e.g. "200 OK"
    #[serde(default, deserialize_with = "null_as_default")]
    pub response_status: String,
}

#[derive(Debug, Deserialize)]
struct RequestsResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    requests: Vec<NgrokRequest>,
}

#[derive(Debug, Serialize)]
struct ReplayBody<'a> {
    id: &'a str,
}

impl NgrokRequest {
    /// Numeric status from the leading three characters of
    /// `response_status`; 0 while no response has been recorded.
    pub fn status_code(&self) -> u16 {
        let bytes = self.response_status.as_bytes();
        if bytes.len() < 3 {
            return 0;
        }
        bytes[..3]
            .iter()
            .filter(|b| b.is_ascii_digit())
            .fold(0u16, |code, b| code * 10 + u16::from(b - b'0'))
    }

    pub fn duration_ms(&self) -> i64 {
        self.duration / 1_000_000
    }
}

impl From<NgrokRequest> for CapturedRequest {
    fn from(wire: NgrokRequest) -> Self {
        let status_code = wire.status_code();
        let duration_ms = wire.duration_ms();
        CapturedRequest {
            id: wire.id,
            method: wire.request.method,
            path: wire.request.uri,
            request_headers: wire.request.headers,
            request_body: wire.request.raw.into_bytes(),
            response_headers: wire.response.headers,
            response_body: wire.response.raw.into_bytes(),
            status_code,
            duration_ms,
            timestamp: wire.start,
            starred: false,
            session_id: String::new(),
        }
    }
}

impl From<NgrokTunnel> for Tunnel {
    fn from(wire: NgrokTunnel) -> Self {
        Tunnel {
            name: wire.name,
            public_url: wire.public_url,
            proto: wire.proto,
            local_address: wire.config.addr,
        }
    }
}

/// HTTP client for the ngrok agent API
#[derive(Debug, Clone)]
pub struct NgrokClient {
    base_url: String,
    http: reqwest::Client,
}

impl NgrokClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, FeedError> {
        let mut base_url = base_url.into();
        if base_url.is_empty() {
            base_url = DEFAULT_BASE_URL.to_string();
        }
        let base_url = base_url.trim_end_matches('/').to_string();
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .no_proxy()
            .build()?;
        Ok(Self { base_url, http })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, FeedError> {
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status {
                method: "GET",
                path: path.to_string(),
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl CaptureFeed for NgrokClient {
    async fn tunnels(&self) -> Result<Vec<Tunnel>, FeedError> {
        let response: TunnelsResponse = self.get_json("/api/tunnels").await?;
        Ok(response.tunnels.into_iter().map(Tunnel::from).collect())
    }

    async fn requests(&self, limit: usize) -> Result<Vec<CapturedRequest>, FeedError> {
        let path = if limit > 0 {
            format!("/api/requests/http?limit={limit}")
        } else {
            "/api/requests/http".to_string()
        };
        let response: RequestsResponse = self.get_json(&path).await?;
        Ok(response
            .requests
            .into_iter()
            .map(CapturedRequest::from)
            .collect())
    }

    async fn replay(&self, request_id: &str) -> Result<(), FeedError> {
        let path = "/api/requests/http";
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .json(&ReplayBody { id: request_id })
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            tracing::info!("Replayed request {}", request_id);
            return Ok(());
        }
        Err(FeedError::Status {
            method: "POST",
            path: path.to_string(),
            status: status.as_u16(),
            body: response.text().await.unwrap_or_default(),
        })
    }

    async fn is_available(&self) -> bool {
        match self.http.get(format!("{}/api", self.base_url)).send().await {
            Ok(response) => response.status() == reqwest::StatusCode::OK,
            Err(_) => false,
        }
    }
}
