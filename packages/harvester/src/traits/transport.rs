//! Transport trait: the single network call the fetch unit retries around.

use async_trait::async_trait;

use crate::error::TransportError;

/// Status and body of one HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// 200 with the given body.
    pub fn ok(body: impl Into<String>) -> Self {
        Self::new(200, body)
    }
}

/// Issues exactly one GET per call.
///
/// Implementations must not retry internally; the retry policy lives in
/// [`crate::fetch::Fetcher`]. Each worker owns its own transport.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch a URL, reading the full body.
    ///
    /// Non-200 statuses are returned as `Ok`; only network-level failures
    /// (timeouts, connection resets, body read errors) are `Err`.
    async fn get(&self, url: &str) -> Result<RawResponse, TransportError>;
}

/// Transport backed by a worker-owned `reqwest::Client`.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &str) -> Result<RawResponse, TransportError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(url, e))?;

        let status = response.status().as_u16();

        // Body is read even for errors so the connection goes back to the pool.
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::from_reqwest(url, e))?;

        Ok(RawResponse { status, body })
    }
}
