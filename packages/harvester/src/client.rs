//! HTTP client factory.
//!
//! Builds one `reqwest::Client` per worker with browser-like headers and a
//! bounded connection pool. reqwest never retries on its own, so every
//! retry decision stays in [`crate::fetch`].

use std::time::Duration;

use reqwest::header::{self, HeaderMap, HeaderValue};
use tracing::debug;

use crate::error::{HarvestError, Result};
use crate::traits::transport::ReqwestTransport;
use crate::types::config::HarvestConfig;

const MAX_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const MAX_REDIRECTS: usize = 5;

fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(
        header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("pl-PL,pl;q=0.9,en-US;q=0.8,en;q=0.5"),
    );
    // No brotli: keeps decoder memory down on long runs
    headers.insert(
        header::ACCEPT_ENCODING,
        HeaderValue::from_static("gzip, deflate"),
    );
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(
        header::UPGRADE_INSECURE_REQUESTS,
        HeaderValue::from_static("1"),
    );
    headers
}

/// Build the client for one worker.
pub fn build_client(config: &HarvestConfig, worker_index: usize) -> Result<reqwest::Client> {
    let user_agent = config.user_agent_for(worker_index);
    debug!(worker = worker_index, user_agent = %user_agent, "Building HTTP client");

    reqwest::Client::builder()
        .timeout(config.request_timeout)
        .connect_timeout(config.request_timeout.min(MAX_CONNECT_TIMEOUT))
        .user_agent(user_agent)
        .default_headers(default_headers())
        .pool_max_idle_per_host(config.effective_pool_size())
        .pool_idle_timeout(POOL_IDLE_TIMEOUT)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .build()
        .map_err(HarvestError::Client)
}

/// Build a worker's transport around a fresh client.
pub fn build_transport(config: &HarvestConfig, worker_index: usize) -> Result<ReqwestTransport> {
    build_client(config, worker_index).map(ReqwestTransport::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_headers() {
        let headers = default_headers();
        assert_eq!(headers[header::ACCEPT_ENCODING], "gzip, deflate");
        assert!(headers.contains_key(header::ACCEPT));
        assert!(headers.contains_key(header::ACCEPT_LANGUAGE));
    }

    #[test]
    fn test_build_client_per_worker() {
        let config = HarvestConfig::new().with_workers(3);
        for worker in 0..3 {
            assert!(build_client(&config, worker).is_ok());
        }
    }
}
