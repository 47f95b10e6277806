//! Fetch-with-backoff unit.
//!
//! The only retry loop in the crate. Given a URL it returns a [`Document`] or a
//! definitive [`FetchFailure`]:
//!
//! - 200: success
//! - 429 / 503: rate limited, back off and retry
//! - network error: back off and retry
//! - anything else: permanent failure, no retry
//!
//! The fetcher holds no shared state. Each worker owns one, wrapping its own
//! transport, so concurrent workers never contend on anything here.

use std::time::Duration;

use scraper::Html;
use tracing::{debug, warn};

use crate::error::{FetchFailure, FetchResult};
use crate::traits::sleeper::{Sleeper, TokioSleeper};
use crate::traits::transport::Transport;
use crate::types::config::HarvestConfig;

/// Statuses that mean "slow down", not "go away".
const TRANSIENT_STATUSES: [u16; 2] = [429, 503];

/// A successfully fetched page.
///
/// Holds the raw markup; [`Document::parse`] builds the tree. The tree is not
/// `Send`, so it is built and dropped inside synchronous extraction code and
/// never held across an await point.
#[derive(Debug, Clone)]
pub struct Document {
    pub url: String,
    pub body: String,
}

impl Document {
    pub fn new(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            body: body.into(),
        }
    }

    /// Parse the body into a document tree.
    pub fn parse(&self) -> Html {
        Html::parse_document(&self.body)
    }
}

/// Exponential backoff with jitter.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(60),
            jitter: 0.25,
        }
    }
}

impl BackoffPolicy {
    pub fn from_config(config: &HarvestConfig) -> Self {
        Self {
            base: config.backoff_base,
            max: config.backoff_max,
            jitter: config.jitter,
        }
    }

    /// Backoff without randomization, for deterministic tests.
    pub fn fixed(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            jitter: 0.0,
        }
    }

    /// Sleep before the retry that follows zero-based `attempt`.
    ///
    /// `base * 2^attempt`, capped at `max`, then scaled by a random factor in
    /// `[1 - jitter, 1 + jitter]` and capped again.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(31));
        let exp = self.base.saturating_mul(factor).min(self.max);
        if self.jitter <= 0.0 {
            return exp;
        }
        let scale = 1.0 + self.jitter * (fastrand::f64() * 2.0 - 1.0);
        exp.mul_f64(scale.max(0.0)).min(self.max)
    }
}

/// Per-worker fetcher: one transport, one retry policy.
pub struct Fetcher<T, S = TokioSleeper> {
    transport: T,
    sleeper: S,
    backoff: BackoffPolicy,
    max_retries: u32,
}

impl<T: Transport> Fetcher<T, TokioSleeper> {
    /// Create a fetcher that sleeps on the tokio timer.
    pub fn new(transport: T, backoff: BackoffPolicy, max_retries: u32) -> Self {
        Self::with_sleeper(transport, TokioSleeper, backoff, max_retries)
    }
}

impl<T: Transport, S: Sleeper> Fetcher<T, S> {
    /// Create a fetcher with an injected sleeper.
    pub fn with_sleeper(transport: T, sleeper: S, backoff: BackoffPolicy, max_retries: u32) -> Self {
        Self {
            transport,
            sleeper,
            backoff,
            max_retries: max_retries.max(1),
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Fetch a URL, retrying transient conditions up to `max_retries` attempts.
    pub async fn fetch(&self, url: &str) -> FetchResult<Document> {
        let mut last_error = String::new();

        for attempt in 0..self.max_retries {
            match self.transport.get(url).await {
                Ok(response) if response.status == 200 => {
                    debug!(url = %url, attempt = attempt + 1, bytes = response.body.len(), "Fetched page");
                    return Ok(Document::new(url, response.body));
                }
                Ok(response) if TRANSIENT_STATUSES.contains(&response.status) => {
                    last_error = format!("HTTP {}", response.status);
                    debug!(url = %url, status = response.status, attempt = attempt + 1, "Rate limited");
                }
                Ok(response) => {
                    warn!(url = %url, status = response.status, "Unexpected status, not retrying");
                    return Err(FetchFailure::UnexpectedStatus {
                        code: response.status,
                    });
                }
                Err(e) => {
                    debug!(url = %url, error = %e, attempt = attempt + 1, "Network error");
                    last_error = e.to_string();
                }
            }

            if attempt + 1 < self.max_retries {
                let delay = self.backoff.delay(attempt);
                debug!(url = %url, delay_ms = delay.as_millis() as u64, "Backing off");
                self.sleeper.sleep(delay).await;
            }
        }

        warn!(url = %url, attempts = self.max_retries, last_error = %last_error, "Retries exhausted");
        Err(FetchFailure::RetriesExhausted {
            attempts: self.max_retries,
            last_error,
        })
    }
}
