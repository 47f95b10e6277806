//! Testing utilities including mock implementations.
//!
//! These let the fetch unit and the runner be exercised without network
//! access or real sleeps.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::TransportError;
use crate::traits::sink::LogSink;
use crate::traits::sleeper::Sleeper;
use crate::traits::transport::{RawResponse, Transport};

/// One scripted outcome of a `get` call.
#[derive(Debug, Clone)]
pub enum Scripted {
    Response(RawResponse),
    Timeout,
    ConnectError,
}

impl Scripted {
    pub fn ok(body: impl Into<String>) -> Self {
        Self::Response(RawResponse::ok(body))
    }

    pub fn status(status: u16) -> Self {
        Self::Response(RawResponse::new(status, ""))
    }

    pub fn timeout() -> Self {
        Self::Timeout
    }

    pub fn connect_error() -> Self {
        Self::ConnectError
    }
}

#[derive(Default)]
struct MockState {
    scripts: HashMap<String, VecDeque<Scripted>>,
    fallback: HashMap<String, Scripted>,
    calls: Vec<String>,
    cancel_after: Option<(usize, CancellationToken)>,
}

/// A scripted transport.
///
/// Each URL has a queue of outcomes consumed one per call. When the queue is
/// empty the URL's fallback is returned (set with [`MockTransport::with_page`]),
/// or 404 if there is none. Clones share state, so a factory can hand one
/// clone to every worker and the test can still inspect all calls.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue outcomes for a URL.
    pub fn with_script(self, url: impl Into<String>, outcomes: Vec<Scripted>) -> Self {
        self.state
            .lock()
            .unwrap()
            .scripts
            .entry(url.into())
            .or_default()
            .extend(outcomes);
        self
    }

    /// Always serve this page for a URL once its script is used up.
    pub fn with_page(self, url: impl Into<String>, html: impl Into<String>) -> Self {
        self.state
            .lock()
            .unwrap()
            .fallback
            .insert(url.into(), Scripted::ok(html));
        self
    }

    /// Cancel `token` during the `calls`-th `get`. That call still returns its
    /// scripted outcome, like a request already on the wire.
    pub fn cancel_after(self, calls: usize, token: CancellationToken) -> Self {
        self.state.lock().unwrap().cancel_after = Some((calls, token));
        self
    }

    /// Number of `get` calls made for a URL.
    pub fn calls(&self, url: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|u| u.as_str() == url)
            .count()
    }

    /// Total `get` calls across URLs.
    pub fn total_calls(&self) -> usize {
        self.state.lock().unwrap().calls.len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get(&self, url: &str) -> Result<RawResponse, TransportError> {
        let outcome = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(url.to_string());
            if let Some((after, token)) = &state.cancel_after {
                if state.calls.len() == *after {
                    token.cancel();
                }
            }
            let scripted = state.scripts.get_mut(url).and_then(VecDeque::pop_front);
            scripted
                .or_else(|| state.fallback.get(url).cloned())
                .unwrap_or_else(|| Scripted::status(404))
        };

        match outcome {
            Scripted::Response(response) => Ok(response),
            Scripted::Timeout => Err(TransportError::Timeout {
                url: url.to_string(),
            }),
            Scripted::ConnectError => Err(TransportError::Connect {
                url: url.to_string(),
                message: "connection reset by peer".to_string(),
            }),
        }
    }
}

/// Records requested sleeps and returns immediately.
#[derive(Clone, Default)]
pub struct RecordingSleeper {
    sleeps: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}

/// Log sink that accepts a fixed number of lines, then fails every write.
///
/// Syncs and the final flush still reach the wrapped sink, so lines written
/// before the failure stay on disk.
pub struct FailingSink {
    inner: Box<dyn LogSink>,
    remaining: usize,
}

impl FailingSink {
    pub fn after(inner: Box<dyn LogSink>, successful_writes: usize) -> Self {
        Self {
            inner,
            remaining: successful_writes,
        }
    }
}

#[async_trait]
impl LogSink for FailingSink {
    async fn write_line(&mut self, line: &[u8]) -> std::io::Result<()> {
        if self.remaining == 0 {
            return Err(std::io::Error::other("no space left on device"));
        }
        self.remaining -= 1;
        self.inner.write_line(line).await
    }

    async fn sync(&mut self) -> std::io::Result<()> {
        self.inner.sync().await
    }

    async fn finish(&mut self) -> std::io::Result<()> {
        self.inner.finish().await
    }
}

/// Minimal listing page in the markup layout the harvester understands.
pub fn listing_page(title: &str, company: &str, salary: &str) -> String {
    format!(
        r#"<html><body>
<h1 data-test="text-positionName">{title}</h1>
<h2 data-scroll-id="employer-name">{company}<a href="/about">About the company</a></h2>
<div data-test="text-earningAmount">{salary}</div>
<section data-scroll-id="technologies-expected-1">
  <ul><li data-test="item-technologies-expected">Rust</li></ul>
</section>
<section data-scroll-id="requirements-expected-1">
  <ul><li class="offer-view_tkzmjn3">3 years of experience</li></ul>
</section>
</body></html>"#
    )
}
