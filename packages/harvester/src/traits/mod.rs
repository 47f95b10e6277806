//! Trait seams for the network, the clock and the disk.
//!
//! - [`transport::Transport`] - one HTTP GET per call, no retries
//! - [`sleeper::Sleeper`] - backoff sleeps, swappable in tests
//! - [`sink::LogSink`] - append-log writes and syncs

pub mod sink;
pub mod sleeper;
pub mod transport;
