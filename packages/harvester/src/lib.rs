//! Resilient Concurrent Job-Listing Harvester
//!
//! Fetches job-listing pages under rate limiting, turns each page into a
//! structured [`JobRecord`] and persists results incrementally, so a long
//! run that crashes, restarts or gets blocked never loses completed work and
//! never stores a listing twice.
//!
//! # Usage
//!
//! ```rust,ignore
//! use harvester::{BatchPaths, Harvester, HarvestConfig, load_descriptors};
//!
//! let config = HarvestConfig::from_env()?;
//! let descriptors = load_descriptors("links_2024.json".as_ref()).await?;
//! let paths = BatchPaths::new("out", "links_2024");
//!
//! let summary = Harvester::new(config).run(descriptors, &paths).await?;
//! println!("appended {} of {}", summary.appended, summary.total);
//! ```
//!
//! # Modules
//!
//! - [`client`] - Per-worker HTTP client factory
//! - [`fetch`] - Fetch with bounded retries and backoff
//! - [`classify`] - Section classification of list items
//! - [`assemble`] - Record assembly from field selectors
//! - [`store`] - Append log and snapshot compaction
//! - [`harvest`] - Worker pool and writer task
//! - [`batch`] - Input loading and monthly batches
//! - [`traits`] - Transport, sleeper and log sink seams
//! - [`types`] - Data types and configuration
//! - [`testing`] - Mock implementations for testing

pub mod assemble;
pub mod batch;
pub mod classify;
pub mod client;
pub mod error;
pub mod fetch;
pub mod harvest;
pub mod store;
pub mod testing;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use assemble::{assemble, extract_record, split_salary};
pub use batch::{
    batch_key_from_path, load_descriptors, month_key, split_by_month, write_month_files,
    UNDATED_BATCH,
};
pub use classify::classify;
pub use client::{build_client, build_transport};
pub use error::{
    ConfigError, FetchFailure, HarvestError, Result, StoreError, TransportError,
};
pub use fetch::{BackoffPolicy, Document, Fetcher};
pub use harvest::{Harvester, RunSummary};
pub use store::{compact, load_snapshot, AppendOutcome, BatchPaths, CompactionReport, PersistenceLog};
pub use traits::{
    sink::LogSink,
    sleeper::{Sleeper, TokioSleeper},
    transport::{RawResponse, ReqwestTransport, Transport},
};
pub use types::{
    config::HarvestConfig,
    listing::ListingDescriptor,
    record::JobRecord,
    section::{ClassifiedSection, SectionBucket, SECTION_TABLE_VERSION},
};
