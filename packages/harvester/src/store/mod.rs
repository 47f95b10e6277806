//! Durable storage: the NDJSON append log and the compacted JSON snapshot.
//!
//! Each batch owns two files in the output directory:
//!
//! - `details_<batch>.ndjson` - append log, one record per line, completion order
//! - `details_<batch>.json` - consolidated snapshot, unique by `url`

pub mod append_log;
pub mod snapshot;

use std::path::{Path, PathBuf};

pub use append_log::{AppendOutcome, PersistenceLog};
pub use snapshot::{compact, load_snapshot, CompactionReport};

const APPEND_LOG_SUFFIX: &str = ".ndjson";
const SNAPSHOT_SUFFIX: &str = ".json";

/// File locations of one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPaths {
    pub append_log: PathBuf,
    pub snapshot: PathBuf,
}

impl BatchPaths {
    /// Paths for a batch key inside an output directory.
    pub fn new(output_dir: impl AsRef<Path>, batch: &str) -> Self {
        let dir = output_dir.as_ref();
        Self {
            append_log: dir.join(format!("details_{batch}{APPEND_LOG_SUFFIX}")),
            snapshot: dir.join(format!("details_{batch}{SNAPSHOT_SUFFIX}")),
        }
    }
}
