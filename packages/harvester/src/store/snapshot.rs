//! Snapshot compactor.
//!
//! Folds the append log into one JSON array. Malformed lines (for example a
//! half-written line left by a crash) are skipped with a warning. The result
//! is written to a temporary file and renamed into place, so the previous
//! snapshot stays valid until the new one is complete.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};

use super::BatchPaths;
use crate::error::{StoreError, StoreResult};
use crate::types::record::JobRecord;

/// What a compaction did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompactionReport {
    /// Records in the written snapshot
    pub records: usize,
    /// Records carried over from the previous snapshot
    pub from_snapshot: usize,
    /// Records taken from the append log
    pub from_log: usize,
    /// Log lines that could not be parsed
    pub malformed_lines: usize,
    /// Entries dropped because their URL was already present
    pub duplicates_dropped: usize,
}

/// Read a finalized snapshot. A missing or empty file is an empty snapshot.
///
/// Array entries that are not valid records are skipped with a warning; a
/// file that is not a JSON array at all is an error.
pub async fn load_snapshot(path: &Path) -> StoreResult<Vec<JobRecord>> {
    let raw = match fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::io(path, e)),
    };
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }

    let values: Vec<serde_json::Value> =
        serde_json::from_str(&raw).map_err(|e| StoreError::MalformedSnapshot {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    let mut records = Vec::with_capacity(values.len());
    for (index, value) in values.into_iter().enumerate() {
        match serde_json::from_value::<JobRecord>(value) {
            Ok(record) if !record.url.is_empty() => records.push(record),
            Ok(_) => warn!(path = %path.display(), index, "Snapshot entry without url, skipping"),
            Err(e) => warn!(path = %path.display(), index, error = %e, "Malformed snapshot entry, skipping"),
        }
    }
    Ok(records)
}

/// Parse the append log line by line. Returns the records and the number of
/// malformed lines. A missing log is empty.
///
/// Lines are split on raw bytes, so a line holding invalid UTF-8 (a write torn
/// inside a multi-byte character) is one malformed line, not the end of the log.
pub(crate) async fn read_log(path: &Path) -> StoreResult<(Vec<JobRecord>, usize)> {
    let file = match fs::File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((Vec::new(), 0)),
        Err(e) => return Err(StoreError::io(path, e)),
    };

    let mut lines = BufReader::new(file).split(b'\n');
    let mut records = Vec::new();
    let mut malformed = 0;
    let mut line_no = 0usize;

    while let Some(line) = lines
        .next_segment()
        .await
        .map_err(|e| StoreError::io(path, e))?
    {
        line_no += 1;

        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        match serde_json::from_slice::<JobRecord>(&line) {
            Ok(record) if !record.url.is_empty() => records.push(record),
            Ok(_) => {
                warn!(path = %path.display(), line = line_no, "Log entry without url, skipping");
                malformed += 1;
            }
            Err(e) => {
                warn!(path = %path.display(), line = line_no, error = %e, "Malformed log entry, skipping");
                malformed += 1;
            }
        }
    }

    Ok((records, malformed))
}

/// Compact a batch's append log into its snapshot.
///
/// Records already in the previous snapshot come first, then log records in
/// log order; the first occurrence of each URL wins. An unreadable previous
/// snapshot is ignored with a warning since the log is authoritative.
pub async fn compact(paths: &BatchPaths) -> StoreResult<CompactionReport> {
    let previous = match load_snapshot(&paths.snapshot).await {
        Ok(records) => records,
        Err(e @ StoreError::MalformedSnapshot { .. }) => {
            warn!(error = %e, "Previous snapshot unreadable, rebuilding from log only");
            Vec::new()
        }
        Err(e) => return Err(e),
    };
    let (logged, malformed_lines) = read_log(&paths.append_log).await?;

    let mut report = CompactionReport {
        malformed_lines,
        ..Default::default()
    };
    let mut seen: HashSet<String> = HashSet::with_capacity(previous.len() + logged.len());
    let mut merged = Vec::with_capacity(previous.len() + logged.len());

    for record in previous {
        if seen.insert(record.url.clone()) {
            report.from_snapshot += 1;
            merged.push(record);
        } else {
            report.duplicates_dropped += 1;
        }
    }
    for record in logged {
        if seen.insert(record.url.clone()) {
            report.from_log += 1;
            merged.push(record);
        } else {
            report.duplicates_dropped += 1;
        }
    }
    report.records = merged.len();

    write_atomic(&paths.snapshot, &merged).await?;

    info!(
        snapshot = %paths.snapshot.display(),
        records = report.records,
        from_log = report.from_log,
        malformed_lines = report.malformed_lines,
        duplicates_dropped = report.duplicates_dropped,
        "Snapshot compacted"
    );

    Ok(report)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

async fn write_atomic(path: &Path, records: &[JobRecord]) -> StoreResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| StoreError::io(parent, e))?;
    }

    let bytes = serde_json::to_vec_pretty(records)?;
    let tmp = temp_path(path);

    let mut file = fs::File::create(&tmp)
        .await
        .map_err(|e| StoreError::io(&tmp, e))?;
    file.write_all(&bytes)
        .await
        .map_err(|e| StoreError::io(&tmp, e))?;
    file.sync_all().await.map_err(|e| StoreError::io(&tmp, e))?;
    drop(file);

    fs::rename(&tmp, path)
        .await
        .map_err(|e| StoreError::io(path, e))
}
