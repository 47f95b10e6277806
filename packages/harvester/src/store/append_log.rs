//! Incremental persistence log.
//!
//! Append-only NDJSON file plus the set of URLs already persisted. Exactly one
//! task owns a `PersistenceLog`, which makes it the single serialization point
//! for appends.
//!
//! Per candidate record: `fetched -> dedup-checked -> appended | skipped-duplicate`.

use std::collections::HashSet;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, error, info, warn};

use super::snapshot::{load_snapshot, read_log};
use super::BatchPaths;
use crate::error::{StoreError, StoreResult};
use crate::traits::sink::LogSink;
use crate::types::record::JobRecord;

/// Result of offering a record to the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    SkippedDuplicate,
}

pub struct PersistenceLog {
    path: PathBuf,
    sink: Box<dyn LogSink>,
    seen: HashSet<String>,
    appended: usize,
}

impl PersistenceLog {
    /// Open a batch's append log, rebuilding the seen set from both the log
    /// and the batch's previous snapshot.
    ///
    /// A log whose last line was cut short by a crash is terminated with a
    /// newline first, so the next record starts on a line of its own.
    pub async fn open(paths: &BatchPaths) -> StoreResult<Self> {
        if let Some(parent) = paths.append_log.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::io(parent, e))?;
        }

        let (logged, malformed) = read_log(&paths.append_log).await?;
        let mut seen: HashSet<String> = logged.into_iter().map(|r| r.url).collect();
        let from_log = seen.len();

        match load_snapshot(&paths.snapshot).await {
            Ok(records) => seen.extend(records.into_iter().map(|r| r.url)),
            Err(e @ StoreError::MalformedSnapshot { .. }) => {
                warn!(error = %e, "Previous snapshot unreadable, deduplicating against the log only");
            }
            Err(e) => return Err(e),
        }

        let needs_newline = ends_without_newline(&paths.append_log).await?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&paths.append_log)
            .await
            .map_err(|e| StoreError::io(&paths.append_log, e))?;

        if needs_newline {
            warn!(path = %paths.append_log.display(), "Append log ends mid-line, terminating torn entry");
            file.write_all(b"\n")
                .await
                .map_err(|e| StoreError::io(&paths.append_log, e))?;
            file.flush()
                .await
                .map_err(|e| StoreError::io(&paths.append_log, e))?;
        }

        info!(
            path = %paths.append_log.display(),
            seen = seen.len(),
            from_log,
            malformed,
            "Persistence log opened"
        );

        Ok(Self {
            path: paths.append_log.clone(),
            sink: Box::new(file),
            seen,
            appended: 0,
        })
    }

    /// Route writes through a different sink, keeping the seen set.
    pub fn map_sink<F>(self, f: F) -> Self
    where
        F: FnOnce(Box<dyn LogSink>) -> Box<dyn LogSink>,
    {
        Self {
            sink: f(self.sink),
            ..self
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a URL is already persisted (this run or earlier).
    pub fn contains(&self, url: &str) -> bool {
        self.seen.contains(url)
    }

    /// Number of distinct URLs known to be persisted.
    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    /// Records appended through this handle.
    pub fn appended_count(&self) -> usize {
        self.appended
    }

    /// Append a record unless its URL is already persisted.
    ///
    /// The record is written as one line and flushed. A failed write is
    /// retried once; a second failure is fatal for the run.
    pub async fn append(&mut self, record: &JobRecord) -> StoreResult<AppendOutcome> {
        if self.seen.contains(&record.url) {
            debug!(url = %record.url, "Already persisted, skipping");
            return Ok(AppendOutcome::SkippedDuplicate);
        }

        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        if let Err(first) = self.sink.write_line(&line).await {
            warn!(url = %record.url, error = %first, "Append failed, retrying once");
            // Leading newline closes off whatever part of the first attempt landed
            let mut retry = Vec::with_capacity(line.len() + 1);
            retry.push(b'\n');
            retry.extend_from_slice(&line);

            if let Err(source) = self.sink.write_line(&retry).await {
                error!(url = %record.url, error = %source, "Append failed twice");
                return Err(StoreError::WriteFailed {
                    url: record.url.clone(),
                    path: self.path.clone(),
                    source,
                });
            }
        }

        self.seen.insert(record.url.clone());
        self.appended += 1;
        Ok(AppendOutcome::Appended)
    }

    /// Force appended data to disk and release slack memory.
    pub async fn checkpoint(&mut self) -> StoreResult<()> {
        self.sink
            .sync()
            .await
            .map_err(|e| StoreError::io(&self.path, e))?;
        self.seen.shrink_to_fit();
        Ok(())
    }

    /// Flush, sync and close the log.
    pub async fn close(mut self) -> StoreResult<()> {
        self.sink
            .finish()
            .await
            .map_err(|e| StoreError::io(&self.path, e))?;
        debug!(path = %self.path.display(), appended = self.appended, "Persistence log closed");
        Ok(())
    }
}

async fn ends_without_newline(path: &Path) -> StoreResult<bool> {
    let mut file = match File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(StoreError::io(path, e)),
    };
    let len = file
        .metadata()
        .await
        .map_err(|e| StoreError::io(path, e))?
        .len();
    if len == 0 {
        return Ok(false);
    }

    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))
        .await
        .map_err(|e| StoreError::io(path, e))?;
    file.read_exact(&mut last)
        .await
        .map_err(|e| StoreError::io(path, e))?;
    Ok(last[0] != b'\n')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::snapshot::compact;
    use crate::testing::FailingSink;
    use crate::types::listing::ListingDescriptor;
    use tempfile::TempDir;

    fn record(url: &str) -> JobRecord {
        JobRecord::from_descriptor(&ListingDescriptor::new(url))
    }

    #[tokio::test]
    async fn test_append_then_skip_duplicate() {
        let dir = TempDir::new().unwrap();
        let paths = BatchPaths::new(dir.path(), "b");
        let mut log = PersistenceLog::open(&paths).await.unwrap();

        assert_eq!(log.append(&record("https://x/1")).await.unwrap(), AppendOutcome::Appended);
        assert_eq!(
            log.append(&record("https://x/1")).await.unwrap(),
            AppendOutcome::SkippedDuplicate
        );
        assert_eq!(log.appended_count(), 1);
        log.close().await.unwrap();

        let raw = fs::read_to_string(&paths.append_log).await.unwrap();
        assert_eq!(raw.lines().count(), 1);
        assert!(raw.ends_with('\n'));
    }

    #[tokio::test]
    async fn test_reopen_rebuilds_seen_set() {
        let dir = TempDir::new().unwrap();
        let paths = BatchPaths::new(dir.path(), "b");

        let mut log = PersistenceLog::open(&paths).await.unwrap();
        log.append(&record("https://x/1")).await.unwrap();
        log.close().await.unwrap();

        let mut log = PersistenceLog::open(&paths).await.unwrap();
        assert!(log.contains("https://x/1"));
        assert_eq!(
            log.append(&record("https://x/1")).await.unwrap(),
            AppendOutcome::SkippedDuplicate
        );
    }

    #[tokio::test]
    async fn test_seen_set_includes_previous_snapshot() {
        let dir = TempDir::new().unwrap();
        let paths = BatchPaths::new(dir.path(), "b");

        let mut log = PersistenceLog::open(&paths).await.unwrap();
        log.append(&record("https://x/1")).await.unwrap();
        log.close().await.unwrap();
        compact(&paths).await.unwrap();

        // The log is gone but the snapshot still knows the URL
        fs::remove_file(&paths.append_log).await.unwrap();
        let log = PersistenceLog::open(&paths).await.unwrap();
        assert!(log.contains("https://x/1"));
        assert_eq!(log.seen_count(), 1);
    }

    #[tokio::test]
    async fn test_torn_tail_is_terminated_before_appending() {
        let dir = TempDir::new().unwrap();
        let paths = BatchPaths::new(dir.path(), "b");
        let good = serde_json::to_string(&record("https://x/1")).unwrap();
        fs::write(&paths.append_log, format!("{good}\n{{\"url\":\"https://x/2\",\"ti"))
            .await
            .unwrap();

        let mut log = PersistenceLog::open(&paths).await.unwrap();
        assert!(log.contains("https://x/1"));
        assert!(!log.contains("https://x/2"));
        log.append(&record("https://x/2")).await.unwrap();
        log.checkpoint().await.unwrap();
        log.close().await.unwrap();

        let report = compact(&paths).await.unwrap();
        assert_eq!(report.records, 2);
        assert_eq!(report.malformed_lines, 1);
    }

    #[tokio::test]
    async fn test_torn_multibyte_tail_keeps_later_appends() {
        let dir = TempDir::new().unwrap();
        let paths = BatchPaths::new(dir.path(), "b");

        let mut polish = record("https://x/2");
        polish.company = "Przedsiębiorstwo Łączności".to_string();
        let torn = serde_json::to_string(&polish).unwrap();
        let cut = torn.find('ę').unwrap() + 1;

        let mut content = serde_json::to_vec(&record("https://x/1")).unwrap();
        content.push(b'\n');
        content.extend_from_slice(&torn.as_bytes()[..cut]);
        fs::write(&paths.append_log, content).await.unwrap();

        let mut log = PersistenceLog::open(&paths).await.unwrap();
        assert!(log.contains("https://x/1"));
        log.append(&record("https://x/3")).await.unwrap();
        log.close().await.unwrap();

        let log = PersistenceLog::open(&paths).await.unwrap();
        assert!(log.contains("https://x/3"));
        assert!(!log.contains("https://x/2"));
        log.close().await.unwrap();

        let report = compact(&paths).await.unwrap();
        assert_eq!(report.records, 2);
        assert_eq!(report.malformed_lines, 1);
    }

    #[tokio::test]
    async fn test_second_write_failure_is_fatal() {
        let dir = TempDir::new().unwrap();
        let paths = BatchPaths::new(dir.path(), "b");
        let mut log = PersistenceLog::open(&paths)
            .await
            .unwrap()
            .map_sink(|sink| Box::new(FailingSink::after(sink, 1)) as Box<dyn LogSink>);

        log.append(&record("https://x/1")).await.unwrap();
        let err = log.append(&record("https://x/2")).await.unwrap_err();
        assert!(matches!(err, StoreError::WriteFailed { ref url, .. } if url == "https://x/2"));
        assert!(!log.contains("https://x/2"));
        log.close().await.unwrap();

        let raw = fs::read_to_string(&paths.append_log).await.unwrap();
        assert_eq!(raw.lines().count(), 1);
    }
}
