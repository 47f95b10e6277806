//! Harvest runner.
//!
//! Wires the pieces together for one batch:
//!
//! ```text
//! descriptors ──► bounded queue ──► N workers (own transport each)
//!                                      │ fetch with backoff
//!                                      │ classify + assemble (sync)
//!                                      ▼
//!                               bounded outcome channel
//!                                      │
//!                                      ▼
//!                         writer (owns PersistenceLog)
//!                                      │ dedup + append
//!                                      ▼
//!                              compaction at the end
//! ```
//!
//! The writer is the only task that touches the log. A storage failure there
//! cancels the workers and fails the run; per-listing fetch failures are only
//! counted.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::assemble::extract_record;
use crate::client::build_transport;
use crate::error::{FetchFailure, HarvestError, Result, StoreError};
use crate::fetch::{BackoffPolicy, Fetcher};
use crate::store::{compact, AppendOutcome, BatchPaths, CompactionReport, PersistenceLog};
use crate::traits::sleeper::{Sleeper, TokioSleeper};
use crate::traits::transport::{ReqwestTransport, Transport};
use crate::types::config::HarvestConfig;
use crate::types::listing::ListingDescriptor;
use crate::types::record::JobRecord;

/// Builds the transport for worker `i`.
pub type TransportFactory<T> = Arc<dyn Fn(usize) -> Result<T> + Send + Sync>;

/// Totals for one batch run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// Descriptors offered to the run
    pub total: usize,
    /// Records newly written to the append log
    pub appended: usize,
    /// Descriptors skipped because their URL was already persisted
    pub skipped_duplicate: usize,
    /// Listings that could not be fetched
    pub failed: usize,
    /// Descriptors rejected before fetching (empty or non-http link)
    pub invalid: usize,
    /// Appended records with at least one fragment in the `unknown` bucket
    pub records_with_unknown_sections: usize,
    pub elapsed: Duration,
    /// Set when the batch was compacted at the end of the run
    pub compaction: Option<CompactionReport>,
}

enum Outcome {
    Record(Box<JobRecord>),
    Failed { url: String, failure: FetchFailure },
}

/// Runs batches of descriptors through a worker pool into a persistence log.
pub struct Harvester<T, S = TokioSleeper> {
    config: HarvestConfig,
    factory: TransportFactory<T>,
    sleeper: S,
    cancel: CancellationToken,
    compact_on_finish: bool,
}

impl Harvester<ReqwestTransport, TokioSleeper> {
    /// Harvester over real HTTP clients, one per worker.
    pub fn new(config: HarvestConfig) -> Self {
        let client_config = config.clone();
        Self::with_transport_factory(
            config,
            move |worker| build_transport(&client_config, worker),
            TokioSleeper,
        )
    }
}

impl<T, S> Harvester<T, S>
where
    T: Transport + 'static,
    S: Sleeper + Clone + 'static,
{
    /// Harvester with injected per-worker transports and sleeper.
    pub fn with_transport_factory<F>(config: HarvestConfig, factory: F, sleeper: S) -> Self
    where
        F: Fn(usize) -> Result<T> + Send + Sync + 'static,
    {
        Self {
            config,
            factory: Arc::new(factory),
            sleeper,
            cancel: CancellationToken::new(),
            compact_on_finish: true,
        }
    }

    /// Use an externally owned cancellation token (for example, Ctrl-C).
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Whether to compact the batch after a successful run. Default: true.
    pub fn with_compaction(mut self, enabled: bool) -> Self {
        self.compact_on_finish = enabled;
        self
    }

    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Harvest one batch.
    ///
    /// Descriptors whose URL is already persisted for this batch are skipped
    /// without fetching. Returns `Err` on storage failure or cancellation; in
    /// both cases everything appended so far stays in the log.
    pub async fn run(
        &self,
        descriptors: Vec<ListingDescriptor>,
        paths: &BatchPaths,
    ) -> Result<RunSummary> {
        self.config.validate()?;
        let log = PersistenceLog::open(paths).await?;
        self.run_with_log(descriptors, log, paths).await
    }

    /// Harvest one batch into an already opened log.
    ///
    /// `paths` must be the batch the log was opened for; it is used for the
    /// final compaction.
    pub async fn run_with_log(
        &self,
        descriptors: Vec<ListingDescriptor>,
        mut log: PersistenceLog,
        paths: &BatchPaths,
    ) -> Result<RunSummary> {
        self.config.validate()?;
        let started = Instant::now();

        let mut summary = RunSummary {
            total: descriptors.len(),
            ..Default::default()
        };

        let mut pending = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            if !descriptor.is_fetchable() {
                warn!(link = %descriptor.link, "Invalid listing link, skipping");
                summary.invalid += 1;
            } else if log.contains(descriptor.link.trim()) {
                summary.skipped_duplicate += 1;
            } else {
                pending.push(descriptor);
            }
        }

        info!(
            batch = %paths.append_log.display(),
            total = summary.total,
            pending = pending.len(),
            already_persisted = summary.skipped_duplicate,
            invalid = summary.invalid,
            workers = self.config.workers,
            "Starting harvest"
        );

        let cancel = self.cancel.child_token();
        let had_work = !pending.is_empty();
        let fatal = if had_work {
            self.harvest_pending(pending, &mut log, &mut summary, &cancel)
                .await?
        } else {
            None
        };

        if let Some(e) = fatal {
            if let Err(close_err) = log.close().await {
                warn!(error = %close_err, "Failed to close log after storage failure");
            }
            summary.elapsed = started.elapsed();
            log_summary(&summary);
            return Err(HarvestError::Store(e));
        }

        log.close().await?;
        summary.elapsed = started.elapsed();

        // Nothing left to do means the batch is complete, cancelled or not
        if had_work && cancel.is_cancelled() {
            warn!("Harvest cancelled, log kept for resume");
            log_summary(&summary);
            return Err(HarvestError::Cancelled);
        }

        if self.compact_on_finish {
            summary.compaction = Some(compact(paths).await?);
        }

        log_summary(&summary);
        Ok(summary)
    }

    /// Fan pending descriptors out to workers and drain their outcomes into
    /// the log. Returns the storage error that stopped the writer, if any.
    async fn harvest_pending(
        &self,
        pending: Vec<ListingDescriptor>,
        log: &mut PersistenceLog,
        summary: &mut RunSummary,
        cancel: &CancellationToken,
    ) -> Result<Option<StoreError>> {
        let workers = self.config.workers;
        let backoff = BackoffPolicy::from_config(&self.config);

        // Build every client before starting so a bad config fails fast
        let mut fetchers = Vec::with_capacity(workers);
        for worker in 0..workers {
            let transport = (self.factory)(worker)?;
            fetchers.push(Fetcher::with_sleeper(
                transport,
                self.sleeper.clone(),
                backoff.clone(),
                self.config.max_retries,
            ));
        }

        let (queue_tx, queue_rx) = mpsc::channel::<ListingDescriptor>(workers * 2);
        let (outcome_tx, mut outcome_rx) = mpsc::channel::<Outcome>(workers * 2);
        let queue_rx = Arc::new(Mutex::new(queue_rx));

        let mut handles: Vec<JoinHandle<()>> = Vec::with_capacity(workers + 1);
        handles.push(tokio::spawn(feed(pending, queue_tx, cancel.clone())));
        for (worker, fetcher) in fetchers.into_iter().enumerate() {
            handles.push(tokio::spawn(work(
                worker,
                fetcher,
                queue_rx.clone(),
                outcome_tx.clone(),
                cancel.clone(),
            )));
        }
        drop(outcome_tx);

        let mut completed = 0usize;
        let mut fatal = None;

        while let Some(outcome) = outcome_rx.recv().await {
            completed += 1;

            match outcome {
                Outcome::Record(record) => match log.append(&record).await {
                    Ok(AppendOutcome::Appended) => {
                        summary.appended += 1;
                        if record.sections.has_unknown() {
                            summary.records_with_unknown_sections += 1;
                        }
                        debug!(
                            url = %record.url,
                            fragments = record.sections.fragment_count(),
                            "Listing stored"
                        );
                    }
                    Ok(AppendOutcome::SkippedDuplicate) => summary.skipped_duplicate += 1,
                    Err(e) => {
                        error!(url = %record.url, error = %e, "Persistence failed, aborting run");
                        fatal = Some(e);
                        break;
                    }
                },
                Outcome::Failed { url, failure } => {
                    summary.failed += 1;
                    warn!(url = %url, reason = failure.reason(), error = %failure, "Listing failed");
                }
            }

            if completed % self.config.reclaim_interval == 0 {
                if let Err(e) = log.checkpoint().await {
                    error!(error = %e, "Checkpoint failed, aborting run");
                    fatal = Some(e);
                    break;
                }
                info!(
                    completed,
                    appended = summary.appended,
                    skipped = summary.skipped_duplicate,
                    failed = summary.failed,
                    seen = log.seen_count(),
                    "Harvest progress"
                );
            }
        }

        if fatal.is_some() {
            cancel.cancel();
        }
        // Unblocks workers waiting to hand over an outcome
        drop(outcome_rx);

        for result in join_all(handles).await {
            if let Err(e) = result {
                error!(error = %e, "Harvest task panicked");
            }
        }

        Ok(fatal)
    }
}

async fn feed(
    pending: Vec<ListingDescriptor>,
    queue: mpsc::Sender<ListingDescriptor>,
    cancel: CancellationToken,
) {
    for descriptor in pending {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            sent = queue.send(descriptor) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }
}

async fn work<T, S>(
    worker: usize,
    fetcher: Fetcher<T, S>,
    queue: Arc<Mutex<mpsc::Receiver<ListingDescriptor>>>,
    outcomes: mpsc::Sender<Outcome>,
    cancel: CancellationToken,
) where
    T: Transport,
    S: Sleeper,
{
    debug!(worker, "Worker started");

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            descriptor = async { queue.lock().await.recv().await } => descriptor,
        };
        let Some(descriptor) = next else {
            break;
        };

        let url = descriptor.link.trim().to_string();
        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            fetched = fetcher.fetch(&url) => fetched,
        };

        let outcome = match fetched {
            Ok(document) => Outcome::Record(Box::new(extract_record(&descriptor, &document))),
            Err(failure) => Outcome::Failed { url, failure },
        };

        if outcomes.send(outcome).await.is_err() {
            break;
        }
    }

    debug!(worker, "Worker stopped");
}

fn log_summary(summary: &RunSummary) {
    info!(
        total = summary.total,
        appended = summary.appended,
        skipped_duplicate = summary.skipped_duplicate,
        failed = summary.failed,
        invalid = summary.invalid,
        records_with_unknown_sections = summary.records_with_unknown_sections,
        elapsed_secs = summary.elapsed.as_secs_f64(),
        "Harvest finished"
    );
    if summary.records_with_unknown_sections > 0 {
        warn!(
            records = summary.records_with_unknown_sections,
            "Records with unclassified sections; the page layout may have changed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::load_snapshot;
    use crate::testing::{listing_page, FailingSink, MockTransport, RecordingSleeper, Scripted};
    use crate::traits::sink::LogSink;
    use tempfile::TempDir;

    fn config(workers: usize) -> HarvestConfig {
        HarvestConfig::new()
            .with_workers(workers)
            .with_max_retries(3)
            .with_backoff(Duration::from_millis(10), Duration::from_millis(100))
            .with_jitter(0.0)
    }

    fn harvester(
        transport: &MockTransport,
        config: HarvestConfig,
    ) -> Harvester<MockTransport, RecordingSleeper> {
        let transport = transport.clone();
        Harvester::with_transport_factory(
            config,
            move |_| Ok(transport.clone()),
            RecordingSleeper::new(),
        )
    }

    #[tokio::test]
    async fn test_run_appends_and_compacts() {
        let dir = TempDir::new().unwrap();
        let paths = BatchPaths::new(dir.path(), "t");
        let transport = MockTransport::new()
            .with_page("https://x/1", listing_page("A", "Acme", "1 000"))
            .with_page("https://x/2", listing_page("B", "Initech", "2 000"));

        let summary = harvester(&transport, config(2))
            .run(
                vec![
                    ListingDescriptor::new("https://x/1"),
                    ListingDescriptor::new("https://x/2"),
                ],
                &paths,
            )
            .await
            .unwrap();

        assert_eq!(summary.total, 2);
        assert_eq!(summary.appended, 2);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.compaction.as_ref().unwrap().records, 2);
        assert_eq!(load_snapshot(&paths.snapshot).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_links_not_fetched() {
        let dir = TempDir::new().unwrap();
        let paths = BatchPaths::new(dir.path(), "t");
        let transport = MockTransport::new();

        let summary = harvester(&transport, config(1))
            .run(
                vec![
                    ListingDescriptor::new(""),
                    ListingDescriptor::new("/relative/path"),
                    ListingDescriptor::new("ftp://x/1"),
                ],
                &paths,
            )
            .await
            .unwrap();

        assert_eq!(summary.invalid, 3);
        assert_eq!(summary.appended, 0);
        assert_eq!(transport.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_failures_counted_not_appended() {
        let dir = TempDir::new().unwrap();
        let paths = BatchPaths::new(dir.path(), "t");
        let transport = MockTransport::new()
            .with_script("https://x/gone", vec![Scripted::status(410)])
            .with_script("https://x/slow", vec![Scripted::status(429); 3])
            .with_page("https://x/ok", listing_page("A", "Acme", ""));

        let summary = harvester(&transport, config(3))
            .run(
                vec![
                    ListingDescriptor::new("https://x/gone"),
                    ListingDescriptor::new("https://x/slow"),
                    ListingDescriptor::new("https://x/ok"),
                ],
                &paths,
            )
            .await
            .unwrap();

        assert_eq!(summary.failed, 2);
        assert_eq!(summary.appended, 1);
        assert_eq!(transport.calls("https://x/gone"), 1);
        assert_eq!(transport.calls("https://x/slow"), 3);

        let urls: Vec<String> = load_snapshot(&paths.snapshot)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.url)
            .collect();
        assert_eq!(urls, vec!["https://x/ok"]);
    }

    #[tokio::test]
    async fn test_unknown_sections_counted() {
        let dir = TempDir::new().unwrap();
        let paths = BatchPaths::new(dir.path(), "t");
        let page = r#"<div data-scroll-id="brand-new-section"><ul>
            <li class="offer-view_tkzmjn3">Something</li></ul></div>"#;
        let transport = MockTransport::new().with_page("https://x/1", page);

        let summary = harvester(&transport, config(1))
            .run(vec![ListingDescriptor::new("https://x/1")], &paths)
            .await
            .unwrap();

        assert_eq!(summary.records_with_unknown_sections, 1);
    }

    #[tokio::test]
    async fn test_pre_cancelled_run_reports_cancellation() {
        let dir = TempDir::new().unwrap();
        let paths = BatchPaths::new(dir.path(), "t");
        let transport = MockTransport::new().with_page("https://x/1", "<html></html>");
        let token = CancellationToken::new();
        token.cancel();

        let result = harvester(&transport, config(1))
            .with_cancellation(token)
            .run(vec![ListingDescriptor::new("https://x/1")], &paths)
            .await;

        assert!(matches!(result, Err(HarvestError::Cancelled)));
        assert!(!paths.snapshot.exists());
    }

    #[tokio::test]
    async fn test_cancelled_with_nothing_pending_still_completes() {
        let dir = TempDir::new().unwrap();
        let paths = BatchPaths::new(dir.path(), "t");
        let transport = MockTransport::new().with_page("https://x/1", "<html></html>");
        harvester(&transport, config(1))
            .run(vec![ListingDescriptor::new("https://x/1")], &paths)
            .await
            .unwrap();

        let token = CancellationToken::new();
        token.cancel();
        let summary = harvester(&transport, config(1))
            .with_cancellation(token)
            .run(vec![ListingDescriptor::new("https://x/1")], &paths)
            .await
            .unwrap();

        assert_eq!(summary.skipped_duplicate, 1);
        assert!(summary.compaction.is_some());
    }

    #[tokio::test]
    async fn test_append_failure_aborts_run_and_keeps_log() {
        let dir = TempDir::new().unwrap();
        let paths = BatchPaths::new(dir.path(), "t");
        let urls: Vec<String> = (0..20).map(|i| format!("https://x/{i}")).collect();
        let transport = urls.iter().fold(MockTransport::new(), |t, url| {
            t.with_page(url.as_str(), listing_page("A", "Acme", ""))
        });

        let log = PersistenceLog::open(&paths)
            .await
            .unwrap()
            .map_sink(|sink| Box::new(FailingSink::after(sink, 1)) as Box<dyn LogSink>);
        let result = harvester(&transport, config(1))
            .run_with_log(
                urls.iter().map(ListingDescriptor::new).collect(),
                log,
                &paths,
            )
            .await;

        assert!(matches!(
            result,
            Err(HarvestError::Store(StoreError::WriteFailed { .. }))
        ));
        // Workers stop once the writer gives up
        assert!(transport.total_calls() < urls.len());
        assert!(!paths.snapshot.exists());

        let (records, malformed) = crate::store::snapshot::read_log(&paths.append_log)
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(malformed, 0);
    }

    #[tokio::test]
    async fn test_factory_error_fails_run() {
        let dir = TempDir::new().unwrap();
        let paths = BatchPaths::new(dir.path(), "t");
        let harvester: Harvester<MockTransport, RecordingSleeper> =
            Harvester::with_transport_factory(
                config(2),
                |_| {
                    Err(HarvestError::Input {
                        path: "factory".into(),
                        reason: "no transport".to_string(),
                    })
                },
                RecordingSleeper::new(),
            );

        let result = harvester
            .run(vec![ListingDescriptor::new("https://x/1")], &paths)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let dir = TempDir::new().unwrap();
        let paths = BatchPaths::new(dir.path(), "t");
        let transport = MockTransport::new();

        let result = harvester(&transport, config(0))
            .run(vec![ListingDescriptor::new("https://x/1")], &paths)
            .await;
        assert!(matches!(result, Err(HarvestError::Config(_))));
    }
}
