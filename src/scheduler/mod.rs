//! Deadline-driven tender monitor.
//!
//! Each cycle fetches a batch from the [`Collector`], classifies every new
//! opportunity (process now or queue until its deadline), then drains the
//! queue of everything that has come due. An identifier is marked processed
//! and persisted when it is classified, before any processing happens, so an
//! opportunity gets at most one attempt even across restarts.
//!
//! The monitor is a single control flow. The queue and the processed set are
//! owned here and only touched through `&mut self`.

pub mod deadline;
pub mod processed;
pub mod queue;

use crate::application::ApplicationAssembler;
use crate::collector::{CandidateQuery, Collector};
use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use chrono::{DateTime, FixedOffset, Utc};
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tenderwatch_types::OpportunityRecord;
use tracing::{debug, error, info, warn};

pub use deadline::{parse_deadline, Deadline, DeadlineSource, DEADLINE_FORMATS};
pub use processed::ProcessedIdSet;
pub use queue::PendingQueue;

/// Step of `process` at which an opportunity failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStage {
    Detail,
    Sign,
    Persist,
    Submit,
}

impl fmt::Display for ProcessStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Detail => "detail",
            Self::Sign => "sign",
            Self::Persist => "persist",
            Self::Submit => "submit",
        };
        f.write_str(name)
    }
}

/// Result of a single processing attempt. Failures are never retried.
#[derive(Debug)]
pub enum ProcessOutcome {
    /// Signed, saved and accepted by the portal
    Submitted { artifact: PathBuf },
    /// Signed and saved, but the portal refused the submission
    Rejected { artifact: PathBuf },
    Failed { stage: ProcessStage, error: AppError },
}

impl ProcessOutcome {
    pub fn is_submitted(&self) -> bool {
        matches!(self, Self::Submitted { .. })
    }

    pub fn artifact(&self) -> Option<&PathBuf> {
        match self {
            Self::Submitted { artifact } | Self::Rejected { artifact } => Some(artifact),
            Self::Failed { .. } => None,
        }
    }
}

/// What classification did with a fetched batch
#[derive(Debug, Default)]
pub struct Classification {
    /// Records not seen before
    pub new: usize,
    /// Records queued for a future deadline
    pub enqueued: usize,
    /// Records that were due and processed right away
    pub processed: Vec<ProcessOutcome>,
}

/// Summary of one monitoring cycle
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: usize,
    pub new: usize,
    pub processed_now: usize,
    pub enqueued: usize,
    pub drained: usize,
    pub submitted: usize,
    pub failed: usize,
    /// Queue length after the cycle
    pub pending: usize,
}

impl CycleReport {
    fn count(&mut self, outcomes: &[ProcessOutcome]) {
        for outcome in outcomes {
            match outcome {
                ProcessOutcome::Submitted { .. } => self.submitted += 1,
                ProcessOutcome::Rejected { .. } => {}
                ProcessOutcome::Failed { .. } => self.failed += 1,
            }
        }
    }
}

/// Polls for opportunities and drives each one through signing and submission.
pub struct TenderScheduler {
    collector: Arc<dyn Collector>,
    assembler: ApplicationAssembler,
    processed: ProcessedIdSet,
    pending: PendingQueue,
    query: CandidateQuery,
    deadline_offset: FixedOffset,
    poll_interval: Duration,
    error_cooldown: Duration,
}

impl fmt::Debug for TenderScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenderScheduler")
            .field("query", &self.query)
            .field("processed", &self.processed.len())
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl TenderScheduler {
    pub fn new(
        collector: Arc<dyn Collector>,
        assembler: ApplicationAssembler,
        processed: ProcessedIdSet,
        config: &AppConfig,
    ) -> Self {
        Self {
            collector,
            assembler,
            processed,
            pending: PendingQueue::new(),
            query: CandidateQuery::from(&config.collector),
            deadline_offset: config.scheduler.deadline_offset(),
            poll_interval: Duration::from_secs(config.scheduler.poll_interval_secs),
            error_cooldown: Duration::from_secs(config.scheduler.error_cooldown_secs),
        }
    }

    pub fn pending(&self) -> &PendingQueue {
        &self.pending
    }

    pub fn processed(&self) -> &ProcessedIdSet {
        &self.processed
    }

    /// Run cycles until `shutdown` resolves.
    ///
    /// Shutdown is only observed between cycles; an in-flight cycle runs to
    /// completion first.
    pub async fn run<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        info!(
            category = %self.query.category,
            max_pages = self.query.max_pages,
            interval_secs = self.poll_interval.as_secs(),
            "Tender monitor started"
        );

        loop {
            let pause = match self.run_cycle().await {
                Ok(report) => {
                    info!(
                        fetched = report.fetched,
                        new = report.new,
                        processed_now = report.processed_now,
                        enqueued = report.enqueued,
                        drained = report.drained,
                        submitted = report.submitted,
                        failed = report.failed,
                        pending = report.pending,
                        "Cycle complete"
                    );
                    self.poll_interval
                }
                Err(e) => {
                    error!("Monitoring cycle failed: {}", e);
                    warn!("Retrying in {} seconds", self.error_cooldown.as_secs());
                    self.error_cooldown
                }
            };

            tokio::select! {
                _ = &mut shutdown => {
                    info!(pending = self.pending.len(), "Shutdown requested, stopping monitor");
                    break;
                }
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }

    /// One pass against the wall clock. The drain reads the clock again, so
    /// deadlines reached while the batch was being processed are not left
    /// waiting for the next cycle.
    pub async fn run_cycle(&mut self) -> AppResult<CycleReport> {
        self.run_cycle_with(Utc::now(), Utc::now).await
    }

    /// One fetch, classify and drain pass with `now` as the reference time.
    pub async fn run_cycle_at(&mut self, now: DateTime<Utc>) -> AppResult<CycleReport> {
        self.run_cycle_with(now, move || now).await
    }

    async fn run_cycle_with<C>(&mut self, now: DateTime<Utc>, drain_clock: C) -> AppResult<CycleReport>
    where
        C: FnOnce() -> DateTime<Utc>,
    {
        debug!("Fetching candidates");
        let batch = self.collector.fetch_candidates(&self.query).await?;

        let mut report = CycleReport {
            fetched: batch.len(),
            ..CycleReport::default()
        };

        let classification = self.classify(batch, now).await?;
        report.new = classification.new;
        report.enqueued = classification.enqueued;
        report.processed_now = classification.processed.len();
        report.count(&classification.processed);

        let drained = self.drain_pending(drain_clock()).await;
        report.drained = drained.len();
        report.count(&drained);

        report.pending = self.pending.len();
        Ok(report)
    }

    /// Mark every unseen record processed, then process it if due or queue it.
    ///
    /// Fails only if the processed set cannot be persisted; records after the
    /// failing one are left unclassified.
    pub async fn classify(
        &mut self,
        batch: Vec<OpportunityRecord>,
        now: DateTime<Utc>,
    ) -> AppResult<Classification> {
        let mut classification = Classification::default();

        for record in batch {
            if self.processed.contains(&record.identifier) {
                continue;
            }

            let deadline = parse_deadline(&record.deadline, self.deadline_offset, now);
            if deadline.source == DeadlineSource::Unparseable {
                warn!(
                    tender = %record.reference_number,
                    deadline = %record.deadline,
                    "Unrecognised deadline, treating as due now"
                );
            }

            self.processed.insert(&record.identifier)?;
            classification.new += 1;

            if deadline.is_due(now) {
                let outcome = self.process(&record).await;
                classification.processed.push(outcome);
            } else {
                info!(
                    tender = %record.reference_number,
                    deadline = %deadline.at,
                    "Queued until deadline"
                );
                self.pending.push(deadline.at, record);
                classification.enqueued += 1;
            }
        }

        Ok(classification)
    }

    /// Process queued records whose deadline is at or before `now`, earliest first.
    pub async fn drain_pending(&mut self, now: DateTime<Utc>) -> Vec<ProcessOutcome> {
        let mut outcomes = Vec::new();
        while let Some((deadline, record)) = self.pending.pop_due(now) {
            debug!(tender = %record.reference_number, deadline = %deadline, "Deadline reached");
            outcomes.push(self.process(&record).await);
        }
        outcomes
    }

    /// Open, sign, save and submit one opportunity. Never panics or retries.
    pub async fn process(&self, record: &OpportunityRecord) -> ProcessOutcome {
        info!(tender = %record.reference_number, "Processing: {}", record.short_title());

        let outcome = self.try_process(record).await;
        match &outcome {
            ProcessOutcome::Submitted { artifact } => {
                info!(tender = %record.reference_number, artifact = %artifact.display(), "Application submitted");
            }
            ProcessOutcome::Rejected { artifact } => {
                warn!(tender = %record.reference_number, artifact = %artifact.display(), "Application refused by portal");
            }
            ProcessOutcome::Failed { stage, error } => {
                error!(tender = %record.reference_number, %stage, "Processing failed: {}", error);
            }
        }
        outcome
    }

    async fn try_process(&self, record: &OpportunityRecord) -> ProcessOutcome {
        if let Err(e) = self.collector.open_detail(&record.identifier).await {
            return failed(ProcessStage::Detail, e);
        }

        let application = ApplicationAssembler::create(record, self.assembler.company());
        let signed = match self.assembler.sign(application).await {
            Ok(signed) => signed,
            Err(e) => return failed(ProcessStage::Sign, e),
        };

        let artifact = match self.assembler.persist(&signed) {
            Ok(path) => path,
            Err(e) => return failed(ProcessStage::Persist, e),
        };

        match self.collector.submit(&signed).await {
            Ok(true) => ProcessOutcome::Submitted { artifact },
            Ok(false) => ProcessOutcome::Rejected { artifact },
            Err(e) => failed(ProcessStage::Submit, e),
        }
    }
}

fn failed(stage: ProcessStage, error: AppError) -> ProcessOutcome {
    ProcessOutcome::Failed { stage, error }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, CollectorConfig, SchedulerConfig, SigningConfig, StorageConfig};
    use crate::testing::{company, opportunity, ScriptedCollector, ScriptedSigner};
    use chrono::{Duration as ChronoDuration, TimeZone};
    use tempfile::TempDir;

    struct Harness {
        dir: TempDir,
        collector: Arc<ScriptedCollector>,
    }

    impl Harness {
        fn new(accept_submissions: bool) -> Self {
            Self {
                dir: TempDir::new().unwrap(),
                collector: Arc::new(ScriptedCollector::new(accept_submissions)),
            }
        }

        fn config(&self) -> AppConfig {
            AppConfig {
                signing: SigningConfig::default(),
                collector: CollectorConfig::default(),
                scheduler: SchedulerConfig::default(),
                storage: StorageConfig {
                    keys_dir: self.dir.path().join("keys"),
                    output_dir: self.dir.path().join("output"),
                },
                company: company(),
            }
        }

        fn scheduler(&self, signer: ScriptedSigner) -> TenderScheduler {
            self.scheduler_with(signer, self.config())
        }

        fn scheduler_with(&self, signer: ScriptedSigner, config: AppConfig) -> TenderScheduler {
            let assembler = ApplicationAssembler::new(
                Arc::new(signer),
                config.company.clone(),
                config.storage.output_dir.clone(),
                &config.signing,
            );
            let processed = ProcessedIdSet::load(config.storage.processed_file());
            TenderScheduler::new(self.collector.clone(), assembler, processed, &config)
        }

        fn artifacts(&self) -> Vec<PathBuf> {
            let Ok(entries) = std::fs::read_dir(self.dir.path().join("output")) else {
                return Vec::new();
            };
            entries
                .map(|e| e.unwrap().path())
                .filter(|p| {
                    p.file_name()
                        .map(|n| n.to_string_lossy().starts_with("application_"))
                        .unwrap_or(false)
                })
                .collect()
        }
    }

    /// 2030-06-01 12:00 UTC, i.e. 17:00 at the portal
    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 6, 1, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_future_deadline_is_enqueued() {
        let harness = Harness::new(true);
        let mut scheduler = harness.scheduler(ScriptedSigner::ok("sig"));
        harness.collector.push_batch(vec![opportunity("T-100", "2099-01-01 10:00")]);

        let report = scheduler.run_cycle_at(now()).await.unwrap();

        assert_eq!(report.enqueued, 1);
        assert_eq!(report.processed_now, 0);
        assert_eq!(report.pending, 1);
        assert!(harness.collector.opened().is_empty());
        assert!(harness.artifacts().is_empty());
        assert!(scheduler.processed().contains("https://portal/announce/T-100"));
    }

    #[tokio::test]
    async fn test_empty_deadline_is_processed_now() {
        let harness = Harness::new(true);
        let mut scheduler = harness.scheduler(ScriptedSigner::ok("sig"));
        harness.collector.push_batch(vec![opportunity("T-101", "")]);

        let report = scheduler.run_cycle_at(now()).await.unwrap();

        assert_eq!(report.processed_now, 1);
        assert_eq!(report.submitted, 1);
        assert_eq!(report.pending, 0);
        assert_eq!(harness.collector.opened(), ["https://portal/announce/T-101"]);
        assert_eq!(harness.collector.submitted().len(), 1);
        assert_eq!(harness.artifacts().len(), 1);
        assert!(scheduler.processed().contains("https://portal/announce/T-101"));
    }

    #[tokio::test]
    async fn test_signing_failure_persists_nothing_and_stays_marked() {
        let harness = Harness::new(true);
        let mut scheduler = harness.scheduler(ScriptedSigner::failing("status 500: key is locked"));

        let classification = scheduler
            .classify(vec![opportunity("T-101", "")], now())
            .await
            .unwrap();

        assert!(matches!(
            classification.processed.as_slice(),
            [ProcessOutcome::Failed { stage: ProcessStage::Sign, error: AppError::SigningService(_) }]
        ));
        assert!(harness.artifacts().is_empty());
        assert!(harness.collector.submitted().is_empty());

        let reloaded = ProcessedIdSet::load(harness.config().storage.processed_file());
        assert!(reloaded.contains("https://portal/announce/T-101"));

        // No retry on the next cycle
        harness.collector.push_batch(vec![opportunity("T-101", "")]);
        let report = scheduler.run_cycle_at(now()).await.unwrap();
        assert_eq!(report.new, 0);
        assert_eq!(report.processed_now, 0);
    }

    #[tokio::test]
    async fn test_deadline_equal_to_now_is_processed() {
        let harness = Harness::new(true);
        let mut scheduler = harness.scheduler(ScriptedSigner::ok("sig"));

        let classification = scheduler
            .classify(vec![opportunity("T-5", "01.06.2030 17:00")], now())
            .await
            .unwrap();

        assert_eq!(classification.enqueued, 0);
        assert_eq!(classification.processed.len(), 1);
        assert!(classification.processed[0].is_submitted());
        assert!(scheduler.pending().is_empty());
    }

    #[tokio::test]
    async fn test_classification_is_idempotent() {
        let harness = Harness::new(true);
        let mut scheduler = harness.scheduler(ScriptedSigner::ok("sig"));
        let batch = vec![
            opportunity("T-1", ""),
            opportunity("T-2", "2099-01-01 10:00"),
            opportunity("T-1", ""),
        ];

        let first = scheduler.classify(batch.clone(), now()).await.unwrap();
        assert_eq!(first.new, 2);
        assert_eq!(first.processed.len(), 1);
        assert_eq!(first.enqueued, 1);

        let second = scheduler.classify(batch, now()).await.unwrap();
        assert_eq!(second.new, 0);
        assert_eq!(second.enqueued, 0);
        assert!(second.processed.is_empty());
        assert_eq!(scheduler.pending().len(), 1);
        assert_eq!(harness.collector.submitted().len(), 1);
    }

    #[tokio::test]
    async fn test_pending_drains_in_deadline_order() {
        let harness = Harness::new(true);
        let mut scheduler = harness.scheduler(ScriptedSigner::ok("sig"));
        harness.collector.push_batch(vec![
            opportunity("D3", "01.06.2030 20:00"),
            opportunity("D1", "01.06.2030 18:00"),
            opportunity("D2", "2030-06-01 19:00"),
            opportunity("D4", "2099-01-01"),
        ]);

        let report = scheduler.run_cycle_at(now()).await.unwrap();
        assert_eq!(report.enqueued, 4);
        assert_eq!(report.drained, 0);

        // Empty batch; three hours later D1..D3 are due
        let later = now() + ChronoDuration::hours(3);
        let report = scheduler.run_cycle_at(later).await.unwrap();
        assert_eq!(report.drained, 3);
        assert_eq!(report.pending, 1);
        assert_eq!(
            harness.collector.opened(),
            [
                "https://portal/announce/D1",
                "https://portal/announce/D2",
                "https://portal/announce/D3",
            ]
        );
        assert_eq!(scheduler.pending().peek().unwrap().1.reference_number, "D4");
    }

    #[tokio::test]
    async fn test_collector_failure_fails_cycle() {
        let harness = Harness::new(true);
        let mut scheduler = harness.scheduler(ScriptedSigner::ok("sig"));
        harness.collector.push_failure("page driver timed out");

        let err = scheduler.run_cycle_at(now()).await.unwrap_err();
        assert!(matches!(err, AppError::Collector(_)));
        assert!(scheduler.processed().is_empty());
    }

    #[tokio::test]
    async fn test_refused_submission_keeps_artifact() {
        let harness = Harness::new(false);
        let mut scheduler = harness.scheduler(ScriptedSigner::ok("sig"));

        let classification = scheduler
            .classify(vec![opportunity("T-9", "")], now())
            .await
            .unwrap();

        let outcome = &classification.processed[0];
        assert!(matches!(outcome, ProcessOutcome::Rejected { .. }));
        assert!(outcome.artifact().unwrap().exists());
    }

    #[tokio::test]
    async fn test_restart_skips_classified_ids() {
        let harness = Harness::new(true);
        {
            let mut scheduler = harness.scheduler(ScriptedSigner::ok("sig"));
            harness.collector.push_batch(vec![opportunity("T-100", "2099-01-01 10:00")]);
            scheduler.run_cycle_at(now()).await.unwrap();
        }

        // The queued record is lost with the old process but never retried
        let mut restarted = harness.scheduler(ScriptedSigner::ok("sig"));
        harness.collector.push_batch(vec![opportunity("T-100", "2099-01-01 10:00")]);
        let report = restarted.run_cycle_at(now()).await.unwrap();
        assert_eq!(report.new, 0);
        assert!(restarted.pending().is_empty());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let harness = Harness::new(true);
        let mut scheduler = harness.scheduler(ScriptedSigner::ok("sig"));
        harness.collector.push_batch(vec![opportunity("T-1", "")]);

        scheduler.run(std::future::ready(())).await;

        assert_eq!(harness.collector.submitted().len(), 1);
    }

    #[tokio::test]
    async fn test_drain_uses_clock_after_classification() {
        let harness = Harness::new(true);
        let mut scheduler = harness.scheduler(ScriptedSigner::ok("sig"));
        // Due 30 minutes after the cycle starts
        harness.collector.push_batch(vec![opportunity("T-30", "01.06.2030 17:30")]);

        let report = scheduler
            .run_cycle_with(now(), || now() + ChronoDuration::hours(1))
            .await
            .unwrap();

        assert_eq!(report.enqueued, 1);
        assert_eq!(report.drained, 1);
        assert_eq!(report.submitted, 1);
        assert!(scheduler.pending().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_cooldown_then_resume() {
        let harness = Harness::new(true);
        let mut config = harness.config();
        config.scheduler.poll_interval_secs = 300;
        config.scheduler.error_cooldown_secs = 60;
        let mut scheduler = harness.scheduler_with(ScriptedSigner::ok("sig"), config);
        harness.collector.push_failure("page driver timed out");
        harness.collector.push_batch(vec![opportunity("T-1", "")]);

        let started = tokio::time::Instant::now();
        scheduler.run(tokio::time::sleep(Duration::from_secs(100))).await;

        let fetched_at = harness.collector.fetched_at();
        assert_eq!(fetched_at.len(), 2);
        assert_eq!(fetched_at[0], started);
        assert_eq!(fetched_at[1] - fetched_at[0], Duration::from_secs(60));
        assert_eq!(harness.collector.submitted().len(), 1);
    }
}
