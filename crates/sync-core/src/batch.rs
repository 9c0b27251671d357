use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use crate::convergence::{wait_until, BackoffPolicy};
use crate::{
    AdapterSummary, DestinationAdapter, Error, JobHandle, JobId, JobResult, JobState, JobStatus,
    NoOpNotifier, Notifier, RecordFailure, Result, SourceRecord, SyncRules, WriteAction,
};

/// Tunables of the batch runner
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunnerSettings {
    /// Interval between job state checks in `await_completion`
    #[serde(default = "default_status_poll_interval_ms")]
    pub status_poll_interval_ms: u64,

    /// Records processed concurrently; 1 keeps the batch sequential
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// How long a lookup may keep reporting "not converged" before the
    /// record is failed for that destination
    #[serde(default = "default_lookup_timeout_ms")]
    pub lookup_timeout_ms: u64,

    #[serde(default)]
    pub lookup_backoff: BackoffPolicy,

    /// Finished jobs kept for status reads; older ones are dropped first
    #[serde(default = "default_retained_jobs")]
    pub retained_jobs: usize,
}

fn default_status_poll_interval_ms() -> u64 {
    500
}

fn default_max_concurrency() -> usize {
    1
}

fn default_lookup_timeout_ms() -> u64 {
    60_000
}

fn default_retained_jobs() -> usize {
    200
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            status_poll_interval_ms: default_status_poll_interval_ms(),
            max_concurrency: default_max_concurrency(),
            lookup_timeout_ms: default_lookup_timeout_ms(),
            lookup_backoff: BackoffPolicy::default(),
            retained_jobs: default_retained_jobs(),
        }
    }
}

impl RunnerSettings {
    pub fn status_poll_interval(&self) -> Duration {
        Duration::from_millis(self.status_poll_interval_ms.max(1))
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }
}

#[derive(Default)]
struct JobTable {
    states: HashMap<JobId, JobState>,
    /// Finished jobs, oldest first
    finished: VecDeque<JobId>,
}

impl JobTable {
    /// Record a terminal state and drop the oldest finished jobs beyond `retain`.
    /// Returns false when the job had already finished.
    fn finish(&mut self, result: JobResult, retain: usize) -> bool {
        let job_id = result.job_id;
        if let Some(JobState::Finished(_)) = self.states.get(&job_id) {
            return false;
        }
        self.states.insert(job_id, JobState::Finished(result));
        self.finished.push_back(job_id);

        while self.finished.len() > retain.max(1) {
            if let Some(oldest) = self.finished.pop_front() {
                self.states.remove(&oldest);
            }
        }
        true
    }
}

#[derive(Default)]
struct RecordOutcome {
    filtered: bool,
    actions: Vec<(usize, WriteAction)>,
    failures: Vec<(usize, RecordFailure)>,
}

/// Runs batches of source records against every configured destination.
///
/// Cloning is cheap; clones share the job table.
#[derive(Clone)]
pub struct BatchRunner {
    flow: String,
    adapters: Arc<Vec<Arc<dyn DestinationAdapter>>>,
    rules: Arc<SyncRules>,
    settings: RunnerSettings,
    notifier: Arc<dyn Notifier>,
    jobs: Arc<RwLock<JobTable>>,
}

impl BatchRunner {
    pub fn new(
        flow: impl Into<String>,
        adapters: Vec<Arc<dyn DestinationAdapter>>,
        rules: SyncRules,
        settings: RunnerSettings,
    ) -> Self {
        Self {
            flow: flow.into(),
            adapters: Arc::new(adapters),
            rules: Arc::new(rules),
            settings,
            notifier: Arc::new(NoOpNotifier),
            jobs: Arc::new(RwLock::new(JobTable::default())),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn flow(&self) -> &str {
        &self.flow
    }

    pub fn adapters(&self) -> &[Arc<dyn DestinationAdapter>] {
        &self.adapters
    }

    pub fn adapter(&self, name: &str) -> Option<Arc<dyn DestinationAdapter>> {
        self.adapters.iter().find(|a| a.name() == name).cloned()
    }

    pub fn rules(&self) -> &SyncRules {
        &self.rules
    }

    pub fn settings(&self) -> &RunnerSettings {
        &self.settings
    }

    /// Register a job and start processing it in the background
    pub async fn submit(&self, records: Vec<SourceRecord>) -> JobHandle {
        let job_id = JobId::new();
        let total = records.len();
        let submitted_at = Utc::now();

        self.jobs.write().await.states.insert(
            job_id,
            JobState::Running {
                job_id,
                flow: self.flow.clone(),
                total,
                submitted_at,
            },
        );
        info!(
            "[{}] Submitted job {} with {} record(s)",
            self.flow, job_id, total
        );

        let runner = self.clone();
        let task = tokio::spawn(async move { runner.process(job_id, records, submitted_at).await });

        let runner = self.clone();
        tokio::spawn(async move {
            let result = match task.await {
                Ok(result) => result,
                Err(e) => {
                    error!("[{}] Job {} aborted: {}", runner.flow, job_id, e);
                    runner.aborted(job_id, total, submitted_at, e.to_string())
                }
            };
            runner.finish(result).await;
        });

        JobHandle { job_id, total }
    }

    /// Wait for a job to reach a terminal state.
    ///
    /// A failed job is returned as `Ok`; use `JobResult::assert_successful`.
    /// Dropping the future only abandons the wait, the job keeps running.
    pub async fn await_completion(&self, handle: &JobHandle, timeout: Duration) -> Result<JobResult> {
        let started = Instant::now();
        let deadline = started + timeout;
        let interval = self.settings.status_poll_interval();

        loop {
            match self.job_state(handle.job_id).await {
                Some(JobState::Finished(result)) => return Ok(result),
                Some(JobState::Running { .. }) => {}
                None => return Err(Error::NotFound(format!("job {}", handle.job_id))),
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(Error::StillRunning {
                    job_id: handle.job_id,
                    waited: now - started,
                });
            }
            sleep(interval.min(deadline - now)).await;
        }
    }

    pub async fn job_state(&self, job_id: JobId) -> Option<JobState> {
        self.jobs.read().await.states.get(&job_id).cloned()
    }

    pub async fn jobs(&self) -> Vec<JobState> {
        self.jobs.read().await.states.values().cloned().collect()
    }

    async fn process(
        &self,
        job_id: JobId,
        records: Vec<SourceRecord>,
        started_at: DateTime<Utc>,
    ) -> JobResult {
        let total = records.len();
        let concurrency = self.settings.max_concurrency.max(1);

        let outcomes: Vec<RecordOutcome> = stream::iter(records.into_iter().enumerate())
            .map(|(index, record)| self.sync_record(index, record))
            .buffered(concurrency)
            .collect()
            .await;

        let mut adapters: Vec<AdapterSummary> = self
            .adapters
            .iter()
            .map(|a| AdapterSummary::new(a.name()))
            .collect();
        let mut succeeded = 0;
        let mut failed = 0;
        let mut filtered = 0;
        let mut failures = Vec::new();

        for outcome in outcomes {
            if outcome.filtered {
                filtered += 1;
                continue;
            }
            for (idx, action) in outcome.actions {
                adapters[idx].tally(action);
            }
            if outcome.failures.is_empty() {
                succeeded += 1;
            } else {
                failed += 1;
                for (idx, failure) in outcome.failures {
                    adapters[idx].failed += 1;
                    failures.push(failure);
                }
            }
        }

        JobResult {
            job_id,
            flow: self.flow.clone(),
            status: if failed == 0 {
                JobStatus::Succeeded
            } else {
                JobStatus::Failed
            },
            total,
            succeeded,
            failed,
            filtered,
            failures,
            adapters,
            started_at,
            finished_at: Utc::now(),
        }
    }

    async fn sync_record(&self, index: usize, record: SourceRecord) -> RecordOutcome {
        if let Some(reason) = self.rules.rejection(&record) {
            debug!(
                "[{}] Record #{} {} filtered out: {}",
                self.flow,
                index,
                record.label(),
                reason
            );
            return RecordOutcome {
                filtered: true,
                ..Default::default()
            };
        }

        let mut outcome = RecordOutcome::default();
        for (idx, adapter) in self.adapters.iter().enumerate() {
            match self.sync_to_adapter(adapter.as_ref(), &record).await {
                Ok(action) => {
                    debug!(
                        "[{}] Record #{} {} -> {}: {:?}",
                        self.flow,
                        index,
                        record.label(),
                        adapter.name(),
                        action
                    );
                    outcome.actions.push((idx, action));
                }
                Err(e) => {
                    warn!(
                        "[{}] Record #{} {} failed at {}: {}",
                        self.flow,
                        index,
                        record.label(),
                        adapter.name(),
                        e
                    );
                    outcome.failures.push((
                        idx,
                        RecordFailure {
                            index,
                            record_id: record.id.clone(),
                            name: record.name().map(str::to_string),
                            adapter: adapter.name().to_string(),
                            reason: e.to_string(),
                        },
                    ));
                }
            }
        }
        outcome
    }

    /// Lookup, decide, write
    async fn sync_to_adapter(
        &self,
        adapter: &dyn DestinationAdapter,
        record: &SourceRecord,
    ) -> Result<WriteAction> {
        let key = adapter.business_key(record)?;
        let fields = adapter.map_fields(record);

        let what = format!("lookup of '{}' in {}", key, adapter.name());
        let key_ref = key.as_str();
        let existing = wait_until(
            &what,
            self.settings.lookup_timeout(),
            &self.settings.lookup_backoff,
            move || async move { adapter.find_by_key(key_ref).await.map(Some) },
        )
        .await?;

        let action = adapter.plan(existing.as_ref(), &fields);
        match action {
            WriteAction::Create => {
                let id = adapter.create(&key, fields).await?;
                debug!("[{}] Created '{}' in {} as {}", self.flow, key, adapter.name(), id);
            }
            WriteAction::Update => adapter.update(&key, fields).await?,
            WriteAction::Skip => {}
        }
        Ok(action)
    }

    /// Result of a job whose processing task died before producing one
    fn aborted(
        &self,
        job_id: JobId,
        total: usize,
        started_at: DateTime<Utc>,
        reason: String,
    ) -> JobResult {
        JobResult {
            job_id,
            flow: self.flow.clone(),
            status: JobStatus::Failed,
            total,
            succeeded: 0,
            failed: total,
            filtered: 0,
            failures: vec![RecordFailure {
                index: 0,
                record_id: None,
                name: None,
                adapter: "runner".to_string(),
                reason: format!("batch aborted: {}", reason),
            }],
            adapters: self
                .adapters
                .iter()
                .map(|a| AdapterSummary::new(a.name()))
                .collect(),
            started_at,
            finished_at: Utc::now(),
        }
    }

    async fn finish(&self, result: JobResult) {
        let recorded = self
            .jobs
            .write()
            .await
            .finish(result.clone(), self.settings.retained_jobs);
        if !recorded {
            warn!(
                "[{}] Job {} already finished, ignoring second result",
                self.flow, result.job_id
            );
            return;
        }

        if result.is_successful() {
            info!(
                "[{}] Job {} succeeded: {} synced, {} filtered",
                self.flow, result.job_id, result.succeeded, result.filtered
            );
            return;
        }

        error!(
            "[{}] Job {} failed: {} of {} record(s) failed",
            self.flow, result.job_id, result.failed, result.total
        );
        if let Err(e) = self.notifier.notify_job_failed(&result).await {
            error!("[{}] Failed to send job failure notification: {}", self.flow, e);
        }
    }
}
