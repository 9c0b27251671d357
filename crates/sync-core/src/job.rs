use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::{Error, Result, WriteAction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(JobId)
            .map_err(|e| Error::Parse(format!("Invalid job id '{}': {}", s, e)))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Running,
    Succeeded,
    Failed,
}

/// One record that could not be written to one destination
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordFailure {
    /// Position of the record in the submitted batch
    pub index: usize,
    pub record_id: Option<String>,
    pub name: Option<String>,
    pub adapter: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AdapterSummary {
    pub adapter: String,
    pub created: u64,
    pub updated: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl AdapterSummary {
    pub fn new(adapter: impl Into<String>) -> Self {
        Self {
            adapter: adapter.into(),
            ..Default::default()
        }
    }

    pub(crate) fn tally(&mut self, action: WriteAction) {
        match action {
            WriteAction::Create => self.created += 1,
            WriteAction::Update => self.updated += 1,
            WriteAction::Skip => self.skipped += 1,
        }
    }
}

/// Aggregate outcome of a batch
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobResult {
    pub job_id: JobId,
    pub flow: String,
    pub status: JobStatus,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Records dropped by the pre-sync rules; they never fail a job
    pub filtered: usize,
    pub failures: Vec<RecordFailure>,
    pub adapters: Vec<AdapterSummary>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl JobResult {
    pub fn is_successful(&self) -> bool {
        self.status == JobStatus::Succeeded
    }

    pub fn assert_successful(&self) -> Result<()> {
        if self.is_successful() {
            Ok(())
        } else {
            Err(Error::JobFailed(Box::new(self.clone())))
        }
    }

    pub fn adapter(&self, name: &str) -> Option<&AdapterSummary> {
        self.adapters.iter().find(|a| a.adapter == name)
    }

    pub fn failures_for(&self, index: usize) -> Vec<&RecordFailure> {
        self.failures.iter().filter(|f| f.index == index).collect()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    Running {
        job_id: JobId,
        flow: String,
        total: usize,
        submitted_at: DateTime<Utc>,
    },
    Finished(JobResult),
}

impl JobState {
    pub fn status(&self) -> JobStatus {
        match self {
            JobState::Running { .. } => JobStatus::Running,
            JobState::Finished(result) => result.status,
        }
    }

    pub fn result(&self) -> Option<&JobResult> {
        match self {
            JobState::Running { .. } => None,
            JobState::Finished(result) => Some(result),
        }
    }
}

/// Returned by `submit`; identifies the job to wait on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobHandle {
    pub job_id: JobId,
    pub total: usize,
}
