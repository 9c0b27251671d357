use crate::{JobResult, Result, SourceRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a flow learns about changed source records
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TriggerPolicy {
    #[default]
    Poll,
    Push,
}

impl TriggerPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerPolicy::Poll => "poll",
            TriggerPolicy::Push => "push",
        }
    }
}

impl fmt::Display for TriggerPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub enum TriggerEvent {
    /// Scheduler tick (or a manual "run once")
    Tick,
    /// Inbound notification payload
    Push(String),
}

/// Trait for change detectors feeding the batch runner
#[async_trait]
pub trait Trigger: Send + Sync {
    fn policy(&self) -> TriggerPolicy;

    /// Turn an event into the records of one batch
    async fn collect(&mut self, event: TriggerEvent) -> Result<Vec<SourceRecord>>;

    /// Called once the batch built from the last `collect` reached a terminal state
    async fn commit(&mut self, _result: &JobResult) -> Result<()> {
        Ok(())
    }

    fn status(&self) -> TriggerStatus;
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TriggerStatus {
    pub events: u64,
    pub records_collected: u64,
    pub errors: u64,
    pub last_error: Option<String>,
    pub cursor: Option<DateTime<Utc>>,
}
