use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use sync_core::{
    Error, JobResult, Result, SourceRecord, SourceSystem, Trigger, TriggerEvent, TriggerPolicy,
    TriggerStatus,
};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PollConfig {
    /// Upper bound on records per tick; the rest wait for the next tick
    #[serde(default)]
    pub max_records: Option<usize>,

    /// Only records modified after this instant are picked up initially
    #[serde(default)]
    pub initial_cursor: Option<DateTime<Utc>>,
}

/// Trigger that queries the source for records changed since its cursor.
///
/// The cursor is the newest `last_modified` of the last committed batch.
/// `collect` only stages the next cursor; `commit` moves it.
pub struct PollTrigger {
    source: Arc<dyn SourceSystem>,
    config: PollConfig,
    cursor: Option<DateTime<Utc>>,
    pending: Option<DateTime<Utc>>,
    status: TriggerStatus,
}

impl PollTrigger {
    pub fn new(source: Arc<dyn SourceSystem>, config: PollConfig) -> Self {
        let cursor = config.initial_cursor;
        Self {
            source,
            config,
            cursor,
            pending: None,
            status: TriggerStatus {
                cursor,
                ..Default::default()
            },
        }
    }

    pub fn cursor(&self) -> Option<DateTime<Utc>> {
        self.cursor
    }

    /// Cap a batch at `max_records` without splitting records that share a
    /// timestamp, since the cursor comparison is strict.
    fn limit(&self, mut records: Vec<SourceRecord>) -> Vec<SourceRecord> {
        let Some(max) = self.config.max_records.filter(|m| *m > 0) else {
            return records;
        };
        if records.len() <= max {
            return records;
        }

        let boundary = records[max - 1].last_modified;
        let end = records
            .iter()
            .position(|r| r.last_modified > boundary)
            .unwrap_or(records.len());
        debug!(
            "Tick capped at {} of {} changed record(s)",
            end,
            records.len()
        );
        records.truncate(end);
        records
    }
}

#[async_trait]
impl Trigger for PollTrigger {
    fn policy(&self) -> TriggerPolicy {
        TriggerPolicy::Poll
    }

    async fn collect(&mut self, event: TriggerEvent) -> Result<Vec<SourceRecord>> {
        if let TriggerEvent::Push(_) = event {
            return Err(Error::Configuration(
                "poll trigger cannot accept push notifications".to_string(),
            ));
        }

        self.status.events += 1;
        let mut records = match self.source.list_changed(self.cursor).await {
            Ok(records) => records,
            Err(e) => {
                self.status.errors += 1;
                self.status.last_error = Some(e.to_string());
                error!("Failed to query changed records: {}", e);
                return Err(e);
            }
        };

        records.sort_by(|a, b| a.last_modified.cmp(&b.last_modified));
        let records = self.limit(records);

        self.pending = records.last().map(|r| r.last_modified);
        self.status.records_collected += records.len() as u64;
        if !records.is_empty() {
            info!(
                "Collected {} changed record(s) since {}",
                records.len(),
                self.cursor
                    .map(|c| c.to_rfc3339())
                    .unwrap_or_else(|| "the beginning".to_string())
            );
        }
        Ok(records)
    }

    async fn commit(&mut self, result: &JobResult) -> Result<()> {
        if !result.is_successful() {
            warn!(
                "Job {} failed; advancing the cursor past its records anyway",
                result.job_id
            );
        }
        if let Some(pending) = self.pending.take() {
            self.cursor = Some(pending);
            self.status.cursor = self.cursor;
            debug!("Poll cursor moved to {}", pending.to_rfc3339());
        }
        Ok(())
    }

    fn status(&self) -> TriggerStatus {
        self.status.clone()
    }
}
