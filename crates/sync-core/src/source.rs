use crate::{Result, SourceRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// The org changes are read from
#[async_trait]
pub trait SourceSystem: Send + Sync {
    /// Records modified strictly after `since` (all records when `None`),
    /// oldest first
    async fn list_changed(&self, since: Option<DateTime<Utc>>) -> Result<Vec<SourceRecord>>;

    /// Create records and return their assigned ids, in input order
    async fn create(&self, records: Vec<SourceRecord>) -> Result<Vec<String>>;

    /// Delete records by id; unknown ids are ignored
    async fn delete(&self, ids: &[String]) -> Result<()>;
}
