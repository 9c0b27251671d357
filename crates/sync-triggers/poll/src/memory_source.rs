use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use sync_core::{Error, Fields, Result, SourceRecord, SourceSystem};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Account key prefix of Salesforce-style ids
const ID_PREFIX: &str = "001";

#[derive(Default)]
struct Inner {
    records: HashMap<String, SourceRecord>,
    last_stamp: Option<DateTime<Utc>>,
}

impl Inner {
    /// Strictly increasing modification stamps, so a cursor never skips a
    /// record written in the same clock tick as the previous one
    fn stamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let stamp = match self.last_stamp {
            Some(last) if now <= last => last + chrono::Duration::microseconds(1),
            _ => now,
        };
        self.last_stamp = Some(stamp);
        stamp
    }
}

/// In-memory source org
pub struct MemorySource {
    inner: RwLock<Inner>,
    sequence: AtomicU64,
}

impl MemorySource {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            sequence: AtomicU64::new(0),
        }
    }

    /// Source pre-populated with the records of a JSON seed file
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let source = Self::new();
        let records = load_seed(path).await?;
        let ids = source.create(records).await?;
        info!("Seeded in-memory source with {} record(s)", ids.len());
        Ok(source)
    }

    fn next_id(&self) -> String {
        let n = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{}{:015}", ID_PREFIX, n)
    }

    /// Merge `fields` into an existing record and mark it modified
    pub async fn update(&self, id: &str, fields: Fields) -> Result<SourceRecord> {
        let mut inner = self.inner.write().await;
        let stamp = inner.stamp();
        let record = inner
            .records
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("no source record with id '{}'", id)))?;
        record.fields.extend(fields);
        record.last_modified = stamp;
        debug!("Updated source record {}", record.label());
        Ok(record.clone())
    }

    pub async fn get(&self, id: &str) -> Option<SourceRecord> {
        self.inner.read().await.records.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceSystem for MemorySource {
    async fn list_changed(&self, since: Option<DateTime<Utc>>) -> Result<Vec<SourceRecord>> {
        let inner = self.inner.read().await;
        let mut changed: Vec<SourceRecord> = inner
            .records
            .values()
            .filter(|r| since.map_or(true, |since| r.last_modified > since))
            .cloned()
            .collect();
        changed.sort_by(|a, b| {
            a.last_modified
                .cmp(&b.last_modified)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(changed)
    }

    async fn create(&self, records: Vec<SourceRecord>) -> Result<Vec<String>> {
        let mut inner = self.inner.write().await;
        let mut ids = Vec::with_capacity(records.len());
        for mut record in records {
            let id = self.next_id();
            record.id = Some(id.clone());
            record.last_modified = inner.stamp();
            debug!("Created source record {}", record.label());
            inner.records.insert(id.clone(), record);
            ids.push(id);
        }
        Ok(ids)
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        let mut inner = self.inner.write().await;
        for id in ids {
            inner.records.remove(id);
        }
        Ok(())
    }
}

/// Read seed records from a JSON array of field objects, e.g.
/// `[{"Name": "Acme", "Industry": "Biotechnology", "NumberOfEmployees": 18000}]`
pub async fn load_seed(path: impl AsRef<Path>) -> Result<Vec<SourceRecord>> {
    let path = path.as_ref();
    let content = tokio::fs::read_to_string(path).await?;
    let rows: Vec<Fields> = serde_json::from_str(&content).map_err(|e| {
        Error::Parse(format!("invalid seed file {}: {}", path.display(), e))
    })?;

    Ok(rows
        .into_iter()
        .map(|fields| SourceRecord {
            fields,
            ..SourceRecord::new()
        })
        .collect())
}
