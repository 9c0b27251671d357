use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::{DestinationRecord, Error, Fields, Result};

struct Entry {
    record: DestinationRecord,
    visible_at: Instant,
}

#[derive(Default)]
struct Inner {
    by_id: HashMap<String, Entry>,
    key_index: HashMap<String, String>,
}

/// In-memory record store backing the simulated downstream systems.
///
/// Created records become readable only after `visibility_delay`, measured
/// on the tokio clock. Updates apply immediately (last write wins per key).
pub struct MemoryRecordStore {
    inner: RwLock<Inner>,
    sequence: AtomicU64,
    visibility_delay: Duration,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::with_visibility_delay(Duration::ZERO)
    }

    pub fn with_visibility_delay(visibility_delay: Duration) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            sequence: AtomicU64::new(0),
            visibility_delay,
        }
    }

    pub fn visibility_delay(&self) -> Duration {
        self.visibility_delay
    }

    /// Next value of the store-wide sequence, starting at 1
    pub fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Visible record for `key`. A record that exists but has not propagated
    /// yet is reported as `Error::TransientLookup`.
    pub async fn find_by_key(&self, key: &str) -> Result<Option<DestinationRecord>> {
        let inner = self.inner.read().await;
        let Some(entry) = inner.key_index.get(key).and_then(|id| inner.by_id.get(id)) else {
            return Ok(None);
        };

        if Instant::now() < entry.visible_at {
            return Err(Error::TransientLookup(format!(
                "'{}' is still propagating",
                key
            )));
        }

        Ok(Some(entry.record.clone()))
    }

    pub async fn insert(&self, id: String, key: &str, fields: Fields) -> Result<()> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner.key_index.get(key) {
            return Err(Error::Validation(format!(
                "duplicate key '{}' (already stored as {})",
                key, existing
            )));
        }

        let record = DestinationRecord {
            id: id.clone(),
            key: key.to_string(),
            fields,
        };
        inner.key_index.insert(key.to_string(), id.clone());
        inner.by_id.insert(
            id,
            Entry {
                record,
                visible_at: Instant::now() + self.visibility_delay,
            },
        );
        Ok(())
    }

    /// Merge `fields` into the record stored under `key`
    pub async fn update(&self, key: &str, fields: Fields) -> Result<()> {
        let mut inner = self.inner.write().await;
        let id = inner
            .key_index
            .get(key)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("no record with key '{}'", key)))?;

        let entry = inner
            .by_id
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("no record with id '{}'", id)))?;
        entry.record.fields.extend(fields);
        Ok(())
    }

    /// Remove records by id, returning how many existed
    pub async fn delete(&self, ids: &[String]) -> usize {
        let mut inner = self.inner.write().await;
        let mut removed = 0;
        for id in ids {
            if let Some(entry) = inner.by_id.remove(id) {
                inner.key_index.remove(&entry.record.key);
                removed += 1;
            }
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.by_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Every stored record regardless of visibility
    pub async fn snapshot(&self) -> Vec<DestinationRecord> {
        let inner = self.inner.read().await;
        let mut records: Vec<_> = inner.by_id.values().map(|e| e.record.clone()).collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }
}

impl Default for MemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(name: &str) -> Fields {
        Fields::from([("Name".to_string(), json!(name))])
    }

    #[tokio::test]
    async fn test_insert_find_update_delete() {
        let store = MemoryRecordStore::new();
        store.insert("1".to_string(), "Acme", fields("Acme")).await.unwrap();

        let found = store.find_by_key("Acme").await.unwrap().unwrap();
        assert_eq!(found.id, "1");

        store
            .update("Acme", Fields::from([("Industry".to_string(), json!("Biotechnology"))]))
            .await
            .unwrap();
        let found = store.find_by_key("Acme").await.unwrap().unwrap();
        assert_eq!(found.get_str("Name"), Some("Acme"));
        assert_eq!(found.get_str("Industry"), Some("Biotechnology"));

        let removed = store.delete(&["1".to_string(), "missing".to_string()]).await;
        assert_eq!(removed, 1);
        assert!(store.find_by_key("Acme").await.unwrap().is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_duplicate_key_rejected() {
        let store = MemoryRecordStore::new();
        store.insert("1".to_string(), "Acme", fields("Acme")).await.unwrap();
        let err = store.insert("2".to_string(), "Acme", fields("Acme")).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_visibility_delay() {
        let store = MemoryRecordStore::with_visibility_delay(Duration::from_secs(15));
        store.insert("1".to_string(), "Acme", fields("Acme")).await.unwrap();

        let err = store.find_by_key("Acme").await.unwrap_err();
        assert!(err.is_transient());

        tokio::time::advance(Duration::from_secs(15)).await;
        assert!(store.find_by_key("Acme").await.unwrap().is_some());
    }

    #[test]
    fn test_sequence_starts_at_one() {
        let store = MemoryRecordStore::new();
        assert_eq!(store.next_sequence(), 1);
        assert_eq!(store.next_sequence(), 2);
    }
}
