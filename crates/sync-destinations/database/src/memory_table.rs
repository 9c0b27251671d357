use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use sync_core::{DestinationRecord, Fields, MemoryRecordStore, Result};

use crate::AccountTable;

/// Table kept in process memory; row ids count up from 1
pub struct MemoryAccountTable {
    key_column: String,
    store: MemoryRecordStore,
}

impl MemoryAccountTable {
    pub fn new(key_column: impl Into<String>) -> Self {
        Self {
            key_column: key_column.into(),
            store: MemoryRecordStore::with_visibility_delay(Duration::ZERO),
        }
    }

    pub async fn rows(&self) -> Vec<DestinationRecord> {
        self.store.snapshot().await
    }
}

#[async_trait]
impl AccountTable for MemoryAccountTable {
    async fn ensure(&self) -> Result<()> {
        Ok(())
    }

    async fn select_by_key(&self, key: &str) -> Result<Option<DestinationRecord>> {
        self.store.find_by_key(key).await
    }

    async fn insert(&self, key: &str, columns: &Fields) -> Result<String> {
        let id = self.store.next_sequence().to_string();
        let mut row = columns.clone();
        row.insert(self.key_column.clone(), Value::String(key.to_string()));
        self.store.insert(id.clone(), key, row).await?;
        Ok(id)
    }

    async fn update(&self, key: &str, columns: &Fields) -> Result<()> {
        self.store.update(key, columns.clone()).await
    }

    async fn delete(&self, ids: &[String]) -> Result<u64> {
        Ok(self.store.delete(ids).await as u64)
    }
}
