use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use sync_core::record::{INDUSTRY, NAME, NUMBER_OF_EMPLOYEES};
use sync_core::{
    key_from_field, project_fields, DestinationAdapter, DestinationRecord, Error, Fields,
    MemoryRecordStore, Result, SourceRecord,
};
use tracing::{debug, info};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrmConfig {
    /// Fields copied to the org and compared on re-sync
    #[serde(default = "default_tracked_fields")]
    pub tracked_fields: Vec<String>,

    /// Delay before a created account shows up in queries
    #[serde(default)]
    pub visibility_delay_ms: u64,
}

fn default_tracked_fields() -> Vec<String> {
    vec![
        NAME.to_string(),
        INDUSTRY.to_string(),
        NUMBER_OF_EMPLOYEES.to_string(),
    ]
}

impl Default for CrmConfig {
    fn default() -> Self {
        Self {
            tracked_fields: default_tracked_fields(),
            visibility_delay_ms: 0,
        }
    }
}

/// Second CRM org; accounts are matched by name
pub struct CrmAdapter {
    name: String,
    tracked_fields: Vec<String>,
    store: MemoryRecordStore,
}

impl CrmAdapter {
    pub fn new(name: impl Into<String>, config: CrmConfig) -> Result<Self> {
        if !config.tracked_fields.iter().any(|f| f == NAME) {
            return Err(Error::Configuration(format!(
                "crm tracked_fields must include {}",
                NAME
            )));
        }

        let name = name.into();
        info!(
            "[{}] CRM org tracking {:?}",
            name, config.tracked_fields
        );
        Ok(Self {
            name,
            tracked_fields: config.tracked_fields,
            store: MemoryRecordStore::with_visibility_delay(Duration::from_millis(
                config.visibility_delay_ms,
            )),
        })
    }

    fn next_id(&self) -> String {
        format!("001B{:014}", self.store.next_sequence())
    }

    pub async fn len(&self) -> usize {
        self.store.len().await
    }

    pub async fn is_empty(&self) -> bool {
        self.store.is_empty().await
    }
}

#[async_trait]
impl DestinationAdapter for CrmAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn business_key(&self, record: &SourceRecord) -> Result<String> {
        key_from_field(record, NAME)
    }

    /// Employee counts are kept as text, the way the org returns them
    fn map_fields(&self, record: &SourceRecord) -> Fields {
        let mut fields = project_fields(record, &self.tracked_fields);
        if let Some(Value::Number(n)) = fields.get(NUMBER_OF_EMPLOYEES) {
            let text = n.to_string();
            fields.insert(NUMBER_OF_EMPLOYEES.to_string(), Value::String(text));
        }
        fields
    }

    async fn find_by_key(&self, key: &str) -> Result<Option<DestinationRecord>> {
        self.store.find_by_key(key).await
    }

    async fn create(&self, key: &str, fields: Fields) -> Result<String> {
        let id = self.next_id();
        self.store.insert(id.clone(), key, fields).await?;
        debug!("[{}] Created account {} as {}", self.name, key, id);
        Ok(id)
    }

    async fn update(&self, key: &str, fields: Fields) -> Result<()> {
        self.store.update(key, fields).await?;
        debug!("[{}] Updated account {}", self.name, key);
        Ok(())
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        let removed = self.store.delete(ids).await;
        info!("[{}] Deleted {} account(s)", self.name, removed);
        Ok(())
    }
}
