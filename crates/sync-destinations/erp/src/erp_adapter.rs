use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use sync_core::record::{INDUSTRY, NAME};
use sync_core::{
    key_from_field, project_fields, DestinationAdapter, DestinationRecord, Fields,
    MemoryRecordStore, Result, SourceRecord,
};
use tracing::{debug, info};

/// Customer number field, also the record id
pub const CUSTOMER_NUMBER: &str = "CustomerNumber";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErpConfig {
    /// Fields copied onto the customer master record
    #[serde(default = "default_fields")]
    pub fields: Vec<String>,

    /// How long a created customer stays invisible to lookups
    #[serde(default = "default_visibility_delay_ms")]
    pub visibility_delay_ms: u64,
}

fn default_fields() -> Vec<String> {
    vec![NAME.to_string(), INDUSTRY.to_string()]
}

fn default_visibility_delay_ms() -> u64 {
    15_000
}

impl Default for ErpConfig {
    fn default() -> Self {
        Self {
            fields: default_fields(),
            visibility_delay_ms: default_visibility_delay_ms(),
        }
    }
}

/// ERP customer master. Customers are matched by name and numbered with
/// zero-padded ten digit customer numbers.
pub struct ErpAdapter {
    name: String,
    fields: Vec<String>,
    store: MemoryRecordStore,
}

impl ErpAdapter {
    pub fn new(name: impl Into<String>, config: ErpConfig) -> Result<Self> {
        let name = name.into();
        info!(
            "[{}] ERP customers visible {}ms after creation",
            name, config.visibility_delay_ms
        );
        Ok(Self {
            name,
            fields: config.fields,
            store: MemoryRecordStore::with_visibility_delay(Duration::from_millis(
                config.visibility_delay_ms,
            )),
        })
    }

    pub fn visibility_delay(&self) -> Duration {
        self.store.visibility_delay()
    }
}

#[async_trait]
impl DestinationAdapter for ErpAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn business_key(&self, record: &SourceRecord) -> Result<String> {
        key_from_field(record, NAME)
    }

    fn map_fields(&self, record: &SourceRecord) -> Fields {
        project_fields(record, &self.fields)
    }

    /// A customer without a customer number has not been released yet and
    /// counts as absent
    async fn find_by_key(&self, key: &str) -> Result<Option<DestinationRecord>> {
        let record = self.store.find_by_key(key).await?;
        Ok(record.filter(|r| {
            r.get(CUSTOMER_NUMBER)
                .map(|v| !v.is_null())
                .unwrap_or(false)
        }))
    }

    async fn create(&self, key: &str, mut fields: Fields) -> Result<String> {
        let customer_number = format!("{:010}", self.store.next_sequence());
        fields.insert(
            CUSTOMER_NUMBER.to_string(),
            Value::String(customer_number.clone()),
        );
        self.store
            .insert(customer_number.clone(), key, fields)
            .await?;
        debug!(
            "[{}] Created customer {} for {}",
            self.name, customer_number, key
        );
        Ok(customer_number)
    }

    async fn update(&self, key: &str, mut fields: Fields) -> Result<()> {
        fields.remove(CUSTOMER_NUMBER);
        self.store.update(key, fields).await?;
        debug!("[{}] Updated customer {}", self.name, key);
        Ok(())
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        let removed = self.store.delete(ids).await;
        info!("[{}] Deleted {} customer(s)", self.name, removed);
        Ok(())
    }
}
