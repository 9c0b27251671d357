use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use sync_core::record::NAME;
use sync_core::{
    key_from_field, CategoryTable, DestinationAdapter, DestinationRecord, Fields,
    MemoryRecordStore, Result, SourceRecord,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const CUSTOMER_NAME: &str = "CustomerName";
pub const CATEGORY_REFERENCE: &str = "CustomerCategoryReference";
pub const WID: &str = "WID";
pub const CUSTOMER_CATEGORY_ID: &str = "Customer_Category_ID";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HrConfig {
    /// How long a created customer stays invisible to lookups
    #[serde(default = "default_visibility_delay_ms")]
    pub visibility_delay_ms: u64,
}

fn default_visibility_delay_ms() -> u64 {
    25_000
}

impl Default for HrConfig {
    fn default() -> Self {
        Self {
            visibility_delay_ms: default_visibility_delay_ms(),
        }
    }
}

/// Customer category id of an HR customer record.
///
/// The reference holds two ids, `[WID, Customer_Category_ID]`; the second
/// is the configured category.
pub fn category_id(record: &DestinationRecord) -> Option<&str> {
    record
        .get(CATEGORY_REFERENCE)?
        .get("ID")?
        .as_array()?
        .iter()
        .find(|id| id.get("type").and_then(Value::as_str) == Some(CUSTOMER_CATEGORY_ID))?
        .get("value")?
        .as_str()
}

/// HR and financials customers, categorized by industry
pub struct HrAdapter {
    name: String,
    categories: CategoryTable,
    /// Stable WID per category id so re-syncs compare equal
    category_wids: BTreeMap<String, String>,
    store: MemoryRecordStore,
}

impl HrAdapter {
    pub fn new(name: impl Into<String>, config: HrConfig, categories: CategoryTable) -> Self {
        let name = name.into();
        if categories.is_empty() {
            warn!("[{}] No customer categories configured", name);
        } else {
            info!("[{}] {} customer categories configured", name, categories.len());
        }

        let category_wids = categories
            .ids()
            .map(|id| (id.to_string(), Uuid::new_v4().simple().to_string()))
            .collect();

        Self {
            name,
            categories,
            category_wids,
            store: MemoryRecordStore::with_visibility_delay(Duration::from_millis(
                config.visibility_delay_ms,
            )),
        }
    }

    fn category_reference(&self, category: &str) -> Value {
        let wid = self
            .category_wids
            .get(category)
            .cloned()
            .unwrap_or_default();
        json!({
            "ID": [
                {"type": WID, "value": wid},
                {"type": CUSTOMER_CATEGORY_ID, "value": category},
            ]
        })
    }
}

#[async_trait]
impl DestinationAdapter for HrAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn business_key(&self, record: &SourceRecord) -> Result<String> {
        key_from_field(record, NAME)
    }

    /// Unmapped industries leave the category reference untouched
    fn map_fields(&self, record: &SourceRecord) -> Fields {
        let mut fields = Fields::new();
        if let Some(name) = record.get(NAME) {
            fields.insert(CUSTOMER_NAME.to_string(), name.clone());
        }

        if let Some(category) = record
            .industry()
            .and_then(|industry| self.categories.categorize(industry))
        {
            fields.insert(
                CATEGORY_REFERENCE.to_string(),
                self.category_reference(category),
            );
        }
        fields
    }

    async fn find_by_key(&self, key: &str) -> Result<Option<DestinationRecord>> {
        self.store.find_by_key(key).await
    }

    async fn create(&self, key: &str, fields: Fields) -> Result<String> {
        let wid = Uuid::new_v4().simple().to_string();
        self.store.insert(wid.clone(), key, fields).await?;
        debug!("[{}] Created customer {} ({})", self.name, key, wid);
        Ok(wid)
    }

    async fn update(&self, key: &str, fields: Fields) -> Result<()> {
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

#[cfg(test)]
mod tests {
    use super::*;
    use sync_core::record::INDUSTRY;
    use sync_core::WriteAction;

    const BIOTECH_ID: &str = "CUSTOMER_CATEGORY-6-1";
    const MANUFACTURING_ID: &str = "CUSTOMER_CATEGORY-6-3";

    fn hr() -> HrAdapter {
        HrAdapter::new(
            "hr",
            HrConfig {
                visibility_delay_ms: 0,
            },
            CategoryTable::new()
                .with("Biotechnology", BIOTECH_ID)
                .with("Manufacturing", MANUFACTURING_ID),
        )
    }

    fn account(name: &str, industry: &str) -> SourceRecord {
        SourceRecord::new().with(NAME, name).with(INDUSTRY, industry)
    }

    #[tokio::test]
    async fn test_category_reference_round_trip() {
        let hr = hr();
        let record = account("X-DemoCreate", "Biotechnology");
        let key = hr.business_key(&record).unwrap();
        let fields = hr.map_fields(&record);

        let wid = hr.create(&key, fields.clone()).await.unwrap();
        let stored = hr.find_by_key(&key).await.unwrap().unwrap();
        assert_eq!(stored.id, wid);
        assert_eq!(stored.get_str(CUSTOMER_NAME), Some("X-DemoCreate"));
        assert_eq!(category_id(&stored), Some(BIOTECH_ID));

        let ids = stored.get(CATEGORY_REFERENCE).unwrap()["ID"].as_array().unwrap();
        assert_eq!(ids[0]["type"], WID);
        assert_eq!(ids[0]["value"].as_str().unwrap().len(), 32);

        // same category twice: nothing to write
        assert_eq!(hr.plan(Some(&stored), &hr.map_fields(&record)), WriteAction::Skip);

        let moved = hr.map_fields(&account("X-DemoCreate", "Manufacturing"));
        assert_eq!(hr.plan(Some(&stored), &moved), WriteAction::Update);
        hr.update(&key, moved).await.unwrap();
        let stored = hr.find_by_key(&key).await.unwrap().unwrap();
        assert_eq!(category_id(&stored), Some(MANUFACTURING_ID));
    }

    #[test]
    fn test_unmapped_industry_has_no_category() {
        let hr = hr();
        let fields = hr.map_fields(&account("X", "Education"));
        assert!(!fields.contains_key(CATEGORY_REFERENCE));

        let record = DestinationRecord {
            id: "w".to_string(),
            key: "X".to_string(),
            fields,
        };
        assert_eq!(category_id(&record), None);
    }

    #[tokio::test]
    async fn test_unmapped_industry_keeps_stored_category() {
        let hr = hr();
        let record = account("X-DemoUpdate", "Biotechnology");
        let key = hr.business_key(&record).unwrap();
        hr.create(&key, hr.map_fields(&record)).await.unwrap();
        let stored = hr.find_by_key(&key).await.unwrap().unwrap();

        let resync = hr.map_fields(&account("X-DemoUpdate", "Education"));
        assert_eq!(hr.plan(Some(&stored), &resync), WriteAction::Skip);

        let renamed = hr.map_fields(&account("X-DemoRenamed", "Education"));
        assert_eq!(hr.plan(Some(&stored), &renamed), WriteAction::Update);
        hr.update(&key, renamed).await.unwrap();

        let stored = hr.find_by_key(&key).await.unwrap().unwrap();
        assert_eq!(stored.get_str(CUSTOMER_NAME), Some("X-DemoRenamed"));
        assert_eq!(category_id(&stored), Some(BIOTECH_ID));
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_visibility_delay() {
        let hr = HrAdapter::new("hr", HrConfig::default(), CategoryTable::new());
        hr.create("Late", Fields::new()).await.unwrap();
        assert!(hr.find_by_key("Late").await.unwrap_err().is_transient());

        tokio::time::advance(Duration::from_millis(25_000)).await;
        assert!(hr.find_by_key("Late").await.unwrap().is_some());
    }
}
