use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use sync_core::record::as_i64;
use sync_core::{
    key_from_source_id, DestinationAdapter, DestinationRecord, Fields, Result, SourceRecord,
};
use tracing::{debug, info};

use crate::{AccountTable, Backend, ColumnSpec, DatabaseConfig, MemoryAccountTable, PgAccountTable};

/// Relational copy of each account, keyed by the source record id
pub struct DatabaseAdapter {
    name: String,
    key_column: String,
    columns: Vec<ColumnSpec>,
    table: Arc<dyn AccountTable>,
}

impl DatabaseAdapter {
    pub fn new(
        name: impl Into<String>,
        key_column: impl Into<String>,
        columns: Vec<ColumnSpec>,
        table: Arc<dyn AccountTable>,
    ) -> Self {
        Self {
            name: name.into(),
            key_column: key_column.into(),
            columns,
            table,
        }
    }

    pub fn from_config(name: &str, config: DatabaseConfig) -> Result<Self> {
        config.validate()?;

        let table: Arc<dyn AccountTable> = match (&config.backend, &config.postgres) {
            (Backend::Postgres, Some(pg)) => {
                info!(
                    "[{}] Using PostgreSQL table {}.{}",
                    name, pg.schema, config.table
                );
                Arc::new(PgAccountTable::new(
                    pg,
                    &config.table,
                    &config.key_column,
                    config.columns.clone(),
                )?)
            }
            _ => {
                info!("[{}] Using in-memory table {}", name, config.table);
                Arc::new(MemoryAccountTable::new(config.key_column.clone()))
            }
        };

        Ok(Self::new(name, config.key_column, config.columns, table))
    }

    pub fn key_column(&self) -> &str {
        &self.key_column
    }
}

fn is_integer_type(sql_type: &str) -> bool {
    matches!(
        sql_type.trim().to_ascii_uppercase().as_str(),
        "SMALLINT" | "INT" | "INTEGER" | "BIGINT" | "INT2" | "INT4" | "INT8"
    )
}

#[async_trait]
impl DestinationAdapter for DatabaseAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn business_key(&self, record: &SourceRecord) -> Result<String> {
        key_from_source_id(record)
    }

    /// Source fields renamed to their columns. Integer columns receive
    /// numeric strings as numbers.
    fn map_fields(&self, record: &SourceRecord) -> Fields {
        self.columns
            .iter()
            .filter_map(|spec| {
                let value = record.get(&spec.field)?;
                let value = match value {
                    Value::String(_) if is_integer_type(&spec.sql_type) => {
                        as_i64(value).map(Value::from).unwrap_or_else(|| value.clone())
                    }
                    _ => value.clone(),
                };
                Some((spec.column.clone(), value))
            })
            .collect()
    }

    async fn find_by_key(&self, key: &str) -> Result<Option<DestinationRecord>> {
        self.table.select_by_key(key).await
    }

    async fn create(&self, key: &str, fields: Fields) -> Result<String> {
        let id = self.table.insert(key, &fields).await?;
        debug!("[{}] Inserted row {} for {}", self.name, id, key);
        Ok(id)
    }

    async fn update(&self, key: &str, fields: Fields) -> Result<()> {
        self.table.update(key, &fields).await?;
        debug!("[{}] Updated row for {}", self.name, key);
        Ok(())
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        let removed = self.table.delete(ids).await?;
        info!("[{}] Deleted {} row(s)", self.name, removed);
        Ok(())
    }

    async fn connect(&self) -> Result<()> {
        self.table.ensure().await
    }

    async fn disconnect(&self) -> Result<()> {
        self.table.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sync_core::{Error, WriteAction};

    fn adapter() -> DatabaseAdapter {
        DatabaseAdapter::from_config("database", DatabaseConfig::default()).unwrap()
    }

    fn account() -> SourceRecord {
        SourceRecord::new()
            .with_id("001d000001XD5XKAA1")
            .with("Name", "X-DemoCreate")
            .with("Industry", "Biotechnology")
            .with("NumberOfEmployees", "18000")
    }

    #[test]
    fn test_key_and_column_mapping() {
        let adapter = adapter();
        let record = account();

        assert_eq!(adapter.business_key(&record).unwrap(), "001d000001XD5XKAA1");
        let fields = adapter.map_fields(&record);
        assert_eq!(fields.get("name"), Some(&json!("X-DemoCreate")));
        assert_eq!(fields.get("industry"), Some(&json!("Biotechnology")));
        assert_eq!(fields.get("numberOfEmployees"), Some(&json!(18000)));
        assert!(fields.get("Name").is_none());

        let err = adapter
            .business_key(&SourceRecord::new().with("Name", "no id"))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_row_lifecycle() {
        let adapter = adapter();
        adapter.connect().await.unwrap();
        let record = account();
        let key = adapter.business_key(&record).unwrap();
        let fields = adapter.map_fields(&record);

        assert!(adapter.find_by_key(&key).await.unwrap().is_none());
        let id = adapter.create(&key, fields.clone()).await.unwrap();
        assert_eq!(id, "1");

        let row = adapter.find_by_key(&key).await.unwrap().unwrap();
        assert_eq!(row.get_str("salesforceId"), Some("001d000001XD5XKAA1"));
        assert_eq!(row.get_str("name"), Some("X-DemoCreate"));
        assert_eq!(adapter.plan(Some(&row), &fields), WriteAction::Skip);

        let changed = adapter.map_fields(&record.clone().with("NumberOfEmployees", 19000));
        assert_eq!(adapter.plan(Some(&row), &changed), WriteAction::Update);
        adapter.update(&key, changed).await.unwrap();
        let row = adapter.find_by_key(&key).await.unwrap().unwrap();
        assert_eq!(row.get("numberOfEmployees"), Some(&json!(19000)));

        adapter.delete(&[id, "999".to_string()]).await.unwrap();
        assert!(adapter.find_by_key(&key).await.unwrap().is_none());
        adapter.disconnect().await.unwrap();
    }

    #[test]
    fn test_integer_type_detection() {
        assert!(is_integer_type("bigint"));
        assert!(is_integer_type(" INTEGER "));
        assert!(!is_integer_type("TEXT"));
    }
}
