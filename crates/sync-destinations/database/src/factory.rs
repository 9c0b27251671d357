use crate::{DatabaseAdapter, DatabaseConfig};
use serde_json::Value;
use std::sync::Arc;
use sync_core::{AdapterFactory, DestinationAdapter, Result, SyncRules};

pub struct DatabaseAdapterFactory;

impl AdapterFactory for DatabaseAdapterFactory {
    fn name(&self) -> &str {
        "database"
    }

    fn create(
        &self,
        name: &str,
        config: Value,
        _rules: &SyncRules,
    ) -> Result<Arc<dyn DestinationAdapter>> {
        let config: DatabaseConfig = if config.is_null() {
            DatabaseConfig::default()
        } else {
            serde_json::from_value(config)?
        };
        Ok(Arc::new(DatabaseAdapter::from_config(name, config)?))
    }
}
