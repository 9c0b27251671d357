use crate::{ErpAdapter, ErpConfig};
use serde_json::Value;
use std::sync::Arc;
use sync_core::{AdapterFactory, DestinationAdapter, Result, SyncRules};

pub struct ErpAdapterFactory;

impl AdapterFactory for ErpAdapterFactory {
    fn name(&self) -> &str {
        "erp"
    }

    fn create(
        &self,
        name: &str,
        config: Value,
        _rules: &SyncRules,
    ) -> Result<Arc<dyn DestinationAdapter>> {
        let config: ErpConfig = if config.is_null() {
            ErpConfig::default()
        } else {
            serde_json::from_value(config)?
        };
        Ok(Arc::new(ErpAdapter::new(name, config)?))
    }
}
