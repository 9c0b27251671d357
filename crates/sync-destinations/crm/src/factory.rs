use crate::{CrmAdapter, CrmConfig};
use serde_json::Value;
use std::sync::Arc;
use sync_core::{AdapterFactory, DestinationAdapter, Result, SyncRules};

pub struct CrmAdapterFactory;

impl AdapterFactory for CrmAdapterFactory {
    fn name(&self) -> &str {
        "crm"
    }

    fn create(
        &self,
        name: &str,
        config: Value,
        _rules: &SyncRules,
    ) -> Result<Arc<dyn DestinationAdapter>> {
        let config: CrmConfig = if config.is_null() {
            CrmConfig::default()
        } else {
            serde_json::from_value(config)?
        };
        Ok(Arc::new(CrmAdapter::new(name, config)?))
    }
}
