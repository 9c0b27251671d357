use crate::{HrAdapter, HrConfig};
use serde_json::Value;
use std::sync::Arc;
use sync_core::{AdapterFactory, DestinationAdapter, Result, SyncRules};

pub struct HrAdapterFactory;

impl AdapterFactory for HrAdapterFactory {
    fn name(&self) -> &str {
        "hr"
    }

    /// The category table comes from the flow rules
    fn create(
        &self,
        name: &str,
        config: Value,
        rules: &SyncRules,
    ) -> Result<Arc<dyn DestinationAdapter>> {
        let config: HrConfig = if config.is_null() {
            HrConfig::default()
        } else {
            serde_json::from_value(config)?
        };
        Ok(Arc::new(HrAdapter::new(
            name,
            config,
            rules.categories.clone(),
        )))
    }
}
