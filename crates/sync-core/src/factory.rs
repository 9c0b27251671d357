use crate::{DestinationAdapter, Result, SyncRules, Trigger};
use serde_json::Value;
use std::sync::Arc;

/// Factory trait for creating triggers
pub trait TriggerFactory: Send + Sync {
    /// Trigger policy this factory serves ("poll", "push")
    fn name(&self) -> &str;

    /// Create a new trigger instance from configuration
    fn create(&self, config: Value) -> Result<Box<dyn Trigger>>;
}

/// Factory trait for creating destination adapters
pub trait AdapterFactory: Send + Sync {
    /// Get the name/type identifier for this adapter
    fn name(&self) -> &str;

    /// Create a new adapter instance. `name` is the instance name used in
    /// job reports; `rules` carries flow-wide tables such as categories.
    fn create(
        &self,
        name: &str,
        config: Value,
        rules: &SyncRules,
    ) -> Result<Arc<dyn DestinationAdapter>>;
}
