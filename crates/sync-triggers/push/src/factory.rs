use crate::{PushConfig, PushTrigger};
use serde_json::Value;
use sync_core::{Result, Trigger, TriggerFactory};

pub struct PushTriggerFactory;

impl TriggerFactory for PushTriggerFactory {
    fn name(&self) -> &str {
        "push"
    }

    fn create(&self, config: Value) -> Result<Box<dyn Trigger>> {
        let config: PushConfig = if config.is_null() {
            PushConfig::default()
        } else {
            serde_json::from_value(config)?
        };
        Ok(Box::new(PushTrigger::new(config)))
    }
}
