use crate::{PollConfig, PollTrigger};
use std::sync::Arc;
use sync_core::{Result, SourceSystem, Trigger, TriggerFactory};
use serde_json::Value;

/// Builds poll triggers reading from one source system
pub struct PollTriggerFactory {
    source: Arc<dyn SourceSystem>,
}

impl PollTriggerFactory {
    pub fn new(source: Arc<dyn SourceSystem>) -> Self {
        Self { source }
    }
}

impl TriggerFactory for PollTriggerFactory {
    fn name(&self) -> &str {
        "poll"
    }

    fn create(&self, config: Value) -> Result<Box<dyn Trigger>> {
        let config: PollConfig = if config.is_null() {
            PollConfig::default()
        } else {
            serde_json::from_value(config)?
        };
        Ok(Box::new(PollTrigger::new(self.source.clone(), config)))
    }
}
