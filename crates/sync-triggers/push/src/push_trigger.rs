use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sync_core::{Error, Result, SourceRecord, Trigger, TriggerEvent, TriggerPolicy, TriggerStatus};
use tracing::{error, info};

use crate::parse_notifications;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    /// Expected `xsi:type` of notified objects; `None` accepts any type
    #[serde(default = "default_object_type")]
    pub object_type: Option<String>,

    /// Fields converted from text to integers
    #[serde(default = "default_numeric_fields")]
    pub numeric_fields: Vec<String>,
}

fn default_object_type() -> Option<String> {
    Some("Account".to_string())
}

fn default_numeric_fields() -> Vec<String> {
    vec![sync_core::record::NUMBER_OF_EMPLOYEES.to_string()]
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            object_type: default_object_type(),
            numeric_fields: default_numeric_fields(),
        }
    }
}

/// Trigger fed by outbound-message notifications.
///
/// Stateless apart from its counters: every notification becomes exactly
/// one batch and there is no cursor to commit.
pub struct PushTrigger {
    config: PushConfig,
    status: TriggerStatus,
}

impl PushTrigger {
    pub fn new(config: PushConfig) -> Self {
        Self {
            config,
            status: TriggerStatus::default(),
        }
    }
}

#[async_trait]
impl Trigger for PushTrigger {
    fn policy(&self) -> TriggerPolicy {
        TriggerPolicy::Push
    }

    async fn collect(&mut self, event: TriggerEvent) -> Result<Vec<SourceRecord>> {
        let TriggerEvent::Push(payload) = event else {
            return Err(Error::Configuration(
                "push trigger is not polled; send notifications instead".to_string(),
            ));
        };

        self.status.events += 1;
        match parse_notifications(&payload, &self.config) {
            Ok(records) => {
                self.status.records_collected += records.len() as u64;
                info!("Notification accepted with {} record(s)", records.len());
                Ok(records)
            }
            Err(e) => {
                self.status.errors += 1;
                self.status.last_error = Some(e.to_string());
                error!("Rejected notification: {}", e);
                Err(e)
            }
        }
    }

    fn status(&self) -> TriggerStatus {
        self.status.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample_notification;

    #[tokio::test]
    async fn test_collect_push_payload() {
        let mut trigger = PushTrigger::new(PushConfig::default());
        let records = trigger
            .collect(TriggerEvent::Push(sample_notification("X-Push")))
            .await
            .unwrap();
        assert_eq!(records.len(), 1);

        assert!(trigger
            .collect(TriggerEvent::Push("<broken".to_string()))
            .await
            .is_err());

        let status = trigger.status();
        assert_eq!(status.events, 2);
        assert_eq!(status.records_collected, 1);
        assert_eq!(status.errors, 1);
        assert!(status.cursor.is_none());
    }

    #[tokio::test]
    async fn test_tick_rejected() {
        let mut trigger = PushTrigger::new(PushConfig::default());
        let err = trigger.collect(TriggerEvent::Tick).await.unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert_eq!(trigger.status().events, 0);
    }

    #[test]
    fn test_config_defaults() {
        let config: PushConfig = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(config.object_type.as_deref(), Some("Account"));
        assert_eq!(config.numeric_fields, vec!["NumberOfEmployees".to_string()]);
    }
}
