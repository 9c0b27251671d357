//! Wiring shared by the `account-sync` binary and its end-to-end tests.

use std::sync::Arc;
use sync_config::AppConfig;
use sync_core::{EmailNotifier, NoOpNotifier, Notifier, Registry, SourceSystem, SyncFlow};
use sync_crm_destination::CrmAdapterFactory;
use sync_database_destination::DatabaseAdapterFactory;
use sync_erp_destination::ErpAdapterFactory;
use sync_hr_destination::HrAdapterFactory;
use sync_poll_trigger::PollTriggerFactory;
use sync_push_trigger::PushTriggerFactory;
use tracing::info;

/// Registry with every trigger and destination type; poll triggers read
/// from `source`
pub fn registry(source: Arc<dyn SourceSystem>) -> Registry {
    let mut registry = Registry::new();

    registry.register_trigger(Arc::new(PollTriggerFactory::new(source)));
    registry.register_trigger(Arc::new(PushTriggerFactory));

    registry.register_adapter(Arc::new(DatabaseAdapterFactory));
    registry.register_adapter(Arc::new(CrmAdapterFactory));
    registry.register_adapter(Arc::new(ErpAdapterFactory));
    registry.register_adapter(Arc::new(HrAdapterFactory));

    registry
}

/// Failure notifier selected by configuration
pub fn notifier(config: &AppConfig) -> anyhow::Result<Arc<dyn Notifier>> {
    if config.notification.email_enabled {
        let notifier = EmailNotifier::from_env()?;
        info!("Job failure e-mails enabled");
        Ok(Arc::new(notifier))
    } else {
        Ok(Arc::new(NoOpNotifier))
    }
}

/// Flow described by the application config
pub fn build_flow(config: &AppConfig, source: Arc<dyn SourceSystem>) -> anyhow::Result<SyncFlow> {
    let registry = registry(source);
    info!("Available triggers: {:?}", registry.list_triggers());
    info!("Available destinations: {:?}", registry.list_adapters());

    let flow = SyncFlow::from_config(config.flow.clone(), &registry)?;
    Ok(flow.with_notifier(notifier(config)?))
}
