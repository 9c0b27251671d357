use crate::{
    BatchRunner, DestinationAdapter, Error, JobHandle, JobResult, Notifier, Registry, Result, RunnerSettings,
    SyncRules, Trigger, TriggerEvent, TriggerPolicy, TriggerStatus,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Configuration structures for flows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowConfig {
    /// Unique name for this flow
    pub name: String,

    pub trigger: TriggerConfig,

    /// Destinations in the order every record is written to them
    pub destinations: Vec<DestinationConfig>,

    #[serde(default)]
    pub rules: SyncRules,

    #[serde(default)]
    pub runner: RunnerSettings,

    /// Bound on how long a poll tick waits for its batch
    #[serde(default = "default_await_timeout_secs")]
    pub await_timeout_secs: u64,
}

fn default_await_timeout_secs() -> u64 {
    600
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Which trigger starts batches ("poll" or "push")
    pub policy: TriggerPolicy,

    /// Trigger-specific configuration
    #[serde(default = "empty_object")]
    pub config: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationConfig {
    /// Type/name of the adapter (e.g., "database", "crm")
    #[serde(rename = "type")]
    pub destination_type: String,

    /// Instance name in job reports; defaults to the type
    #[serde(default)]
    pub name: Option<String>,

    /// Adapter-specific configuration
    #[serde(default = "empty_object")]
    pub config: Value,
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

impl DestinationConfig {
    pub fn new(destination_type: impl Into<String>, config: Value) -> Self {
        Self {
            destination_type: destination_type.into(),
            name: None,
            config,
        }
    }

    pub fn instance_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.destination_type)
    }
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            name: "account-broadcast".to_string(),
            trigger: TriggerConfig::default(),
            destinations: vec![
                DestinationConfig::new(
                    "database",
                    serde_json::json!({
                        "backend": "memory",
                        "table": "account"
                    }),
                ),
                DestinationConfig::new("crm", empty_object()),
                DestinationConfig::new("erp", empty_object()),
                DestinationConfig::new("hr", empty_object()),
            ],
            rules: SyncRules::default(),
            runner: RunnerSettings::default(),
            await_timeout_secs: default_await_timeout_secs(),
        }
    }
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            policy: TriggerPolicy::Poll,
            config: empty_object(),
        }
    }
}

struct TriggerSlot {
    trigger: Box<dyn Trigger>,
    /// Poll batch that outlived its tick's wait; committed by a later tick
    in_flight: Option<JobHandle>,
}

/// A trigger wired to a batch runner
pub struct SyncFlow {
    name: String,
    policy: TriggerPolicy,
    trigger: Mutex<TriggerSlot>,
    runner: BatchRunner,
    await_timeout: Duration,
}

impl SyncFlow {
    pub fn new(
        name: String,
        trigger: Box<dyn Trigger>,
        runner: BatchRunner,
        await_timeout: Duration,
    ) -> Self {
        Self {
            name,
            policy: trigger.policy(),
            trigger: Mutex::new(TriggerSlot {
                trigger,
                in_flight: None,
            }),
            runner,
            await_timeout,
        }
    }

    /// Create a flow from configuration using the registry
    pub fn from_config(config: FlowConfig, registry: &Registry) -> Result<Self> {
        info!("Creating flow '{}'", config.name);

        let trigger_factory = registry.get_trigger_factory(config.trigger.policy.as_str())?;
        let trigger = trigger_factory.create(config.trigger.config)?;
        if trigger.policy() != config.trigger.policy {
            return Err(Error::Configuration(format!(
                "Trigger factory '{}' produced a {} trigger",
                config.trigger.policy,
                trigger.policy()
            )));
        }

        if config.destinations.is_empty() {
            return Err(Error::Configuration(format!(
                "Flow '{}' has no destinations",
                config.name
            )));
        }

        let mut adapters: Vec<Arc<dyn DestinationAdapter>> = Vec::new();
        for dest_config in config.destinations {
            let name = dest_config.instance_name().to_string();
            if adapters.iter().any(|a| a.name() == name) {
                return Err(Error::Configuration(format!(
                    "Destination '{}' configured twice",
                    name
                )));
            }
            let factory = registry.get_adapter_factory(&dest_config.destination_type)?;
            adapters.push(factory.create(&name, dest_config.config, &config.rules)?);
        }

        let runner = BatchRunner::new(config.name.clone(), adapters, config.rules, config.runner);
        Ok(Self::new(
            config.name,
            trigger,
            runner,
            Duration::from_secs(config.await_timeout_secs),
        ))
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.runner = self.runner.with_notifier(notifier);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> TriggerPolicy {
        self.policy
    }

    pub fn runner(&self) -> &BatchRunner {
        &self.runner
    }

    pub async fn trigger_status(&self) -> TriggerStatus {
        self.trigger.lock().await.trigger.status()
    }

    /// Connect every destination
    pub async fn connect(&self) -> Result<()> {
        for adapter in self.runner.adapters() {
            adapter.connect().await?;
            info!("[{}] Destination {} connected", self.name, adapter.name());
        }
        Ok(())
    }

    pub async fn disconnect(&self) -> Result<()> {
        for adapter in self.runner.adapters() {
            adapter.disconnect().await?;
        }
        info!("[{}] Flow disconnected", self.name);
        Ok(())
    }

    /// One poll tick: collect changes, run them as a batch, wait for the
    /// batch and move the cursor. Returns `None` when nothing changed.
    ///
    /// When the wait runs out the batch stays in flight and the cursor stays
    /// put; the next tick waits for that batch and commits it instead of
    /// collecting the same window again. The trigger stays locked for the
    /// whole tick, so ticks never overlap.
    pub async fn run_once(&self) -> Result<Option<JobResult>> {
        let mut slot = self.trigger.lock().await;

        if let Some(handle) = slot.in_flight {
            info!(
                "[{}] Waiting for job {} from an earlier tick",
                self.name, handle.job_id
            );
            match self.runner.await_completion(&handle, self.await_timeout).await {
                Ok(result) => {
                    slot.in_flight = None;
                    slot.trigger.commit(&result).await?;
                    return Ok(Some(result));
                }
                Err(Error::NotFound(_)) => {
                    warn!(
                        "[{}] Job {} is no longer tracked, collecting its window again",
                        self.name, handle.job_id
                    );
                    slot.in_flight = None;
                }
                Err(e) => return Err(e),
            }
        }

        let records = slot.trigger.collect(TriggerEvent::Tick).await?;
        if records.is_empty() {
            info!("[{}] No changes", self.name);
            return Ok(None);
        }

        let handle = self.runner.submit(records).await;
        match self.runner.await_completion(&handle, self.await_timeout).await {
            Ok(result) => {
                slot.trigger.commit(&result).await?;
                Ok(Some(result))
            }
            Err(e) => {
                if let Error::StillRunning { .. } = e {
                    slot.in_flight = Some(handle);
                }
                Err(e)
            }
        }
    }

    /// Turn one push notification into exactly one batch
    pub async fn on_push(&self, payload: String) -> Result<JobHandle> {
        let records = {
            let mut slot = self.trigger.lock().await;
            slot.trigger.collect(TriggerEvent::Push(payload)).await?
        };
        info!(
            "[{}] Push notification carried {} record(s)",
            self.name,
            records.len()
        );
        Ok(self.runner.submit(records).await)
    }

    /// Run poll ticks every `interval` until `cancel` fires
    pub fn spawn_scheduler(
        self: Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("[{}] Poll scheduler started (every {:?})", self.name, interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    res = self.run_once() => match res {
                        Ok(Some(result)) if !result.is_successful() => warn!(
                            "[{}] Scheduled batch {} finished with failures",
                            self.name, result.job_id
                        ),
                        Ok(_) => {}
                        Err(e) => error!("[{}] Scheduled poll failed: {}", self.name, e),
                    },
                }
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
            info!("[{}] Poll scheduler stopped", self.name);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{key_from_field, project_fields};
    use crate::record::NAME;
    use crate::{
        AdapterFactory, DestinationRecord, Fields, MemoryRecordStore, SourceRecord, TriggerFactory,
    };
    use async_trait::async_trait;

    struct StubTrigger {
        pending: Vec<SourceRecord>,
        commits: Arc<std::sync::atomic::AtomicUsize>,
    }

    #[async_trait]
    impl Trigger for StubTrigger {
        fn policy(&self) -> TriggerPolicy {
            TriggerPolicy::Poll
        }

        async fn collect(&mut self, event: TriggerEvent) -> Result<Vec<SourceRecord>> {
            match event {
                TriggerEvent::Tick => Ok(self.pending.clone()),
                TriggerEvent::Push(_) => Err(Error::Configuration("poll only".to_string())),
            }
        }

        async fn commit(&mut self, _result: &JobResult) -> Result<()> {
            self.pending.clear();
            self.commits.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }

        fn status(&self) -> TriggerStatus {
            TriggerStatus::default()
        }
    }

    struct SlowAdapter {
        store: MemoryRecordStore,
        create_delay: Duration,
    }

    #[async_trait]
    impl DestinationAdapter for SlowAdapter {
        fn name(&self) -> &str {
            "slow"
        }

        fn business_key(&self, record: &SourceRecord) -> Result<String> {
            key_from_field(record, NAME)
        }

        fn map_fields(&self, record: &SourceRecord) -> Fields {
            project_fields(record, &[NAME.to_string()])
        }

        async fn find_by_key(&self, key: &str) -> Result<Option<DestinationRecord>> {
            self.store.find_by_key(key).await
        }

        async fn create(&self, key: &str, fields: Fields) -> Result<String> {
            tokio::time::sleep(self.create_delay).await;
            let id = self.store.next_sequence().to_string();
            self.store.insert(id.clone(), key, fields).await?;
            Ok(id)
        }

        async fn update(&self, key: &str, fields: Fields) -> Result<()> {
            self.store.update(key, fields).await
        }

        async fn delete(&self, ids: &[String]) -> Result<()> {
            self.store.delete(ids).await;
            Ok(())
        }
    }

    fn stub_flow(records: Vec<SourceRecord>) -> (SyncFlow, Arc<std::sync::atomic::AtomicUsize>) {
        stub_flow_with(records, vec![])
    }

    fn stub_flow_with(
        records: Vec<SourceRecord>,
        adapters: Vec<Arc<dyn DestinationAdapter>>,
    ) -> (SyncFlow, Arc<std::sync::atomic::AtomicUsize>) {
        let commits = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let trigger = StubTrigger {
            pending: records,
            commits: commits.clone(),
        };
        let runner = BatchRunner::new("stub", adapters, SyncRules::default(), RunnerSettings::default());
        (
            SyncFlow::new("stub".to_string(), Box::new(trigger), runner, Duration::from_secs(5)),
            commits,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_once_commits_after_batch() {
        let (flow, commits) = stub_flow(vec![SourceRecord::new().with("Name", "Acme")]);

        let result = flow.run_once().await.unwrap().unwrap();
        assert!(result.is_successful());
        assert_eq!(commits.load(std::sync::atomic::Ordering::SeqCst), 1);

        // nothing left: no batch, no commit
        assert!(flow.run_once().await.unwrap().is_none());
        assert_eq!(commits.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(flow.runner().jobs().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_tick_is_committed_by_next_tick() {
        let adapter = Arc::new(SlowAdapter {
            store: MemoryRecordStore::new(),
            create_delay: Duration::from_secs(20),
        });
        let (flow, commits) = stub_flow_with(
            vec![SourceRecord::new().with(NAME, "Acme")],
            vec![adapter.clone()],
        );

        for _ in 0..2 {
            let err = flow.run_once().await.unwrap_err();
            assert!(matches!(err, Error::StillRunning { .. }));
        }
        assert_eq!(flow.runner().jobs().await.len(), 1);
        assert_eq!(commits.load(std::sync::atomic::Ordering::SeqCst), 0);

        let result = loop {
            match flow.run_once().await {
                Ok(Some(result)) => break result,
                Err(Error::StillRunning { .. }) => continue,
                other => panic!("unexpected tick outcome: {:?}", other),
            }
        };
        result.assert_successful().unwrap();
        assert_eq!(commits.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(flow.runner().jobs().await.len(), 1);
        assert_eq!(adapter.store.len().await, 1);

        // window committed: nothing is collected again
        assert!(flow.run_once().await.unwrap().is_none());
        assert_eq!(flow.runner().jobs().await.len(), 1);
    }

    #[tokio::test]
    async fn test_push_on_poll_flow_is_rejected() {
        let (flow, _) = stub_flow(vec![]);
        let err = flow.on_push("<xml/>".to_string()).await.unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(flow.runner().jobs().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_stops_on_cancel() {
        let (flow, _) = stub_flow(vec![]);
        let cancel = CancellationToken::new();
        let handle = Arc::new(flow).spawn_scheduler(Duration::from_secs(1), cancel.clone());

        tokio::time::sleep(Duration::from_secs(3)).await;
        cancel.cancel();
        handle.await.unwrap();
    }

    struct NoTriggers;

    impl TriggerFactory for NoTriggers {
        fn name(&self) -> &str {
            "poll"
        }

        fn create(&self, _config: Value) -> Result<Box<dyn Trigger>> {
            Ok(Box::new(StubTrigger {
                pending: vec![],
                commits: Arc::default(),
            }))
        }
    }

    struct NoAdapters;

    impl AdapterFactory for NoAdapters {
        fn name(&self) -> &str {
            "none"
        }

        fn create(
            &self,
            _name: &str,
            _config: Value,
            _rules: &SyncRules,
        ) -> Result<Arc<dyn DestinationAdapter>> {
            Err(Error::Configuration("not buildable".to_string()))
        }
    }

    #[test]
    fn test_from_config_reports_unknown_types() {
        let mut registry = Registry::new();
        registry.register_trigger(Arc::new(NoTriggers));
        registry.register_adapter(Arc::new(NoAdapters));

        let config = FlowConfig::default();
        let err = SyncFlow::from_config(config, &registry).err().unwrap();
        assert_eq!(
            err.to_string(),
            "Configuration error: Adapter factory 'database' not found"
        );

        let config = FlowConfig {
            trigger: TriggerConfig {
                policy: TriggerPolicy::Push,
                config: Value::Null,
            },
            ..Default::default()
        };
        let err = SyncFlow::from_config(config, &registry).err().unwrap();
        assert_eq!(
            err.to_string(),
            "Configuration error: Trigger factory 'push' not found"
        );
    }

    #[test]
    fn test_flow_config_defaults_from_yaml_like_json() {
        let config: FlowConfig = serde_json::from_value(serde_json::json!({
            "name": "accounts",
            "trigger": {"policy": "push"},
            "destinations": [{"type": "crm"}, {"type": "crm", "name": "crm-eu"}]
        }))
        .unwrap();

        assert_eq!(config.trigger.policy, TriggerPolicy::Push);
        assert_eq!(config.destinations[1].instance_name(), "crm-eu");
        assert_eq!(config.await_timeout_secs, 600);
        assert_eq!(config.runner.status_poll_interval_ms, 500);
    }
}
