use serde::{Deserialize, Serialize};
use std::path::Path;

mod tracing_init;

pub use sync_core::{DestinationConfig, FlowConfig, TriggerConfig};
pub use tracing_init::init_tracing;

/// Prefix of environment overrides, e.g. `ACCOUNT_SYNC__API__PORT=4000`
pub const ENV_PREFIX: &str = "ACCOUNT_SYNC";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub flow: FlowConfig,
    pub api: ApiConfig,
    pub logging: LoggingConfig,
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub notification: NotificationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// API server host
    pub host: String,

    /// API server port
    pub port: u16,

    /// Enable CORS
    pub cors_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    pub level: String,

    /// JSON formatted logs
    pub json: bool,
}

/// Recurring poll ticks; ignored by push flows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Send an e-mail (SMTP_* environment variables) when a job fails
    #[serde(default)]
    pub email_enabled: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        let mut flow = FlowConfig::default();
        flow.rules.filters.push(sync_core::RecordFilter::Exclude {
            field: sync_core::record::INDUSTRY.to_string(),
            values: vec!["Hospitality".to_string(), "Technology".to_string()],
        });

        Self {
            flow,
            api: ApiConfig {
                host: "localhost".to_string(),
                port: 3000,
                cors_enabled: true,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                json: false,
            },
            scheduler: SchedulerConfig {
                enabled: true,
                interval_secs: 30,
            },
            notification: NotificationConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn load(config_dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let config_dir = config_dir.as_ref();
        let s = config::Config::builder()
            // Start with defaults
            .add_source(config::Config::try_from(&Self::default())?)
            // Add default.yaml
            .add_source(
                config::File::with_name(&config_dir.join("default.yaml").to_string_lossy())
                    .required(false),
            )
            // Add local.yaml (untracked per-machine overrides)
            .add_source(
                config::File::with_name(&config_dir.join("local.yaml").to_string_lossy())
                    .required(false),
            )
            // Add environment variables (ACCOUNT_SYNC__API__PORT=4000)
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        let config: Self = s.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Checks that do not need the registry
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.flow.destinations.is_empty() {
            anyhow::bail!("flow '{}' has no destinations", self.flow.name);
        }
        if self.scheduler.enabled && self.scheduler.interval_secs == 0 {
            anyhow::bail!("scheduler.interval_secs must be greater than zero");
        }
        if self.flow.runner.max_concurrency == 0 {
            anyhow::bail!("flow.runner.max_concurrency must be greater than zero");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use sync_core::TriggerPolicy;

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("sync-config-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_defaults_without_files() {
        let dir = scratch_dir();
        let config = AppConfig::load(&dir).unwrap();

        assert_eq!(config.flow.name, "account-broadcast");
        assert_eq!(config.flow.trigger.policy, TriggerPolicy::Poll);
        assert_eq!(config.flow.destinations.len(), 4);
        assert_eq!(config.flow.rules.filters.len(), 1);
        assert_eq!(config.api.port, 3000);
        assert!(config.scheduler.enabled);
        assert!(!config.notification.email_enabled);
    }

    #[test]
    fn test_local_yaml_overrides_default_yaml() {
        let dir = scratch_dir();
        std::fs::write(
            dir.join("default.yaml"),
            r#"
flow:
  name: accounts
  trigger:
    policy: push
  destinations:
    - type: crm
    - type: erp
      config:
        visibility_delay_ms: 0
  rules:
    categories:
      Biotechnology: bio-id
api:
  port: 4000
"#,
        )
        .unwrap();
        std::fs::write(dir.join("local.yaml"), "api:\n  port: 4100\n").unwrap();

        let config = AppConfig::load(&dir).unwrap();
        assert_eq!(config.flow.name, "accounts");
        assert_eq!(config.flow.trigger.policy, TriggerPolicy::Push);
        assert_eq!(config.flow.destinations.len(), 2);
        assert_eq!(config.flow.destinations[1].destination_type, "erp");
        assert_eq!(
            config.flow.destinations[1].config["visibility_delay_ms"],
            serde_json::json!(0)
        );
        assert_eq!(
            config.flow.rules.categories.categorize("Biotechnology"),
            Some("bio-id")
        );
        assert_eq!(config.api.port, 4100);
        assert_eq!(config.api.host, "localhost");
    }

    #[test]
    fn test_yaml_file_round_trip() {
        let dir = scratch_dir();
        let path = dir.join("saved.yaml");

        let mut config = AppConfig::default();
        config.logging.json = true;
        config.to_file(&path).unwrap();

        let loaded = AppConfig::from_file(&path).unwrap();
        assert!(loaded.logging.json);
        assert_eq!(loaded.flow.destinations.len(), 4);
        assert_eq!(loaded.flow.rules, config.flow.rules);
    }

    #[test]
    fn test_validate_rejects_empty_flow() {
        let mut config = AppConfig::default();
        config.flow.destinations.clear();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.scheduler.interval_secs = 0;
        assert!(config.validate().is_err());
    }
}
