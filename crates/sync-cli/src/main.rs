use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use sync_api::handlers::AppState;
use sync_api::ApiServer;
use sync_config::{init_tracing, AppConfig};
use sync_core::TriggerPolicy;
use sync_poll_trigger::MemorySource;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "account-sync")]
#[command(about = "Propagate account changes to downstream systems", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server and, for poll flows, the scheduler
    Start {
        /// Configuration directory
        #[arg(short, long, default_value = "config")]
        config_dir: PathBuf,

        /// JSON file with accounts to seed the in-memory source with
        #[arg(short, long)]
        records: Option<PathBuf>,
    },

    /// Run a single poll tick and print the job result
    RunOnce {
        /// Configuration directory
        #[arg(short, long, default_value = "config")]
        config_dir: PathBuf,

        /// JSON file with accounts to seed the in-memory source with
        #[arg(short, long)]
        records: Option<PathBuf>,
    },

    /// Validate configuration
    Validate {
        /// Configuration directory
        #[arg(short, long, default_value = "config")]
        config_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Start {
            config_dir,
            records,
        } => start(&config_dir, records.as_deref()).await,
        Commands::RunOnce {
            config_dir,
            records,
        } => {
            if !run_once(&config_dir, records.as_deref()).await? {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Validate { config_dir } => validate(&config_dir),
    }
}

async fn load_source(records: Option<&Path>) -> anyhow::Result<Arc<MemorySource>> {
    let source = match records {
        Some(path) => MemorySource::from_file(path)
            .await
            .with_context(|| format!("Failed to seed source from {}", path.display()))?,
        None => MemorySource::new(),
    };
    info!("Source holds {} account(s)", source.len().await);
    Ok(Arc::new(source))
}

async fn start(config_dir: &Path, records: Option<&Path>) -> anyhow::Result<()> {
    let config = AppConfig::load(config_dir)?;
    init_tracing(&config.logging)?;

    info!("Starting account sync");

    let source = load_source(records).await?;
    let flow = sync_cli::build_flow(&config, source)?;
    flow.connect().await?;
    let flow = Arc::new(flow);

    let cancel = CancellationToken::new();
    let scheduler = if flow.policy() == TriggerPolicy::Poll && config.scheduler.enabled {
        Some(flow.clone().spawn_scheduler(
            Duration::from_secs(config.scheduler.interval_secs),
            cancel.clone(),
        ))
    } else {
        info!("Poll scheduler disabled");
        None
    };

    let server = ApiServer::new(
        config.api.host.clone(),
        config.api.port,
        config.api.cors_enabled,
        AppState::new(flow.clone()),
    );

    info!(
        "API server listening on {}:{}",
        config.api.host, config.api.port
    );

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("API server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    cancel.cancel();
    if let Some(handle) = scheduler {
        if let Err(e) = handle.await {
            error!("Poll scheduler task failed: {}", e);
        }
    }
    flow.disconnect().await?;

    info!("Shutdown complete");
    Ok(())
}

/// Returns whether the tick succeeded
async fn run_once(config_dir: &Path, records: Option<&Path>) -> anyhow::Result<bool> {
    let config = AppConfig::load(config_dir)?;
    init_tracing(&config.logging)?;

    if config.flow.trigger.policy != TriggerPolicy::Poll {
        anyhow::bail!(
            "run-once needs a poll flow, '{}' is a {} flow",
            config.flow.name,
            config.flow.trigger.policy
        );
    }

    let source = load_source(records).await?;
    let flow = sync_cli::build_flow(&config, source)?;
    flow.connect().await?;

    let result = flow.run_once().await;
    flow.disconnect().await?;

    match result? {
        Some(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(result.is_successful())
        }
        None => {
            println!("No changes");
            Ok(true)
        }
    }
}

fn validate(config_dir: &Path) -> anyhow::Result<()> {
    println!("Validating configuration in {}", config_dir.display());

    let config = AppConfig::load(config_dir)?;
    let registry = sync_cli::registry(Arc::new(MemorySource::new()));
    let flow = sync_core::SyncFlow::from_config(config.flow.clone(), &registry)?;

    println!("✓ Configuration is valid");
    println!("\nFlow: {}", flow.name());
    println!("  Trigger: {}", flow.policy());
    println!("  Destinations:");
    for adapter in flow.runner().adapters() {
        println!("    - {}", adapter.name());
    }
    println!(
        "  Filters: {}, categories: {}",
        config.flow.rules.filters.len(),
        config.flow.rules.categories.len()
    );
    println!("\nAPI: {}:{}", config.api.host, config.api.port);
    if flow.policy() == TriggerPolicy::Poll {
        println!(
            "Scheduler: {} (every {}s)",
            if config.scheduler.enabled {
                "enabled"
            } else {
                "disabled"
            },
            config.scheduler.interval_secs
        );
    }

    Ok(())
}
