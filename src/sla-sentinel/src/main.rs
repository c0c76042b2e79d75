//! SLA Sentinel: SLA evaluation and escalation engine for support tickets.
//!
//! Main entry point that wires the config store, ticket store, notifier,
//! and scheduler together and runs until interrupted.

use clap::Parser;
use sentinel_config::{spawn_file_watcher, SlaConfigStore};
use sentinel_core::alert_bus::BroadcastSink;
use sentinel_core::AppConfig;
use sentinel_engine::{Evaluator, Scheduler};
use sentinel_notify::SlackWebhookNotifier;
use sentinel_store::InMemoryTicketStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "sla-sentinel")]
#[command(about = "SLA evaluation and escalation engine for support tickets")]
#[command(version)]
struct Cli {
    /// Node identifier (overrides config)
    #[arg(long, env = "SLA_SENTINEL__NODE_ID")]
    node_id: Option<String>,

    /// Seconds between evaluation cycles (overrides config)
    #[arg(long, env = "SLA_SENTINEL__SCHEDULER__INTERVAL_SECS")]
    interval: Option<u64>,

    /// Path to the SLA target table (overrides config)
    #[arg(long, env = "SLA_SENTINEL__SLA__CONFIG_PATH")]
    sla_config: Option<String>,

    /// Maximum tickets evaluated concurrently (overrides config)
    #[arg(long, env = "SLA_SENTINEL__SCHEDULER__CONCURRENCY")]
    concurrency: Option<usize>,

    /// Seed a handful of demo tickets into the in-memory store
    #[arg(long, default_value_t = false)]
    demo: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sla_sentinel=info,sentinel_engine=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("SLA Sentinel starting up");

    // Load configuration
    let mut config = AppConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    // Apply CLI overrides
    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(interval) = cli.interval {
        config.scheduler.interval_secs = interval;
    }
    if let Some(path) = cli.sla_config {
        config.sla.config_path = path;
    }
    if let Some(concurrency) = cli.concurrency {
        config.scheduler.concurrency = concurrency;
    }

    info!(
        node_id = %config.node_id,
        interval_secs = config.scheduler.interval_secs,
        concurrency = config.scheduler.concurrency,
        sla_config = %config.sla.config_path,
        "Configuration loaded"
    );

    // SLA target table with hot reload
    let config_store = SlaConfigStore::bootstrap(&config.sla.config_path);
    let watcher = spawn_file_watcher(
        config_store.clone(),
        config.sla.config_path.clone().into(),
        Duration::from_secs(config.sla.watch_interval_secs),
    );

    // Ticket store
    let store = Arc::new(InMemoryTicketStore::new());
    if cli.demo {
        store.seed_demo_data(chrono::Utc::now());
        info!("Demo tickets seeded");
    }

    // Outbound surfaces
    let notifier = Arc::new(SlackWebhookNotifier::new(config.notifier.clone()));
    let broadcaster = Arc::new(BroadcastSink::new(256));

    let evaluator = Evaluator::new(
        store.clone(),
        config_store,
        notifier,
        broadcaster,
        config.scheduler.concurrency,
        Duration::from_millis(config.notifier.delivery_timeout_ms),
    );

    let mut scheduler = Scheduler::new(evaluator, Duration::from_secs(config.scheduler.interval_secs));
    scheduler.start();

    info!("SLA Sentinel is running");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    // Finish any in-flight cycle before exiting.
    scheduler.shutdown().await;
    watcher.abort();

    info!("SLA Sentinel stopped");
    Ok(())
}
