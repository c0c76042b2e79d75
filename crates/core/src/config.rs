use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `SLA_SENTINEL__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub sla: SlaFileConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between evaluation cycles.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Maximum tickets evaluated concurrently within one cycle.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlaFileConfig {
    /// Path to the SLA target table (TOML/YAML/JSON).
    #[serde(default = "default_sla_config_path")]
    pub config_path: String,
    /// Seconds between file-change polls for hot reload.
    #[serde(default = "default_watch_interval_secs")]
    pub watch_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifierConfig {
    #[serde(default)]
    pub slack_webhook_url: String,
    #[serde(default = "default_slack_channel")]
    pub channel: String,
    #[serde(default = "default_slack_critical_channel")]
    pub critical_channel: String,
    /// Delivery attempts exceeding this bound count as failed.
    #[serde(default = "default_delivery_timeout_ms")]
    pub delivery_timeout_ms: u64,
}

// Default functions
fn default_node_id() -> String {
    "sentinel-01".to_string()
}
fn default_interval_secs() -> u64 {
    60
}
fn default_concurrency() -> usize {
    16
}
fn default_sla_config_path() -> String {
    "sla_config.yaml".to_string()
}
fn default_watch_interval_secs() -> u64 {
    5
}
fn default_slack_channel() -> String {
    "#sla-alerts".to_string()
}
fn default_slack_critical_channel() -> String {
    "#sla-critical".to_string()
}
fn default_delivery_timeout_ms() -> u64 {
    5000
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            concurrency: default_concurrency(),
        }
    }
}

impl Default for SlaFileConfig {
    fn default() -> Self {
        Self {
            config_path: default_sla_config_path(),
            watch_interval_secs: default_watch_interval_secs(),
        }
    }
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            slack_webhook_url: String::new(),
            channel: default_slack_channel(),
            critical_channel: default_slack_critical_channel(),
            delivery_timeout_ms: default_delivery_timeout_ms(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            scheduler: SchedulerConfig::default(),
            sla: SlaFileConfig::default(),
            notifier: NotifierConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("SLA_SENTINEL")
                .separator("__")
                .try_parsing(true)
                .list_separator(","),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}
