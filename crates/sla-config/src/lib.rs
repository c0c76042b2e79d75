//! SLA target configuration: load, validate, version, hot-swap.

pub mod store;
pub mod table;
pub mod watcher;

pub use store::{SlaConfigStore, SlaConfigVersion};
pub use table::{AlertThresholds, EscalationBreakpoint, SlaTargetEntry, SlaTargetTable};
pub use watcher::spawn_file_watcher;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load SLA config: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid SLA config: {0}")]
    Validation(String),
}
