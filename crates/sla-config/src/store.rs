//! Versioned configuration store with atomic hot swap.
//!
//! Readers call `current()` on every evaluation cycle and always observe a
//! fully-validated, immutable version. `reload()` builds and validates a
//! candidate off to the side and swaps it in atomically; a bad candidate
//! leaves the active version untouched.

use crate::table::SlaTargetTable;
use crate::ConfigError;
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// One immutable, validated snapshot of the SLA target table.
#[derive(Debug, Clone)]
pub struct SlaConfigVersion {
    pub version: u64,
    pub table: SlaTargetTable,
    pub loaded_at: DateTime<Utc>,
}

/// Holds the active configuration version and hands out `Arc` snapshots.
pub struct SlaConfigStore {
    path: PathBuf,
    active: ArcSwap<SlaConfigVersion>,
    next_version: AtomicU64,
}

impl SlaConfigStore {
    /// Load the initial version from `path`, falling back to the
    /// compiled-in default table when the file is missing or invalid.
    /// The store always starts with a valid version.
    pub fn bootstrap(path: impl Into<PathBuf>) -> Arc<Self> {
        let path = path.into();
        let table = match Self::load_table(&path) {
            Ok(table) => {
                info!(path = %path.display(), "SLA target table loaded");
                table
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to load SLA target table, using built-in defaults"
                );
                SlaTargetTable::default_table()
            }
        };

        let version = SlaConfigVersion {
            version: 1,
            table,
            loaded_at: Utc::now(),
        };

        Arc::new(Self {
            path,
            active: ArcSwap::from_pointee(version),
            next_version: AtomicU64::new(2),
        })
    }

    /// The currently active version. Lock-free, never touches I/O.
    pub fn current(&self) -> Arc<SlaConfigVersion> {
        self.active.load_full()
    }

    /// Re-read the source file and swap in a new version. A candidate
    /// that fails to parse or validate is discarded and the active
    /// version is retained.
    pub fn reload(&self) -> Result<Arc<SlaConfigVersion>, ConfigError> {
        let table = match Self::load_table(&self.path) {
            Ok(table) => table,
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    active_version = self.current().version,
                    "SLA config reload failed, keeping active version"
                );
                return Err(e);
            }
        };

        let version = self.next_version.fetch_add(1, Ordering::SeqCst);
        let new = Arc::new(SlaConfigVersion {
            version,
            table,
            loaded_at: Utc::now(),
        });
        self.active.store(new.clone());

        info!(version, path = %self.path.display(), "SLA config reloaded");
        Ok(new)
    }

    fn load_table(path: &Path) -> Result<SlaTargetTable, ConfigError> {
        let table: SlaTargetTable = config::Config::builder()
            .add_source(config::File::from(path))
            .build()?
            .try_deserialize()?;
        table.validate()?;
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_core::types::{CustomerTier, Priority, SlaType};
    use std::fs;

    fn temp_config(contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("sla-{}.yaml", uuid::Uuid::new_v4()));
        fs::write(&path, contents).unwrap();
        path
    }

    const VALID_YAML: &str = r#"
alert_thresholds:
  warning: 0.15
  critical: 0.05
targets:
  ENTERPRISE:
    P0:
      response_minutes: 15
      resolution_minutes: 240
      escalation:
        - after_minutes: 30
          level: LEVEL1
        - after_minutes: 60
          level: LEVEL2
"#;

    #[test]
    fn test_bootstrap_from_file() {
        let path = temp_config(VALID_YAML);
        let store = SlaConfigStore::bootstrap(&path);

        let current = store.current();
        assert_eq!(current.version, 1);
        assert_eq!(
            current
                .table
                .target_minutes(CustomerTier::Enterprise, Priority::P0, SlaType::Response),
            Some(15)
        );
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_bootstrap_missing_file_uses_defaults() {
        let store = SlaConfigStore::bootstrap("/nonexistent/sla.yaml");
        let current = store.current();
        assert_eq!(current.version, 1);
        assert!(current
            .table
            .target_minutes(CustomerTier::Enterprise, Priority::P0, SlaType::Response)
            .is_some());
    }

    #[test]
    fn test_reload_bumps_version() {
        let path = temp_config(VALID_YAML);
        let store = SlaConfigStore::bootstrap(&path);

        fs::write(&path, VALID_YAML.replace("response_minutes: 15", "response_minutes: 20"))
            .unwrap();
        let reloaded = store.reload().unwrap();

        assert_eq!(reloaded.version, 2);
        assert_eq!(
            store
                .current()
                .table
                .target_minutes(CustomerTier::Enterprise, Priority::P0, SlaType::Response),
            Some(20)
        );
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_invalid_reload_keeps_active_version() {
        let path = temp_config(VALID_YAML);
        let store = SlaConfigStore::bootstrap(&path);
        let before = store.current();

        // Warning below critical fails validation.
        fs::write(&path, VALID_YAML.replace("warning: 0.15", "warning: 0.01")).unwrap();
        assert!(store.reload().is_err());

        let after = store.current();
        assert_eq!(after.version, before.version);
        assert_eq!(after.table, before.table);

        // A later valid reload still gets a fresh, monotonic version.
        fs::write(&path, VALID_YAML).unwrap();
        let recovered = store.reload().unwrap();
        assert!(recovered.version > before.version);
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_unparseable_reload_keeps_active_version() {
        let path = temp_config(VALID_YAML);
        let store = SlaConfigStore::bootstrap(&path);

        fs::write(&path, "targets: [not, a, map").unwrap();
        assert!(store.reload().is_err());
        assert_eq!(store.current().version, 1);
        fs::remove_file(path).unwrap();
    }
}
