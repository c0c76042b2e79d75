//! The SLA target table: response/resolution minutes and escalation
//! breakpoints per (tier, priority), plus global alert thresholds.
//!
//! The table is parsed from a TOML/YAML/JSON file and validated before it
//! can become an active configuration version.

use crate::ConfigError;
use sentinel_core::types::{CustomerTier, EscalationLevel, Priority, SlaType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Remaining-fraction boundaries below which clock severity increases.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AlertThresholds {
    pub warning: f64,
    pub critical: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            warning: 0.15,
            critical: 0.05,
        }
    }
}

/// One rung of the escalation ladder: after `after_minutes` elapsed on
/// either clock, the ticket must be at least at `level`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct EscalationBreakpoint {
    pub after_minutes: u32,
    pub level: EscalationLevel,
}

/// Targets for one (tier, priority) cell. A missing target means that SLA
/// type does not apply to the cell.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SlaTargetEntry {
    #[serde(default)]
    pub response_minutes: Option<u32>,
    #[serde(default)]
    pub resolution_minutes: Option<u32>,
    #[serde(default)]
    pub escalation: Vec<EscalationBreakpoint>,
}

impl SlaTargetEntry {
    pub fn target_minutes(&self, sla_type: SlaType) -> Option<u32> {
        match sla_type {
            SlaType::Response => self.response_minutes,
            SlaType::Resolution => self.resolution_minutes,
        }
    }
}

/// The full target table. Immutable once wrapped in a config version.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SlaTargetTable {
    #[serde(default)]
    pub alert_thresholds: AlertThresholds,
    #[serde(default)]
    pub targets: HashMap<CustomerTier, HashMap<Priority, SlaTargetEntry>>,
}

impl SlaTargetTable {
    pub fn entry(&self, tier: CustomerTier, priority: Priority) -> Option<&SlaTargetEntry> {
        self.targets.get(&tier).and_then(|m| m.get(&priority))
    }

    pub fn target_minutes(
        &self,
        tier: CustomerTier,
        priority: Priority,
        sla_type: SlaType,
    ) -> Option<u32> {
        self.entry(tier, priority)
            .and_then(|e| e.target_minutes(sla_type))
    }

    /// Check the invariants a candidate table must satisfy before it can
    /// replace the active version.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let thresholds = &self.alert_thresholds;
        for (name, value) in [
            ("warning", thresholds.warning),
            ("critical", thresholds.critical),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ConfigError::Validation(format!(
                    "{name} threshold {value} out of range (0, 1]"
                )));
            }
        }
        if thresholds.warning < thresholds.critical {
            return Err(ConfigError::Validation(format!(
                "warning threshold {} below critical threshold {}",
                thresholds.warning, thresholds.critical
            )));
        }

        for (tier, priorities) in &self.targets {
            for (priority, entry) in priorities {
                if !entry.escalation.is_empty()
                    && entry.response_minutes.is_none()
                    && entry.resolution_minutes.is_none()
                {
                    return Err(ConfigError::Validation(format!(
                        "{tier:?}/{priority:?} defines escalation breakpoints but no SLA target"
                    )));
                }
                for pair in entry.escalation.windows(2) {
                    if pair[1].after_minutes <= pair[0].after_minutes {
                        return Err(ConfigError::Validation(format!(
                            "{tier:?}/{priority:?} escalation breakpoints not strictly increasing \
                             ({} then {})",
                            pair[0].after_minutes, pair[1].after_minutes
                        )));
                    }
                    if pair[1].level <= pair[0].level {
                        return Err(ConfigError::Validation(format!(
                            "{tier:?}/{priority:?} escalation levels not strictly increasing"
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Compiled-in fallback used when no config file is available at
    /// startup.
    pub fn default_table() -> Self {
        use CustomerTier::*;
        use EscalationLevel::*;
        use Priority::*;

        let mut targets: HashMap<CustomerTier, HashMap<Priority, SlaTargetEntry>> = HashMap::new();

        let cells: [(CustomerTier, Priority, u32, u32, &[(u32, EscalationLevel)]); 8] = [
            (
                Enterprise,
                P0,
                15,
                240,
                &[(30, Level1), (60, Level2), (120, Level3), (240, Level4)],
            ),
            (Enterprise, P1, 30, 480, &[(60, Level1), (240, Level2), (480, Level3)]),
            (Premium, P0, 30, 480, &[(60, Level1), (240, Level2), (480, Level3)]),
            (Premium, P1, 60, 960, &[(120, Level1), (480, Level2)]),
            (Standard, P0, 60, 960, &[(120, Level1), (480, Level2)]),
            (Standard, P1, 120, 1440, &[(240, Level1)]),
            (Standard, P2, 240, 2880, &[]),
            (Basic, P0, 240, 2880, &[(480, Level1)]),
        ];

        for (tier, priority, response, resolution, ladder) in cells {
            targets.entry(tier).or_default().insert(
                priority,
                SlaTargetEntry {
                    response_minutes: Some(response),
                    resolution_minutes: Some(resolution),
                    escalation: ladder
                        .iter()
                        .map(|&(after_minutes, level)| EscalationBreakpoint {
                            after_minutes,
                            level,
                        })
                        .collect(),
                },
            );
        }

        Self {
            alert_thresholds: AlertThresholds::default(),
            targets,
        }
    }
}
