//! Alert policy: decides which alert rows to create and deactivate from a
//! ticket's freshly computed clock states.
//!
//! Pure: the evaluator persists the returned delta in the same transaction
//! as the ticket's SLA fields. Re-running with identical inputs yields an
//! empty delta, which is what makes overlapping or repeated cycles safe.

use crate::clock::SlaClocks;
use chrono::{DateTime, Utc};
use sentinel_core::types::{Alert, AlertType, SlaType, Ticket};
use sentinel_core::{SentinelError, SentinelResult};
use sentinel_config::AlertThresholds;
use uuid::Uuid;

/// Alert rows to create and deactivate for one ticket, one cycle.
#[derive(Debug, Clone, Default)]
pub struct AlertDelta {
    pub create: Vec<Alert>,
    pub deactivate: Vec<Uuid>,
}

impl AlertDelta {
    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.deactivate.is_empty()
    }
}

/// Reconcile the active-alert set against the new clock states.
///
/// Raises an alert when a clock's severity first reaches warning,
/// critical, or breached and no active alert of that or higher severity
/// exists for the (ticket, sla_type); the superseded lower alert is
/// deactivated in the same delta. A terminal ticket deactivates all of
/// its active alerts.
pub fn reconcile(
    ticket: &Ticket,
    clocks: &SlaClocks,
    active_alerts: &[Alert],
    thresholds: &AlertThresholds,
    now: DateTime<Utc>,
) -> SentinelResult<AlertDelta> {
    let mut delta = AlertDelta::default();

    if ticket.status.is_terminal() {
        delta.deactivate = active_alerts.iter().filter(|a| a.is_active).map(|a| a.id).collect();
        return Ok(delta);
    }

    for sla_type in SlaType::ALL {
        let active: Vec<&Alert> = active_alerts
            .iter()
            .filter(|a| a.is_active && a.sla_type == sla_type)
            .collect();
        // Dedup invariant: at most one active alert per (ticket, sla_type).
        if active.len() > 1 {
            return Err(SentinelError::InvariantViolation(format!(
                "ticket {} has {} active {:?} alerts",
                ticket.id,
                active.len(),
                sla_type
            )));
        }
        let existing = active.first().copied();

        let clock = clocks.get(sla_type);
        // Paused and compliant clocks never raise alerts.
        let desired = match AlertType::from_sla_status(clock.status) {
            Some(desired) => desired,
            None => continue,
        };

        let existing_severity = existing.map(|a| a.alert_type.severity()).unwrap_or(0);
        if desired.severity() <= existing_severity {
            continue;
        }

        if let Some(superseded) = existing {
            delta.deactivate.push(superseded.id);
        }

        let threshold_percentage = match desired {
            AlertType::Warning => Some(thresholds.warning * 100.0),
            AlertType::Critical => Some(thresholds.critical * 100.0),
            AlertType::Breached => Some(0.0),
        };

        delta.create.push(Alert {
            id: Uuid::new_v4(),
            ticket_id: ticket.id,
            alert_type: desired,
            sla_type,
            threshold_percentage,
            time_remaining_minutes: clock.remaining_minutes,
            deadline: clock.deadline,
            is_active: true,
            created_at: now,
            resolved_at: None,
            notified_at: None,
        });
    }

    Ok(delta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock;
    use chrono::Duration;
    use sentinel_config::SlaTargetTable;
    use sentinel_core::types::{CustomerTier, Priority, SlaStatus, TicketStatus};

    fn setup(created_at: DateTime<Utc>) -> (Ticket, SlaTargetTable) {
        let ticket = Ticket::new(
            "TKT-1",
            "test",
            Priority::P0,
            CustomerTier::Enterprise,
            created_at,
        );
        (ticket, SlaTargetTable::default_table())
    }

    fn active_alert(ticket: &Ticket, alert_type: AlertType, sla_type: SlaType) -> Alert {
        Alert {
            id: Uuid::new_v4(),
            ticket_id: ticket.id,
            alert_type,
            sla_type,
            threshold_percentage: None,
            time_remaining_minutes: None,
            deadline: None,
            is_active: true,
            created_at: ticket.created_at,
            resolved_at: None,
            notified_at: None,
        }
    }

    #[test]
    fn test_first_warning_creates_one_alert() {
        let t0 = Utc::now();
        let (ticket, table) = setup(t0);
        let now = t0 + Duration::seconds(13 * 60);
        let clocks = clock::compute(&ticket, &table, now);
        assert_eq!(clocks.response.status, SlaStatus::Warning);

        let delta = reconcile(&ticket, &clocks, &[], &table.alert_thresholds, now).unwrap();
        assert_eq!(delta.create.len(), 1);
        assert_eq!(delta.create[0].alert_type, AlertType::Warning);
        assert_eq!(delta.create[0].sla_type, SlaType::Response);
        assert!(delta.deactivate.is_empty());
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let t0 = Utc::now();
        let (ticket, table) = setup(t0);
        let now = t0 + Duration::seconds(13 * 60);
        let clocks = clock::compute(&ticket, &table, now);

        let existing = active_alert(&ticket, AlertType::Warning, SlaType::Response);
        let delta = reconcile(
            &ticket,
            &clocks,
            &[existing],
            &table.alert_thresholds,
            now,
        )
        .unwrap();
        assert!(delta.is_empty());
    }

    #[test]
    fn test_breach_supersedes_critical() {
        let t0 = Utc::now();
        let (ticket, table) = setup(t0);
        let now = t0 + Duration::minutes(16);
        let clocks = clock::compute(&ticket, &table, now);
        assert_eq!(clocks.response.status, SlaStatus::Breached);

        let critical = active_alert(&ticket, AlertType::Critical, SlaType::Response);
        let critical_id = critical.id;
        let delta = reconcile(
            &ticket,
            &clocks,
            &[critical],
            &table.alert_thresholds,
            now,
        )
        .unwrap();

        assert_eq!(delta.create.len(), 1);
        assert_eq!(delta.create[0].alert_type, AlertType::Breached);
        assert_eq!(delta.deactivate, vec![critical_id]);
    }

    #[test]
    fn test_higher_active_severity_blocks_lower() {
        let t0 = Utc::now();
        let (mut ticket, table) = setup(t0);
        ticket.response_sla_status = SlaStatus::Breached;
        let now = t0 + Duration::seconds(13 * 60);
        let clocks = clock::compute(&ticket, &table, now);

        let breached = active_alert(&ticket, AlertType::Breached, SlaType::Response);
        let delta = reconcile(
            &ticket,
            &clocks,
            &[breached],
            &table.alert_thresholds,
            now,
        )
        .unwrap();
        assert!(delta.is_empty());
    }

    #[test]
    fn test_terminal_ticket_deactivates_everything() {
        let t0 = Utc::now();
        let (mut ticket, table) = setup(t0);
        ticket.status = TicketStatus::Cancelled;
        let now = t0 + Duration::minutes(20);
        let clocks = clock::compute(&ticket, &table, now);

        let a = active_alert(&ticket, AlertType::Warning, SlaType::Response);
        let b = active_alert(&ticket, AlertType::Critical, SlaType::Resolution);
        let ids = vec![a.id, b.id];
        let delta = reconcile(&ticket, &clocks, &[a, b], &table.alert_thresholds, now).unwrap();

        assert!(delta.create.is_empty());
        assert_eq!(delta.deactivate, ids);
    }

    #[test]
    fn test_duplicate_active_alerts_is_invariant_violation() {
        let t0 = Utc::now();
        let (ticket, table) = setup(t0);
        let now = t0 + Duration::minutes(5);
        let clocks = clock::compute(&ticket, &table, now);

        let a = active_alert(&ticket, AlertType::Warning, SlaType::Response);
        let b = active_alert(&ticket, AlertType::Warning, SlaType::Response);
        let result = reconcile(&ticket, &clocks, &[a, b], &table.alert_thresholds, now);
        assert!(matches!(result, Err(SentinelError::InvariantViolation(_))));
    }

    #[test]
    fn test_paused_clock_never_alerts() {
        let t0 = Utc::now();
        let (mut ticket, table) = setup(t0);
        ticket.status = TicketStatus::PendingCustomer;
        ticket.sla_paused_at = Some(t0);

        // Response clock for P3/BASIC is unconfigured; resolution is held.
        let ticket = Ticket {
            priority: Priority::P3,
            customer_tier: CustomerTier::Basic,
            ..ticket
        };
        let now = t0 + Duration::days(10);
        let clocks = clock::compute(&ticket, &table, now);
        assert_eq!(clocks.response.status, SlaStatus::Paused);

        let delta = reconcile(&ticket, &clocks, &[], &table.alert_thresholds, now).unwrap();
        assert!(delta.is_empty());
    }
}
