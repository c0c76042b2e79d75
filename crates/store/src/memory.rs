//! In-memory ticket store backed by DashMap.
//!
//! Implements the `TicketStore` seam for the evaluator and the surface the
//! ingestion path uses to create tickets and move their lifecycle status.
//! Resolution-clock pause bookkeeping lives here, where status changes are
//! observed, so the clock calculator stays pure.

use crate::{EvaluationCommit, StoreError, TicketStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sentinel_core::types::{
    Alert, CustomerTier, Priority, StatusHistoryEntry, Ticket, TicketStatus,
};
use tracing::info;
use uuid::Uuid;

/// Thread-safe in-memory store for tickets, alerts, and status history.
pub struct InMemoryTicketStore {
    tickets: DashMap<Uuid, Ticket>,
    alerts: DashMap<Uuid, Alert>,
    history: DashMap<Uuid, StatusHistoryEntry>,
}

impl InMemoryTicketStore {
    pub fn new() -> Self {
        info!("Ticket store initialized (in-memory, development mode)");
        Self {
            tickets: DashMap::new(),
            alerts: DashMap::new(),
            history: DashMap::new(),
        }
    }

    // ─── Ingestion-facing surface ──────────────────────────────────────────

    /// Insert a new ticket as the ingestion path would.
    pub fn create_ticket(
        &self,
        external_id: impl Into<String>,
        title: impl Into<String>,
        priority: Priority,
        customer_tier: CustomerTier,
        created_at: DateTime<Utc>,
    ) -> Ticket {
        let ticket = Ticket::new(external_id, title, priority, customer_tier, created_at);
        self.tickets.insert(ticket.id, ticket.clone());
        ticket
    }

    /// Insert a pre-built ticket (tests, replays).
    pub fn insert_ticket(&self, ticket: Ticket) {
        self.tickets.insert(ticket.id, ticket);
    }

    pub fn get_ticket(&self, id: Uuid) -> Option<Ticket> {
        self.tickets.get(&id).map(|r| r.value().clone())
    }

    /// Move a ticket's lifecycle status, maintaining resolution-pause
    /// bookkeeping and deactivating alerts on terminal transitions.
    pub fn set_status(
        &self,
        id: Uuid,
        status: TicketStatus,
        at: DateTime<Utc>,
    ) -> Result<Ticket, StoreError> {
        let mut entry = self.tickets.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        let ticket = entry.value_mut();
        let previous = ticket.status;

        if status.pauses_resolution_clock() && !previous.pauses_resolution_clock() {
            ticket.sla_paused_at = Some(at);
        }
        if previous.pauses_resolution_clock() && !status.pauses_resolution_clock() {
            if let Some(paused_at) = ticket.sla_paused_at.take() {
                ticket.resolution_paused_minutes += (at - paused_at).num_minutes().max(0);
            }
        }

        if status == TicketStatus::Resolved && ticket.resolved_at.is_none() {
            ticket.resolved_at = Some(at);
        }

        ticket.status = status;
        ticket.updated_at = at;
        ticket.row_version += 1;
        let updated = ticket.clone();
        drop(entry);

        // Terminal tickets leave evaluation; close out their alerts here.
        if status.is_terminal() && !previous.is_terminal() {
            self.deactivate_alerts_for(id, at);
        }

        Ok(updated)
    }

    /// Record the first human response on a ticket.
    pub fn record_first_response(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Ticket, StoreError> {
        let mut entry = self.tickets.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        let ticket = entry.value_mut();
        if ticket.first_response_at.is_none() {
            ticket.first_response_at = Some(at);
            ticket.updated_at = at;
            ticket.row_version += 1;
        }
        Ok(ticket.clone())
    }

    // ─── Read surface for tests and dashboards ─────────────────────────────

    pub fn alerts_for(&self, ticket_id: Uuid) -> Vec<Alert> {
        let mut alerts: Vec<Alert> = self
            .alerts
            .iter()
            .filter(|r| r.value().ticket_id == ticket_id)
            .map(|r| r.value().clone())
            .collect();
        alerts.sort_by_key(|a| a.created_at);
        alerts
    }

    pub fn history_for(&self, ticket_id: Uuid) -> Vec<StatusHistoryEntry> {
        let mut rows: Vec<StatusHistoryEntry> = self
            .history
            .iter()
            .filter(|r| r.value().ticket_id == ticket_id)
            .map(|r| r.value().clone())
            .collect();
        rows.sort_by_key(|h| h.changed_at);
        rows
    }

    fn deactivate_alerts_for(&self, ticket_id: Uuid, at: DateTime<Utc>) {
        for mut alert in self.alerts.iter_mut() {
            let alert = alert.value_mut();
            if alert.ticket_id == ticket_id && alert.is_active {
                alert.is_active = false;
                alert.resolved_at = Some(at);
            }
        }
    }

    /// Seed a handful of open tickets for the `--demo` flag.
    pub fn seed_demo_data(&self, now: DateTime<Utc>) {
        let seeds = [
            ("TKT-1001", "Checkout API returning 500s", Priority::P0, CustomerTier::Enterprise, 10),
            ("TKT-1002", "Dashboard loading slowly", Priority::P1, CustomerTier::Premium, 45),
            ("TKT-1003", "CSV export misses rows", Priority::P2, CustomerTier::Standard, 300),
            ("TKT-1004", "Password reset email delayed", Priority::P1, CustomerTier::Basic, 90),
        ];
        for (external_id, title, priority, tier, age_minutes) in seeds {
            self.create_ticket(
                external_id,
                title,
                priority,
                tier,
                now - chrono::Duration::minutes(age_minutes),
            );
        }
        info!(count = seeds.len(), "Seeded demo tickets");
    }
}

impl Default for InMemoryTicketStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TicketStore for InMemoryTicketStore {
    async fn open_tickets(&self) -> Result<Vec<Ticket>, StoreError> {
        let mut tickets: Vec<Ticket> = self
            .tickets
            .iter()
            .filter(|r| !r.value().status.is_terminal())
            .map(|r| r.value().clone())
            .collect();
        tickets.sort_by_key(|t| t.created_at);
        Ok(tickets)
    }

    async fn active_alerts(&self, ticket_id: Uuid) -> Result<Vec<Alert>, StoreError> {
        Ok(self
            .alerts
            .iter()
            .filter(|r| r.value().ticket_id == ticket_id && r.value().is_active)
            .map(|r| r.value().clone())
            .collect())
    }

    async fn unnotified_alerts(&self) -> Result<Vec<(Alert, Ticket)>, StoreError> {
        let mut pending = Vec::new();
        for alert in self.alerts.iter() {
            let alert = alert.value();
            if alert.is_active && alert.notified_at.is_none() {
                if let Some(ticket) = self.get_ticket(alert.ticket_id) {
                    pending.push((alert.clone(), ticket));
                }
            }
        }
        pending.sort_by_key(|(a, _)| a.created_at);
        Ok(pending)
    }

    async fn commit_evaluation(&self, commit: EvaluationCommit) -> Result<(), StoreError> {
        // The ticket write-lock covers the whole commit, standing in for a
        // database transaction with row-level locking.
        let mut entry = self
            .tickets
            .get_mut(&commit.ticket_id)
            .ok_or(StoreError::NotFound(commit.ticket_id))?;
        let ticket = entry.value_mut();

        if ticket.row_version != commit.expected_row_version {
            return Err(StoreError::VersionConflict(commit.ticket_id));
        }

        let update = &commit.update;
        ticket.response_sla_status = update.response_sla_status;
        ticket.resolution_sla_status = update.resolution_sla_status;
        ticket.response_sla_deadline = update.response_sla_deadline;
        ticket.resolution_sla_deadline = update.resolution_sla_deadline;
        ticket.response_sla_remaining_minutes = update.response_sla_remaining_minutes;
        ticket.resolution_sla_remaining_minutes = update.resolution_sla_remaining_minutes;
        if update.escalation_advanced {
            ticket.escalation_level = update.escalation_level;
            ticket.escalation_count += 1;
            ticket.last_escalation_at = Some(commit.committed_at);
        }
        ticket.updated_at = commit.committed_at;
        ticket.row_version += 1;

        for alert_id in &commit.deactivate_alerts {
            if let Some(mut alert) = self.alerts.get_mut(alert_id) {
                alert.is_active = false;
                alert.resolved_at = Some(commit.committed_at);
            }
        }
        for alert in &commit.new_alerts {
            self.alerts.insert(alert.id, alert.clone());
        }
        if let Some(history) = &commit.history {
            self.history.insert(history.id, history.clone());
        }
        Ok(())
    }

    async fn mark_alert_notified(
        &self,
        alert_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut alert = self
            .alerts
            .get_mut(&alert_id)
            .ok_or(StoreError::NotFound(alert_id))?;
        alert.notified_at = Some(at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TicketSlaUpdate;
    use chrono::Duration;
    use sentinel_core::types::{AlertType, EscalationLevel, SlaStatus, SlaType};

    fn open_ticket(store: &InMemoryTicketStore, now: DateTime<Utc>) -> Ticket {
        store.create_ticket(
            "TKT-1",
            "Test ticket",
            Priority::P0,
            CustomerTier::Enterprise,
            now,
        )
    }

    fn sla_update() -> TicketSlaUpdate {
        TicketSlaUpdate {
            response_sla_status: SlaStatus::Warning,
            resolution_sla_status: SlaStatus::Compliant,
            response_sla_deadline: None,
            resolution_sla_deadline: None,
            response_sla_remaining_minutes: Some(2),
            resolution_sla_remaining_minutes: Some(200),
            escalation_level: EscalationLevel::Level0,
            escalation_advanced: false,
        }
    }

    fn alert_for(ticket: &Ticket, now: DateTime<Utc>) -> Alert {
        Alert {
            id: Uuid::new_v4(),
            ticket_id: ticket.id,
            alert_type: AlertType::Warning,
            sla_type: SlaType::Response,
            threshold_percentage: Some(15.0),
            time_remaining_minutes: Some(2),
            deadline: None,
            is_active: true,
            created_at: now,
            resolved_at: None,
            notified_at: None,
        }
    }

    #[tokio::test]
    async fn test_open_tickets_excludes_terminal() {
        let store = InMemoryTicketStore::new();
        let now = Utc::now();
        let open = open_ticket(&store, now);
        let closed = store.create_ticket("TKT-2", "Done", Priority::P2, CustomerTier::Basic, now);
        store.set_status(closed.id, TicketStatus::Closed, now).unwrap();

        let tickets = store.open_tickets().await.unwrap();
        assert_eq!(tickets.len(), 1);
        assert_eq!(tickets[0].id, open.id);
    }

    #[tokio::test]
    async fn test_commit_rejects_stale_row_version() {
        let store = InMemoryTicketStore::new();
        let now = Utc::now();
        let ticket = open_ticket(&store, now);

        // Concurrent writer bumps the row in between.
        store
            .set_status(ticket.id, TicketStatus::InProgress, now)
            .unwrap();

        let result = store
            .commit_evaluation(EvaluationCommit {
                ticket_id: ticket.id,
                expected_row_version: ticket.row_version,
                update: sla_update(),
                new_alerts: vec![],
                deactivate_alerts: vec![],
                history: None,
                committed_at: now,
            })
            .await;
        assert!(matches!(result, Err(StoreError::VersionConflict(_))));
    }

    #[tokio::test]
    async fn test_commit_applies_alerts_and_escalation() {
        let store = InMemoryTicketStore::new();
        let now = Utc::now();
        let ticket = open_ticket(&store, now);
        let alert = alert_for(&ticket, now);

        let mut update = sla_update();
        update.escalation_level = EscalationLevel::Level1;
        update.escalation_advanced = true;

        store
            .commit_evaluation(EvaluationCommit {
                ticket_id: ticket.id,
                expected_row_version: 0,
                update,
                new_alerts: vec![alert.clone()],
                deactivate_alerts: vec![],
                history: None,
                committed_at: now,
            })
            .await
            .unwrap();

        let stored = store.get_ticket(ticket.id).unwrap();
        assert_eq!(stored.escalation_level, EscalationLevel::Level1);
        assert_eq!(stored.escalation_count, 1);
        assert_eq!(stored.row_version, 1);

        let active = store.active_alerts(ticket.id).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, alert.id);
    }

    #[tokio::test]
    async fn test_pause_bookkeeping_on_pending_customer() {
        let store = InMemoryTicketStore::new();
        let t0 = Utc::now();
        let ticket = open_ticket(&store, t0);

        store
            .set_status(ticket.id, TicketStatus::PendingCustomer, t0 + Duration::minutes(60))
            .unwrap();
        let paused = store.get_ticket(ticket.id).unwrap();
        assert!(paused.sla_paused_at.is_some());

        store
            .set_status(ticket.id, TicketStatus::Open, t0 + Duration::minutes(90))
            .unwrap();
        let resumed = store.get_ticket(ticket.id).unwrap();
        assert!(resumed.sla_paused_at.is_none());
        assert_eq!(resumed.resolution_paused_minutes, 30);
    }

    #[tokio::test]
    async fn test_terminal_transition_deactivates_alerts() {
        let store = InMemoryTicketStore::new();
        let now = Utc::now();
        let ticket = open_ticket(&store, now);
        let alert = alert_for(&ticket, now);
        store.alerts.insert(alert.id, alert);

        store
            .set_status(ticket.id, TicketStatus::Resolved, now)
            .unwrap();

        assert!(store.active_alerts(ticket.id).await.unwrap().is_empty());
        // The row is retained for audit, just inactive.
        assert_eq!(store.alerts_for(ticket.id).len(), 1);
        assert!(store.get_ticket(ticket.id).unwrap().resolved_at.is_some());
    }

    #[tokio::test]
    async fn test_unnotified_alerts_and_mark_notified() {
        let store = InMemoryTicketStore::new();
        let now = Utc::now();
        let ticket = open_ticket(&store, now);
        let alert = alert_for(&ticket, now);
        store.alerts.insert(alert.id, alert.clone());

        let pending = store.unnotified_alerts().await.unwrap();
        assert_eq!(pending.len(), 1);

        store.mark_alert_notified(alert.id, now).await.unwrap();
        let pending = store.unnotified_alerts().await.unwrap();
        assert!(pending.is_empty());
    }
}
