//! Persistence seam for the evaluation engine.
//!
//! The evaluator talks to a `TicketStore` trait; the in-memory DashMap
//! implementation here is the reference store for development and tests.
//! Production: replace with PostgreSQL (sqlx) or similar ACID store.

pub mod memory;

pub use memory::InMemoryTicketStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sentinel_core::types::{
    Alert, EscalationLevel, SlaStatus, StatusHistoryEntry, Ticket,
};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("ticket {0} not found")]
    NotFound(Uuid),

    #[error("version conflict on ticket {0}")]
    VersionConflict(Uuid),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// SLA fields the evaluator writes back after computing a ticket's clocks.
#[derive(Debug, Clone)]
pub struct TicketSlaUpdate {
    pub response_sla_status: SlaStatus,
    pub resolution_sla_status: SlaStatus,
    pub response_sla_deadline: Option<DateTime<Utc>>,
    pub resolution_sla_deadline: Option<DateTime<Utc>>,
    pub response_sla_remaining_minutes: Option<i64>,
    pub resolution_sla_remaining_minutes: Option<i64>,
    pub escalation_level: EscalationLevel,
    /// True when this cycle crossed a new escalation breakpoint.
    pub escalation_advanced: bool,
}

/// Everything one per-ticket evaluation wants persisted atomically:
/// ticket SLA fields, alert creations/deactivations, and at most one
/// status-history row.
#[derive(Debug, Clone)]
pub struct EvaluationCommit {
    pub ticket_id: Uuid,
    /// Optimistic guard: the `row_version` the evaluation was computed
    /// against. A mismatch fails the whole commit.
    pub expected_row_version: u64,
    pub update: TicketSlaUpdate,
    pub new_alerts: Vec<Alert>,
    pub deactivate_alerts: Vec<Uuid>,
    pub history: Option<StatusHistoryEntry>,
    pub committed_at: DateTime<Utc>,
}

/// Transactional read/write access to tickets, alerts, and status history.
#[async_trait]
pub trait TicketStore: Send + Sync {
    /// All tickets with a non-terminal status.
    async fn open_tickets(&self) -> Result<Vec<Ticket>, StoreError>;

    /// Active alerts for one ticket.
    async fn active_alerts(&self, ticket_id: Uuid) -> Result<Vec<Alert>, StoreError>;

    /// Active alerts whose delivery has not yet been confirmed, with the
    /// ticket each belongs to.
    async fn unnotified_alerts(&self) -> Result<Vec<(Alert, Ticket)>, StoreError>;

    /// Apply one per-ticket evaluation atomically.
    async fn commit_evaluation(&self, commit: EvaluationCommit) -> Result<(), StoreError>;

    /// Record confirmed delivery of an alert to the notifier.
    async fn mark_alert_notified(
        &self,
        alert_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}
