use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ticket priority, P0 being the most urgent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Priority {
    #[serde(alias = "p0")]
    P0,
    #[serde(alias = "p1")]
    P1,
    #[serde(alias = "p2")]
    P2,
    #[serde(alias = "p3")]
    P3,
}

/// Customer tier, which together with priority selects the SLA targets.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum CustomerTier {
    #[serde(alias = "enterprise")]
    Enterprise,
    #[serde(alias = "premium")]
    Premium,
    #[serde(alias = "standard")]
    Standard,
    #[serde(alias = "basic")]
    Basic,
}

/// Ticket lifecycle status. Terminal statuses freeze the ticket's SLA
/// fields and exclude it from further evaluation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    InProgress,
    PendingCustomer,
    PendingInternal,
    Resolved,
    Closed,
    Cancelled,
}

impl TicketStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved | Self::Closed | Self::Cancelled)
    }

    /// While a ticket waits on the customer, the resolution clock is held.
    pub fn pauses_resolution_clock(&self) -> bool {
        matches!(self, Self::PendingCustomer)
    }
}

/// Categorical state of a single SLA clock.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum SlaStatus {
    Compliant,
    Warning,
    Critical,
    Breached,
    /// Clock held (waiting on customer) or no target configured for this
    /// tier/priority combination.
    Paused,
}

impl SlaStatus {
    /// Severity rank used for monotonicity and alert supersession.
    /// `Paused` carries no severity.
    pub fn severity(&self) -> u8 {
        match self {
            Self::Compliant | Self::Paused => 0,
            Self::Warning => 1,
            Self::Critical => 2,
            Self::Breached => 3,
        }
    }
}

/// The two SLA clocks tracked per ticket.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SlaType {
    Response,
    Resolution,
}

impl SlaType {
    pub const ALL: [SlaType; 2] = [SlaType::Response, SlaType::Resolution];
}

/// Escalation rung. Non-decreasing while a ticket is open; frozen on
/// closure.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum EscalationLevel {
    #[default]
    Level0,
    Level1,
    Level2,
    Level3,
    Level4,
}

impl EscalationLevel {
    pub fn as_u8(&self) -> u8 {
        match self {
            Self::Level0 => 0,
            Self::Level1 => 1,
            Self::Level2 => 2,
            Self::Level3 => 3,
            Self::Level4 => 4,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Level0),
            1 => Some(Self::Level1),
            2 => Some(Self::Level2),
            3 => Some(Self::Level3),
            4 => Some(Self::Level4),
            _ => None,
        }
    }
}

/// Persisted alert severity. Escalation advances are notified but not
/// stored as alert rows, so they are not part of this enum.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AlertType {
    Warning,
    Critical,
    Breached,
}

impl AlertType {
    pub fn severity(&self) -> u8 {
        match self {
            Self::Warning => 1,
            Self::Critical => 2,
            Self::Breached => 3,
        }
    }

    /// The alert severity implied by a clock state, if any.
    pub fn from_sla_status(status: SlaStatus) -> Option<Self> {
        match status {
            SlaStatus::Warning => Some(Self::Warning),
            SlaStatus::Critical => Some(Self::Critical),
            SlaStatus::Breached => Some(Self::Breached),
            SlaStatus::Compliant | SlaStatus::Paused => None,
        }
    }
}

/// A support ticket as seen by the evaluation engine.
///
/// Business fields are written by the ingestion path; SLA fields and the
/// escalation level are written by the evaluator. `row_version` guards
/// read-modify-write cycles against concurrent workers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: Uuid,
    pub external_id: String,
    pub title: String,
    pub priority: Priority,
    pub customer_tier: CustomerTier,
    pub status: TicketStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub first_response_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,

    pub response_sla_deadline: Option<DateTime<Utc>>,
    pub resolution_sla_deadline: Option<DateTime<Utc>>,
    pub response_sla_status: SlaStatus,
    pub resolution_sla_status: SlaStatus,
    pub response_sla_remaining_minutes: Option<i64>,
    pub resolution_sla_remaining_minutes: Option<i64>,

    pub escalation_level: EscalationLevel,
    pub escalation_count: u32,
    pub last_escalation_at: Option<DateTime<Utc>>,

    /// Set while the resolution clock is held (`pending_customer`).
    pub sla_paused_at: Option<DateTime<Utc>>,
    /// Total minutes already excluded from the resolution clock by
    /// completed pause intervals.
    pub resolution_paused_minutes: i64,

    pub row_version: u64,
}

impl Ticket {
    /// Construct a fresh ticket as the ingestion path would hand it over.
    pub fn new(
        external_id: impl Into<String>,
        title: impl Into<String>,
        priority: Priority,
        customer_tier: CustomerTier,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            external_id: external_id.into(),
            title: title.into(),
            priority,
            customer_tier,
            status: TicketStatus::Open,
            created_at,
            updated_at: created_at,
            first_response_at: None,
            resolved_at: None,
            response_sla_deadline: None,
            resolution_sla_deadline: None,
            response_sla_status: SlaStatus::Compliant,
            resolution_sla_status: SlaStatus::Compliant,
            response_sla_remaining_minutes: None,
            resolution_sla_remaining_minutes: None,
            escalation_level: EscalationLevel::Level0,
            escalation_count: 0,
            last_escalation_at: None,
            sla_paused_at: None,
            resolution_paused_minutes: 0,
            row_version: 0,
        }
    }

    pub fn sla_status(&self, sla_type: SlaType) -> SlaStatus {
        match sla_type {
            SlaType::Response => self.response_sla_status,
            SlaType::Resolution => self.resolution_sla_status,
        }
    }
}

/// A persisted alert row. Deactivated on supersession or ticket closure,
/// never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub alert_type: AlertType,
    pub sla_type: SlaType,
    /// Remaining-time percentage at which the alert fired.
    pub threshold_percentage: Option<f64>,
    pub time_remaining_minutes: Option<i64>,
    pub deadline: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    /// Set only once delivery to the notifier is confirmed; unset alerts
    /// are retried on later cycles.
    pub notified_at: Option<DateTime<Utc>>,
}

/// Append-only record of a detected ticket transition. Write-once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub changed_at: DateTime<Utc>,
    pub from_status: TicketStatus,
    pub to_status: TicketStatus,
    pub from_response_sla: SlaStatus,
    pub to_response_sla: SlaStatus,
    pub from_resolution_sla: SlaStatus,
    pub to_resolution_sla: SlaStatus,
    pub from_escalation_level: EscalationLevel,
    pub to_escalation_level: EscalationLevel,
}

/// What kind of event an outbound payload describes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AlertEventKind {
    /// A new alert row was created.
    Sla(AlertType),
    /// The escalation level advanced across a configured breakpoint.
    Escalation,
}

/// Outbound shape handed to the notifier and the broadcaster after a
/// successful per-ticket commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertPayload {
    pub alert_id: Option<Uuid>,
    pub ticket_id: Uuid,
    pub external_id: String,
    pub title: String,
    pub priority: Priority,
    pub customer_tier: CustomerTier,
    pub kind: AlertEventKind,
    /// `None` for escalation events, which are not tied to one clock.
    pub sla_type: Option<SlaType>,
    pub remaining_minutes: Option<i64>,
    pub escalation_level: EscalationLevel,
    pub created_at: DateTime<Utc>,
}

/// Outcome of one evaluation cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluationSummary {
    pub config_version: u64,
    pub tickets_evaluated: usize,
    pub tickets_skipped: usize,
    pub alerts_created: usize,
    pub escalations_advanced: usize,
    pub breaches_detected: usize,
    pub elapsed_ms: u64,
}

/// Elapsed wall time between two instants as fractional minutes, clamped
/// at zero.
pub fn minutes_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    let delta: Duration = end - start;
    (delta.num_seconds().max(0) as f64) / 60.0
}
