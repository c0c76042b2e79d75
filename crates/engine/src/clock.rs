//! Clock calculator: pure mapping from (ticket, target table, now) to the
//! state of both SLA clocks.
//!
//! No I/O and no mutation: the evaluator feeds the result into the alert
//! and escalation policies and persists whatever changed.

use chrono::{DateTime, Duration, Utc};
use sentinel_config::SlaTargetTable;
use sentinel_core::types::{minutes_between, SlaStatus, SlaType, Ticket};

/// Computed state of one SLA clock at a point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct ClockState {
    pub status: SlaStatus,
    /// `None` when the clock does not apply to this tier/priority.
    pub target_minutes: Option<u32>,
    /// Elapsed minutes counted against the target (pauses excluded).
    pub elapsed_minutes: f64,
    /// `max(0, (target - elapsed) / target)`; 1.0 for inapplicable clocks.
    pub remaining_fraction: f64,
    pub remaining_minutes: Option<i64>,
    pub deadline: Option<DateTime<Utc>>,
}

impl ClockState {
    fn inapplicable() -> Self {
        Self {
            status: SlaStatus::Paused,
            target_minutes: None,
            elapsed_minutes: 0.0,
            remaining_fraction: 1.0,
            remaining_minutes: None,
            deadline: None,
        }
    }
}

/// Both clocks for one ticket.
#[derive(Debug, Clone, PartialEq)]
pub struct SlaClocks {
    pub response: ClockState,
    pub resolution: ClockState,
}

impl SlaClocks {
    pub fn get(&self, sla_type: SlaType) -> &ClockState {
        match sla_type {
            SlaType::Response => &self.response,
            SlaType::Resolution => &self.resolution,
        }
    }
}

/// Compute both clock states for `ticket` under `table` at `now`.
pub fn compute(ticket: &Ticket, table: &SlaTargetTable, now: DateTime<Utc>) -> SlaClocks {
    SlaClocks {
        response: compute_response(ticket, table, now),
        resolution: compute_resolution(ticket, table, now),
    }
}

fn compute_response(ticket: &Ticket, table: &SlaTargetTable, now: DateTime<Utc>) -> ClockState {
    let target = match table.target_minutes(ticket.customer_tier, ticket.priority, SlaType::Response)
    {
        Some(t) => t,
        None => return ClockState::inapplicable(),
    };

    // Once the first response is in, the clock freezes at that instant.
    let end = ticket.first_response_at.unwrap_or(now);
    let elapsed = minutes_between(ticket.created_at, end);
    let frozen = ticket.first_response_at.is_some();

    let deadline = ticket.created_at + Duration::minutes(i64::from(target));
    finish(ticket.response_sla_status, target, elapsed, deadline, table, frozen)
}

fn compute_resolution(ticket: &Ticket, table: &SlaTargetTable, now: DateTime<Utc>) -> ClockState {
    let target =
        match table.target_minutes(ticket.customer_tier, ticket.priority, SlaType::Resolution) {
            Some(t) => t,
            None => return ClockState::inapplicable(),
        };

    let end = ticket.resolved_at.unwrap_or(now);
    let frozen = ticket.resolved_at.is_some();

    // Minutes excluded from the clock: completed pauses plus the
    // currently-open one, if any.
    let mut paused = ticket.resolution_paused_minutes as f64;
    if let Some(paused_at) = ticket.sla_paused_at {
        paused += minutes_between(paused_at, end);
    }
    let elapsed = (minutes_between(ticket.created_at, end) - paused).max(0.0);

    // The deadline shifts out by however long the clock has been held.
    let deadline = ticket.created_at
        + Duration::minutes(i64::from(target))
        + Duration::seconds((paused * 60.0) as i64);

    let mut state = finish(
        ticket.resolution_sla_status,
        target,
        elapsed,
        deadline,
        table,
        frozen,
    );

    // While waiting on the customer the state is held, not evaluated,
    // unless the clock already breached, which is permanent.
    if !frozen && ticket.status.pauses_resolution_clock() && state.status != SlaStatus::Breached {
        state.status = SlaStatus::Paused;
    }
    state
}

fn finish(
    previous: SlaStatus,
    target: u32,
    elapsed: f64,
    deadline: DateTime<Utc>,
    table: &SlaTargetTable,
    frozen: bool,
) -> ClockState {
    let target_f = f64::from(target);
    let remaining_fraction = ((target_f - elapsed) / target_f).max(0.0);
    let remaining_minutes = (target_f - elapsed).max(0.0).floor() as i64;

    let computed = if elapsed >= target_f {
        SlaStatus::Breached
    } else if frozen {
        // SLA met before the target: compliant, permanently.
        SlaStatus::Compliant
    } else if remaining_fraction <= table.alert_thresholds.critical {
        SlaStatus::Critical
    } else if remaining_fraction <= table.alert_thresholds.warning {
        SlaStatus::Warning
    } else {
        SlaStatus::Compliant
    };

    // Breach is latched: never revert to a lower severity in-lifecycle.
    let status = if previous == SlaStatus::Breached {
        SlaStatus::Breached
    } else {
        computed
    };

    ClockState {
        status,
        target_minutes: Some(target),
        elapsed_minutes: elapsed,
        remaining_fraction,
        remaining_minutes: Some(remaining_minutes),
        deadline: Some(deadline),
    }
}
