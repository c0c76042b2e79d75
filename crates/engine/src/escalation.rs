//! Escalation policy: a per-ticket ladder driven by elapsed time.
//!
//! Each (tier, priority) cell configures breakpoints mapping elapsed
//! minutes to a minimum escalation level. Every cycle we take the highest
//! breakpoint crossed by **either** clock and advance the ticket if that
//! exceeds its current level. Levels never regress while a ticket is
//! open; closure freezes the level permanently.

use crate::clock::SlaClocks;
use sentinel_config::SlaTargetEntry;
use sentinel_core::types::{EscalationLevel, Ticket};

/// The minimum level the breakpoint ladder demands for the given elapsed
/// times. Breakpoints are strictly increasing (validated at config load),
/// so the last crossed one wins.
pub fn required_level(entry: &SlaTargetEntry, clocks: &SlaClocks) -> EscalationLevel {
    let elapsed = clocks
        .response
        .elapsed_minutes
        .max(clocks.resolution.elapsed_minutes);

    let mut level = EscalationLevel::Level0;
    for breakpoint in &entry.escalation {
        if elapsed >= f64::from(breakpoint.after_minutes) {
            level = breakpoint.level;
        }
    }
    level
}

/// Decide whether the ticket advances this cycle. Returns the new level
/// only on an actual advance; `None` means the level is unchanged.
pub fn evaluate(
    ticket: &Ticket,
    entry: Option<&SlaTargetEntry>,
    clocks: &SlaClocks,
) -> Option<EscalationLevel> {
    if ticket.status.is_terminal() {
        return None;
    }
    let entry = entry?;
    if entry.escalation.is_empty() {
        return None;
    }

    let required = required_level(entry, clocks);
    if required > ticket.escalation_level {
        Some(required)
    } else {
        None
    }
}
