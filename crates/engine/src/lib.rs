//! SLA evaluation engine: clock calculation, alert reconciliation,
//! escalation policy, and the cycle orchestration that ties them to the
//! ticket store and notifier.

pub mod alert_policy;
pub mod clock;
pub mod escalation;
pub mod evaluator;
pub mod scheduler;

pub use alert_policy::AlertDelta;
pub use clock::{ClockState, SlaClocks};
pub use evaluator::{CycleError, Evaluator};
pub use scheduler::Scheduler;
