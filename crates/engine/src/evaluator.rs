//! Evaluation cycle orchestration.
//!
//! One cycle: snapshot the active configuration version, load all open
//! tickets, and for each ticket compute clock states, alert deltas, and
//! the escalation delta, persisting everything for that ticket in a
//! single store commit. Newly created alerts are then handed to the
//! notifier and the broadcaster best-effort, outside the commit. A
//! ticket that fails is skipped and picked up again next cycle.

use crate::{alert_policy, clock, escalation};
use chrono::{DateTime, Utc};
use sentinel_config::{SlaConfigStore, SlaConfigVersion};
use sentinel_core::alert_bus::AlertSink;
use sentinel_core::types::{
    Alert, AlertEventKind, AlertPayload, EvaluationSummary, SlaStatus, SlaType,
    StatusHistoryEntry, Ticket,
};
use sentinel_core::{SentinelError, SentinelResult};
use sentinel_notify::AlertNotifier;
use sentinel_store::{EvaluationCommit, StoreError, TicketSlaUpdate, TicketStore};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A failure that abandons the whole cycle; retried at the next tick.
#[derive(Error, Debug)]
pub enum CycleError {
    #[error("ticket store unreachable: {0}")]
    StoreUnavailable(#[from] StoreError),
}

/// Result of evaluating one ticket.
struct TicketOutcome {
    alerts_created: usize,
    escalated: bool,
    breached: bool,
}

/// Orchestrates evaluation cycles over the persisted ticket set.
#[derive(Clone)]
pub struct Evaluator {
    store: Arc<dyn TicketStore>,
    config: Arc<SlaConfigStore>,
    notifier: Arc<dyn AlertNotifier>,
    broadcaster: Arc<dyn AlertSink>,
    concurrency: usize,
    delivery_timeout: Duration,
}

impl Evaluator {
    pub fn new(
        store: Arc<dyn TicketStore>,
        config: Arc<SlaConfigStore>,
        notifier: Arc<dyn AlertNotifier>,
        broadcaster: Arc<dyn AlertSink>,
        concurrency: usize,
        delivery_timeout: Duration,
    ) -> Self {
        Self {
            store,
            config,
            notifier,
            broadcaster,
            concurrency: concurrency.max(1),
            delivery_timeout,
        }
    }

    /// Run one evaluation cycle at `now`.
    ///
    /// The configuration version is read once here; a reload landing
    /// mid-cycle takes effect at the next cycle.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> Result<EvaluationSummary, CycleError> {
        let started = std::time::Instant::now();
        let config = self.config.current();

        metrics::counter!("sla.cycles").increment(1);

        // Retry alerts from earlier cycles whose delivery never confirmed.
        self.redeliver_unnotified().await;

        let tickets = self.store.open_tickets().await?;
        debug!(
            count = tickets.len(),
            config_version = config.version,
            "Evaluation cycle started"
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut handles = Vec::with_capacity(tickets.len());
        for ticket in tickets {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .expect("evaluator semaphore closed");
            let evaluator = self.clone();
            let config = config.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                let ticket_id = ticket.id;
                let result = evaluator.process_ticket(ticket, &config, now).await;
                (ticket_id, result)
            }));
        }

        let mut summary = EvaluationSummary {
            config_version: config.version,
            ..Default::default()
        };
        for handle in handles {
            match handle.await {
                Ok((_, Ok(outcome))) => {
                    summary.tickets_evaluated += 1;
                    summary.alerts_created += outcome.alerts_created;
                    if outcome.escalated {
                        summary.escalations_advanced += 1;
                    }
                    if outcome.breached {
                        summary.breaches_detected += 1;
                    }
                }
                Ok((ticket_id, Err(e))) => {
                    summary.tickets_skipped += 1;
                    metrics::counter!("sla.tickets_skipped").increment(1);
                    warn!(ticket_id = %ticket_id, error = %e, "Ticket skipped this cycle");
                }
                Err(e) => {
                    summary.tickets_skipped += 1;
                    warn!(error = %e, "Ticket evaluation task failed");
                }
            }
        }

        summary.elapsed_ms = started.elapsed().as_millis() as u64;
        metrics::counter!("sla.tickets_evaluated").increment(summary.tickets_evaluated as u64);
        metrics::counter!("sla.alerts_created").increment(summary.alerts_created as u64);
        metrics::counter!("sla.escalations").increment(summary.escalations_advanced as u64);
        metrics::histogram!("sla.cycle_duration_ms").record(summary.elapsed_ms as f64);

        info!(
            config_version = summary.config_version,
            tickets = summary.tickets_evaluated,
            skipped = summary.tickets_skipped,
            alerts = summary.alerts_created,
            escalations = summary.escalations_advanced,
            breaches = summary.breaches_detected,
            elapsed_ms = summary.elapsed_ms,
            "Evaluation cycle completed"
        );
        Ok(summary)
    }

    /// Evaluate and persist one ticket. Everything for the ticket goes
    /// through one store commit; outbound delivery happens after.
    async fn process_ticket(
        &self,
        ticket: Ticket,
        config: &SlaConfigVersion,
        now: DateTime<Utc>,
    ) -> SentinelResult<TicketOutcome> {
        let table = &config.table;
        let clocks = clock::compute(&ticket, table, now);
        let entry = table.entry(ticket.customer_tier, ticket.priority);

        let new_level = escalation::evaluate(&ticket, entry, &clocks);
        let escalated = new_level.is_some();
        let level = new_level.unwrap_or(ticket.escalation_level);

        let active = self
            .store
            .active_alerts(ticket.id)
            .await
            .map_err(|e| SentinelError::TransientStore(e.to_string()))?;
        let delta =
            alert_policy::reconcile(&ticket, &clocks, &active, &table.alert_thresholds, now)?;

        let breached = SlaType::ALL.iter().any(|&t| {
            clocks.get(t).status == SlaStatus::Breached
                && ticket.sla_status(t) != SlaStatus::Breached
        });

        let changed = clocks.response.status != ticket.response_sla_status
            || clocks.resolution.status != ticket.resolution_sla_status
            || escalated;
        let history = changed.then(|| StatusHistoryEntry {
            id: Uuid::new_v4(),
            ticket_id: ticket.id,
            changed_at: now,
            from_status: ticket.status,
            to_status: ticket.status,
            from_response_sla: ticket.response_sla_status,
            to_response_sla: clocks.response.status,
            from_resolution_sla: ticket.resolution_sla_status,
            to_resolution_sla: clocks.resolution.status,
            from_escalation_level: ticket.escalation_level,
            to_escalation_level: level,
        });

        let update = TicketSlaUpdate {
            response_sla_status: clocks.response.status,
            resolution_sla_status: clocks.resolution.status,
            response_sla_deadline: clocks.response.deadline,
            resolution_sla_deadline: clocks.resolution.deadline,
            response_sla_remaining_minutes: clocks.response.remaining_minutes,
            resolution_sla_remaining_minutes: clocks.resolution.remaining_minutes,
            escalation_level: level,
            escalation_advanced: escalated,
        };

        self.store
            .commit_evaluation(EvaluationCommit {
                ticket_id: ticket.id,
                expected_row_version: ticket.row_version,
                update,
                new_alerts: delta.create.clone(),
                deactivate_alerts: delta.deactivate.clone(),
                history,
                committed_at: now,
            })
            .await
            .map_err(|e| SentinelError::TransientStore(e.to_string()))?;

        if breached {
            warn!(
                ticket_id = %ticket.id,
                external_id = %ticket.external_id,
                priority = ?ticket.priority,
                "SLA breach detected"
            );
        }

        // Outbound, best-effort, outside the commit.
        let mut payloads: Vec<AlertPayload> = delta
            .create
            .iter()
            .map(|alert| alert_payload(&ticket, alert, level))
            .collect();
        if escalated {
            payloads.push(AlertPayload {
                alert_id: None,
                ticket_id: ticket.id,
                external_id: ticket.external_id.clone(),
                title: ticket.title.clone(),
                priority: ticket.priority,
                customer_tier: ticket.customer_tier,
                kind: AlertEventKind::Escalation,
                sla_type: None,
                remaining_minutes: None,
                escalation_level: level,
                created_at: now,
            });
            info!(
                ticket_id = %ticket.id,
                external_id = %ticket.external_id,
                level = level.as_u8(),
                "Escalation level advanced"
            );
        }

        for payload in payloads {
            self.broadcaster.publish(payload.clone());
            self.notify(&payload).await;
        }

        Ok(TicketOutcome {
            alerts_created: delta.create.len(),
            escalated,
            breached,
        })
    }

    /// Deliver one payload with a bounded timeout. Confirmed delivery of
    /// an alert row records `notified_at`; any failure leaves it unset
    /// for a later cycle to retry.
    async fn notify(&self, payload: &AlertPayload) {
        let delivery = tokio::time::timeout(self.delivery_timeout, self.notifier.deliver(payload));
        match delivery.await {
            Ok(Ok(())) => {
                if let Some(alert_id) = payload.alert_id {
                    if let Err(e) = self.store.mark_alert_notified(alert_id, Utc::now()).await {
                        warn!(alert_id = %alert_id, error = %e, "Failed to record delivery");
                    }
                }
                metrics::counter!("sla.notifications_delivered").increment(1);
            }
            Ok(Err(e)) => {
                metrics::counter!("sla.notification_failures").increment(1);
                warn!(
                    ticket_id = %payload.ticket_id,
                    error = %e,
                    "Alert delivery failed, will retry next cycle"
                );
            }
            Err(_) => {
                metrics::counter!("sla.notification_failures").increment(1);
                warn!(
                    ticket_id = %payload.ticket_id,
                    timeout_ms = self.delivery_timeout.as_millis() as u64,
                    "Alert delivery timed out, will retry next cycle"
                );
            }
        }
    }

    /// Resend active alerts whose delivery was never confirmed.
    async fn redeliver_unnotified(&self) {
        let pending = match self.store.unnotified_alerts().await {
            Ok(pending) => pending,
            Err(e) => {
                warn!(error = %e, "Could not load unnotified alerts");
                return;
            }
        };
        if pending.is_empty() {
            return;
        }

        debug!(count = pending.len(), "Retrying unconfirmed alert deliveries");
        for (alert, ticket) in pending {
            let payload = alert_payload(&ticket, &alert, ticket.escalation_level);
            self.notify(&payload).await;
        }
    }
}

fn alert_payload(
    ticket: &Ticket,
    alert: &Alert,
    level: sentinel_core::types::EscalationLevel,
) -> AlertPayload {
    AlertPayload {
        alert_id: Some(alert.id),
        ticket_id: ticket.id,
        external_id: ticket.external_id.clone(),
        title: ticket.title.clone(),
        priority: ticket.priority,
        customer_tier: ticket.customer_tier,
        kind: AlertEventKind::Sla(alert.alert_type),
        sla_type: Some(alert.sla_type),
        remaining_minutes: alert.time_remaining_minutes,
        escalation_level: level,
        created_at: alert.created_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use sentinel_core::alert_bus::CaptureSink;
    use sentinel_core::types::{CustomerTier, Priority};
    use sentinel_notify::{CaptureNotifier, FailingNotifier};
    use sentinel_store::InMemoryTicketStore;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn evaluator_with(
        store: Arc<dyn TicketStore>,
        notifier: Arc<dyn AlertNotifier>,
    ) -> (Evaluator, Arc<CaptureSink>) {
        let config = SlaConfigStore::bootstrap("/nonexistent/sla.yaml");
        let sink = Arc::new(CaptureSink::new());
        let evaluator = Evaluator::new(
            store,
            config,
            notifier,
            sink.clone(),
            4,
            Duration::from_millis(500),
        );
        (evaluator, sink)
    }

    #[tokio::test]
    async fn test_cycle_is_idempotent_at_same_instant() {
        let store = Arc::new(InMemoryTicketStore::new());
        let t0 = Utc::now();
        store.create_ticket("TKT-1", "t", Priority::P0, CustomerTier::Enterprise, t0);
        let notifier = Arc::new(CaptureNotifier::new());
        let (evaluator, _) = evaluator_with(store.clone(), notifier);

        let now = t0 + ChronoDuration::minutes(13);
        let first = evaluator.run_cycle(now).await.unwrap();
        assert_eq!(first.alerts_created, 1);

        let second = evaluator.run_cycle(now).await.unwrap();
        assert_eq!(second.alerts_created, 0);
        assert_eq!(second.escalations_advanced, 0);
        assert_eq!(second.tickets_skipped, 0);
    }

    #[tokio::test]
    async fn test_failed_delivery_is_retried_next_cycle() {
        let store = Arc::new(InMemoryTicketStore::new());
        let t0 = Utc::now();
        let ticket = store.create_ticket("TKT-1", "t", Priority::P0, CustomerTier::Enterprise, t0);

        let (broken, _) = evaluator_with(store.clone(), Arc::new(FailingNotifier));
        broken
            .run_cycle(t0 + ChronoDuration::minutes(13))
            .await
            .unwrap();

        let alerts = store.alerts_for(ticket.id);
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].notified_at.is_none());

        // Same store, working notifier: redelivery confirms the alert.
        let capture = Arc::new(CaptureNotifier::new());
        let (healed, _) = evaluator_with(store.clone(), capture.clone());
        healed
            .run_cycle(t0 + ChronoDuration::minutes(13))
            .await
            .unwrap();

        let alerts = store.alerts_for(ticket.id);
        assert!(alerts[0].notified_at.is_some());
        assert_eq!(capture.count(), 1);
    }

    /// Store wrapper that fails `commit_evaluation` while the flag is up.
    struct FlakyStore {
        inner: Arc<InMemoryTicketStore>,
        fail_commits: AtomicBool,
    }

    #[async_trait]
    impl TicketStore for FlakyStore {
        async fn open_tickets(&self) -> Result<Vec<Ticket>, StoreError> {
            self.inner.open_tickets().await
        }
        async fn active_alerts(&self, ticket_id: Uuid) -> Result<Vec<Alert>, StoreError> {
            self.inner.active_alerts(ticket_id).await
        }
        async fn unnotified_alerts(&self) -> Result<Vec<(Alert, Ticket)>, StoreError> {
            self.inner.unnotified_alerts().await
        }
        async fn commit_evaluation(&self, commit: EvaluationCommit) -> Result<(), StoreError> {
            if self.fail_commits.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("injected outage".to_string()));
            }
            self.inner.commit_evaluation(commit).await
        }
        async fn mark_alert_notified(
            &self,
            alert_id: Uuid,
            at: DateTime<Utc>,
        ) -> Result<(), StoreError> {
            self.inner.mark_alert_notified(alert_id, at).await
        }
    }

    #[tokio::test]
    async fn test_transient_commit_failure_skips_then_recovers() {
        let inner = Arc::new(InMemoryTicketStore::new());
        let t0 = Utc::now();
        let ticket = inner.create_ticket("TKT-1", "t", Priority::P0, CustomerTier::Enterprise, t0);

        let flaky = Arc::new(FlakyStore {
            inner: inner.clone(),
            fail_commits: AtomicBool::new(true),
        });
        let (evaluator, _) = evaluator_with(flaky.clone(), Arc::new(CaptureNotifier::new()));

        let summary = evaluator
            .run_cycle(t0 + ChronoDuration::minutes(13))
            .await
            .unwrap();
        assert_eq!(summary.tickets_skipped, 1);
        assert_eq!(summary.alerts_created, 0);
        assert!(inner.alerts_for(ticket.id).is_empty());

        // Store recovers; the next cycle picks the ticket back up.
        flaky.fail_commits.store(false, Ordering::SeqCst);
        let summary = evaluator
            .run_cycle(t0 + ChronoDuration::minutes(13))
            .await
            .unwrap();
        assert_eq!(summary.tickets_skipped, 0);
        assert_eq!(summary.alerts_created, 1);
    }

    #[tokio::test]
    async fn test_escalation_event_without_new_alert() {
        // Both cycles see a breached response clock (no new alert), but a
        // resolution breakpoint is crossed between them: the level must
        // advance and an escalation event must go out.
        let store = Arc::new(InMemoryTicketStore::new());
        let t0 = Utc::now();
        store.create_ticket("TKT-1", "t", Priority::P0, CustomerTier::Enterprise, t0);
        let notifier = Arc::new(CaptureNotifier::new());
        let (evaluator, sink) = evaluator_with(store.clone(), notifier);

        // 100m: response breached, escalation L2 (60m breakpoint).
        let first = evaluator
            .run_cycle(t0 + ChronoDuration::minutes(100))
            .await
            .unwrap();
        assert_eq!(first.escalations_advanced, 1);

        // 130m: nothing new severity-wise, but 120m breakpoint crossed.
        let second = evaluator
            .run_cycle(t0 + ChronoDuration::minutes(130))
            .await
            .unwrap();
        assert_eq!(second.alerts_created, 0);
        assert_eq!(second.escalations_advanced, 1);

        let escalations: Vec<_> = sink
            .events()
            .into_iter()
            .filter(|e| e.kind == AlertEventKind::Escalation)
            .collect();
        assert_eq!(escalations.len(), 2);
        assert_eq!(
            escalations.last().unwrap().escalation_level,
            sentinel_core::types::EscalationLevel::Level3
        );
    }

    #[tokio::test]
    async fn test_store_outage_abandons_cycle() {
        struct DeadStore;

        #[async_trait]
        impl TicketStore for DeadStore {
            async fn open_tickets(&self) -> Result<Vec<Ticket>, StoreError> {
                Err(StoreError::Unavailable("down".to_string()))
            }
            async fn active_alerts(&self, _: Uuid) -> Result<Vec<Alert>, StoreError> {
                Err(StoreError::Unavailable("down".to_string()))
            }
            async fn unnotified_alerts(&self) -> Result<Vec<(Alert, Ticket)>, StoreError> {
                Err(StoreError::Unavailable("down".to_string()))
            }
            async fn commit_evaluation(&self, _: EvaluationCommit) -> Result<(), StoreError> {
                Err(StoreError::Unavailable("down".to_string()))
            }
            async fn mark_alert_notified(
                &self,
                _: Uuid,
                _: DateTime<Utc>,
            ) -> Result<(), StoreError> {
                Err(StoreError::Unavailable("down".to_string()))
            }
        }

        let (evaluator, _) = evaluator_with(Arc::new(DeadStore), Arc::new(CaptureNotifier::new()));
        let result = evaluator.run_cycle(Utc::now()).await;
        assert!(matches!(result, Err(CycleError::StoreUnavailable(_))));
    }
}
