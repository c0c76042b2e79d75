//! Periodic cycle scheduler.
//!
//! Drives the evaluator on a fixed interval with an overlap guard: if a
//! cycle is still running when the next tick fires, the tick is skipped
//! and logged rather than queued. Shutdown waits for the in-flight cycle
//! to finish so no ticket is left half-committed by the process exiting.

use crate::evaluator::{CycleError, Evaluator};
use chrono::Utc;
use sentinel_core::types::EvaluationSummary;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

pub struct Scheduler {
    evaluator: Arc<Evaluator>,
    interval: Duration,
    in_progress: Arc<AtomicBool>,
    shutdown: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(evaluator: Evaluator, interval: Duration) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            evaluator: Arc::new(evaluator),
            interval,
            in_progress: Arc::new(AtomicBool::new(false)),
            shutdown,
            handle: None,
        }
    }

    /// Spawn the tick loop. The first cycle runs immediately.
    pub fn start(&mut self) {
        if self.handle.is_some() {
            return;
        }
        let evaluator = self.evaluator.clone();
        let in_progress = self.in_progress.clone();
        let mut shutdown_rx = self.shutdown.subscribe();
        let period = self.interval;

        self.handle = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // Ticks missed while a cycle runs long are dropped, not
            // replayed in a burst.
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;

            loop {
                run_guarded(&evaluator, &in_progress).await;
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = shutdown_rx.changed() => {
                        info!("Scheduler stopping");
                        break;
                    }
                }
            }
        }));
        info!(interval_secs = self.interval.as_secs(), "Scheduler started");
    }

    /// Run one cycle outside the schedule, sharing the overlap guard with
    /// the tick loop. `None` means a cycle was already in progress.
    pub async fn trigger_now(&self) -> Option<Result<EvaluationSummary, CycleError>> {
        run_guarded(&self.evaluator, &self.in_progress).await
    }

    /// Signal the loop to stop and wait for any in-flight cycle.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        info!("Scheduler stopped");
    }
}

async fn run_guarded(
    evaluator: &Evaluator,
    in_progress: &AtomicBool,
) -> Option<Result<EvaluationSummary, CycleError>> {
    if in_progress.swap(true, Ordering::SeqCst) {
        metrics::counter!("sla.cycles_skipped").increment(1);
        warn!("Previous evaluation cycle still running, skipping this tick");
        return None;
    }

    let result = evaluator.run_cycle(Utc::now()).await;
    in_progress.store(false, Ordering::SeqCst);

    if let Err(e) = &result {
        // The cycle is abandoned; the next tick retries from scratch.
        error!(error = %e, "Evaluation cycle failed");
    }
    Some(result)
}
