//! Outbound alert notification with delivery tracking.
//!
//! The evaluator hands every committed alert and escalation event to an
//! `AlertNotifier`. Delivery is best-effort: a failure leaves the alert's
//! `notified_at` unset so a later cycle retries it.

pub mod slack;

pub use slack::SlackWebhookNotifier;

use async_trait::async_trait;
use parking_lot::Mutex;
use sentinel_core::types::AlertPayload;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("notifier not configured: {0}")]
    NotConfigured(String),

    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error("delivery timed out")]
    Timeout,
}

/// Delivers one rendered alert to a human-facing destination.
#[async_trait]
pub trait AlertNotifier: Send + Sync {
    async fn deliver(&self, payload: &AlertPayload) -> Result<(), NotifyError>;
}

/// Notifier that drops everything; for deployments without a webhook.
pub struct NoOpNotifier;

#[async_trait]
impl AlertNotifier for NoOpNotifier {
    async fn deliver(&self, _payload: &AlertPayload) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Captures delivered payloads for testing.
#[derive(Default)]
pub struct CaptureNotifier {
    delivered: Mutex<Vec<AlertPayload>>,
}

impl CaptureNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delivered(&self) -> Vec<AlertPayload> {
        self.delivered.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.delivered.lock().len()
    }
}

#[async_trait]
impl AlertNotifier for CaptureNotifier {
    async fn deliver(&self, payload: &AlertPayload) -> Result<(), NotifyError> {
        self.delivered.lock().push(payload.clone());
        Ok(())
    }
}

/// Fails every delivery; for exercising the retry path in tests.
pub struct FailingNotifier;

#[async_trait]
impl AlertNotifier for FailingNotifier {
    async fn deliver(&self, _payload: &AlertPayload) -> Result<(), NotifyError> {
        Err(NotifyError::Delivery("injected failure".to_string()))
    }
}
