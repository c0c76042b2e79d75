//! Alert fan-out bus: trait for publishing alert events from the engine.
//!
//! The evaluator publishes every committed alert and escalation event into
//! an `Arc<dyn AlertSink>`. Implementations rebroadcast to live dashboard
//! subscribers (tokio broadcast), capture for tests, or drop.

use crate::types::AlertPayload;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

/// Trait for publishing alert events to downstream subscribers.
pub trait AlertSink: Send + Sync {
    fn publish(&self, event: AlertPayload);
}

/// No-op sink for tests and deployments without live subscribers.
pub struct NoOpSink;

impl AlertSink for NoOpSink {
    fn publish(&self, _event: AlertPayload) {}
}

/// In-memory sink that captures events for testing.
#[derive(Default)]
pub struct CaptureSink {
    events: Mutex<Vec<AlertPayload>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<AlertPayload> {
        self.events.lock().expect("alert bus mutex poisoned").clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().expect("alert bus mutex poisoned").len()
    }

    pub fn clear(&self) {
        self.events.lock().expect("alert bus mutex poisoned").clear();
    }
}

impl AlertSink for CaptureSink {
    fn publish(&self, event: AlertPayload) {
        self.events
            .lock()
            .expect("alert bus mutex poisoned")
            .push(event);
    }
}

/// Sink backed by a tokio broadcast channel. Subscribers that lag are
/// dropped by the channel; publishing never blocks the evaluator.
pub struct BroadcastSink {
    sender: broadcast::Sender<AlertPayload>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AlertPayload> {
        self.sender.subscribe()
    }
}

impl AlertSink for BroadcastSink {
    fn publish(&self, event: AlertPayload) {
        // Send fails only when there are no subscribers; that is fine.
        let _ = self.sender.send(event);
    }
}

/// Convenience: create a no-op bus for modules that don't need fan-out.
pub fn noop_sink() -> Arc<dyn AlertSink> {
    Arc::new(NoOpSink)
}

/// Convenience: create a capture sink for tests.
pub fn capture_sink() -> Arc<CaptureSink> {
    Arc::new(CaptureSink::new())
}
