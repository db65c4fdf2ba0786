//! Progress reporting: injected step notifications for long assembly stages.
//!
//! The engine announces the start and end of slow stages (web search,
//! document retrieval, translation) through a [`ProgressReporter`] passed in
//! with each request. Callers choose where the events go: nowhere, the log,
//! or a broadcast channel feeding a UI.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::info;

/// Phase of a reported step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum StepPhase {
    Start,
    End { success: bool },
    /// Free-form note attached to a running step
    Info { detail: String },
}

/// One progress notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub step: String,
    #[serde(flatten)]
    pub phase: StepPhase,
    pub timestamp: DateTime<Utc>,
}

/// Receives step notifications.
pub trait ProgressReporter: Send + Sync {
    fn report_step(&self, step: &str, phase: StepPhase);
}

/// Discards every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report_step(&self, _step: &str, _phase: StepPhase) {}
}

/// Writes notifications to the `tracing` log at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingProgress;

impl ProgressReporter for TracingProgress {
    fn report_step(&self, step: &str, phase: StepPhase) {
        match phase {
            StepPhase::Start => info!(step, "started"),
            StepPhase::End { success } => info!(step, success, "finished"),
            StepPhase::Info { detail } => info!(step, %detail, "progress"),
        }
    }
}

/// A broadcast-based progress channel.
///
/// Uses `tokio::sync::broadcast` so several consumers (a UI socket, a log
/// writer) can follow the same request.
pub struct ProgressBus {
    sender: broadcast::Sender<Arc<ProgressEvent>>,
}

impl ProgressBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<ProgressEvent>> {
        self.sender.subscribe()
    }
}

impl Default for ProgressBus {
    fn default() -> Self {
        Self::new(64)
    }
}

impl ProgressReporter for ProgressBus {
    fn report_step(&self, step: &str, phase: StepPhase) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(ProgressEvent {
            step: step.to_string(),
            phase,
            timestamp: Utc::now(),
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bus_delivers_steps_in_order() {
        let bus = ProgressBus::new(8);
        let mut rx = bus.subscribe();

        bus.report_step("Crafting internet search query", StepPhase::Start);
        bus.report_step("Crafting internet search query", StepPhase::End { success: true });

        let first = rx.recv().await.unwrap();
        assert_eq!(first.step, "Crafting internet search query");
        assert_eq!(first.phase, StepPhase::Start);
        let second = rx.recv().await.unwrap();
        assert_eq!(second.phase, StepPhase::End { success: true });
    }

    #[test]
    fn bus_without_subscribers_doesnt_panic() {
        let bus = ProgressBus::default();
        bus.report_step("noop", StepPhase::Info { detail: "nobody listens".into() });
    }

    #[test]
    fn event_serializes_phase_inline() {
        let event = ProgressEvent {
            step: "Translating".into(),
            phase: StepPhase::End { success: false },
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["phase"], "end");
        assert_eq!(json["success"], false);
    }
}
