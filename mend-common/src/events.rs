//! Event types for the Mend event system
//!
//! Provides the shared `CoordinatorEvent` definitions and the `EventBus` used
//! to push run lifecycle updates to SSE consumers (the dashboard).

use crate::model::{FixStatus, RunState, SeverityTier};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Coordinator event types
///
/// Events are broadcast via the `EventBus` and serialized for SSE
/// transmission. All events use this central enum for type safety and
/// exhaustive matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CoordinatorEvent {
    /// A failure event was accepted at the ingestion boundary
    RunReceived {
        run_id: Uuid,
        source_pipeline_id: String,
        task_id: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A run moved through the coordinator state machine
    RunStateChanged {
        run_id: Uuid,
        old_state: RunState,
        new_state: RunState,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A run was classified
    RunClassified {
        run_id: Uuid,
        tier: SeverityTier,
        intervene: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A fix is awaiting a human decision
    ApprovalRequested {
        run_id: Uuid,
        strategy: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The pending approval gate resolved (approve, reject, or timeout)
    ApprovalResolved {
        run_id: Uuid,
        approved: bool,
        timed_out: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A run reached a terminal state and was appended to history
    RunCompleted {
        run_id: Uuid,
        state: RunState,
        fix_status: Option<FixStatus>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Feedback was submitted
    FeedbackSubmitted {
        feedback_id: Uuid,
        run_id: Option<Uuid>,
        rating: u8,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl CoordinatorEvent {
    /// Event type name for SSE event framing
    pub fn event_type(&self) -> &'static str {
        match self {
            CoordinatorEvent::RunReceived { .. } => "RunReceived",
            CoordinatorEvent::RunStateChanged { .. } => "RunStateChanged",
            CoordinatorEvent::RunClassified { .. } => "RunClassified",
            CoordinatorEvent::ApprovalRequested { .. } => "ApprovalRequested",
            CoordinatorEvent::ApprovalResolved { .. } => "ApprovalResolved",
            CoordinatorEvent::RunCompleted { .. } => "RunCompleted",
            CoordinatorEvent::FeedbackSubmitted { .. } => "FeedbackSubmitted",
        }
    }
}

/// Broadcast bus carrying coordinator events to all subscribers
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CoordinatorEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    ///
    /// The coordinator never blocks (or errors) on slow or absent SSE
    /// consumers.
    pub fn emit_lossy(&self, event: CoordinatorEvent) {
        let _ = self.tx.send(event);
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
