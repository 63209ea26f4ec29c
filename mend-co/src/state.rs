//! Shared coordinator state
//!
//! Thread-safe state shared between the run coordinator and the HTTP
//! handlers: the append-only run history, the feedback list, the audit log
//! ring, and the single pending-approval gate.
//!
//! Only the coordinator task mutates the history and the pending gate;
//! handlers take read snapshots. Readers never observe a partially-appended
//! run because appends happen under the write lock in one step.

use chrono::{DateTime, Utc};
use mend_common::error::{Error, Result};
use mend_common::events::EventBus;
use mend_common::model::{FeedbackEntry, Run};
use std::collections::VecDeque;
use tokio::sync::{oneshot, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

/// Resolution of the pending-approval gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalDecision {
    Approved,
    Rejected,
}

/// The single run currently awaiting a human decision
struct PendingGate {
    /// Snapshot of the run exposed to the dashboard
    run: Run,
    /// Consumed on the first approve/reject; `None` afterwards so a second
    /// decision answers NotPending
    decision_tx: Option<oneshot::Sender<ApprovalDecision>>,
}

/// One line in the audit log ring
#[derive(Debug, Clone)]
pub struct LogLine {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

impl LogLine {
    /// Render in the shape the dashboard log view expects
    pub fn render(&self) -> String {
        format!(
            "{} {}",
            self.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            self.message
        )
    }
}

/// Shared state accessible by the coordinator and all handlers
pub struct SharedState {
    /// Append-only run history, arrival order; never mutated after append
    history: RwLock<Vec<Run>>,

    /// Append-only feedback list
    feedback: RwLock<Vec<FeedbackEntry>>,

    /// Capped audit log ring serving the logs endpoint
    logs: RwLock<VecDeque<LogLine>>,
    log_capacity: usize,

    /// The run currently held at the approval gate, if any
    pending: RwLock<Option<PendingGate>>,

    /// Event broadcaster for SSE consumers
    pub event_bus: EventBus,
}

impl SharedState {
    pub fn new(log_capacity: usize) -> Self {
        Self {
            history: RwLock::new(Vec::new()),
            feedback: RwLock::new(Vec::new()),
            logs: RwLock::new(VecDeque::with_capacity(log_capacity.min(256))),
            log_capacity,
            pending: RwLock::new(None),
            event_bus: EventBus::new(100),
        }
    }

    // ------------------------------------------------------------------
    // Run history
    // ------------------------------------------------------------------

    /// Append a terminal run to the history, exactly once per run
    pub async fn append_run(&self, run: Run) {
        debug_assert!(run.is_terminal());
        let mut history = self.history.write().await;
        history.push(run);
        debug!("History now holds {} runs", history.len());
    }

    /// Snapshot of the history in arrival order (oldest first)
    pub async fn history_snapshot(&self) -> Vec<Run> {
        self.history.read().await.clone()
    }

    /// Snapshot of the history, most recent first (status endpoint order)
    pub async fn runs_most_recent_first(&self) -> Vec<Run> {
        let mut runs = self.history.read().await.clone();
        runs.reverse();
        runs
    }

    /// Id of the most recently completed run, if any
    pub async fn latest_run_id(&self) -> Option<Uuid> {
        self.history.read().await.last().map(|run| run.id)
    }

    pub async fn history_len(&self) -> usize {
        self.history.read().await.len()
    }

    // ------------------------------------------------------------------
    // Pending-approval gate
    // ------------------------------------------------------------------

    /// Park a run at the approval gate
    ///
    /// The coordinator holds the receiving half and waits with a timeout;
    /// there is at most one gate at a time by the single-consumer discipline.
    pub async fn set_pending(&self, run: Run, decision_tx: oneshot::Sender<ApprovalDecision>) {
        let mut pending = self.pending.write().await;
        debug_assert!(pending.is_none());
        *pending = Some(PendingGate {
            run,
            decision_tx: Some(decision_tx),
        });
    }

    /// The run currently awaiting a decision, if any
    pub async fn pending_run(&self) -> Option<Run> {
        self.pending.read().await.as_ref().map(|gate| gate.run.clone())
    }

    /// Resolve the pending gate for `run_id`
    ///
    /// Fails with `NotPending` when the given run is not the currently
    /// pending one, or when a decision was already delivered.
    pub async fn resolve_pending(&self, run_id: Uuid, decision: ApprovalDecision) -> Result<()> {
        let mut pending = self.pending.write().await;
        match pending.as_mut() {
            Some(gate) if gate.run.id == run_id => {
                let tx = gate.decision_tx.take().ok_or(Error::NotPending(run_id))?;
                // A send error means the coordinator already timed out the
                // gate; report NotPending so the caller sees no state change.
                tx.send(decision).map_err(|_| Error::NotPending(run_id))?;
                info!(run_id = %run_id, ?decision, "Approval gate resolved");
                Ok(())
            }
            _ => Err(Error::NotPending(run_id)),
        }
    }

    /// Clear the gate once the coordinator resumes the run
    pub async fn clear_pending(&self) {
        *self.pending.write().await = None;
    }

    // ------------------------------------------------------------------
    // Feedback
    // ------------------------------------------------------------------

    pub async fn add_feedback(&self, entry: FeedbackEntry) {
        self.feedback.write().await.push(entry);
    }

    /// The most recent `limit` feedback entries, newest first
    pub async fn recent_feedback(&self, limit: usize) -> Vec<FeedbackEntry> {
        let feedback = self.feedback.read().await;
        feedback.iter().rev().take(limit).cloned().collect()
    }

    // ------------------------------------------------------------------
    // Audit log
    // ------------------------------------------------------------------

    /// Record an audit line (also emitted through tracing)
    pub async fn audit(&self, message: impl Into<String>) {
        let message = message.into();
        info!(target: "mend_audit", "{}", message);

        let mut logs = self.logs.write().await;
        if logs.len() == self.log_capacity {
            logs.pop_front();
        }
        logs.push_back(LogLine {
            timestamp: Utc::now(),
            message,
        });
    }

    /// The most recent `limit` audit lines, oldest-to-newest
    pub async fn recent_logs(&self, limit: usize) -> Vec<String> {
        let logs = self.logs.read().await;
        let skip = logs.len().saturating_sub(limit);
        logs.iter().skip(skip).map(LogLine::render).collect()
    }
}
