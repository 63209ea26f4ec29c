//! Run coordinator
//!
//! Single-consumer actor that sequences classification, diagnosis, strategy
//! selection, fix execution and history append for one failure event at a
//! time. Events arriving while a run is in flight (including parked at the
//! approval gate) queue in arrival order, which keeps the history ordering
//! deterministic.

use crate::diagnosis::{self, DiagnosisEngine};
use crate::executor::FixExecutor;
use crate::selector::{self, RemediationDecision, RemediationFlags};
use crate::severity::{self, ClassifierPolicy};
use crate::state::{ApprovalDecision, SharedState};
use mend_common::config::Settings;
use mend_common::error::{Error, Result};
use mend_common::events::CoordinatorEvent;
use mend_common::model::{
    Diagnosis, FailureEvent, FixRecord, FixStatus, FixStrategy, Run, RunState,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// Coordinator tuning derived from the resolved settings
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Bound on a single diagnosis call
    pub agent_timeout: Duration,
    /// Bound on the pending-approval wait
    pub approval_timeout: Duration,
    pub classifier: ClassifierPolicy,
    pub flags: RemediationFlags,
}

impl From<&Settings> for CoordinatorConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            agent_timeout: settings.agent_timeout,
            approval_timeout: settings.agent_timeout,
            classifier: ClassifierPolicy {
                max_retries: settings.max_retries,
                lookback_window: settings.lookback_window,
            },
            flags: RemediationFlags {
                auto_fix_enabled: settings.auto_fix_enabled,
                require_human_approval: settings.require_human_approval,
            },
        }
    }
}

struct QueuedEvent {
    run_id: Uuid,
    event: FailureEvent,
}

/// Ingestion handle given to the HTTP boundary
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::UnboundedSender<QueuedEvent>,
}

impl CoordinatorHandle {
    /// Enqueue a failure event; returns the run id without waiting for
    /// diagnosis or fix completion
    pub fn ingest(&self, event: FailureEvent) -> Result<Uuid> {
        validate_event(&event)?;
        let run_id = Uuid::new_v4();
        self.tx
            .send(QueuedEvent { run_id, event })
            .map_err(|_| Error::Internal("coordinator is not running".to_string()))?;
        Ok(run_id)
    }
}

/// Reject malformed events before a run is created
fn validate_event(event: &FailureEvent) -> Result<()> {
    if event.source_pipeline_id.trim().is_empty() {
        return Err(Error::Validation(
            "source_pipeline_id must not be empty".to_string(),
        ));
    }
    if event.task_id.trim().is_empty() {
        return Err(Error::Validation("task_id must not be empty".to_string()));
    }
    Ok(())
}

/// The orchestrating state machine for failure runs
pub struct Coordinator {
    state: Arc<SharedState>,
    engine: Arc<dyn DiagnosisEngine>,
    executor: FixExecutor,
    config: CoordinatorConfig,
    rx: mpsc::UnboundedReceiver<QueuedEvent>,
    cancel: CancellationToken,
}

impl Coordinator {
    pub fn new(
        state: Arc<SharedState>,
        engine: Arc<dyn DiagnosisEngine>,
        executor: FixExecutor,
        config: CoordinatorConfig,
        cancel: CancellationToken,
    ) -> (Self, CoordinatorHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                state,
                engine,
                executor,
                config,
                rx,
                cancel,
            },
            CoordinatorHandle { tx },
        )
    }

    /// Drain the queue until cancelled, one run fully resolved at a time
    pub async fn run(mut self) {
        info!(
            backend = self.engine.name(),
            "Run coordinator started"
        );
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                queued = self.rx.recv() => match queued {
                    Some(queued) => self.process(queued).await,
                    None => break,
                },
            }
        }
        info!("Run coordinator stopped");
    }

    /// Advance the run state machine, broadcasting the transition
    async fn advance(&self, run: &mut Run, new_state: RunState) {
        let transition = run.transition_to(new_state);
        self.state.event_bus.emit_lossy(CoordinatorEvent::RunStateChanged {
            run_id: transition.run_id,
            old_state: transition.old_state,
            new_state: transition.new_state,
            timestamp: transition.transitioned_at,
        });
    }

    /// Handle one failure event to a terminal state
    async fn process(&self, queued: QueuedEvent) {
        let QueuedEvent { run_id, event } = queued;
        let mut run = Run::new(event);
        run.id = run_id;

        self.state.event_bus.emit_lossy(CoordinatorEvent::RunReceived {
            run_id: run.id,
            source_pipeline_id: run.event.source_pipeline_id.clone(),
            task_id: run.event.task_id.clone(),
            timestamp: run.created_at,
        });
        self.state
            .audit(format!(
                "run {}: received {} failure on task '{}' (retry {})",
                run.id,
                run.event.error_type.as_str(),
                run.event.task_id,
                run.event.retry_count
            ))
            .await;

        // Classification is pure and total
        let history = self.state.history_snapshot().await;
        let assessment = severity::classify(&run.event, &history, &self.config.classifier);
        run.severity = Some(assessment.clone());
        self.advance(&mut run, RunState::Classified).await;
        self.state.event_bus.emit_lossy(CoordinatorEvent::RunClassified {
            run_id: run.id,
            tier: assessment.tier,
            intervene: assessment.intervene,
            timestamp: chrono::Utc::now(),
        });
        self.state
            .audit(format!(
                "run {}: classified {:?} ({})",
                run.id, assessment.tier, assessment.rationale
            ))
            .await;

        if !assessment.intervene {
            self.advance(&mut run, RunState::MonitoredOnly).await;
            self.finalize(run).await;
            return;
        }

        // Diagnosis, bounded and degradable
        self.advance(&mut run, RunState::Diagnosing).await;
        let diagnosis = self.diagnose(&run, &history).await;
        self.state
            .audit(format!(
                "run {}: diagnosed '{}' (confidence {:?}, safety {:?})",
                run.id, diagnosis.root_cause, diagnosis.confidence, diagnosis.safety
            ))
            .await;
        run.diagnosis = Some(diagnosis.clone());

        // Strategy selection
        self.advance(&mut run, RunState::Selecting).await;
        match selector::select(&diagnosis, &self.config.flags) {
            RemediationDecision::Escalate => {
                let strategy = FixStrategy::NotifyHuman {
                    message: format!("Escalated to operator: {}", diagnosis.root_cause),
                };
                self.state
                    .audit(format!("run {}: escalated to human operator", run.id))
                    .await;
                self.apply_fix(&mut run, strategy).await;
            }
            RemediationDecision::AutoApply(strategy) => {
                self.state
                    .audit(format!(
                        "run {}: auto-applying {} fix",
                        run.id,
                        strategy.kind()
                    ))
                    .await;
                self.apply_fix(&mut run, strategy).await;
            }
            RemediationDecision::AwaitApproval(strategy) => {
                self.await_approval(&mut run, strategy).await;
            }
        }

        self.finalize(run).await;
    }

    /// Invoke the diagnosis backend with the agent timeout, substituting the
    /// degraded diagnosis on timeout or error
    async fn diagnose(&self, run: &Run, history: &[Run]) -> Diagnosis {
        match timeout(
            self.config.agent_timeout,
            self.engine.diagnose(&run.event, history),
        )
        .await
        {
            Ok(Ok(diagnosis)) => diagnosis::ensure_candidates(diagnosis),
            Ok(Err(e)) => {
                warn!(run_id = %run.id, "Diagnosis backend error: {}", e);
                self.state
                    .audit(format!(
                        "run {}: diagnosis unavailable ({}), continuing degraded",
                        run.id, e
                    ))
                    .await;
                diagnosis::degraded()
            }
            Err(_) => {
                warn!(run_id = %run.id, "Diagnosis timed out");
                self.state
                    .audit(format!(
                        "run {}: diagnosis timed out after {:?}, continuing degraded",
                        run.id, self.config.agent_timeout
                    ))
                    .await;
                diagnosis::degraded()
            }
        }
    }

    /// Apply a strategy through the executor and record the outcome
    async fn apply_fix(&self, run: &mut Run, strategy: FixStrategy) {
        self.advance(run, RunState::Applying).await;

        let mut record = match run.fix.take() {
            Some(mut existing) => {
                existing.status = FixStatus::Applied;
                existing
            }
            None => FixRecord::new(strategy.clone(), FixStatus::Applied),
        };
        record.applied_at = Some(chrono::Utc::now());

        let outcome = self.executor.execute(&strategy).await;

        if outcome.verification.is_some() {
            self.advance(run, RunState::Verifying).await;
        }

        record.status = outcome.status;
        record.verification = outcome.verification;
        record.rollback_note = outcome.rollback_note;

        self.state
            .audit(match record.status {
                FixStatus::Verified => {
                    format!("run {}: {} fix verified", run.id, strategy.kind())
                }
                FixStatus::Applied => {
                    format!("run {}: {} handed off", run.id, strategy.kind())
                }
                FixStatus::RolledBack => match &record.rollback_note {
                    Some(note) => format!(
                        "run {}: {} fix rolled back with unresolved risk ({})",
                        run.id,
                        strategy.kind(),
                        note
                    ),
                    None => format!("run {}: {} fix rolled back", run.id, strategy.kind()),
                },
                status => format!("run {}: fix finished as {:?}", run.id, status),
            })
            .await;

        run.fix = Some(record);
        self.advance(run, RunState::Completed).await;
    }

    /// Park the run at the approval gate and resolve the decision
    async fn await_approval(&self, run: &mut Run, strategy: FixStrategy) {
        run.fix = Some(FixRecord::new(strategy.clone(), FixStatus::PendingApproval));
        self.advance(run, RunState::PendingApproval).await;

        self.state.event_bus.emit_lossy(CoordinatorEvent::ApprovalRequested {
            run_id: run.id,
            strategy: strategy.kind().to_string(),
            timestamp: chrono::Utc::now(),
        });
        self.state
            .audit(format!(
                "run {}: {} fix awaiting human approval",
                run.id,
                strategy.kind()
            ))
            .await;

        let (decision_tx, decision_rx) = oneshot::channel();
        self.state.set_pending(run.clone(), decision_tx).await;

        let (decision, timed_out) = tokio::select! {
            _ = self.cancel.cancelled() => {
                // Shutdown must not hang the run; treat as rejection
                (ApprovalDecision::Rejected, false)
            }
            outcome = timeout(self.config.approval_timeout, decision_rx) => match outcome {
                Ok(Ok(decision)) => (decision, false),
                // Sender dropped without a decision; treat as rejection
                Ok(Err(_)) => (ApprovalDecision::Rejected, false),
                Err(_) => (ApprovalDecision::Rejected, true),
            },
        };
        self.state.clear_pending().await;

        self.state.event_bus.emit_lossy(CoordinatorEvent::ApprovalResolved {
            run_id: run.id,
            approved: decision == ApprovalDecision::Approved,
            timed_out,
            timestamp: chrono::Utc::now(),
        });

        match decision {
            ApprovalDecision::Approved => {
                self.state
                    .audit(format!("run {}: fix approved", run.id))
                    .await;
                self.apply_fix(run, strategy).await;
            }
            ApprovalDecision::Rejected => {
                let reason = if timed_out {
                    "approval timed out"
                } else {
                    "fix rejected"
                };
                self.state
                    .audit(format!("run {}: {}", run.id, reason))
                    .await;
                if let Some(record) = run.fix.as_mut() {
                    record.status = FixStatus::Rejected;
                }
                self.advance(run, RunState::Rejected).await;
                self.advance(run, RunState::Completed).await;
            }
        }
    }

    /// Append the terminal run to the history, exactly once
    async fn finalize(&self, run: Run) {
        debug_assert!(run.is_terminal());
        self.state.event_bus.emit_lossy(CoordinatorEvent::RunCompleted {
            run_id: run.id,
            state: run.state,
            fix_status: run.fix.as_ref().map(|fix| fix.status),
            timestamp: chrono::Utc::now(),
        });
        self.state
            .audit(format!("run {}: terminal state {:?}", run.id, run.state))
            .await;
        self.state.append_run(run).await;
    }
}
