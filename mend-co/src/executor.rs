//! Fix execution, verification, and rollback
//!
//! One operation per strategy variant, dispatched through a closed match so
//! a new variant cannot ship without an execute and rollback arm. Every
//! execution is wrapped: verification failure triggers a single rollback
//! attempt to the snapshotted pre-fix state; a rollback failure is recorded
//! on the fix record and surfaced, never propagated as a panic.

use crate::scheduler::{SchedulerGateway, TaskRunStatus};
use crate::surface::{PipelineSurface, RecordSchema};
use mend_common::error::Error;
use mend_common::model::{FixStatus, FixStrategy, VerificationResult};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Result of applying one fix strategy
#[derive(Debug, Clone)]
pub struct FixOutcome {
    pub status: FixStatus,
    pub verification: Option<VerificationResult>,
    /// Set when rollback itself failed; the run completes with this flag
    pub rollback_note: Option<String>,
}

impl FixOutcome {
    fn verified(detail: String) -> Self {
        Self {
            status: FixStatus::Verified,
            verification: Some(VerificationResult {
                passed: true,
                detail,
            }),
            rollback_note: None,
        }
    }

    fn rolled_back(detail: String, rollback: Result<(), Error>) -> Self {
        let rollback_note = match rollback {
            Ok(()) => None,
            Err(e) => {
                error!("Rollback failed: {}", e);
                Some(format!("rollback failed: {}", e))
            }
        };
        Self {
            status: FixStatus::RolledBack,
            verification: Some(VerificationResult {
                passed: false,
                detail,
            }),
            rollback_note,
        }
    }
}

/// Pre-fix state captured before application, consumed by rollback
enum Snapshot {
    None,
    Schema(RecordSchema),
    Transform { name: String },
    Config { key: String, prior: Option<String> },
}

/// Applies chosen strategies against the pipeline surface and the upstream
/// scheduler
pub struct FixExecutor {
    surface: Arc<PipelineSurface>,
    scheduler: Arc<dyn SchedulerGateway>,
}

impl FixExecutor {
    pub fn new(surface: Arc<PipelineSurface>, scheduler: Arc<dyn SchedulerGateway>) -> Self {
        Self { surface, scheduler }
    }

    /// Apply a strategy, verify the result, roll back on failure
    pub async fn execute(&self, strategy: &FixStrategy) -> FixOutcome {
        info!(strategy = strategy.kind(), "Applying fix");

        // NotifyHuman is a hand-off, not an automated fix: no verification,
        // nothing to roll back
        if let FixStrategy::NotifyHuman { message } = strategy {
            info!("Human intervention requested: {}", message);
            return FixOutcome {
                status: FixStatus::Applied,
                verification: None,
                rollback_note: None,
            };
        }

        let snapshot = match self.apply(strategy).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                // Application itself failed; nothing took effect, so the
                // rollback is the trivial one
                warn!("Fix application failed: {}", e);
                return FixOutcome::rolled_back(format!("application failed: {}", e), Ok(()));
            }
        };

        match self.verify(strategy).await {
            VerificationResult { passed: true, detail } => {
                info!(strategy = strategy.kind(), "Fix verified");
                FixOutcome::verified(detail)
            }
            VerificationResult { passed: false, detail } => {
                warn!(
                    strategy = strategy.kind(),
                    "Verification failed ({}), rolling back", detail
                );
                FixOutcome::rolled_back(detail, self.rollback(snapshot).await)
            }
        }
    }

    /// Apply the strategy, returning the pre-fix snapshot for rollback
    async fn apply(&self, strategy: &FixStrategy) -> Result<Snapshot, Error> {
        match strategy {
            FixStrategy::Retry {
                pipeline_id,
                task_id,
            } => {
                self.scheduler.request_retry(pipeline_id, task_id).await?;
                Ok(Snapshot::None)
            }
            FixStrategy::UpdateSchema { patch } => {
                let snapshot = self.surface.schema_snapshot().await;
                self.surface.apply_schema_patch(patch).await;
                Ok(Snapshot::Schema(snapshot))
            }
            FixStrategy::AddTransformation { rule } => {
                self.surface.register_transform(rule.clone()).await;
                Ok(Snapshot::Transform {
                    name: rule.name.clone(),
                })
            }
            FixStrategy::UpdateConfig { key, value } => {
                let prior = self.surface.set_config(key, value).await;
                Ok(Snapshot::Config {
                    key: key.clone(),
                    prior,
                })
            }
            FixStrategy::NotifyHuman { .. } => Ok(Snapshot::None),
        }
    }

    async fn verify(&self, strategy: &FixStrategy) -> VerificationResult {
        match strategy {
            FixStrategy::Retry {
                pipeline_id,
                task_id,
            } => match self.scheduler.task_status(pipeline_id, task_id).await {
                Ok(TaskRunStatus::Failed) => VerificationResult {
                    passed: false,
                    detail: "scheduler reports the task failed again".to_string(),
                },
                Ok(status) => VerificationResult {
                    passed: true,
                    detail: format!("scheduler re-dispatched the task ({:?})", status),
                },
                Err(e) => VerificationResult {
                    passed: false,
                    detail: format!("status readback failed: {}", e),
                },
            },
            FixStrategy::UpdateSchema { .. } | FixStrategy::AddTransformation { .. } => {
                let violations = self.surface.validate_sample().await;
                if violations.is_empty() {
                    VerificationResult {
                        passed: true,
                        detail: "sample record validates against the updated pipeline".to_string(),
                    }
                } else {
                    VerificationResult {
                        passed: false,
                        detail: format!("sample record still invalid: {}", violations.join("; ")),
                    }
                }
            }
            FixStrategy::UpdateConfig { key, value } => {
                match self.surface.config_value(key).await {
                    Some(read) if &read == value => VerificationResult {
                        passed: true,
                        detail: format!("config '{}' read back as '{}'", key, read),
                    },
                    read => VerificationResult {
                        passed: false,
                        detail: format!("config '{}' read back as {:?}", key, read),
                    },
                }
            }
            FixStrategy::NotifyHuman { .. } => VerificationResult {
                passed: true,
                detail: "no automated verification for hand-off".to_string(),
            },
        }
    }

    /// Restore the snapshotted pre-fix state
    async fn rollback(&self, snapshot: Snapshot) -> Result<(), Error> {
        match snapshot {
            Snapshot::None => Ok(()),
            Snapshot::Schema(schema) => {
                self.surface.restore_schema(schema).await;
                Ok(())
            }
            Snapshot::Transform { name } => {
                self.surface.remove_transform(&name).await;
                Ok(())
            }
            Snapshot::Config { key, prior } => {
                match prior {
                    Some(value) => {
                        self.surface.set_config(&key, &value).await;
                    }
                    None => self.surface.remove_config(&key).await,
                }
                Ok(())
            }
        }
    }
}
