//! Domain value types for failure remediation
//!
//! A `Run` is the unit of work for one `FailureEvent` and progresses through
//! the coordinator state machine:
//!
//! Received → Classified → MonitoredOnly (terminal)
//!                       | Diagnosing → Selecting → PendingApproval ⇄ {Applying, Rejected}
//!                                                | Applying → Verifying → Completed (terminal)
//!
//! Value types (`FailureEvent`, `Diagnosis`) are immutable once created;
//! `FixRecord` mutates through its status field only.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Failure category reported by the upstream scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    SchemaValidation,
    DataType,
    Connection,
    Timeout,
    /// Anything the wire value doesn't name; degrades instead of rejecting
    #[serde(other)]
    Unknown,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::SchemaValidation => "schema_validation",
            ErrorType::DataType => "data_type",
            ErrorType::Connection => "connection",
            ErrorType::Timeout => "timeout",
            ErrorType::Unknown => "unknown",
        }
    }
}

/// A pipeline failure event, created at the ingestion boundary and never
/// mutated afterwards
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureEvent {
    /// Pipeline (DAG) the failed task belongs to
    pub source_pipeline_id: String,
    /// Task that failed
    pub task_id: String,
    pub error_type: ErrorType,
    pub error_message: String,
    pub occurred_at: DateTime<Utc>,
    /// Retries the scheduler has already attempted for this task
    #[serde(default)]
    pub retry_count: u32,
}

/// Coarse severity tier driving whether intervention occurs
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeverityTier {
    Low,
    Medium,
    High,
    Critical,
}

/// Output of the severity classifier, embedded in the run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeverityAssessment {
    pub tier: SeverityTier,
    pub intervene: bool,
    pub rationale: String,
}

/// Confidence the diagnosis engine has in its root cause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

/// Whether the suggested remediation is safe to apply automatically
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Safety {
    Safe,
    Risky,
    Unsafe,
}

/// Root-cause analysis produced once per run; immutable
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnosis {
    pub root_cause: String,
    pub confidence: Confidence,
    /// Ordered by preference; never empty (fallback is always NotifyHuman)
    pub candidate_fixes: Vec<FixStrategy>,
    pub safety: Safety,
}

/// Record field type in the pipeline schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Integer,
    Number,
    String,
    Boolean,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Integer => "integer",
            FieldType::Number => "number",
            FieldType::String => "string",
            FieldType::Boolean => "boolean",
        }
    }
}

/// A named field with its expected type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub field_type: FieldType,
}

/// Edit applied to the pipeline record schema
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaPatch {
    /// Required fields to relax to optional
    #[serde(default)]
    pub make_optional: Vec<String>,
    /// Newly observed fields to register as optional
    #[serde(default)]
    pub add_fields: Vec<FieldSpec>,
}

/// Data-shaping rule applied to records before validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformRule {
    pub name: String,
    pub kind: TransformKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransformKind {
    /// Fill a missing field with a default value
    DefaultValue {
        field: String,
        value: serde_json::Value,
    },
    /// Rename a field the source started emitting under a new name
    RenameField { from: String, to: String },
    /// Parse a numeric value that arrives as a string
    CoerceNumber { field: String },
}

/// A concrete remediation action; each variant carries exactly the data
/// needed to execute it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum FixStrategy {
    /// Signal the upstream scheduler to re-run the failed task
    Retry {
        pipeline_id: String,
        task_id: String,
    },
    /// Patch the schema definition consumed by validation
    UpdateSchema { patch: SchemaPatch },
    /// Register a data-shaping rule applied before validation
    AddTransformation { rule: TransformRule },
    /// Write a configuration value consumed by the pipeline
    UpdateConfig { key: String, value: String },
    /// Hand off to a human; no automated action follows
    NotifyHuman { message: String },
}

impl FixStrategy {
    /// Short tag for logs and events
    pub fn kind(&self) -> &'static str {
        match self {
            FixStrategy::Retry { .. } => "retry",
            FixStrategy::UpdateSchema { .. } => "update_schema",
            FixStrategy::AddTransformation { .. } => "add_transformation",
            FixStrategy::UpdateConfig { .. } => "update_config",
            FixStrategy::NotifyHuman { .. } => "notify_human",
        }
    }
}

/// Lifecycle status of a fix record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixStatus {
    PendingApproval,
    Applied,
    Verified,
    RolledBack,
    Rejected,
}

/// Outcome of the executor's verification step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    pub passed: bool,
    pub detail: String,
}

/// The fix chosen for a run; created once, mutated through `status` only
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixRecord {
    pub strategy: FixStrategy,
    pub status: FixStatus,
    pub applied_at: Option<DateTime<Utc>>,
    pub verification: Option<VerificationResult>,
    /// Set when rollback itself failed; flags unresolved risk in the record
    pub rollback_note: Option<String>,
}

impl FixRecord {
    pub fn new(strategy: FixStrategy, status: FixStatus) -> Self {
        Self {
            strategy,
            status,
            applied_at: None,
            verification: None,
            rollback_note: None,
        }
    }
}

/// Coordinator state machine position for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Received,
    Classified,
    /// Terminal: no intervention needed, upstream handles it
    MonitoredOnly,
    Diagnosing,
    Selecting,
    PendingApproval,
    Applying,
    Verifying,
    Rejected,
    Completed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::MonitoredOnly | RunState::Completed)
    }
}

/// State transition record, emitted on the event bus
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub run_id: Uuid,
    pub old_state: RunState,
    pub new_state: RunState,
    pub transitioned_at: DateTime<Utc>,
}

/// The full lifecycle record of handling one failure event.
///
/// Owned exclusively by the run coordinator; appended to the history store
/// exactly once, in full, when terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    pub state: RunState,
    pub event: FailureEvent,
    pub severity: Option<SeverityAssessment>,
    /// Absent when intervene = false
    pub diagnosis: Option<Diagnosis>,
    pub fix: Option<FixRecord>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Run {
    pub fn new(event: FailureEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: RunState::Received,
            event,
            severity: None,
            diagnosis: None,
            fix: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Transition to a new state, stamping `completed_at` on terminal states
    pub fn transition_to(&mut self, new_state: RunState) -> StateTransition {
        let transition = StateTransition {
            run_id: self.id,
            old_state: self.state,
            new_state,
            transitioned_at: Utc::now(),
        };
        self.state = new_state;

        if new_state.is_terminal() {
            self.completed_at = Some(Utc::now());
        }

        transition
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// User feedback on coordinator behavior; independent append-only list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub id: Uuid,
    /// May be unattributed
    pub run_id: Option<Uuid>,
    pub rating: u8,
    pub comment: String,
    pub submitted_at: DateTime<Utc>,
}

impl FeedbackEntry {
    /// Create a feedback entry, rejecting ratings outside 1..=5
    pub fn new(rating: u8, comment: String, run_id: Option<Uuid>) -> Result<Self> {
        if !(1..=5).contains(&rating) {
            return Err(Error::InvalidRating(rating));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            run_id,
            rating,
            comment,
            submitted_at: Utc::now(),
        })
    }
}
