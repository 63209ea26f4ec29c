//! HTTP request handlers
//!
//! Implements the coordinator's boundary operations: ingest, status reads,
//! the approval gate, feedback, audit logs, and the 24 h summary.

use crate::error::{ApiError, ApiResult};
use crate::state::ApprovalDecision;
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Duration, Utc};
use mend_common::events::CoordinatorEvent;
use mend_common::model::{
    ErrorType, FailureEvent, FeedbackEntry, FixStatus, Run, SeverityTier,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;
use uuid::Uuid;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
    port: u16,
}

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub source_pipeline_id: String,
    pub task_id: String,
    pub error_type: ErrorType,
    #[serde(default)]
    pub error_message: String,
    /// Defaults to the ingestion time when the scheduler omits it
    pub occurred_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub retry_count: u32,
    /// The record that failed validation, if the scheduler captured it;
    /// becomes the verification sample for schema/transform fixes
    #[serde(default)]
    pub failing_payload: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub run_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub runs: Vec<Run>,
}

#[derive(Debug, Serialize)]
pub struct DecisionResponse {
    pub run_id: Uuid,
    pub decision: String,
}

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub rating: u8,
    #[serde(default)]
    pub comment: String,
    pub run_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct FeedbackQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct FeedbackListResponse {
    pub feedback: Vec<FeedbackEntry>,
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct LogsResponse {
    pub logs: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub total_runs_24h: usize,
    pub interventions_24h: usize,
    pub severity_distribution: BTreeMap<&'static str, usize>,
    pub fix_status_distribution: BTreeMap<&'static str, usize>,
    /// Verified fixes over all fixes with a verification outcome
    pub fix_success_rate: f64,
}

// ============================================================================
// Health
// ============================================================================

/// GET /health - health check endpoint
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        module: "mend-co".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        port: state.port,
    })
}

// ============================================================================
// Ingestion
// ============================================================================

/// POST /api/v1/events - ingest a failure event
///
/// Enqueues the event and returns the run id without waiting for diagnosis
/// or fix completion.
pub async fn ingest(
    State(state): State<AppState>,
    Json(request): Json<IngestRequest>,
) -> ApiResult<(StatusCode, Json<IngestResponse>)> {
    if let Some(payload) = request.failing_payload {
        state.surface.set_failing_sample(payload).await;
    }

    let event = FailureEvent {
        source_pipeline_id: request.source_pipeline_id,
        task_id: request.task_id,
        error_type: request.error_type,
        error_message: request.error_message,
        occurred_at: request.occurred_at.unwrap_or_else(Utc::now),
        retry_count: request.retry_count,
    };

    let run_id = state.coordinator.ingest(event)?;
    info!(%run_id, "Failure event accepted");
    Ok((StatusCode::ACCEPTED, Json(IngestResponse { run_id })))
}

// ============================================================================
// Dashboard reads
// ============================================================================

/// GET /api/v1/status - completed runs, most recent first
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        runs: state.state.runs_most_recent_first().await,
    })
}

/// GET /api/v1/logs?limit= - recent audit lines, oldest-to-newest
pub async fn get_logs(
    State(state): State<AppState>,
    Query(query): Query<LogsQuery>,
) -> Json<LogsResponse> {
    let limit = query.limit.unwrap_or(200);
    Json(LogsResponse {
        logs: state.state.recent_logs(limit).await,
    })
}

fn tier_key(tier: SeverityTier) -> &'static str {
    match tier {
        SeverityTier::Low => "low",
        SeverityTier::Medium => "medium",
        SeverityTier::High => "high",
        SeverityTier::Critical => "critical",
    }
}

fn fix_status_key(status: FixStatus) -> &'static str {
    match status {
        FixStatus::PendingApproval => "pending_approval",
        FixStatus::Applied => "applied",
        FixStatus::Verified => "verified",
        FixStatus::RolledBack => "rolled_back",
        FixStatus::Rejected => "rejected",
    }
}

/// GET /api/v1/summary - aggregate view over the last 24 hours
pub async fn get_summary(State(state): State<AppState>) -> Json<SummaryResponse> {
    let cutoff = Utc::now() - Duration::hours(24);
    let runs = state.state.history_snapshot().await;

    let mut severity_distribution: BTreeMap<&'static str, usize> = BTreeMap::new();
    let mut fix_status_distribution: BTreeMap<&'static str, usize> = BTreeMap::new();
    let mut total = 0usize;
    let mut interventions = 0usize;
    let mut verified = 0usize;
    let mut concluded = 0usize;

    for run in runs.iter().filter(|run| run.created_at >= cutoff) {
        total += 1;
        if let Some(severity) = &run.severity {
            *severity_distribution.entry(tier_key(severity.tier)).or_default() += 1;
            if severity.intervene {
                interventions += 1;
            }
        }
        if let Some(fix) = &run.fix {
            *fix_status_distribution
                .entry(fix_status_key(fix.status))
                .or_default() += 1;
            if fix.verification.is_some() {
                concluded += 1;
                if fix.status == FixStatus::Verified {
                    verified += 1;
                }
            }
        }
    }

    let fix_success_rate = if concluded > 0 {
        verified as f64 / concluded as f64
    } else {
        0.0
    };

    Json(SummaryResponse {
        total_runs_24h: total,
        interventions_24h: interventions,
        severity_distribution,
        fix_status_distribution,
        fix_success_rate,
    })
}

// ============================================================================
// Approval gate
// ============================================================================

/// GET /api/v1/approvals/pending - the run awaiting a decision, if any
pub async fn get_pending_approval(State(state): State<AppState>) -> Json<Option<Run>> {
    Json(state.state.pending_run().await)
}

/// POST /api/v1/approvals/:run_id/approve
pub async fn approve(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> ApiResult<Json<DecisionResponse>> {
    state
        .state
        .resolve_pending(run_id, ApprovalDecision::Approved)
        .await?;
    Ok(Json(DecisionResponse {
        run_id,
        decision: "approved".to_string(),
    }))
}

/// POST /api/v1/approvals/:run_id/reject
pub async fn reject(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> ApiResult<Json<DecisionResponse>> {
    state
        .state
        .resolve_pending(run_id, ApprovalDecision::Rejected)
        .await?;
    Ok(Json(DecisionResponse {
        run_id,
        decision: "rejected".to_string(),
    }))
}

// ============================================================================
// Feedback
// ============================================================================

/// POST /api/v1/feedback - record user feedback
///
/// Without an explicit run id the entry attaches to the most recent
/// completed run.
pub async fn submit_feedback(
    State(state): State<AppState>,
    Json(request): Json<FeedbackRequest>,
) -> ApiResult<(StatusCode, Json<FeedbackEntry>)> {
    let run_id = match request.run_id {
        Some(run_id) => Some(run_id),
        None => state.state.latest_run_id().await,
    };

    let entry = FeedbackEntry::new(request.rating, request.comment, run_id)
        .map_err(ApiError::from)?;

    state.state.add_feedback(entry.clone()).await;
    state.state.event_bus.emit_lossy(CoordinatorEvent::FeedbackSubmitted {
        feedback_id: entry.id,
        run_id: entry.run_id,
        rating: entry.rating,
        timestamp: entry.submitted_at,
    });
    state
        .state
        .audit(format!(
            "feedback {} received (rating {})",
            entry.id, entry.rating
        ))
        .await;

    Ok((StatusCode::CREATED, Json(entry)))
}

/// GET /api/v1/feedback?limit= - recent feedback, newest first
pub async fn get_feedback(
    State(state): State<AppState>,
    Query(query): Query<FeedbackQuery>,
) -> Json<FeedbackListResponse> {
    let limit = query.limit.unwrap_or(20);
    Json(FeedbackListResponse {
        feedback: state.state.recent_feedback(limit).await,
    })
}
