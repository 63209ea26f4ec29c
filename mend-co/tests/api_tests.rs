//! Integration tests for the mend-co API endpoints
//!
//! Exercises routing and handler logic against a real coordinator with a
//! stubbed scheduler gateway, using `tower::ServiceExt::oneshot`.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use mend_co::coordinator::{Coordinator, CoordinatorConfig};
use mend_co::diagnosis::RuleBasedEngine;
use mend_co::executor::FixExecutor;
use mend_co::scheduler::{SchedulerGateway, TaskRunStatus};
use mend_co::selector::RemediationFlags;
use mend_co::severity::ClassifierPolicy;
use mend_co::state::SharedState;
use mend_co::surface::PipelineSurface;
use mend_co::AppState;
use mend_common::error::Result;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::util::ServiceExt; // for `oneshot`

struct StubScheduler;

#[async_trait]
impl SchedulerGateway for StubScheduler {
    async fn request_retry(&self, _pipeline_id: &str, _task_id: &str) -> Result<()> {
        Ok(())
    }

    async fn task_status(&self, _pipeline_id: &str, _task_id: &str) -> Result<TaskRunStatus> {
        Ok(TaskRunStatus::Running)
    }
}

/// Test helper: full app with a live coordinator and rule-based diagnosis
fn setup_app() -> (axum::Router, Arc<SharedState>, CancellationToken) {
    let state = Arc::new(SharedState::new(500));
    let surface = Arc::new(PipelineSurface::new());
    let executor = FixExecutor::new(Arc::clone(&surface), Arc::new(StubScheduler));
    let cancel = CancellationToken::new();

    let config = CoordinatorConfig {
        agent_timeout: Duration::from_secs(5),
        approval_timeout: Duration::from_secs(5),
        classifier: ClassifierPolicy::default(),
        flags: RemediationFlags {
            auto_fix_enabled: true,
            require_human_approval: false,
        },
    };

    let (coordinator, handle) = Coordinator::new(
        Arc::clone(&state),
        Arc::new(RuleBasedEngine::new()),
        executor,
        config,
        cancel.clone(),
    );
    tokio::spawn(coordinator.run());

    let app = mend_co::build_router(AppState {
        coordinator: handle,
        state: Arc::clone(&state),
        surface,
        port: 5780,
    });
    (app, state, cancel)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

fn ingest_body() -> Value {
    json!({
        "source_pipeline_id": "self_healing_pipeline",
        "task_id": "validate_schema",
        "error_type": "schema_validation",
        "error_message": "Record 0: Missing required field 'department'",
        "retry_count": 0,
        "failing_payload": {
            "id": 2,
            "name": "Bob Jones",
            "email": "bob@example.com",
            "salary": 95000,
            "hire_date": "2019-03-22"
        }
    })
}

async fn wait_for_runs(state: &SharedState, count: usize) {
    for _ in 0..500 {
        if state.history_len().await >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("history never reached {} runs", count);
}

// ============================================================================
// Health
// ============================================================================

#[tokio::test]
async fn health_endpoint_reports_module_identity() {
    let (app, _state, _cancel) = setup_app();

    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "mend-co");
    assert!(body["version"].is_string());
}

// ============================================================================
// Ingestion and status
// ============================================================================

#[tokio::test]
async fn ingest_returns_run_id_and_status_shows_completed_run() {
    let (app, state, _cancel) = setup_app();

    let response = app
        .clone()
        .oneshot(post_json("/api/v1/events", ingest_body()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let body = extract_json(response.into_body()).await;
    let run_id = body["run_id"].as_str().expect("run_id in response").to_string();

    wait_for_runs(&state, 1).await;

    let response = app.oneshot(get("/api/v1/status")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    let runs = body["runs"].as_array().unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0]["id"], run_id.as_str());
    assert_eq!(runs[0]["state"], "completed");
    // Rule-based diagnosis auto-applied the schema patch and verified it
    assert_eq!(runs[0]["fix"]["status"], "verified");
    assert_eq!(runs[0]["fix"]["strategy"]["strategy"], "update_schema");
}

#[tokio::test]
async fn ingest_rejects_empty_task_id() {
    let (app, state, _cancel) = setup_app();

    let mut body = ingest_body();
    body["task_id"] = json!("");
    let response = app
        .oneshot(post_json("/api/v1/events", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(state.history_len().await, 0);
}

#[tokio::test]
async fn unknown_error_type_degrades_instead_of_rejecting() {
    let (app, state, _cancel) = setup_app();

    let mut body = ingest_body();
    body["error_type"] = json!("disk_full");
    body["error_message"] = json!("no space left on device");
    let response = app
        .clone()
        .oneshot(post_json("/api/v1/events", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    wait_for_runs(&state, 1).await;
    let response = app.oneshot(get("/api/v1/status")).await.unwrap();
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["runs"][0]["event"]["error_type"], "unknown");
}

// ============================================================================
// Approval gate
// ============================================================================

#[tokio::test]
async fn approving_a_non_pending_run_conflicts() {
    let (app, _state, _cancel) = setup_app();

    let run_id = uuid::Uuid::new_v4();
    let response = app
        .oneshot(post_json(
            &format!("/api/v1/approvals/{}/approve", run_id),
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"]["code"], "CONFLICT");
}

#[tokio::test]
async fn pending_approval_is_null_when_nothing_is_gated() {
    let (app, _state, _cancel) = setup_app();

    let response = app.oneshot(get("/api/v1/approvals/pending")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert!(body.is_null());
}

// ============================================================================
// Feedback
// ============================================================================

#[tokio::test]
async fn feedback_round_trip_attaches_to_latest_run() {
    let (app, state, _cancel) = setup_app();

    app.clone()
        .oneshot(post_json("/api/v1/events", ingest_body()))
        .await
        .unwrap();
    wait_for_runs(&state, 1).await;
    let latest = state.latest_run_id().await.unwrap();

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/v1/feedback",
            json!({"rating": 4, "comment": "fixed it quickly"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["rating"], 4);
    assert_eq!(body["run_id"], latest.to_string().as_str());

    let response = app.oneshot(get("/api/v1/feedback")).await.unwrap();
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["feedback"].as_array().unwrap().len(), 1);
}

/// Scenario D: rating outside 1..=5 is rejected and nothing is recorded
#[tokio::test]
async fn out_of_range_rating_is_rejected() {
    let (app, _state, _cancel) = setup_app();

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/v1/feedback",
            json!({"rating": 6, "comment": "!"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app.oneshot(get("/api/v1/feedback")).await.unwrap();
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["feedback"].as_array().unwrap().len(), 0);
}

// ============================================================================
// Logs and summary
// ============================================================================

#[tokio::test]
async fn logs_endpoint_returns_recent_audit_lines() {
    let (app, state, _cancel) = setup_app();

    app.clone()
        .oneshot(post_json("/api/v1/events", ingest_body()))
        .await
        .unwrap();
    wait_for_runs(&state, 1).await;

    let response = app
        .oneshot(get("/api/v1/logs?limit=50"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    let logs = body["logs"].as_array().unwrap();
    assert!(!logs.is_empty());
    // Oldest-to-newest: the reception line precedes the terminal line
    let rendered: Vec<&str> = logs.iter().filter_map(|line| line.as_str()).collect();
    let received = rendered
        .iter()
        .position(|line| line.contains("received schema_validation failure"));
    let terminal = rendered.iter().position(|line| line.contains("terminal state"));
    assert!(received.unwrap() < terminal.unwrap());
}

#[tokio::test]
async fn summary_aggregates_last_day() {
    let (app, state, _cancel) = setup_app();

    app.clone()
        .oneshot(post_json("/api/v1/events", ingest_body()))
        .await
        .unwrap();
    wait_for_runs(&state, 1).await;

    let response = app.oneshot(get("/api/v1/summary")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["total_runs_24h"], 1);
    assert_eq!(body["interventions_24h"], 1);
    assert_eq!(body["severity_distribution"]["medium"], 1);
    assert_eq!(body["fix_status_distribution"]["verified"], 1);
    assert_eq!(body["fix_success_rate"], 1.0);
}
