//! mend-co library interface
//!
//! Remediation coordinator for pipeline failures: classifies severity,
//! diagnoses root cause through a pluggable engine, selects and applies
//! remediation with verification and rollback, gates risky fixes behind
//! human approval, and keeps an auditable in-memory history.

pub mod api;
pub mod coordinator;
pub mod diagnosis;
pub mod error;
pub mod executor;
pub mod scheduler;
pub mod selector;
pub mod severity;
pub mod state;
pub mod surface;

pub use crate::error::{ApiError, ApiResult};

use crate::coordinator::CoordinatorHandle;
use crate::state::SharedState;
use crate::surface::PipelineSurface;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Ingestion handle into the coordinator queue
    pub coordinator: CoordinatorHandle,
    /// Shared history / pending / audit state
    pub state: Arc<SharedState>,
    /// Pipeline surface updated with failing payload samples at ingestion
    pub surface: Arc<PipelineSurface>,
    /// Server port, reported by the health endpoint
    pub port: u16,
}

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(api::handlers::health))
        .nest(
            "/api/v1",
            Router::new()
                // Ingestion boundary for the upstream scheduler
                .route("/events", post(api::handlers::ingest))
                // Dashboard reads
                .route("/status", get(api::handlers::get_status))
                .route("/logs", get(api::handlers::get_logs))
                .route("/summary", get(api::handlers::get_summary))
                .route("/events/stream", get(api::sse::event_stream))
                // Approval gate
                .route("/approvals/pending", get(api::handlers::get_pending_approval))
                .route("/approvals/:run_id/approve", post(api::handlers::approve))
                .route("/approvals/:run_id/reject", post(api::handlers::reject))
                // Feedback
                .route("/feedback", post(api::handlers::submit_feedback))
                .route("/feedback", get(api::handlers::get_feedback)),
        )
        // The dashboard is served from another origin
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
