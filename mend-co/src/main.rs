//! mend-co - Remediation coordinator service
//!
//! Receives pipeline-failure events from the upstream scheduler, classifies
//! and diagnoses them, applies remediation with verification and rollback,
//! and serves status, approvals, feedback, logs and SSE to the dashboard.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mend_co::coordinator::{Coordinator, CoordinatorConfig};
use mend_co::diagnosis;
use mend_co::executor::FixExecutor;
use mend_co::scheduler::HttpScheduler;
use mend_co::state::SharedState;
use mend_co::surface::PipelineSurface;
use mend_co::AppState;
use mend_common::config::{ConfigOverrides, Settings};

/// Command-line arguments for mend-co
#[derive(Parser, Debug)]
#[command(name = "mend-co")]
#[command(about = "Remediation coordinator for self-healing data pipelines")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Path to the TOML configuration file
    #[arg(short, long, env = "MEND_CONFIG")]
    config: Option<std::path::PathBuf>,

    /// Upstream scheduler base URL
    #[arg(long)]
    scheduler_url: Option<String>,

    /// Diagnosis backend (rules | generative)
    #[arg(long)]
    diagnosis_backend: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mend_co=info,mend_common=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Log build identification immediately after tracing init
    info!(
        "Starting Mend Coordinator (mend-co) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let args = Args::parse();
    let settings = Settings::resolve(ConfigOverrides {
        config_path: args.config,
        port: args.port,
        scheduler_url: args.scheduler_url,
        diagnosis_backend: args.diagnosis_backend,
    })
    .context("Failed to resolve configuration")?;

    info!(
        "Scheduler: {} | diagnosis backend: {:?} | agent timeout: {:?} | auto_fix: {} | approval gate: {}",
        settings.scheduler_url,
        settings.diagnosis_backend,
        settings.agent_timeout,
        settings.auto_fix_enabled,
        settings.require_human_approval
    );

    // Shared state, pipeline surface, collaborator gateways
    let state = Arc::new(SharedState::new(settings.log_buffer_lines));
    let surface = Arc::new(PipelineSurface::new());
    let scheduler = Arc::new(
        HttpScheduler::new(settings.scheduler_url.clone())
            .context("Failed to construct scheduler gateway")?,
    );
    let engine = diagnosis::build_engine(&settings);
    let executor = FixExecutor::new(Arc::clone(&surface), scheduler);

    // Run coordinator actor
    let cancel = CancellationToken::new();
    let (coordinator, handle) = Coordinator::new(
        Arc::clone(&state),
        engine,
        executor,
        CoordinatorConfig::from(&settings),
        cancel.clone(),
    );
    let coordinator_task = tokio::spawn(coordinator.run());
    info!("Run coordinator started");

    // HTTP boundary
    let app = mend_co::build_router(AppState {
        coordinator: handle,
        state,
        surface,
        port: settings.port,
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("mend-co listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Stop the coordinator; an in-flight approval gate resolves as rejected
    cancel.cancel();
    let _ = coordinator_task.await;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
