//! Common error types for Mend

use thiserror::Error;
use uuid::Uuid;

/// Common result type for Mend operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for the remediation coordinator.
///
/// Only `Validation`, `InvalidRating` and `NotPending` are caller-facing;
/// everything else is recovered locally and recorded in the audit trail.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed failure event or feedback, rejected at the boundary
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Feedback rating outside the 1..=5 range
    #[error("Invalid rating: {0} (must be 1..=5)")]
    InvalidRating(u8),

    /// Approval decision for a run that is not the currently pending one
    #[error("Run {0} is not pending approval")]
    NotPending(Uuid),

    /// Diagnosis backend timed out or failed; the run continues degraded
    #[error("Diagnosis unavailable: {0}")]
    DiagnosisUnavailable(String),

    /// Fix application failed; triggers a rollback attempt
    #[error("Fix execution failed: {0}")]
    Execution(String),

    /// Rollback after a failed verification itself failed
    #[error("Rollback failed: {0}")]
    Rollback(String),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
