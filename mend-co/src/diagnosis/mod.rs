//! Pluggable root-cause diagnosis
//!
//! Diagnosis is a capability behind a fixed contract: any implementation of
//! `DiagnosisEngine` is substitutable, selected via configuration at
//! startup. The coordinator bounds every call with the agent timeout and
//! substitutes `degraded()` on timeout or backend error, so a run never
//! stalls because the backend is unreachable.

pub mod generative;
pub mod rules;

pub use generative::GenerativeEngine;
pub use rules::RuleBasedEngine;

use async_trait::async_trait;
use mend_common::config::{DiagnosisBackend, Settings};
use mend_common::error::Result;
use mend_common::model::{Confidence, Diagnosis, FailureEvent, FixStrategy, Run, Safety};
use std::sync::Arc;
use tracing::warn;

/// Root-cause analysis contract
///
/// Implementations must always populate confidence and safety, and must
/// never return an empty candidate list.
#[async_trait]
pub trait DiagnosisEngine: Send + Sync {
    async fn diagnose(&self, event: &FailureEvent, history: &[Run]) -> Result<Diagnosis>;

    /// Backend name for logs
    fn name(&self) -> &'static str;
}

/// The diagnosis substituted when the backend times out or errors
pub fn degraded() -> Diagnosis {
    Diagnosis {
        root_cause: "diagnosis unavailable".to_string(),
        confidence: Confidence::Low,
        candidate_fixes: vec![FixStrategy::NotifyHuman {
            message: "Diagnosis backend unavailable, manual investigation required".to_string(),
        }],
        safety: Safety::Unsafe,
    }
}

/// Enforce the never-empty candidate contract on a backend's answer
pub fn ensure_candidates(mut diagnosis: Diagnosis) -> Diagnosis {
    if diagnosis.candidate_fixes.is_empty() {
        warn!("Diagnosis backend returned no candidate fixes, substituting NotifyHuman");
        diagnosis.candidate_fixes = vec![FixStrategy::NotifyHuman {
            message: format!("No automated fix available: {}", diagnosis.root_cause),
        }];
    }
    diagnosis
}

/// Construct the configured engine
pub fn build_engine(settings: &Settings) -> Arc<dyn DiagnosisEngine> {
    match settings.diagnosis_backend {
        DiagnosisBackend::Rules => Arc::new(RuleBasedEngine::new()),
        DiagnosisBackend::Generative => match settings.openai_api_key.clone() {
            Some(api_key) => Arc::new(GenerativeEngine::new(api_key)),
            None => {
                warn!("Generative backend selected but no API key configured, using rule-based diagnosis");
                Arc::new(RuleBasedEngine::new())
            }
        },
    }
}
