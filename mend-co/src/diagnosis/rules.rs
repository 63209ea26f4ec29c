//! Rule-based diagnosis engine
//!
//! Pattern matcher over the error message and error type. Emits candidate
//! fixes ordered by preference; the escalation fallback (NotifyHuman) is
//! always the last candidate so the list is never empty.

use super::DiagnosisEngine;
use async_trait::async_trait;
use mend_common::error::Result;
use mend_common::model::{
    Confidence, Diagnosis, ErrorType, FailureEvent, FixStrategy, Run, SchemaPatch, TransformKind,
    TransformRule, Safety,
};
use regex::Regex;
use serde_json::json;
use tracing::debug;

pub struct RuleBasedEngine {
    missing_field: Regex,
    type_mismatch: Regex,
}

impl Default for RuleBasedEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleBasedEngine {
    pub fn new() -> Self {
        Self {
            // "Missing required field 'department'"
            missing_field: Regex::new(r"[Mm]issing required field '([^']+)'")
                .expect("valid missing-field pattern"),
            // "'salary' must be number"
            type_mismatch: Regex::new(r"'([^']+)' must be ([A-Za-z]+)")
                .expect("valid type-mismatch pattern"),
        }
    }

    /// Recurrences of the same failure within recent history, counting the
    /// current event
    fn recurrence(&self, event: &FailureEvent, history: &[Run]) -> usize {
        history
            .iter()
            .rev()
            .take(10)
            .filter(|run| {
                run.event.task_id == event.task_id && run.event.error_type == event.error_type
            })
            .count()
            + 1
    }

    fn diagnose_schema_failure(&self, event: &FailureEvent, recurrence: usize) -> Diagnosis {
        let missing: Vec<String> = self
            .missing_field
            .captures_iter(&event.error_message)
            .map(|captures| captures[1].to_string())
            .collect();

        if missing.is_empty() {
            return Diagnosis {
                root_cause: "Schema validation failed: unknown field mismatch".to_string(),
                confidence: Confidence::Medium,
                candidate_fixes: vec![FixStrategy::NotifyHuman {
                    message: format!(
                        "Schema validation failed on task '{}' with no recognizable field pattern",
                        event.task_id
                    ),
                }],
                safety: Safety::Risky,
            };
        }

        let mut root_cause = format!(
            "Schema mismatch: missing required fields: {}",
            missing.join(", ")
        );
        if recurrence >= 3 {
            root_cause.push_str(&format!(" (persistent across {} recent runs)", recurrence));
        }

        // Relaxing the schema is preferred; defaulting the first missing
        // field keeps downstream consumers fed if the source never recovers
        let candidate_fixes = vec![
            FixStrategy::UpdateSchema {
                patch: SchemaPatch {
                    make_optional: missing.clone(),
                    add_fields: vec![],
                },
            },
            FixStrategy::AddTransformation {
                rule: TransformRule {
                    name: format!("default-{}", missing[0]),
                    kind: TransformKind::DefaultValue {
                        field: missing[0].clone(),
                        value: json!(null),
                    },
                },
            },
            FixStrategy::NotifyHuman {
                message: root_cause.clone(),
            },
        ];

        Diagnosis {
            root_cause,
            confidence: Confidence::High,
            candidate_fixes,
            safety: Safety::Safe,
        }
    }

    fn diagnose_data_type_failure(&self, event: &FailureEvent) -> Diagnosis {
        if let Some(captures) = self.type_mismatch.captures(&event.error_message) {
            let field = captures[1].to_string();
            let expected = captures[2].to_string();
            return Diagnosis {
                root_cause: format!(
                    "Data type mismatch: field '{}' should be {}",
                    field, expected
                ),
                confidence: Confidence::High,
                candidate_fixes: vec![
                    FixStrategy::AddTransformation {
                        rule: TransformRule {
                            name: format!("coerce-{}", field),
                            kind: TransformKind::CoerceNumber { field },
                        },
                    },
                    FixStrategy::NotifyHuman {
                        message: format!("Type mismatch on task '{}'", event.task_id),
                    },
                ],
                safety: Safety::Safe,
            };
        }

        Diagnosis {
            root_cause: "Data type validation failed".to_string(),
            confidence: Confidence::Medium,
            candidate_fixes: vec![FixStrategy::NotifyHuman {
                message: format!(
                    "Type validation failed on task '{}' with no recognizable field pattern",
                    event.task_id
                ),
            }],
            safety: Safety::Risky,
        }
    }

    fn diagnose_connection_failure(&self, event: &FailureEvent) -> Diagnosis {
        Diagnosis {
            root_cause: "Connection failure: service unavailable or network issues".to_string(),
            confidence: Confidence::Medium,
            candidate_fixes: vec![
                FixStrategy::Retry {
                    pipeline_id: event.source_pipeline_id.clone(),
                    task_id: event.task_id.clone(),
                },
                FixStrategy::UpdateConfig {
                    key: "request_timeout_secs".to_string(),
                    value: "60".to_string(),
                },
                FixStrategy::NotifyHuman {
                    message: format!("Repeated connection failures on task '{}'", event.task_id),
                },
            ],
            safety: Safety::Risky,
        }
    }

    fn diagnose_timeout_failure(&self, event: &FailureEvent) -> Diagnosis {
        Diagnosis {
            root_cause: "API timeout: service overloaded or network degraded".to_string(),
            confidence: Confidence::Medium,
            candidate_fixes: vec![
                FixStrategy::UpdateConfig {
                    key: "request_timeout_secs".to_string(),
                    value: "60".to_string(),
                },
                FixStrategy::Retry {
                    pipeline_id: event.source_pipeline_id.clone(),
                    task_id: event.task_id.clone(),
                },
                FixStrategy::NotifyHuman {
                    message: format!("Timeouts on task '{}'", event.task_id),
                },
            ],
            safety: Safety::Risky,
        }
    }

    fn diagnose_unknown_failure(&self, event: &FailureEvent) -> Diagnosis {
        Diagnosis {
            root_cause: "Unknown error pattern".to_string(),
            confidence: Confidence::Low,
            candidate_fixes: vec![FixStrategy::NotifyHuman {
                message: format!(
                    "Unrecognized failure on task '{}': {}",
                    event.task_id, event.error_message
                ),
            }],
            safety: Safety::Risky,
        }
    }
}

#[async_trait]
impl DiagnosisEngine for RuleBasedEngine {
    async fn diagnose(&self, event: &FailureEvent, history: &[Run]) -> Result<Diagnosis> {
        let message = event.error_message.to_lowercase();
        let recurrence = self.recurrence(event, history);
        debug!(task_id = %event.task_id, recurrence, "Pattern diagnosis");

        let diagnosis = match event.error_type {
            ErrorType::SchemaValidation => self.diagnose_schema_failure(event, recurrence),
            ErrorType::DataType => self.diagnose_data_type_failure(event),
            ErrorType::Connection => self.diagnose_connection_failure(event),
            ErrorType::Timeout => self.diagnose_timeout_failure(event),
            ErrorType::Unknown => {
                // The wire tag was unrecognized; fall back to message sniffing
                if message.contains("schema") || message.contains("missing required field") {
                    self.diagnose_schema_failure(event, recurrence)
                } else if message.contains("timeout") {
                    self.diagnose_timeout_failure(event)
                } else if message.contains("connection") {
                    self.diagnose_connection_failure(event)
                } else if self.type_mismatch.is_match(&event.error_message) {
                    self.diagnose_data_type_failure(event)
                } else {
                    self.diagnose_unknown_failure(event)
                }
            }
        };
        Ok(diagnosis)
    }

    fn name(&self) -> &'static str {
        "rules"
    }
}
