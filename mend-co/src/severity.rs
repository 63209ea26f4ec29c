//! Severity classification for failure events
//!
//! Pure function over the event and recent history; rules are evaluated in
//! order and the first match wins. Every event yields exactly one
//! assessment, so the coordinator has no error path here.

use mend_common::model::{ErrorType, FailureEvent, Run, SeverityAssessment, SeverityTier};

/// Classifier tuning knobs
#[derive(Debug, Clone)]
pub struct ClassifierPolicy {
    /// Connection failures at or above this retry count are high severity
    pub max_retries: u32,
    /// Runs of history considered when counting recurrences
    pub lookback_window: usize,
}

impl Default for ClassifierPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            lookback_window: 5,
        }
    }
}

/// Occurrences of the same `(task_id, error_type)` within the lookback
/// window, counting the current event
fn occurrence_count(event: &FailureEvent, history: &[Run], window: usize) -> usize {
    let prior = history
        .iter()
        .rev()
        .take(window)
        .filter(|run| {
            run.event.task_id == event.task_id && run.event.error_type == event.error_type
        })
        .count();
    prior + 1
}

/// Classify a failure event against recent history
pub fn classify(
    event: &FailureEvent,
    history: &[Run],
    policy: &ClassifierPolicy,
) -> SeverityAssessment {
    // Rule 1: recurring schema drift on the same task
    if event.error_type == ErrorType::SchemaValidation {
        let occurrences = occurrence_count(event, history, policy.lookback_window);
        if occurrences >= 3 {
            return SeverityAssessment {
                tier: SeverityTier::Critical,
                intervene: true,
                rationale: format!(
                    "recurring schema drift: occurrence {} for task '{}' within the last {} runs",
                    occurrences, event.task_id, policy.lookback_window
                ),
            };
        }
    }

    // Rules 2 and 3: connection failures, gated on the retry budget
    if event.error_type == ErrorType::Connection {
        if event.retry_count >= policy.max_retries {
            return SeverityAssessment {
                tier: SeverityTier::High,
                intervene: true,
                rationale: format!(
                    "connection failure exhausted {} of {} retries",
                    event.retry_count, policy.max_retries
                ),
            };
        }
        return SeverityAssessment {
            tier: SeverityTier::Low,
            intervene: false,
            rationale: format!(
                "connection failure at retry {} of {}, upstream scheduler retries",
                event.retry_count, policy.max_retries
            ),
        };
    }

    // Rule 4: schema and type failures are common and fixable
    if matches!(
        event.error_type,
        ErrorType::SchemaValidation | ErrorType::DataType
    ) {
        return SeverityAssessment {
            tier: SeverityTier::Medium,
            intervene: true,
            rationale: format!(
                "{} failure on task '{}', automated remediation viable",
                event.error_type.as_str(),
                event.task_id
            ),
        };
    }

    // Rule 5: everything else
    SeverityAssessment {
        tier: SeverityTier::Medium,
        intervene: true,
        rationale: "unknown failure mode, conservative intervention".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mend_common::model::RunState;

    fn event(error_type: ErrorType, task_id: &str, retry_count: u32) -> FailureEvent {
        FailureEvent {
            source_pipeline_id: "self_healing_pipeline".into(),
            task_id: task_id.into(),
            error_type,
            error_message: "boom".into(),
            occurred_at: Utc::now(),
            retry_count,
        }
    }

    fn terminal_run(error_type: ErrorType, task_id: &str) -> Run {
        let mut run = Run::new(event(error_type, task_id, 0));
        run.transition_to(RunState::MonitoredOnly);
        run
    }

    #[test]
    fn recurring_schema_drift_is_critical() {
        let history = vec![
            terminal_run(ErrorType::SchemaValidation, "validate_schema"),
            terminal_run(ErrorType::SchemaValidation, "validate_schema"),
        ];
        let assessment = classify(
            &event(ErrorType::SchemaValidation, "validate_schema", 0),
            &history,
            &ClassifierPolicy::default(),
        );
        assert_eq!(assessment.tier, SeverityTier::Critical);
        assert!(assessment.intervene);
        assert!(assessment.rationale.contains("recurring schema drift"));
    }

    #[test]
    fn second_schema_occurrence_is_not_critical() {
        let history = vec![terminal_run(ErrorType::SchemaValidation, "validate_schema")];
        let assessment = classify(
            &event(ErrorType::SchemaValidation, "validate_schema", 0),
            &history,
            &ClassifierPolicy::default(),
        );
        assert_eq!(assessment.tier, SeverityTier::Medium);
        assert!(assessment.intervene);
    }

    #[test]
    fn occurrences_outside_lookback_window_do_not_count() {
        // Two old schema failures pushed out of the window by newer runs
        let mut history = vec![
            terminal_run(ErrorType::SchemaValidation, "validate_schema"),
            terminal_run(ErrorType::SchemaValidation, "validate_schema"),
        ];
        for _ in 0..5 {
            history.push(terminal_run(ErrorType::Connection, "fetch_api_data"));
        }
        let assessment = classify(
            &event(ErrorType::SchemaValidation, "validate_schema", 0),
            &history,
            &ClassifierPolicy::default(),
        );
        assert_eq!(assessment.tier, SeverityTier::Medium);
    }

    #[test]
    fn recurrence_on_other_task_does_not_count() {
        let history = vec![
            terminal_run(ErrorType::SchemaValidation, "load_data"),
            terminal_run(ErrorType::SchemaValidation, "load_data"),
        ];
        let assessment = classify(
            &event(ErrorType::SchemaValidation, "validate_schema", 0),
            &history,
            &ClassifierPolicy::default(),
        );
        assert_eq!(assessment.tier, SeverityTier::Medium);
    }

    #[test]
    fn connection_below_retry_budget_is_monitored_only() {
        let assessment = classify(
            &event(ErrorType::Connection, "fetch_api_data", 1),
            &[],
            &ClassifierPolicy::default(),
        );
        assert_eq!(assessment.tier, SeverityTier::Low);
        assert!(!assessment.intervene);
    }

    #[test]
    fn connection_at_retry_budget_is_high() {
        let assessment = classify(
            &event(ErrorType::Connection, "fetch_api_data", 3),
            &[],
            &ClassifierPolicy::default(),
        );
        assert_eq!(assessment.tier, SeverityTier::High);
        assert!(assessment.intervene);
    }

    #[test]
    fn data_type_failure_is_medium() {
        let assessment = classify(
            &event(ErrorType::DataType, "transform_data", 0),
            &[],
            &ClassifierPolicy::default(),
        );
        assert_eq!(assessment.tier, SeverityTier::Medium);
        assert!(assessment.intervene);
    }

    #[test]
    fn unknown_failure_mode_intervenes_conservatively() {
        for error_type in [ErrorType::Timeout, ErrorType::Unknown] {
            let assessment = classify(&event(error_type, "load_data", 0), &[], &ClassifierPolicy::default());
            assert_eq!(assessment.tier, SeverityTier::Medium);
            assert!(assessment.intervene);
        }
        let unknown = classify(
            &event(ErrorType::Unknown, "load_data", 0),
            &[],
            &ClassifierPolicy::default(),
        );
        assert_eq!(
            unknown.rationale,
            "unknown failure mode, conservative intervention"
        );
    }
}
