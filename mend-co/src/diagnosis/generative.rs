//! Generative-model diagnosis engine
//!
//! Posts the failure context to an OpenAI-compatible chat-completion
//! endpoint and parses a structured assessment out of the reply. The typed
//! candidate strategies always come from the rule engine; the model refines
//! the root cause, confidence, safety, and preferred strategy order. Any
//! transport or parse failure falls back to the rule engine's answer so this
//! backend is never worse than pattern matching.

use super::{DiagnosisEngine, RuleBasedEngine};
use async_trait::async_trait;
use mend_common::error::Result;
use mend_common::model::{Confidence, Diagnosis, FailureEvent, Run, Safety};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_MODEL: &str = "gpt-4";

const SYSTEM_PROMPT: &str = "You are an expert data engineer diagnosing data \
pipeline failures. Reply with a single JSON object with keys: root_cause \
(string), confidence (low|medium|high), remediation_safety \
(safe|risky|unsafe), recommended_strategy (retry|update_schema|\
add_transformation|update_config|notify_human), reasoning (string).";

pub struct GenerativeEngine {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: String,
    fallback: RuleBasedEngine,
}

/// Structured assessment expected in the model reply
#[derive(Debug, Deserialize)]
struct ModelAssessment {
    root_cause: String,
    confidence: Confidence,
    remediation_safety: Safety,
    #[serde(default)]
    recommended_strategy: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

impl GenerativeEngine {
    pub fn new(api_key: String) -> Self {
        Self::with_endpoint(api_key, DEFAULT_ENDPOINT)
    }

    /// Point at a non-default endpoint (self-hosted or proxy deployments)
    pub fn with_endpoint(api_key: String, endpoint: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_key,
            endpoint: endpoint.into(),
            model: DEFAULT_MODEL.to_string(),
            fallback: RuleBasedEngine::new(),
        }
    }

    fn build_prompt(event: &FailureEvent, history: &[Run]) -> String {
        let mut prompt = format!(
            "Analyze the following pipeline failure and provide a diagnosis.\n\n\
             Failure details:\n\
             - Pipeline: {}\n\
             - Task: {}\n\
             - Error type: {}\n\
             - Error message: {}\n\
             - Retry count: {}\n\
             - Occurred at: {}\n",
            event.source_pipeline_id,
            event.task_id,
            event.error_type.as_str(),
            event.error_message,
            event.retry_count,
            event.occurred_at.to_rfc3339(),
        );

        if !history.is_empty() {
            prompt.push_str("\nRecent failure history (newest last):\n");
            for run in history.iter().rev().take(10).rev() {
                prompt.push_str(&format!(
                    "- task {} failed with {}: {}\n",
                    run.event.task_id,
                    run.event.error_type.as_str(),
                    run.event.error_message
                ));
            }
        }
        prompt
    }

    /// Pull the first JSON object out of the completion text
    fn parse_assessment(content: &str) -> Option<ModelAssessment> {
        let start = content.find('{')?;
        let end = content.rfind('}')?;
        if end <= start {
            return None;
        }
        serde_json::from_str(&content[start..=end]).ok()
    }

    /// Fold the model's assessment over the rule-derived baseline
    fn apply_assessment(assessment: ModelAssessment, mut baseline: Diagnosis) -> Diagnosis {
        baseline.root_cause = assessment.root_cause;
        baseline.confidence = assessment.confidence;
        baseline.safety = assessment.remediation_safety;

        if let Some(preferred) = assessment.recommended_strategy {
            if let Some(index) = baseline
                .candidate_fixes
                .iter()
                .position(|fix| fix.kind() == preferred)
            {
                let fix = baseline.candidate_fixes.remove(index);
                baseline.candidate_fixes.insert(0, fix);
            }
        }
        baseline
    }

    async fn complete(&self, prompt: String) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": 0.1,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": prompt},
            ],
        });

        let response: ChatResponse = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                mend_common::Error::DiagnosisUnavailable(format!("backend unreachable: {}", e))
            })?
            .error_for_status()
            .map_err(|e| {
                mend_common::Error::DiagnosisUnavailable(format!("backend error: {}", e))
            })?
            .json()
            .await
            .map_err(|e| {
                mend_common::Error::DiagnosisUnavailable(format!("malformed response: {}", e))
            })?;

        response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| {
                mend_common::Error::DiagnosisUnavailable("empty completion".to_string())
            })
    }
}

#[async_trait]
impl DiagnosisEngine for GenerativeEngine {
    async fn diagnose(&self, event: &FailureEvent, history: &[Run]) -> Result<Diagnosis> {
        let baseline = self.fallback.diagnose(event, history).await?;

        let content = match self.complete(Self::build_prompt(event, history)).await {
            Ok(content) => content,
            Err(e) => {
                warn!("Generative diagnosis failed ({}), using rule-based answer", e);
                return Ok(baseline);
            }
        };

        match Self::parse_assessment(&content) {
            Some(assessment) => {
                debug!(root_cause = %assessment.root_cause, "Model assessment accepted");
                Ok(Self::apply_assessment(assessment, baseline))
            }
            None => {
                warn!("Unparseable model reply, using rule-based answer");
                Ok(baseline)
            }
        }
    }

    fn name(&self) -> &'static str {
        "generative"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mend_common::model::FixStrategy;

    fn baseline() -> Diagnosis {
        Diagnosis {
            root_cause: "Connection failure: service unavailable or network issues".into(),
            confidence: Confidence::Medium,
            candidate_fixes: vec![
                FixStrategy::Retry {
                    pipeline_id: "p".into(),
                    task_id: "t".into(),
                },
                FixStrategy::UpdateConfig {
                    key: "request_timeout_secs".into(),
                    value: "60".into(),
                },
                FixStrategy::NotifyHuman {
                    message: "escalate".into(),
                },
            ],
            safety: Safety::Risky,
        }
    }

    #[test]
    fn parses_json_embedded_in_prose() {
        let content = r#"Here is my analysis:
        {"root_cause": "API rate limiting", "confidence": "high",
         "remediation_safety": "safe", "recommended_strategy": "update_config",
         "reasoning": "429 responses in the log"}
        Let me know if you need more."#;

        let assessment = GenerativeEngine::parse_assessment(content).unwrap();
        assert_eq!(assessment.root_cause, "API rate limiting");
        assert_eq!(assessment.confidence, Confidence::High);
        assert_eq!(assessment.remediation_safety, Safety::Safe);
        assert_eq!(assessment.recommended_strategy.as_deref(), Some("update_config"));
    }

    #[test]
    fn rejects_reply_without_json() {
        assert!(GenerativeEngine::parse_assessment("I could not determine the cause.").is_none());
        assert!(GenerativeEngine::parse_assessment("}{").is_none());
    }

    #[test]
    fn assessment_reorders_candidates() {
        let assessment = ModelAssessment {
            root_cause: "API rate limiting".into(),
            confidence: Confidence::High,
            remediation_safety: Safety::Safe,
            recommended_strategy: Some("update_config".into()),
        };
        let diagnosis = GenerativeEngine::apply_assessment(assessment, baseline());

        assert_eq!(diagnosis.root_cause, "API rate limiting");
        assert_eq!(diagnosis.safety, Safety::Safe);
        assert!(matches!(
            &diagnosis.candidate_fixes[0],
            FixStrategy::UpdateConfig { .. }
        ));
        // Original ordering preserved behind the promoted candidate
        assert!(matches!(&diagnosis.candidate_fixes[1], FixStrategy::Retry { .. }));
    }

    #[test]
    fn unknown_recommendation_keeps_order() {
        let assessment = ModelAssessment {
            root_cause: "x".into(),
            confidence: Confidence::Low,
            remediation_safety: Safety::Risky,
            recommended_strategy: Some("reboot_the_universe".into()),
        };
        let diagnosis = GenerativeEngine::apply_assessment(assessment, baseline());
        assert!(matches!(&diagnosis.candidate_fixes[0], FixStrategy::Retry { .. }));
    }
}
