//! Remediation strategy selection
//!
//! Pure policy function from a diagnosis and the configuration flags to one
//! of AutoApply / AwaitApproval / Escalate. First matching row wins:
//!
//! | safety | require_human_approval | auto_fix_enabled | decision        |
//! |--------|------------------------|------------------|-----------------|
//! | unsafe | any                    | any              | Escalate        |
//! | risky  | true                   | any              | AwaitApproval   |
//! | risky  | false                  | true             | AutoApply       |
//! | risky  | false                  | false            | Escalate        |
//! | safe   | true                   | any              | AwaitApproval   |
//! | safe   | false                  | true             | AutoApply       |
//! | safe   | false                  | false            | Escalate        |

use mend_common::model::{Diagnosis, FixStrategy, Safety};

/// Configuration flags consumed by the selector
#[derive(Debug, Clone, Copy)]
pub struct RemediationFlags {
    pub auto_fix_enabled: bool,
    pub require_human_approval: bool,
}

/// The selector's verdict for one diagnosis
#[derive(Debug, Clone, PartialEq)]
pub enum RemediationDecision {
    /// Apply the strategy without waiting for a human
    AutoApply(FixStrategy),
    /// Hold the strategy at the approval gate
    AwaitApproval(FixStrategy),
    /// Route to human notification; no automated fix
    Escalate,
}

/// Select a remediation decision for a diagnosis
///
/// The top candidate is the first element of `candidate_fixes` (the engine
/// orders by preference). Escalate ignores the candidate list entirely.
pub fn select(diagnosis: &Diagnosis, flags: &RemediationFlags) -> RemediationDecision {
    if diagnosis.safety == Safety::Unsafe {
        return RemediationDecision::Escalate;
    }

    // The engine contract guarantees a non-empty list; stay total anyway
    let top = match diagnosis.candidate_fixes.first() {
        Some(strategy) => strategy.clone(),
        None => return RemediationDecision::Escalate,
    };

    if flags.require_human_approval {
        RemediationDecision::AwaitApproval(top)
    } else if flags.auto_fix_enabled {
        RemediationDecision::AutoApply(top)
    } else {
        RemediationDecision::Escalate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mend_common::model::{Confidence, SchemaPatch};

    fn diagnosis(safety: Safety) -> Diagnosis {
        Diagnosis {
            root_cause: "Schema mismatch: missing required fields: department".into(),
            confidence: Confidence::High,
            candidate_fixes: vec![
                FixStrategy::UpdateSchema {
                    patch: SchemaPatch {
                        make_optional: vec!["department".into()],
                        add_fields: vec![],
                    },
                },
                FixStrategy::NotifyHuman {
                    message: "escalate".into(),
                },
            ],
            safety,
        }
    }

    fn flags(require_human_approval: bool, auto_fix_enabled: bool) -> RemediationFlags {
        RemediationFlags {
            auto_fix_enabled,
            require_human_approval,
        }
    }

    #[test]
    fn unsafe_always_escalates() {
        for (approval, auto_fix) in [(false, false), (false, true), (true, false), (true, true)] {
            assert_eq!(
                select(&diagnosis(Safety::Unsafe), &flags(approval, auto_fix)),
                RemediationDecision::Escalate
            );
        }
    }

    #[test]
    fn approval_flag_gates_both_risk_levels() {
        for safety in [Safety::Safe, Safety::Risky] {
            for auto_fix in [false, true] {
                match select(&diagnosis(safety), &flags(true, auto_fix)) {
                    RemediationDecision::AwaitApproval(FixStrategy::UpdateSchema { .. }) => {}
                    other => panic!("expected AwaitApproval(UpdateSchema), got {:?}", other),
                }
            }
        }
    }

    #[test]
    fn auto_fix_applies_top_candidate() {
        for safety in [Safety::Safe, Safety::Risky] {
            match select(&diagnosis(safety), &flags(false, true)) {
                RemediationDecision::AutoApply(FixStrategy::UpdateSchema { .. }) => {}
                other => panic!("expected AutoApply(UpdateSchema), got {:?}", other),
            }
        }
    }

    #[test]
    fn no_auto_fix_and_no_gate_escalates() {
        for safety in [Safety::Safe, Safety::Risky] {
            assert_eq!(
                select(&diagnosis(safety), &flags(false, false)),
                RemediationDecision::Escalate
            );
        }
    }

    #[test]
    fn empty_candidate_list_escalates() {
        let empty = Diagnosis {
            candidate_fixes: vec![],
            ..diagnosis(Safety::Safe)
        };
        assert_eq!(
            select(&empty, &flags(false, true)),
            RemediationDecision::Escalate
        );
    }
}
