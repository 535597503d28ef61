//! Recommendation Engine
//!
//! Collapses validation issues and fraud signals into a single verdict.
//! Rules are evaluated top-down and the first match wins.

use crate::config::Thresholds;
use crate::models::{FraudSignal, Severity, Verdict};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionRule {
    HighSeveritySignal,
    ValidationErrors,
    LesserSignals,
    HighConfidence,
    ModerateConfidence,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub verdict: Verdict,
    pub rule: DecisionRule,
    pub explanation: String,
}

pub struct RecommendationEngine {
    thresholds: Thresholds,
}

impl RecommendationEngine {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    pub fn recommend(
        &self,
        mean_confidence: f64,
        validation_errors: &[String],
        signals: &[FraudSignal],
    ) -> Recommendation {
        let high: Vec<&FraudSignal> = signals
            .iter()
            .filter(|s| s.severity == Severity::High)
            .collect();

        if let Some(first) = high.first() {
            let explanation = if high.len() == 1 {
                format!("Rejected: {}", first.description)
            } else {
                format!(
                    "Rejected: {} (and {} more high-severity signal(s))",
                    first.description,
                    high.len() - 1
                )
            };
            return self.build(Verdict::Reject, DecisionRule::HighSeveritySignal, explanation);
        }

        if !validation_errors.is_empty() {
            return self.build(
                Verdict::Review,
                DecisionRule::ValidationErrors,
                format!(
                    "Manual review: {} validation error(s), first: {}",
                    validation_errors.len(),
                    validation_errors[0]
                ),
            );
        }

        if let Some(worst) = signals.iter().max_by_key(|s| s.severity) {
            return self.build(
                Verdict::Review,
                DecisionRule::LesserSignals,
                format!(
                    "Manual review: {} {} signal(s), most severe: {}",
                    signals.len(),
                    worst.severity,
                    worst.description
                ),
            );
        }

        if mean_confidence >= self.thresholds.approve_confidence {
            return self.build(
                Verdict::Approve,
                DecisionRule::HighConfidence,
                format!("Approved: all checks passed with confidence {mean_confidence:.2}"),
            );
        }

        self.build(
            Verdict::Review,
            DecisionRule::ModerateConfidence,
            format!(
                "Manual review: confidence {:.2} is below the approval bar of {:.2}",
                mean_confidence, self.thresholds.approve_confidence
            ),
        )
    }

    fn build(&self, verdict: Verdict, rule: DecisionRule, explanation: String) -> Recommendation {
        log::debug!("Recommendation {} via {:?}", verdict, rule);
        Recommendation {
            verdict,
            rule,
            explanation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SignalKind;

    fn engine() -> RecommendationEngine {
        RecommendationEngine::new(Thresholds::default())
    }

    fn signal(severity: Severity) -> FraudSignal {
        FraudSignal::new(SignalKind::LowConfidence, severity, format!("{severity} signal"))
    }

    #[test]
    fn test_clean_high_confidence_approves() {
        let r = engine().recommend(0.92, &[], &[]);
        assert_eq!(r.verdict, Verdict::Approve);
        assert_eq!(r.rule, DecisionRule::HighConfidence);
    }

    #[test]
    fn test_approval_bar_is_inclusive() {
        assert_eq!(engine().recommend(0.8, &[], &[]).verdict, Verdict::Approve);
        let r = engine().recommend(0.79, &[], &[]);
        assert_eq!(r.verdict, Verdict::Review);
        assert_eq!(r.rule, DecisionRule::ModerateConfidence);
    }

    #[test]
    fn test_high_signal_wins_over_everything() {
        let errors = vec!["Tax ID must be in format ABCDE1234F".to_string()];
        let r = engine().recommend(0.99, &errors, &[signal(Severity::Low), signal(Severity::High)]);
        assert_eq!(r.verdict, Verdict::Reject);
        assert_eq!(r.rule, DecisionRule::HighSeveritySignal);
        assert!(r.explanation.contains("HIGH signal"));
    }

    #[test]
    fn test_validation_errors_force_review() {
        let errors = vec!["Tax ID must be in format ABCDE1234F".to_string()];
        let r = engine().recommend(0.95, &errors, &[]);
        assert_eq!(r.verdict, Verdict::Review);
        assert_eq!(r.rule, DecisionRule::ValidationErrors);
        assert!(r.explanation.contains("ABCDE1234F"));
    }

    #[test]
    fn test_lesser_signals_force_review() {
        let r = engine().recommend(0.95, &[], &[signal(Severity::Low), signal(Severity::Medium)]);
        assert_eq!(r.verdict, Verdict::Review);
        assert_eq!(r.rule, DecisionRule::LesserSignals);
        assert!(r.explanation.contains("MEDIUM"));
    }

    #[test]
    fn test_configured_threshold_is_used() {
        let thresholds = Thresholds {
            approve_confidence: 0.95,
            ..Thresholds::default()
        };
        let r = RecommendationEngine::new(thresholds).recommend(0.9, &[], &[]);
        assert_eq!(r.verdict, Verdict::Review);
    }
}
