//! Fraud Signal Detector
//!
//! Heuristics over an extraction result and the validation issues raised
//! against it. Every rule is evaluated independently and all matches are
//! emitted; the request's fraud flag is derived from the output.

mod forensics;

use crate::config::Thresholds;
use crate::models::{ExtractionResult, FraudSignal, Severity, SignalKind};
use crate::validation::ValidationIssue;

pub struct FraudSignalDetector {
    thresholds: Thresholds,
    use_forensics: bool,
}

impl FraudSignalDetector {
    pub fn new(thresholds: Thresholds, use_forensics: bool) -> Self {
        Self {
            thresholds,
            use_forensics,
        }
    }

    /// Detect fraud signals for one extraction
    pub fn detect(
        &self,
        extraction: &ExtractionResult,
        issues: &[ValidationIssue],
    ) -> Vec<FraudSignal> {
        let mut signals = Vec::new();

        for issue in issues.iter().filter(|i| i.is_identifier_failure()) {
            signals.push(FraudSignal::new(
                SignalKind::IdentifierCheck,
                Severity::High,
                format!("Identifier check failed: {}", issue.message),
            ));
        }

        if let Some(signal) = self.check_mean_confidence(extraction) {
            signals.push(signal);
        }
        signals.extend(self.check_inconsistent_fields(extraction));
        signals.extend(check_mixed_scripts(extraction));

        if self.use_forensics {
            signals.extend(forensics::signals(extraction));
        }

        log::debug!(
            "Fraud detection for {} produced {} signal(s)",
            extraction.document_type,
            signals.len()
        );
        signals
    }

    /// Only the higher severity is kept when both confidence bars are crossed.
    fn check_mean_confidence(&self, extraction: &ExtractionResult) -> Option<FraudSignal> {
        let mean = extraction.mean_confidence();
        if mean < self.thresholds.very_low_confidence {
            Some(FraudSignal::new(
                SignalKind::LowConfidence,
                Severity::High,
                format!("Very low overall extraction confidence ({mean:.2})"),
            ))
        } else if mean < self.thresholds.low_confidence {
            Some(FraudSignal::new(
                SignalKind::LowConfidence,
                Severity::Medium,
                format!("Low overall extraction confidence ({mean:.2})"),
            ))
        } else {
            None
        }
    }

    fn check_inconsistent_fields(&self, extraction: &ExtractionResult) -> Vec<FraudSignal> {
        let any_clear = extraction
            .fields
            .values()
            .any(|f| f.confidence >= self.thresholds.consistent_confidence);
        if !any_clear {
            return Vec::new();
        }

        extraction
            .fields
            .iter()
            .filter(|(_, f)| f.confidence < self.thresholds.very_low_confidence)
            .map(|(name, f)| {
                FraudSignal::new(
                    SignalKind::InconsistentExtraction,
                    Severity::Low,
                    format!(
                        "Field '{}' read with confidence {:.2} while other fields are clear",
                        name, f.confidence
                    ),
                )
            })
            .collect()
    }
}

fn check_mixed_scripts(extraction: &ExtractionResult) -> Option<FraudSignal> {
    let name = extraction.field_value("name")?;
    let has_devanagari = name.chars().any(|c| ('\u{0900}'..='\u{097F}').contains(&c));
    let has_latin = name.chars().any(|c| c.is_ascii_alphabetic());

    if has_devanagari && has_latin && name.chars().count() > 20 {
        Some(FraudSignal::new(
            SignalKind::MixedScripts,
            Severity::Low,
            "Name mixes Devanagari and Latin script",
        ))
    } else {
        None
    }
}
