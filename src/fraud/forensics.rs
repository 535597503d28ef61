//! Signals derived from what the extraction model reports about the
//! document itself rather than from the extracted values.

use crate::models::{ExtractionResult, FraudSignal, Severity, SignalKind};

const TAMPER_MARKERS: &[&str] = &["tamper", "edit", "alter", "manipulat"];
const QUALITY_MARKERS: &[&str] = &["blur", "quality", "glare", "dark", "resolution"];

pub(super) fn signals(extraction: &ExtractionResult) -> Vec<FraudSignal> {
    let mut signals = Vec::new();

    if !extraction.is_identity_document {
        let reason = extraction
            .rejection_reason
            .as_deref()
            .unwrap_or("no reason given");
        signals.push(FraudSignal::new(
            SignalKind::NotIdentityDocument,
            Severity::High,
            format!("Not an identity document: {reason}"),
        ));
    }

    if !extraction.is_readable {
        signals.push(FraudSignal::new(
            SignalKind::Unreadable,
            Severity::Medium,
            "Document is not fully readable",
        ));
    }

    for issue in &extraction.quality_issues {
        signals.push(FraudSignal::new(
            SignalKind::QualityIssue,
            quality_severity(issue),
            format!("Image quality: {issue}"),
        ));
    }

    let Some(report) = &extraction.forensics else {
        return signals;
    };

    if let Some(score) = report.validity_score {
        let severity = if score < 0.4 {
            Some(Severity::High)
        } else if score < 0.6 {
            Some(Severity::Medium)
        } else {
            None
        };
        if let Some(severity) = severity {
            let mut description = format!("Low document validity score ({score:.2})");
            if !report.reasoning.is_empty() {
                description.push_str(": ");
                description.push_str(&report.reasoning);
            }
            signals.push(FraudSignal::new(
                SignalKind::LowValidityScore,
                severity,
                description,
            ));
        }
    }

    if !report.genuine_appearance {
        signals.push(FraudSignal::new(
            SignalKind::VisualAnomaly,
            Severity::High,
            "Document does not appear genuine",
        ));
    }

    for element in &report.suspicious_elements {
        signals.push(FraudSignal::new(
            SignalKind::SuspiciousElement,
            Severity::Medium,
            format!("Suspicious: {element}"),
        ));
    }

    for alteration in &report.alterations {
        signals.push(FraudSignal::new(
            SignalKind::Alteration,
            Severity::High,
            format!("Tampering detected: {alteration}"),
        ));
    }

    signals
}

fn quality_severity(issue: &str) -> Severity {
    let lower = issue.to_lowercase();
    if TAMPER_MARKERS.iter().any(|m| lower.contains(m)) {
        Severity::High
    } else if QUALITY_MARKERS.iter().any(|m| lower.contains(m)) {
        Severity::Low
    } else {
        Severity::Medium
    }
}
