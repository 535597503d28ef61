//! Shared data model for verification requests, extraction results,
//! fraud signals and the decision audit trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a verification request.
///
/// `Processing` is the only non-terminal state; a request leaves it exactly
/// once, for either `Completed` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Processing,
    Completed,
    Failed,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Processing => "PROCESSING",
            RequestStatus::Completed => "COMPLETED",
            RequestStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestStatus::Processing)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PROCESSING" => Ok(RequestStatus::Processing),
            "COMPLETED" => Ok(RequestStatus::Completed),
            "FAILED" => Ok(RequestStatus::Failed),
            other => Err(format!("unknown request status: {other}")),
        }
    }
}

/// APPROVE / REVIEW / REJECT. Used both for the system recommendation and
/// for the officer's final decision, so the two compare directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Approve,
    Review,
    Reject,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Approve => "APPROVE",
            Verdict::Review => "REVIEW",
            Verdict::Reject => "REJECT",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verdict {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "APPROVE" => Ok(Verdict::Approve),
            "REVIEW" => Ok(Verdict::Review),
            "REJECT" => Ok(Verdict::Reject),
            other => Err(format!("unknown verdict: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
        };
        f.write_str(s)
    }
}

/// One extracted value with the model's self-reported certainty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedField {
    pub value: String,
    pub confidence: f64,
}

impl ExtractedField {
    /// Builds a field, forcing the confidence into [0, 1]. NaN becomes 0.
    pub fn new(value: impl Into<String>, confidence: f64) -> Self {
        Self {
            value: value.into(),
            confidence: clamp_unit(confidence),
        }
    }
}

pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Forensic observations reported by the extraction model itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForensicReport {
    pub genuine_appearance: bool,
    pub validity_score: Option<f64>,
    pub reasoning: String,
    pub suspicious_elements: Vec<String>,
    pub alterations: Vec<String>,
    pub security_features: Vec<String>,
}

/// Normalized output of the extraction step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub document_type: String,
    pub fields: BTreeMap<String, ExtractedField>,
    pub is_readable: bool,
    pub is_identity_document: bool,
    pub rejection_reason: Option<String>,
    pub quality_issues: Vec<String>,
    pub forensics: Option<ForensicReport>,
}

impl ExtractionResult {
    pub fn new(document_type: impl Into<String>, fields: BTreeMap<String, ExtractedField>) -> Self {
        Self {
            document_type: document_type.into(),
            fields,
            is_readable: true,
            is_identity_document: true,
            rejection_reason: None,
            quality_issues: Vec::new(),
            forensics: None,
        }
    }

    /// Mean confidence across all fields; an empty extraction scores 0.
    pub fn mean_confidence(&self) -> f64 {
        if self.fields.is_empty() {
            return 0.0;
        }
        let total: f64 = self.fields.values().map(|f| f.confidence).sum();
        total / self.fields.len() as f64
    }

    pub fn field_value(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(|f| f.value.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalKind {
    IdentifierCheck,
    LowConfidence,
    InconsistentExtraction,
    MixedScripts,
    NotIdentityDocument,
    VisualAnomaly,
    LowValidityScore,
    Alteration,
    SuspiciousElement,
    Unreadable,
    QualityIssue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudSignal {
    pub kind: SignalKind,
    pub description: String,
    pub severity: Severity,
}

impl FraudSignal {
    pub fn new(kind: SignalKind, severity: Severity, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
            severity,
        }
    }
}

/// True iff at least one signal is HIGH.
pub fn fraud_flag(signals: &[FraudSignal]) -> bool {
    signals.iter().any(|s| s.severity == Severity::High)
}

/// Result payload stored alongside a COMPLETED request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredResult {
    pub extraction: ExtractionResult,
    pub validation_errors: Vec<String>,
    pub fraud_signals: Vec<FraudSignal>,
    pub explanation: String,
    pub mean_confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationRequest {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub status: RequestStatus,
    pub document_type: Option<String>,
    pub fraud_flag: bool,
    pub recommendation: Option<Verdict>,
    pub diagnostic: Option<String>,
    pub result: Option<ScoredResult>,
}

/// Response body of a completed verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub request_id: String,
    pub status: RequestStatus,
    pub document_type: String,
    pub confidence_score: f64,
    pub fields: BTreeMap<String, ExtractedField>,
    pub validation_errors: Vec<String>,
    pub fraud_signals: Vec<FraudSignal>,
    pub fraud_flag: bool,
    pub recommendation: Verdict,
    pub explanation: String,
}

impl VerificationReport {
    pub fn from_scored(request_id: &str, recommendation: Verdict, scored: &ScoredResult) -> Self {
        Self {
            request_id: request_id.to_string(),
            status: RequestStatus::Completed,
            document_type: scored.extraction.document_type.clone(),
            confidence_score: scored.mean_confidence,
            fields: scored.extraction.fields.clone(),
            validation_errors: scored.validation_errors.clone(),
            fraud_signals: scored.fraud_signals.clone(),
            fraud_flag: fraud_flag(&scored.fraud_signals),
            recommendation,
            explanation: scored.explanation.clone(),
        }
    }
}

/// One officer decision. Never updated once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLog {
    pub id: String,
    pub request_id: Option<String>,
    pub officer_id: Option<String>,
    pub officer_decision: Verdict,
    pub was_overridden: bool,
    pub override_reason: Option<String>,
    pub latency_ms: u64,
    pub created_at: DateTime<Utc>,
    /// Document type of the referenced request, filled in when listing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditPage {
    pub logs: Vec<AuditLog>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Officer,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Officer => "OFFICER",
            Role::Admin => "ADMIN",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "OFFICER" => Ok(Role::Officer),
            "ADMIN" => Ok(Role::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Officer {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub department: Option<String>,
    pub role: Role,
    pub is_active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_confidence_is_clamped() {
        assert_eq!(ExtractedField::new("x", 1.7).confidence, 1.0);
        assert_eq!(ExtractedField::new("x", -0.2).confidence, 0.0);
        assert_eq!(ExtractedField::new("x", f64::NAN).confidence, 0.0);
        assert_eq!(ExtractedField::new("x", 0.42).confidence, 0.42);
    }

    #[test]
    fn test_mean_confidence() {
        let mut fields = BTreeMap::new();
        fields.insert("name".to_string(), ExtractedField::new("A", 0.9));
        fields.insert("dob".to_string(), ExtractedField::new("B", 0.7));
        let extraction = ExtractionResult::new("pan", fields);
        assert!((extraction.mean_confidence() - 0.8).abs() < 1e-9);

        let empty = ExtractionResult::new("unknown", BTreeMap::new());
        assert_eq!(empty.mean_confidence(), 0.0);
    }

    #[test]
    fn test_verdict_parsing_and_wire_names() {
        assert_eq!("approve".parse::<Verdict>().unwrap(), Verdict::Approve);
        assert!("maybe".parse::<Verdict>().is_err());
        assert_eq!(
            serde_json::to_string(&Verdict::Reject).unwrap(),
            "\"REJECT\""
        );
        assert_eq!(
            serde_json::to_string(&RequestStatus::Processing).unwrap(),
            "\"PROCESSING\""
        );
    }

    #[test]
    fn test_fraud_flag_requires_high() {
        let medium = FraudSignal::new(SignalKind::LowConfidence, Severity::Medium, "m");
        let high = FraudSignal::new(SignalKind::IdentifierCheck, Severity::High, "h");
        assert!(!fraud_flag(&[medium.clone()]));
        assert!(fraud_flag(&[medium, high]));
        assert!(!fraud_flag(&[]));
    }
}
