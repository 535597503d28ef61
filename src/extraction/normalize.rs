//! Maps the model's loosely-typed reply onto `ExtractionResult`.
//!
//! Noise inside a well-formed reply (out-of-range or missing confidence,
//! odd value types) is repaired. A reply that is empty, not JSON, or has
//! no extracted fields is `Malformed`, unless the model explicitly says
//! the image is not a readable identity document.

use crate::error::CollaboratorError;
use crate::models::{clamp_unit, ExtractedField, ExtractionResult, ForensicReport};
use crate::validation::{normalize_document_type, DocumentKind};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const UNKNOWN_DOCUMENT_TYPE: &str = "unknown";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawExtraction {
    document_type: Option<String>,
    fields: Option<Map<String, Value>>,
    is_readable: Option<bool>,
    is_identity_document: Option<bool>,
    rejection_reason: Option<String>,
    quality_issues: Vec<String>,
    forensics: Option<RawForensics>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawForensics {
    genuine_appearance: Option<bool>,
    validity_score: Option<f64>,
    reasoning: Option<String>,
    suspicious_elements: Vec<String>,
    alterations: Vec<String>,
    security_features: Vec<String>,
}

/// Strips a Markdown code fence, or any prose around the outermost JSON
/// object, from a model reply.
pub fn strip_fence(text: &str) -> &str {
    let text = text.trim();
    if let Some(start) = text.find("```json") {
        let rest = &text[start + "```json".len()..];
        return rest.split("```").next().unwrap_or(rest).trim();
    }
    if let Some(start) = text.find("```") {
        let rest = &text[start + 3..];
        return rest.split("```").next().unwrap_or(rest).trim();
    }
    match (text.find('{'), text.rfind('}')) {
        (Some(open), Some(close)) if open < close => &text[open..=close],
        _ => text,
    }
}

pub fn parse_response(
    text: &str,
    hint: Option<&str>,
) -> Result<ExtractionResult, CollaboratorError> {
    let body = strip_fence(text);
    if body.is_empty() {
        return Err(CollaboratorError::Malformed("empty reply".to_string()));
    }

    let raw: RawExtraction = serde_json::from_str(body)
        .map_err(|e| CollaboratorError::Malformed(format!("reply is not valid JSON: {e}")))?;

    let classified = raw
        .document_type
        .as_deref()
        .map(normalize_document_type)
        .filter(|t| !t.is_empty());

    let fields: BTreeMap<String, ExtractedField> = raw
        .fields
        .unwrap_or_default()
        .into_iter()
        .filter(|(name, _)| !name.trim().is_empty())
        .map(|(name, entry)| (name, normalize_field(entry)))
        .collect();

    let declined = raw.is_identity_document == Some(false) || raw.is_readable == Some(false);
    if fields.is_empty() && !declined {
        return Err(CollaboratorError::Malformed(
            "reply carries no extracted fields".to_string(),
        ));
    }

    // A recognised hint is a manual override of the model's classification.
    let document_type = match hint.and_then(DocumentKind::parse) {
        Some(kind) => kind.as_str().to_string(),
        None => classified.unwrap_or_else(|| UNKNOWN_DOCUMENT_TYPE.to_string()),
    };

    let forensics = raw.forensics.map(|f| ForensicReport {
        genuine_appearance: f.genuine_appearance.unwrap_or(true),
        validity_score: f.validity_score.map(clamp_unit),
        reasoning: f.reasoning.unwrap_or_default(),
        suspicious_elements: f.suspicious_elements,
        alterations: f.alterations,
        security_features: f.security_features,
    });

    Ok(ExtractionResult {
        document_type,
        fields,
        is_readable: raw.is_readable.unwrap_or(true),
        is_identity_document: raw.is_identity_document.unwrap_or(true),
        rejection_reason: raw.rejection_reason.filter(|r| !r.trim().is_empty()),
        quality_issues: raw.quality_issues,
        forensics,
    })
}

fn normalize_field(entry: Value) -> ExtractedField {
    match entry {
        Value::Object(mut map) => {
            let value = map.remove("value").map(scalar_text).unwrap_or_default();
            let confidence = map.get("confidence").and_then(number).unwrap_or(0.0);
            ExtractedField::new(value, confidence)
        }
        other => ExtractedField::new(scalar_text(other), 0.0),
    }
}

fn scalar_text(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
