//! Rule-based format validation of extracted document fields.
//!
//! Rules are deterministic and keyed by document type. Malformed extracted
//! data never aborts the pipeline; it becomes a validation issue instead.

pub mod checksum;

use crate::models::ExtractedField;
use chrono::{Datelike, NaiveDate, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

lazy_static! {
    static ref NATIONAL_ID: Regex = Regex::new(r"^\d{12}$").unwrap();
    static ref TAX_ID: Regex = Regex::new(r"^[A-Z]{5}[0-9]{4}[A-Z]$").unwrap();
    static ref DRIVING_LICENSE: Regex =
        Regex::new(r"^([A-Z]{2})(\d{2})(\d{4})(\d{7})$").unwrap();
    static ref VOTER_ID: Regex = Regex::new(r"^[A-Z]{3}\d{7}$").unwrap();
    static ref PASSPORT: Regex = Regex::new(r"^[A-Z][0-9]{7}$").unwrap();
    static ref NAME_SUSPICIOUS: Regex =
        Regex::new(r"[0-9@#$%^&*()_+=\[\]{}|\\<>]").unwrap();
}

/// Fourth character of a tax ID encodes the holder type.
const TAX_ID_HOLDER_TYPES: &str = "PCHFATBLJG";

const STATE_CODES: &[&str] = &[
    "AN", "AP", "AR", "AS", "BR", "CG", "CH", "DD", "DL", "DN", "GA", "GJ", "HP", "HR", "JH",
    "JK", "KA", "KL", "LA", "LD", "MH", "ML", "MN", "MP", "MZ", "NL", "OD", "OR", "PB", "PY",
    "RJ", "SK", "TN", "TR", "TS", "UK", "UP", "WB",
];

const DOB_FORMATS: &[&str] = &["%d-%m-%Y", "%d/%m/%Y", "%Y-%m-%d", "%d %b %Y", "%d %B %Y"];

/// Field names the identifier may arrive under, checked in order.
const IDENTIFIER_FIELDS: &[&str] = &["id_number", "document_number", "number"];

/// Document types with format rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    /// 12-digit national ID (aadhaar) with a Verhoeff check digit.
    NationalId,
    /// 10-character tax ID (pan).
    TaxId,
    DrivingLicense,
    VoterId,
    Passport,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 5] = [
        DocumentKind::NationalId,
        DocumentKind::TaxId,
        DocumentKind::DrivingLicense,
        DocumentKind::VoterId,
        DocumentKind::Passport,
    ];

    /// Maps a classified document type onto a rule set. Returns `None` for
    /// anything without rules, including `"unknown"`.
    pub fn parse(document_type: &str) -> Option<Self> {
        match normalize_document_type(document_type).as_str() {
            "aadhaar" | "aadhar" | "national_id" => Some(DocumentKind::NationalId),
            "pan" | "pan_card" | "tax_id" => Some(DocumentKind::TaxId),
            "driving_license" | "driving_licence" | "drivers_license" | "dl" => {
                Some(DocumentKind::DrivingLicense)
            }
            "voter_id" | "epic" => Some(DocumentKind::VoterId),
            "passport" => Some(DocumentKind::Passport),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::NationalId => "aadhaar",
            DocumentKind::TaxId => "pan",
            DocumentKind::DrivingLicense => "driving_license",
            DocumentKind::VoterId => "voter_id",
            DocumentKind::Passport => "passport",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            DocumentKind::NationalId => "National ID number",
            DocumentKind::TaxId => "Tax ID",
            DocumentKind::DrivingLicense => "Driving licence number",
            DocumentKind::VoterId => "Voter ID",
            DocumentKind::Passport => "Passport number",
        }
    }

    pub fn identifier_format(&self) -> &'static str {
        match self {
            DocumentKind::NationalId => "12 digits, Verhoeff check digit last",
            DocumentKind::TaxId => "ABCDE1234F (5 letters, 4 digits, 1 letter)",
            DocumentKind::DrivingLicense => "SS RR YYYY NNNNNNN (state, RTO, year, serial)",
            DocumentKind::VoterId => "ABC1234567 (3 letters, 7 digits)",
            DocumentKind::Passport => "A1234567 (1 letter, 7 digits)",
        }
    }
}

/// Lower-cases a free-form document type and folds spaces and hyphens
/// into underscores.
pub fn normalize_document_type(document_type: &str) -> String {
    document_type
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    IdentifierFormat,
    IdentifierChecksum,
    Field,
    UnsupportedType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub kind: IssueKind,
    pub message: String,
}

impl ValidationIssue {
    fn new(kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Format or checksum failure of the document's primary identifier.
    pub fn is_identifier_failure(&self) -> bool {
        matches!(
            self.kind,
            IssueKind::IdentifierFormat | IssueKind::IdentifierChecksum
        )
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

pub fn messages(issues: &[ValidationIssue]) -> Vec<String> {
    issues.iter().map(|i| i.message.clone()).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportedDocument {
    pub document_type: String,
    pub identifier_format: String,
}

#[derive(Debug, Clone, Default)]
pub struct ValidationEngine;

impl ValidationEngine {
    pub fn new() -> Self {
        Self
    }

    /// Runs every rule that applies to `document_type`, in a fixed order:
    /// name, date of birth, then the identifier.
    pub fn validate(
        &self,
        document_type: &str,
        fields: &BTreeMap<String, ExtractedField>,
    ) -> Vec<ValidationIssue> {
        let Some(kind) = DocumentKind::parse(document_type) else {
            return vec![ValidationIssue::new(
                IssueKind::UnsupportedType,
                "unsupported document type",
            )];
        };

        let today = Utc::now().date_naive();
        let mut issues = Vec::new();
        issues.extend(self.validate_name(fields));
        issues.extend(self.validate_dob(fields, today));

        match identifier_value(fields) {
            Some(number) => issues.extend(self.check_identifier(kind, number, today)),
            None => issues.push(ValidationIssue::new(
                IssueKind::Field,
                format!("{} is missing", kind.label()),
            )),
        }

        issues
    }

    /// Validates a bare identifier without any other document context.
    pub fn validate_identifier(&self, kind: DocumentKind, number: &str) -> Vec<ValidationIssue> {
        self.check_identifier(kind, number, Utc::now().date_naive())
    }

    pub fn supported_documents(&self) -> Vec<SupportedDocument> {
        DocumentKind::ALL
            .iter()
            .map(|kind| SupportedDocument {
                document_type: kind.as_str().to_string(),
                identifier_format: kind.identifier_format().to_string(),
            })
            .collect()
    }

    fn check_identifier(
        &self,
        kind: DocumentKind,
        number: &str,
        today: NaiveDate,
    ) -> Vec<ValidationIssue> {
        match kind {
            DocumentKind::NationalId => check_national_id(number),
            DocumentKind::TaxId => check_tax_id(number),
            DocumentKind::DrivingLicense => check_driving_license(number, today.year()),
            DocumentKind::VoterId => check_pattern(
                &VOTER_ID,
                kind,
                number,
                "three letters followed by seven digits",
            ),
            DocumentKind::Passport => check_pattern(
                &PASSPORT,
                kind,
                number,
                "one letter followed by seven digits",
            ),
        }
    }

    fn validate_name(&self, fields: &BTreeMap<String, ExtractedField>) -> Vec<ValidationIssue> {
        let Some(field) = fields.get("name") else {
            return Vec::new();
        };
        let name = field.value.trim();
        let mut issues = Vec::new();

        if name.chars().count() < 2 {
            issues.push(ValidationIssue::new(
                IssueKind::Field,
                "Name field is missing or too short",
            ));
        }
        if NAME_SUSPICIOUS.is_match(name) {
            issues.push(ValidationIssue::new(
                IssueKind::Field,
                "Name contains suspicious characters",
            ));
        }
        issues
    }

    fn validate_dob(
        &self,
        fields: &BTreeMap<String, ExtractedField>,
        today: NaiveDate,
    ) -> Vec<ValidationIssue> {
        let dob = match fields.get("dob") {
            Some(field) if !field.value.trim().is_empty() => field.value.trim(),
            _ => return Vec::new(),
        };

        let parsed = DOB_FORMATS
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(dob, fmt).ok());

        match parsed {
            None => vec![ValidationIssue::new(
                IssueKind::Field,
                format!("Could not parse date of birth: {dob}"),
            )],
            Some(date) if date > today => vec![ValidationIssue::new(
                IssueKind::Field,
                "Date of birth cannot be in the future",
            )],
            Some(date) if date.year() < 1900 => vec![ValidationIssue::new(
                IssueKind::Field,
                "Date of birth year seems too old",
            )],
            Some(_) => Vec::new(),
        }
    }
}

fn identifier_value(fields: &BTreeMap<String, ExtractedField>) -> Option<&str> {
    IDENTIFIER_FIELDS
        .iter()
        .filter_map(|name| fields.get(*name))
        .map(|field| field.value.trim())
        .find(|value| !value.is_empty())
}

fn compact(number: &str) -> String {
    number
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect::<String>()
        .to_uppercase()
}

fn check_national_id(number: &str) -> Vec<ValidationIssue> {
    let clean = compact(number);
    let label = DocumentKind::NationalId.label();

    if !NATIONAL_ID.is_match(&clean) {
        return vec![ValidationIssue::new(
            IssueKind::IdentifierFormat,
            format!("{label} must be exactly 12 digits"),
        )];
    }
    if clean.starts_with('0') || clean.starts_with('1') {
        return vec![ValidationIssue::new(
            IssueKind::IdentifierFormat,
            format!("{label} cannot begin with 0 or 1"),
        )];
    }
    if !checksum::verhoeff_valid(&clean) {
        return vec![ValidationIssue::new(
            IssueKind::IdentifierChecksum,
            format!("{label} failed check-digit verification"),
        )];
    }
    Vec::new()
}

fn check_tax_id(number: &str) -> Vec<ValidationIssue> {
    let clean = compact(number);

    if !TAX_ID.is_match(&clean) {
        return vec![ValidationIssue::new(
            IssueKind::IdentifierFormat,
            "Tax ID must be in format ABCDE1234F",
        )];
    }
    // Regex guarantees ten ASCII characters.
    let holder = clean.as_bytes()[3] as char;
    if !TAX_ID_HOLDER_TYPES.contains(holder) {
        return vec![ValidationIssue::new(
            IssueKind::IdentifierFormat,
            format!("Tax ID holder-type character '{holder}' is not recognised"),
        )];
    }
    Vec::new()
}

fn check_driving_license(number: &str, current_year: i32) -> Vec<ValidationIssue> {
    let clean = compact(number);
    let label = DocumentKind::DrivingLicense.label();

    let Some(caps) = DRIVING_LICENSE.captures(&clean) else {
        return vec![ValidationIssue::new(
            IssueKind::IdentifierFormat,
            format!("{label} must be a state code, RTO code, issue year and 7-digit serial"),
        )];
    };

    let mut issues = Vec::new();
    let state = &caps[1];
    if !STATE_CODES.contains(&state) {
        issues.push(ValidationIssue::new(
            IssueKind::IdentifierFormat,
            format!("Unknown state code '{state}' in {}", label.to_lowercase()),
        ));
    }
    let year: i32 = caps[3].parse().unwrap_or(0);
    if year < 1900 || year > current_year {
        issues.push(ValidationIssue::new(
            IssueKind::IdentifierFormat,
            format!("{label} issue year {year} is not plausible"),
        ));
    }
    issues
}

fn check_pattern(
    pattern: &Regex,
    kind: DocumentKind,
    number: &str,
    shape: &str,
) -> Vec<ValidationIssue> {
    if pattern.is_match(&compact(number)) {
        Vec::new()
    } else {
        vec![ValidationIssue::new(
            IssueKind::IdentifierFormat,
            format!("{} must be {shape}", kind.label()),
        )]
    }
}
