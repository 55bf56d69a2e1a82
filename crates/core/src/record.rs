//! Parsed record sections and per-submission metadata

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Field name → raw value for one record section
pub type Fields = BTreeMap<String, String>;

pub const FIRST_ASSESSMENT: &str = "FIRST ASSESSMENT";
pub const RETURN_ASSESSMENT: &str = "RETURN ASSESSMENT";

/// A record as produced by the flat-file parser. Read-only once parsed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedRecord {
    #[serde(default)]
    pub admin: Fields,
    #[serde(default)]
    pub patient: Fields,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encounter: Option<Fields>,
    /// Assessment section name → its fields
    #[serde(default)]
    pub assessment: BTreeMap<String, Fields>,
}

impl ParsedRecord {
    pub fn has_assessment_data(&self) -> bool {
        self.assessment
            .values()
            .any(|fields| fields.values().any(|v| !v.trim().is_empty()))
    }
}

/// Per-submission identifiers and operation intent, as supplied by the source
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordMetadata {
    pub bundle_id: String,
    pub patient_id: String,
    pub patient_key: String,
    pub patient_operation: String,
    pub encounter_id: String,
    pub encounter_key: String,
    pub encounter_operation: String,
    pub assessment_id: String,
    pub assessment_key: String,
    pub assessment_operation: String,
    pub assessment_type: String,
    pub return_assessment: bool,
    pub fiscal_year: Option<i32>,
    pub fiscal_quarter: Option<u8>,
}

/// Assessment type label, reduced to what drives identity and period rules
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssessmentType {
    First,
    Return,
    /// Any other label: a follow-up on previously submitted resources
    FollowUp(String),
}

impl AssessmentType {
    pub fn parse(label: &str) -> Self {
        let normalized = label.trim().to_ascii_uppercase();
        match normalized.as_str() {
            FIRST_ASSESSMENT => AssessmentType::First,
            RETURN_ASSESSMENT => AssessmentType::Return,
            _ => AssessmentType::FollowUp(normalized),
        }
    }

    pub fn is_follow_up(&self) -> bool {
        matches!(self, AssessmentType::FollowUp(_))
    }
}

/// Non-blank, trimmed value of a field
pub fn field<'a>(fields: &'a Fields, name: &str) -> Option<&'a str> {
    fields
        .get(name)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

/// Non-blank trimmed string, or `None`
pub fn non_blank(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%m/%d/%Y", "%Y%m%d", "%m%d%Y"];

/// Normalize a flat-file date to FHIR `YYYY-MM-DD`. Unrecognized input is
/// passed through unchanged so the server reports it.
pub fn fhir_date(raw: &str) -> String {
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .map(|date| date.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| {
            tracing::warn!(value = raw, "Unrecognized date format");
            raw.to_string()
        })
}
