//! PASS/FAIL classification of raw submission responses
//!
//! Classification runs in two explicit stages. The structural stage parses
//! the response as FHIR XML; if the text cannot be parsed, the heuristic
//! stage scans it instead. Neither stage returns an error to the caller.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::bundle::BundleType;
use crate::identity::ReturnedIds;
use crate::operation::ResourceKind;
use crate::outcome::{Issue, collect_issues};
use crate::xml::{child, child_value, children, strip_prefix};

static FAILED_SEVERITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"severity(?:\s+value\s*=\s*|"?\s*:\s*)["'](?:error|fatal)["']"#)
        .expect("valid severity pattern")
});

static FAILED_STATUS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"status(?:\s+value\s*=\s*|"?\s*:\s*)["'][45]"#).expect("valid status pattern")
});

/// What to conclude from an empty response body.
///
/// The legacy behavior is `Pass`. An empty body carries no evidence either
/// way, so every occurrence is logged at WARN regardless of policy.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmptyResponsePolicy {
    #[default]
    Pass,
    Fail,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EvaluatorOptions {
    pub empty_response: EmptyResponsePolicy,
}

/// Which stage produced the verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassificationBasis {
    Structural,
    Heuristic,
    EmptyResponse,
}

/// Outcome of classifying one response
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub passed: bool,
    pub basis: ClassificationBasis,
    pub issues: Vec<Issue>,
    pub returned: ReturnedIds,
}

impl Evaluation {
    fn heuristic(passed: bool, basis: ClassificationBasis) -> Self {
        Self {
            passed,
            basis,
            issues: Vec::new(),
            returned: ReturnedIds::default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct OutcomeEvaluator {
    options: EvaluatorOptions,
}

impl OutcomeEvaluator {
    pub fn new(options: EvaluatorOptions) -> Self {
        Self { options }
    }

    pub fn evaluate(&self, raw: &str) -> Evaluation {
        match evaluate_structural(raw) {
            Ok(evaluation) => evaluation,
            Err(e) => {
                tracing::debug!(error = %e, "Response is not parsable XML, using text scan");
                self.evaluate_heuristic(raw)
            }
        }
    }

    /// Text scan for payloads the structural stage cannot read
    pub fn evaluate_heuristic(&self, raw: &str) -> Evaluation {
        if raw.trim().is_empty() {
            let passed = self.options.empty_response == EmptyResponsePolicy::Pass;
            tracing::warn!(
                passed,
                "Empty submission response; classification follows the empty-response policy"
            );
            return Evaluation::heuristic(passed, ClassificationBasis::EmptyResponse);
        }

        let text = raw.to_lowercase();
        let failed_outcome = text.contains("operationoutcome") && FAILED_SEVERITY.is_match(&text);
        let failed_status = FAILED_STATUS.is_match(&text);

        Evaluation::heuristic(
            !(failed_outcome || failed_status),
            ClassificationBasis::Heuristic,
        )
    }
}

/// Strict classification of a FHIR XML response
pub fn evaluate_structural(raw: &str) -> Result<Evaluation, roxmltree::Error> {
    let xml = strip_prefix(raw).unwrap_or(raw);
    let doc = roxmltree::Document::parse(xml)?;
    let issues = collect_issues(&doc);

    let fail = |issues: Vec<Issue>| Evaluation {
        passed: false,
        basis: ClassificationBasis::Structural,
        issues,
        returned: ReturnedIds::default(),
    };

    if issues.iter().any(Issue::is_failure) {
        return Ok(fail(issues));
    }

    let root = doc.root_element();
    let is_response_bundle = root.tag_name().name() == "Bundle"
        && child_value(root, "type") == Some(BundleType::TransactionResponse.as_str());
    if !is_response_bundle {
        return Ok(fail(issues));
    }

    let entries: Vec<_> = children(root, "entry").collect();
    let statuses: Vec<&str> = entries
        .iter()
        .filter_map(|entry| child(*entry, "response"))
        .filter_map(|response| child_value(response, "status"))
        .collect();

    if statuses.is_empty() || !statuses.iter().all(|s| is_success_status(s)) {
        return Ok(fail(issues));
    }

    let mut returned = ReturnedIds::default();
    for entry in entries {
        if let Some((kind, id)) = returned_id(entry) {
            returned.set(kind, id);
        }
    }

    Ok(Evaluation {
        passed: true,
        basis: ClassificationBasis::Structural,
        issues,
        returned,
    })
}

/// `201`, `200 OK` and the like; anything outside 2xx fails
fn is_success_status(status: &str) -> bool {
    status
        .split_whitespace()
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .is_some_and(|code| (200..300).contains(&code))
}

/// Resource kind and id from `response/location`, else the embedded resource
fn returned_id(entry: roxmltree::Node<'_, '_>) -> Option<(ResourceKind, String)> {
    let from_location = child(entry, "response")
        .and_then(|response| child_value(response, "location"))
        .and_then(parse_location);

    from_location.or_else(|| {
        let resource = child(entry, "resource")?
            .children()
            .find(|n| n.is_element())?;
        let kind = ResourceKind::from_resource_type(resource.tag_name().name())?;
        let id = child_value(resource, "id")?;
        Some((kind, id.to_string()))
    })
}

/// `[base/]Type/id[/_history/n]`
fn parse_location(location: &str) -> Option<(ResourceKind, String)> {
    let segments: Vec<&str> = location.split('/').collect();
    segments.windows(2).find_map(|pair| {
        let kind = ResourceKind::from_resource_type(pair[0])?;
        let id = pair[1].trim();
        (!id.is_empty() && !id.starts_with('_')).then(|| (kind, id.to_string()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response_bundle(statuses: &[&str]) -> String {
        let entries: String = statuses
            .iter()
            .map(|s| format!(r#"<entry><response><status value="{}"/></response></entry>"#, s))
            .collect();
        format!(
            concat!(
                r#"<Bundle xmlns="http://hl7.org/fhir">"#,
                r#"<type value="transaction-response"/>{}</Bundle>"#
            ),
            entries
        )
    }

    #[test]
    fn all_success_statuses_pass() {
        let evaluation =
            OutcomeEvaluator::default().evaluate(&response_bundle(&["200", "201 Created"]));
        assert!(evaluation.passed);
        assert_eq!(evaluation.basis, ClassificationBasis::Structural);
    }

    #[test]
    fn one_client_error_status_fails() {
        let evaluation = OutcomeEvaluator::default().evaluate(&response_bundle(&["201", "400"]));
        assert!(!evaluation.passed);
        assert_eq!(evaluation.basis, ClassificationBasis::Structural);
    }

    #[test]
    fn non_numeric_status_fails() {
        assert!(!OutcomeEvaluator::default().evaluate(&response_bundle(&["OK"])).passed);
    }

    #[test]
    fn bundle_without_statuses_fails() {
        assert!(!OutcomeEvaluator::default().evaluate(&response_bundle(&[])).passed);
    }

    #[test]
    fn wrong_bundle_type_fails() {
        let xml = r#"<Bundle xmlns="http://hl7.org/fhir"><type value="batch-response"/>
            <entry><response><status value="200"/></response></entry></Bundle>"#;
        assert!(!OutcomeEvaluator::default().evaluate(xml).passed);
    }

    #[test]
    fn error_issue_fails_even_with_success_statuses() {
        let xml = r#"<Bundle xmlns="http://hl7.org/fhir"><type value="transaction-response"/>
            <entry><response><status value="200"/>
              <outcome><OperationOutcome>
                <issue><severity value="fatal"/></issue>
              </OperationOutcome></outcome>
            </response></entry></Bundle>"#;
        let evaluation = OutcomeEvaluator::default().evaluate(xml);
        assert!(!evaluation.passed);
        assert_eq!(evaluation.issues.len(), 1);
    }

    #[test]
    fn warning_issue_does_not_fail() {
        let xml = r#"<Bundle xmlns="http://hl7.org/fhir"><type value="transaction-response"/>
            <entry><response><status value="201"/>
              <outcome><OperationOutcome>
                <issue><severity value="warning"/></issue>
              </OperationOutcome></outcome>
            </response></entry></Bundle>"#;
        let evaluation = OutcomeEvaluator::default().evaluate(xml);
        assert!(evaluation.passed);
        assert_eq!(evaluation.issues.len(), 1);
    }

    #[test]
    fn root_operation_outcome_fails() {
        let xml = r#"<OperationOutcome xmlns="http://hl7.org/fhir">
            <issue><severity value="information"/></issue>
        </OperationOutcome>"#;
        assert!(!OutcomeEvaluator::default().evaluate(xml).passed);
    }

    #[test]
    fn log_prefix_is_stripped() {
        let raw = format!("2024-01-01 INFO response follows: {}", response_bundle(&["201"]));
        let evaluation = OutcomeEvaluator::default().evaluate(&raw);
        assert!(evaluation.passed);
        assert_eq!(evaluation.basis, ClassificationBasis::Structural);
    }

    #[test]
    fn returned_ids_come_from_locations_and_resources() {
        let xml = r#"<Bundle xmlns="http://hl7.org/fhir"><type value="transaction-response"/>
            <entry><response><status value="201"/>
              <location value="https://api.test/fhir/Encounter/E9/_history/1"/>
            </response></entry>
            <entry>
              <resource><QuestionnaireResponse><id value="Q9"/></QuestionnaireResponse></resource>
              <response><status value="201"/></response></entry>
            <entry><response><status value="200"/><location value="Patient/P123"/></response>
            </entry>
            </Bundle>"#;
        let evaluation = OutcomeEvaluator::default().evaluate(xml);
        assert!(evaluation.passed);
        assert_eq!(evaluation.returned.encounter.as_deref(), Some("E9"));
        assert_eq!(evaluation.returned.assessment.as_deref(), Some("Q9"));
        assert_eq!(evaluation.returned.patient.as_deref(), Some("P123"));
    }

    #[test]
    fn unparsable_server_error_fails_heuristically() {
        let raw = r#"proxy said: <status value="500"> <broken"#;
        let evaluation = OutcomeEvaluator::default().evaluate(raw);
        assert!(!evaluation.passed);
        assert_eq!(evaluation.basis, ClassificationBasis::Heuristic);
    }

    #[test]
    fn unparsable_outcome_with_error_severity_fails() {
        let raw = r#"{"resourceType": "OperationOutcome", "issue": [{"severity": "error"}]}"#;
        let evaluation = OutcomeEvaluator::default().evaluate(raw);
        assert!(!evaluation.passed);
        assert_eq!(evaluation.basis, ClassificationBasis::Heuristic);
    }

    #[test]
    fn unparsable_text_without_failure_markers_passes() {
        let evaluation = OutcomeEvaluator::default().evaluate("accepted, status value=\"201\"");
        assert!(evaluation.passed);
        assert_eq!(evaluation.basis, ClassificationBasis::Heuristic);
    }

    #[test]
    fn empty_response_follows_policy() {
        let legacy = OutcomeEvaluator::default().evaluate("   ");
        assert!(legacy.passed);
        assert_eq!(legacy.basis, ClassificationBasis::EmptyResponse);

        let strict = OutcomeEvaluator::new(EvaluatorOptions {
            empty_response: EmptyResponsePolicy::Fail,
        })
        .evaluate("");
        assert!(!strict.passed);
    }
}
