//! Decoding of failed submissions into section-addressed write-back notes
//!
//! Each issue is reduced to one primary domain code and a message in which
//! every recognized code token is replaced by its friendly name. Issues whose
//! code the catalog cannot resolve are skipped; the rest are deduplicated
//! by (section, message).

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::catalog::{CatalogEntry, ElementCatalog};
use crate::error::SubmitResult;
use crate::operation::Operation;
use crate::outcome::{Issue, collect_issues};
use crate::xml::strip_prefix;

/// Downstream systems split notes on this prefix to recover the section.
/// The exact text must not change.
pub const NOTE_LINE_BREAK: &str = "\r\n";
pub const NOTE_ITEM_PREFIX: &str = "Item: ";

/// Section state written for every section that received a note
pub const SECTION_STATE_NEEDS_ATTENTION: &str = "NEEDS_ATTENTION";

pub const DEFAULT_ISSUE_MESSAGE: &str = "Validation error";

/// Coding systems containing this marker carry domain code tokens
pub const DOMAIN_CODE_SYSTEM_MARKER: &str = "data-element";

/// `i` + one letter + digits + optional lowercase letter, e.g. `iA9`, `iB12a`
static DOMAIN_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bi[a-z]\d+[a-z]?\b").expect("valid token pattern"));

/// One write-back step for the Persistence Gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum WriteBackInstruction {
    AppendNote {
        record_id: String,
        section: String,
        note: String,
    },
    SetSectionState {
        record_id: String,
        section: String,
        state: String,
    },
    MarkIncomplete {
        record_id: String,
    },
}

/// How an issue's section was determined
enum PrimaryCode<'c> {
    /// Domain token; the message gets token substitution
    Token(String),
    /// Business code resolved directly; message is kept as-is
    Business(&'c CatalogEntry),
}

pub struct ErrorReconciler<'c> {
    catalog: &'c ElementCatalog,
}

impl<'c> ErrorReconciler<'c> {
    pub fn new(catalog: &'c ElementCatalog) -> Self {
        Self { catalog }
    }

    /// Parse every OperationOutcome in the response and reconcile its issues
    pub fn reconcile(
        &self,
        outcome_xml: &str,
        record_id: &str,
        assessment_operation: Operation,
    ) -> SubmitResult<Vec<WriteBackInstruction>> {
        let xml = strip_prefix(outcome_xml).unwrap_or(outcome_xml);
        let doc = roxmltree::Document::parse(xml)?;
        let issues = collect_issues(&doc);
        Ok(self.reconcile_issues(&issues, record_id, assessment_operation))
    }

    pub fn reconcile_issues(
        &self,
        issues: &[Issue],
        record_id: &str,
        assessment_operation: Operation,
    ) -> Vec<WriteBackInstruction> {
        let mut seen = HashSet::new();
        let mut instructions = Vec::new();

        for issue in issues {
            let Some((section, message)) = self.decode(issue) else {
                continue;
            };
            if !seen.insert((section.to_lowercase(), message.to_lowercase())) {
                continue;
            }

            instructions.push(WriteBackInstruction::AppendNote {
                record_id: record_id.to_string(),
                section: section.clone(),
                note: format_note(&section, &message),
            });
            instructions.push(WriteBackInstruction::SetSectionState {
                record_id: record_id.to_string(),
                section,
                state: SECTION_STATE_NEEDS_ATTENTION.to_string(),
            });
        }

        if matches!(
            assessment_operation,
            Operation::Create | Operation::Correction | Operation::Delete
        ) {
            instructions.push(WriteBackInstruction::MarkIncomplete {
                record_id: record_id.to_string(),
            });
        }

        tracing::debug!(
            record_id,
            issues = issues.len(),
            notes = seen.len(),
            "Reconciled submission issues"
        );
        instructions
    }

    /// Section and final message for one issue, or `None` to skip it
    fn decode(&self, issue: &Issue) -> Option<(String, String)> {
        let message = issue_message(issue);

        let (entry, message) = match self.primary_code(issue, &message)? {
            PrimaryCode::Token(token) => {
                let entry = self.resolve_token(&token);
                (entry, substitute_tokens(&message, self.catalog))
            }
            PrimaryCode::Business(entry) => (Some(entry), message),
        };

        match entry {
            Some(entry) => Some((entry.section.clone(), message)),
            None => {
                tracing::debug!(message = %message, "Issue code not in catalog, skipping");
                None
            }
        }
    }

    fn primary_code(&self, issue: &Issue, message: &str) -> Option<PrimaryCode<'c>> {
        let domain_coding = issue.codings.iter().find_map(|coding| {
            let system = coding.system.as_deref()?;
            if !system.to_lowercase().contains(DOMAIN_CODE_SYSTEM_MARKER) {
                return None;
            }
            coding.code.clone()
        });
        if let Some(code) = domain_coding {
            return Some(PrimaryCode::Token(code));
        }

        if let Some(token) = DOMAIN_TOKEN.find(message) {
            return Some(PrimaryCode::Token(token.as_str().to_string()));
        }

        issue
            .codings
            .iter()
            .filter_map(|coding| coding.code.as_deref())
            .find_map(|code| self.catalog.resolve_business_code(code))
            .map(PrimaryCode::Business)
    }

    /// Tokens may arrive with or without the `i` prefix
    fn resolve_token(&self, token: &str) -> Option<&'c CatalogEntry> {
        self.catalog
            .resolve(token)
            .or_else(|| self.catalog.resolve(&format!("i{}", token)))
            .or_else(|| self.catalog.resolve_business_code(token))
    }
}

/// First coding display, then diagnostics, then a generic message
fn issue_message(issue: &Issue) -> String {
    issue
        .codings
        .iter()
        .find_map(|c| c.display.as_deref().filter(|d| !d.trim().is_empty()))
        .or(issue.diagnostics.as_deref().filter(|d| !d.trim().is_empty()))
        .unwrap_or(DEFAULT_ISSUE_MESSAGE)
        .trim()
        .to_string()
}

/// `\r\nItem: {section} - {message}`
pub fn format_note(section: &str, message: &str) -> String {
    format!(
        "{}{}{} - {}",
        NOTE_LINE_BREAK, NOTE_ITEM_PREFIX, section, message
    )
}

/// Replace every resolvable domain token with its friendly name.
///
/// Longest tokens go first so `iA12` is never rewritten through `iA1`.
/// `(token)` keeps its parentheses around the friendly name.
pub fn substitute_tokens(message: &str, catalog: &ElementCatalog) -> String {
    let mut tokens: Vec<&str> = Vec::new();
    for m in DOMAIN_TOKEN.find_iter(message) {
        let token = m.as_str();
        let seen = tokens.iter().any(|t| t.eq_ignore_ascii_case(token));
        if !seen && catalog.resolve(token).is_some() {
            tokens.push(token);
        }
    }
    if tokens.is_empty() {
        return message.to_string();
    }
    // Alternation is leftmost-first, so longer tokens must come first.
    tokens.sort_by(|a, b| b.len().cmp(&a.len()));

    let alternation = tokens
        .iter()
        .map(|t| regex::escape(t))
        .collect::<Vec<_>>()
        .join("|");
    let parenthesized = Regex::new(&format!(r"(?i)\(\s*({})\s*\)", alternation))
        .expect("escaped token alternation");
    let bare =
        Regex::new(&format!(r"(?i)\b({})\b", alternation)).expect("escaped token alternation");

    let friendly_name = |caps: &Captures<'_>| {
        catalog
            .resolve(&caps[1])
            .map(|entry| entry.display_name.clone())
            .unwrap_or_else(|| caps[0].to_string())
    };

    let result = parenthesized.replace_all(message, |caps: &Captures<'_>| {
        format!("({})", friendly_name(caps))
    });
    bare.replace_all(&result, |caps: &Captures<'_>| friendly_name(caps))
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogEntry;
    use crate::outcome::IssueCoding;

    fn entry(token: &str, section: &str, code: &str, name: &str) -> CatalogEntry {
        CatalogEntry {
            token: token.into(),
            section: section.into(),
            display_code: code.into(),
            display_name: name.into(),
        }
    }

    fn catalog() -> ElementCatalog {
        ElementCatalog::from_entries(vec![
            entry("iA9", "A", "A0900", "Marital Status"),
            entry("iA1", "A", "A0100", "Facility Number"),
            entry("iA12", "A", "A1200", "Admission Date"),
            entry("iB3a", "B", "B0300A", "Hearing"),
        ])
    }

    fn issue(display: Option<&str>, diagnostics: Option<&str>) -> Issue {
        Issue {
            severity: Some(crate::outcome::IssueSeverity::Error),
            code: Some("invalid".into()),
            codings: display
                .map(|d| {
                    vec![IssueCoding {
                        system: Some("urn:validation".into()),
                        code: Some("V1".into()),
                        display: Some(d.into()),
                    }]
                })
                .unwrap_or_default(),
            details_text: None,
            diagnostics: diagnostics.map(str::to_string),
            expression: Vec::new(),
        }
    }

    fn notes(instructions: &[WriteBackInstruction]) -> Vec<String> {
        instructions
            .iter()
            .filter_map(|i| match i {
                WriteBackInstruction::AppendNote { note, .. } => Some(note.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn substitution_replaces_bare_and_parenthesized_tokens() {
        let catalog = catalog();
        assert_eq!(
            substitute_tokens("Invalid iA9 value", &catalog),
            "Invalid Marital Status value"
        );
        assert_eq!(substitute_tokens("(iA9)", &catalog), "(Marital Status)");
        assert_eq!(substitute_tokens("Check IA9", &catalog), "Check Marital Status");
    }

    #[test]
    fn longer_tokens_are_not_split_by_shorter_ones() {
        assert_eq!(
            substitute_tokens("iA1 must precede iA12", &catalog()),
            "Facility Number must precede Admission Date"
        );
    }

    #[test]
    fn every_occurrence_is_replaced_in_one_pass() {
        assert_eq!(
            substitute_tokens("( iA12 ) after iA1, then IA12/iB3a", &catalog()),
            "(Admission Date) after Facility Number, then Admission Date/Hearing"
        );
    }

    #[test]
    fn friendly_names_are_inserted_literally() {
        let catalog =
            ElementCatalog::from_entries(vec![entry("iC1", "C", "C0100", "Cost $1 (USD)")]);
        assert_eq!(substitute_tokens("Bad iC1", &catalog), "Bad Cost $1 (USD)");
        assert_eq!(substitute_tokens("(iC1)", &catalog), "(Cost $1 (USD))");
    }

    #[test]
    fn unknown_tokens_are_left_alone() {
        assert_eq!(
            substitute_tokens("iZ4 and iB3a", &catalog()),
            "iZ4 and Hearing"
        );
    }

    #[test]
    fn note_prefix_is_exact() {
        assert_eq!(format_note("A", "msg"), "\r\nItem: A - msg");
    }

    #[test]
    fn message_falls_back_to_diagnostics_then_default() {
        assert_eq!(issue_message(&issue(Some("shown"), Some("diag"))), "shown");
        assert_eq!(issue_message(&issue(None, Some("diag"))), "diag");
        assert_eq!(issue_message(&issue(None, None)), DEFAULT_ISSUE_MESSAGE);
    }

    #[test]
    fn duplicate_issues_produce_one_note() {
        let catalog = catalog();
        let issues = vec![
            issue(Some("Invalid iA9 value"), None),
            issue(Some("INVALID IA9 VALUE"), None),
            issue(None, Some("Invalid iA9 value")),
        ];
        let instructions =
            ErrorReconciler::new(&catalog).reconcile_issues(&issues, "R1", Operation::Update);

        assert_eq!(
            notes(&instructions),
            vec!["\r\nItem: A - Invalid Marital Status value"]
        );
        assert_eq!(instructions.len(), 2);
        assert_eq!(
            instructions[1],
            WriteBackInstruction::SetSectionState {
                record_id: "R1".into(),
                section: "A".into(),
                state: SECTION_STATE_NEEDS_ATTENTION.into(),
            }
        );
    }

    #[test]
    fn unresolvable_issues_are_skipped() {
        let catalog = catalog();
        let issues = vec![
            issue(Some("Unknown iQ77 element"), None),
            issue(Some("No code at all"), None),
            issue(Some("Bad iB3a"), None),
        ];
        let instructions =
            ErrorReconciler::new(&catalog).reconcile_issues(&issues, "R1", Operation::Use);
        assert_eq!(notes(&instructions), vec!["\r\nItem: B - Bad Hearing"]);
    }

    #[test]
    fn domain_coding_wins_over_message_tokens() {
        let catalog = catalog();
        let mut domain = issue(Some("iA9 conflicts with iB3a"), None);
        domain.codings.insert(
            0,
            IssueCoding {
                system: Some("https://api.test/CodeSystem/Data-Element".into()),
                code: Some("B3a".into()),
                display: None,
            },
        );
        let instructions =
            ErrorReconciler::new(&catalog).reconcile_issues(&[domain], "R1", Operation::Use);
        assert_eq!(
            notes(&instructions),
            vec!["\r\nItem: B - Marital Status conflicts with Hearing"]
        );
    }

    #[test]
    fn business_code_resolves_section_without_substitution() {
        let catalog = catalog();
        let mut business = issue(None, Some("Field iZ9 rejected"));
        business.codings.push(IssueCoding {
            system: Some("urn:business".into()),
            code: Some("A0900".into()),
            display: None,
        });
        // The message token iZ9 is extracted first but does not resolve.
        let reconciler = ErrorReconciler::new(&catalog);
        let skipped = reconciler.reconcile_issues(&[business.clone()], "R1", Operation::Use);
        assert!(notes(&skipped).is_empty());

        business.diagnostics = Some("Marital status rejected".into());
        let instructions =
            ErrorReconciler::new(&catalog).reconcile_issues(&[business], "R1", Operation::Use);
        assert_eq!(notes(&instructions), vec!["\r\nItem: A - Marital status rejected"]);
    }

    #[test]
    fn mark_incomplete_follows_assessment_operation() {
        let catalog = catalog();
        let reconciler = ErrorReconciler::new(&catalog);
        for op in [Operation::Create, Operation::Correction, Operation::Delete] {
            let instructions = reconciler.reconcile_issues(&[], "R1", op);
            assert_eq!(
                instructions,
                vec![WriteBackInstruction::MarkIncomplete {
                    record_id: "R1".into()
                }]
            );
        }
        for op in [Operation::Update, Operation::Use] {
            assert!(reconciler.reconcile_issues(&[], "R1", op).is_empty());
        }
    }

    #[test]
    fn reconcile_reads_nested_outcomes() {
        let catalog = catalog();
        let xml = r#"HTTP 400 <Bundle xmlns="http://hl7.org/fhir">
          <type value="transaction-response"/>
          <entry><response><status value="400"/><outcome><OperationOutcome>
            <issue><severity value="error"/><diagnostics value="Missing (iA12)"/></issue>
          </OperationOutcome></outcome></response></entry>
          <entry><response><status value="400"/><outcome><OperationOutcome>
            <issue><severity value="error"/><diagnostics value="Missing (iA12)"/></issue>
            <issue><severity value="error"/>
              <details><coding><display value="iB3a out of range"/></coding></details>
            </issue>
          </OperationOutcome></outcome></response></entry>
        </Bundle>"#;

        let instructions = ErrorReconciler::new(&catalog)
            .reconcile(xml, "R1", Operation::Create)
            .unwrap();

        assert_eq!(
            notes(&instructions),
            vec![
                "\r\nItem: A - Missing (Admission Date)",
                "\r\nItem: B - Hearing out of range"
            ]
        );
        assert_eq!(
            instructions.last(),
            Some(&WriteBackInstruction::MarkIncomplete {
                record_id: "R1".into()
            })
        );
        assert_eq!(instructions.len(), 5);
    }

    #[test]
    fn reconcile_rejects_unparsable_payload() {
        let catalog = catalog();
        assert!(
            ErrorReconciler::new(&catalog)
                .reconcile("not xml", "R1", Operation::Create)
                .is_err()
        );
    }
}
