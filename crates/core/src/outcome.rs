use serde::{Deserialize, Serialize};

use crate::xml::{child, child_value, children};

/// Severity of the issue
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Fatal,
    Error,
    Warning,
    Information,
}

impl IssueSeverity {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fatal" => Some(IssueSeverity::Fatal),
            "error" => Some(IssueSeverity::Error),
            "warning" => Some(IssueSeverity::Warning),
            "information" => Some(IssueSeverity::Information),
            _ => None,
        }
    }

    /// Error and fatal issues fail a submission
    pub fn is_failure(self) -> bool {
        matches!(self, IssueSeverity::Fatal | IssueSeverity::Error)
    }
}

/// One `details.coding` entry of an issue
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IssueCoding {
    pub system: Option<String>,
    pub code: Option<String>,
    pub display: Option<String>,
}

/// OperationOutcome issue as reported by the server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Issue {
    /// `None` when the server sent no or an unknown severity
    pub severity: Option<IssueSeverity>,
    pub code: Option<String>,
    pub codings: Vec<IssueCoding>,
    pub details_text: Option<String>,
    pub diagnostics: Option<String>,
    pub expression: Vec<String>,
}

impl Issue {
    pub fn is_failure(&self) -> bool {
        self.severity.is_some_and(IssueSeverity::is_failure)
    }

    /// Read one `<issue>` element
    pub(crate) fn from_node(node: roxmltree::Node<'_, '_>) -> Self {
        let details = child(node, "details");
        let codings = details
            .map(|details| {
                children(details, "coding")
                    .map(|coding| IssueCoding {
                        system: child_value(coding, "system").map(str::to_string),
                        code: child_value(coding, "code").map(str::to_string),
                        display: child_value(coding, "display").map(str::to_string),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            severity: child_value(node, "severity").and_then(IssueSeverity::parse),
            code: child_value(node, "code").map(str::to_string),
            codings,
            details_text: details
                .and_then(|d| child_value(d, "text"))
                .map(str::to_string),
            diagnostics: child_value(node, "diagnostics").map(str::to_string),
            expression: children(node, "expression")
                .filter_map(|e| e.attribute("value"))
                .map(str::to_string)
                .collect(),
        }
    }
}

/// Every issue of every OperationOutcome in the document, at any depth
pub(crate) fn collect_issues(doc: &roxmltree::Document<'_>) -> Vec<Issue> {
    doc.descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "OperationOutcome")
        .flat_map(|outcome| children(outcome, "issue").map(Issue::from_node))
        .collect()
}
