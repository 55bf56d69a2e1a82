//! Resource kinds, operation verbs and their REST mapping

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::bundle::{BundleRequest, HttpVerb};
use crate::error::{SubmitError, SubmitResult};

/// The three submittable resource kinds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Patient,
    Encounter,
    Assessment,
}

impl ResourceKind {
    /// FHIR resource type name used in paths and references
    pub fn resource_type(self) -> &'static str {
        match self {
            ResourceKind::Patient => "Patient",
            ResourceKind::Encounter => "Encounter",
            ResourceKind::Assessment => "QuestionnaireResponse",
        }
    }

    /// Operation applied when the record leaves the field blank
    pub fn default_operation(self) -> Operation {
        match self {
            ResourceKind::Patient | ResourceKind::Encounter => Operation::Use,
            ResourceKind::Assessment => Operation::Create,
        }
    }

    pub fn from_resource_type(resource_type: &str) -> Option<Self> {
        match resource_type {
            "Patient" => Some(ResourceKind::Patient),
            "Encounter" => Some(ResourceKind::Encounter),
            "QuestionnaireResponse" => Some(ResourceKind::Assessment),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Patient => "Patient",
            ResourceKind::Encounter => "Encounter",
            ResourceKind::Assessment => "Assessment",
        };
        f.write_str(name)
    }
}

/// Intended effect of a submission on one resource
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Create,
    Update,
    Correction,
    Delete,
    /// Reference an existing resource without a REST call
    Use,
}

impl Operation {
    /// Parse a raw metadata value. Blank input yields the kind's default.
    pub fn parse(kind: ResourceKind, raw: &str) -> SubmitResult<Self> {
        let value = raw.trim();
        if value.is_empty() {
            return Ok(kind.default_operation());
        }

        match value.to_ascii_uppercase().as_str() {
            "CREATE" => Ok(Operation::Create),
            "UPDATE" => Ok(Operation::Update),
            "CORRECTION" => Ok(Operation::Correction),
            "DELETE" => Ok(Operation::Delete),
            "USE" => Ok(Operation::Use),
            _ => Err(SubmitError::InvalidOperation {
                kind,
                value: value.to_string(),
            }),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Create => "CREATE",
            Operation::Update => "UPDATE",
            Operation::Correction => "CORRECTION",
            Operation::Delete => "DELETE",
            Operation::Use => "USE",
        }
    }

    /// UPDATE and DELETE must target a previously issued id
    pub fn requires_known_id(self) -> bool {
        matches!(self, Operation::Update | Operation::Delete)
    }

    /// CREATE references its resource through a transaction-temporary id
    pub fn uses_temporary_id(self) -> bool {
        matches!(self, Operation::Create)
    }

    /// REST action for a bundle entry. `None` for USE.
    pub fn request(self, kind: ResourceKind, id: &str) -> Option<BundleRequest> {
        let resource_type = kind.resource_type();
        let (method, url) = match self {
            Operation::Create => (HttpVerb::Post, resource_type.to_string()),
            // The API has no correction-by-id; the body content is authoritative.
            Operation::Correction => (HttpVerb::Put, resource_type.to_string()),
            Operation::Update => (HttpVerb::Post, format!("{}/$update", resource_type)),
            Operation::Delete => (HttpVerb::Delete, format!("{}/{}", resource_type, id)),
            Operation::Use => return None,
        };
        Some(BundleRequest { method, url })
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
