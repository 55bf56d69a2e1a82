use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Bundle types exchanged with the submission API
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum BundleType {
    Transaction,
    TransactionResponse,
}

impl BundleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BundleType::Transaction => "transaction",
            BundleType::TransactionResponse => "transaction-response",
        }
    }
}

/// HTTP verb of a transaction entry
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpVerb {
    Post,
    Put,
    Delete,
}

/// FHIR Bundle resource (simplified for transaction submissions)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    pub resource_type: String,

    pub id: String,

    #[serde(rename = "type")]
    pub bundle_type: BundleType,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entry: Vec<BundleEntry>,
}

impl Bundle {
    /// Create an empty transaction bundle
    pub fn transaction(id: impl Into<String>) -> Self {
        Self {
            resource_type: "Bundle".to_string(),
            id: id.into(),
            bundle_type: BundleType::Transaction,
            entry: Vec::new(),
        }
    }

    /// Find the entry carrying a given resource type
    pub fn entry_for(&self, resource_type: &str) -> Option<&BundleEntry> {
        self.entry.iter().find(|e| {
            e.resource.get("resourceType").and_then(JsonValue::as_str) == Some(resource_type)
        })
    }
}

/// One bundle entry: payload, full-url and optional REST action
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleEntry {
    pub full_url: String,

    pub resource: JsonValue,

    /// Absent for USE: the resource is referenced only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<BundleRequest>,
}

impl BundleEntry {
    pub fn new(full_url: String, resource: JsonValue, request: Option<BundleRequest>) -> Self {
        Self {
            full_url,
            resource,
            request,
        }
    }
}

/// REST action of a transaction entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BundleRequest {
    pub method: HttpVerb,
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundle_type_wire_names_match_as_str() {
        for bundle_type in [BundleType::Transaction, BundleType::TransactionResponse] {
            assert_eq!(
                serde_json::to_value(&bundle_type).unwrap(),
                bundle_type.as_str()
            );
        }
        assert!(serde_json::from_str::<BundleType>("\"batch\"").is_err());
    }
}
