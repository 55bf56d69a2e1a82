//! Transaction bundle assembly
//!
//! Entry order is Encounter, Assessment, Patient. Server-side transaction
//! processing may depend on it, so it is kept stable.

mod assessment;
mod encounter;
mod patient;

use serde_json::Value as JsonValue;

use crate::bundle::{Bundle, BundleEntry};
use crate::error::{SubmitError, SubmitResult};
use crate::identity::{NormalizedMetadata, ResolvedResource};
use crate::operation::Operation;
use crate::record::ParsedRecord;

pub use encounter::{COVERAGE_FIELDS, DISCHARGE_EXPIRED};

pub const PATIENT_KEY_SYSTEM: &str = "urn:submission:patient-key";
pub const ENCOUNTER_KEY_SYSTEM: &str = "urn:submission:encounter-key";
pub const ASSESSMENT_KEY_SYSTEM: &str = "urn:submission:assessment-key";
pub const FACILITY_SYSTEM: &str = "urn:submission:facility";

/// Knobs for payload construction
#[derive(Debug, Clone)]
pub struct AssemblerOptions {
    /// Prefix for permanent full-urls; empty means relative `{Type}/{id}`
    pub base_url: String,
    /// Canonical of the assessment questionnaire
    pub questionnaire_url: String,
}

impl Default for AssemblerOptions {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            questionnaire_url: "Questionnaire/assessment".to_string(),
        }
    }
}

/// Builds one transaction bundle per record
#[derive(Debug, Clone, Default)]
pub struct BundleAssembler {
    options: AssemblerOptions,
}

impl BundleAssembler {
    pub fn new(options: AssemblerOptions) -> Self {
        Self { options }
    }

    pub fn build(
        &self,
        record: &ParsedRecord,
        metadata: &NormalizedMetadata,
    ) -> SubmitResult<Bundle> {
        let mut bundle = Bundle::transaction(metadata.bundle_id.clone());

        if includes_encounter(record, metadata) {
            if let Some(fields) = &record.encounter {
                let resource = encounter::build(fields, record, metadata);
                bundle.entry.push(self.entry(&metadata.encounter, resource));
            }
        }

        // No USE bypass for the assessment: it always participates.
        if record.has_assessment_data() {
            let resource = assessment::build(record, metadata, &self.options.questionnaire_url);
            bundle.entry.push(self.entry(&metadata.assessment, resource));
        }

        if includes_patient(metadata) {
            let resource = patient::build(&record.patient, metadata);
            bundle.entry.push(self.entry(&metadata.patient, resource));
        }

        if bundle.entry.is_empty() {
            return Err(SubmitError::EmptyBundle);
        }

        tracing::debug!(
            bundle_id = %bundle.id,
            entries = bundle.entry.len(),
            "Assembled transaction bundle"
        );
        Ok(bundle)
    }

    fn entry(&self, resource: &ResolvedResource, payload: JsonValue) -> BundleEntry {
        BundleEntry::new(
            self.full_url(resource),
            payload,
            resource.operation.request(resource.kind, &resource.id),
        )
    }

    /// Temporary `urn:uuid:` for CREATE, permanent url otherwise
    pub fn full_url(&self, resource: &ResolvedResource) -> String {
        if resource.operation.uses_temporary_id() {
            return temporary_reference(&resource.id);
        }
        let path = permanent_reference(resource);
        let base = self.options.base_url.trim_end_matches('/');
        if base.is_empty() {
            path
        } else {
            format!("{}/{}", base, path)
        }
    }
}

fn temporary_reference(id: &str) -> String {
    format!("urn:uuid:{}", id)
}

fn permanent_reference(resource: &ResolvedResource) -> String {
    format!("{}/{}", resource.kind.resource_type(), resource.id)
}

/// Reference value used inside other resources
fn reference(resource: &ResolvedResource) -> String {
    if resource.operation.uses_temporary_id() {
        temporary_reference(&resource.id)
    } else {
        permanent_reference(resource)
    }
}

/// Resource id element: CREATE leaves id assignment to the server
fn resource_id(resource: &ResolvedResource) -> Option<String> {
    (!resource.operation.uses_temporary_id()).then(|| resource.id.clone())
}

fn includes_patient(metadata: &NormalizedMetadata) -> bool {
    metadata.patient.operation != Operation::Use
}

fn includes_encounter(record: &ParsedRecord, metadata: &NormalizedMetadata) -> bool {
    record.encounter.is_some() && metadata.encounter.operation != Operation::Use
}

/// Reference to a resource this bundle submits or the server already holds.
/// A USE resource with a generated id exists nowhere, so it gets `None`.
fn known_reference(resource: &ResolvedResource, in_bundle: bool) -> Option<JsonValue> {
    (in_bundle || resource.is_known())
        .then(|| serde_json::json!({ "reference": reference(resource) }))
}

fn coding(system: &str, code: &str) -> JsonValue {
    serde_json::json!({ "coding": [{ "system": system, "code": code }] })
}
