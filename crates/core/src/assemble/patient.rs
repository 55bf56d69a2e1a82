use serde_json::{Map, Value as JsonValue, json};

use super::{PATIENT_KEY_SYSTEM, resource_id};
use crate::identity::NormalizedMetadata;
use crate::record::{Fields, fhir_date, field, non_blank};

const MEDICARE_SYSTEM: &str = "http://hl7.org/fhir/sid/us-mbi";
const MEDICAID_SYSTEM: &str = "http://hl7.org/fhir/sid/us-medicaid";

/// Build the Patient payload
pub(super) fn build(fields: &Fields, metadata: &NormalizedMetadata) -> JsonValue {
    let mut patient = Map::new();
    patient.insert("resourceType".into(), json!("Patient"));
    if let Some(id) = resource_id(&metadata.patient) {
        patient.insert("id".into(), json!(id));
    }

    let mut identifiers = Vec::new();
    if let Some(key) = non_blank(&metadata.patient.key) {
        identifiers.push(json!({ "system": PATIENT_KEY_SYSTEM, "value": key }));
    }
    if let Some(mbi) = field(fields, "medicare_number") {
        identifiers.push(json!({ "system": MEDICARE_SYSTEM, "value": mbi }));
    }
    if let Some(medicaid) = field(fields, "medicaid_number") {
        identifiers.push(json!({ "system": MEDICAID_SYSTEM, "value": medicaid }));
    }
    if !identifiers.is_empty() {
        patient.insert("identifier".into(), JsonValue::Array(identifiers));
    }

    if let Some(name) = name(fields) {
        patient.insert("name".into(), json!([name]));
    }
    if let Some(gender) = field(fields, "gender") {
        patient.insert("gender".into(), json!(administrative_gender(gender)));
    }
    if let Some(birth_date) = field(fields, "birth_date") {
        patient.insert("birthDate".into(), json!(fhir_date(birth_date)));
    }

    JsonValue::Object(patient)
}

fn name(fields: &Fields) -> Option<JsonValue> {
    let family = field(fields, "last_name");
    let given: Vec<&str> = ["first_name", "middle_initial"]
        .iter()
        .filter_map(|name| field(fields, name))
        .collect();

    if family.is_none() && given.is_empty() {
        return None;
    }

    let mut name = Map::new();
    name.insert("use".into(), json!("official"));
    if let Some(family) = family {
        name.insert("family".into(), json!(family));
    }
    if !given.is_empty() {
        name.insert("given".into(), json!(given));
    }
    Some(JsonValue::Object(name))
}

/// Map source gender codes onto FHIR administrative gender
fn administrative_gender(code: &str) -> &'static str {
    match code.to_ascii_uppercase().as_str() {
        "1" | "M" | "MALE" => "male",
        "2" | "F" | "FEMALE" => "female",
        "O" | "OTHER" => "other",
        _ => "unknown",
    }
}
