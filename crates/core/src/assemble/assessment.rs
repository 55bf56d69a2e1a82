use serde_json::{Map, Value as JsonValue, json};

use super::{
    ASSESSMENT_KEY_SYSTEM, includes_encounter, includes_patient, known_reference, resource_id,
};
use crate::identity::NormalizedMetadata;
use crate::record::{ParsedRecord, fhir_date, field, non_blank};

/// Build the QuestionnaireResponse payload. One item per section, one child
/// item per answered field.
pub(super) fn build(
    record: &ParsedRecord,
    metadata: &NormalizedMetadata,
    questionnaire_url: &str,
) -> JsonValue {
    let mut response = Map::new();
    response.insert("resourceType".into(), json!("QuestionnaireResponse"));
    if let Some(id) = resource_id(&metadata.assessment) {
        response.insert("id".into(), json!(id));
    }
    if let Some(key) = non_blank(&metadata.assessment.key) {
        response.insert(
            "identifier".into(),
            json!({ "system": ASSESSMENT_KEY_SYSTEM, "value": key }),
        );
    }
    response.insert("questionnaire".into(), json!(questionnaire_url));
    response.insert("status".into(), json!("completed"));
    // Only reference resources the bundle or the server knows about.
    if let Some(subject) = known_reference(&metadata.patient, includes_patient(metadata)) {
        response.insert("subject".into(), subject);
    }
    let encounter_in_bundle = includes_encounter(record, metadata);
    if let Some(encounter) = known_reference(&metadata.encounter, encounter_in_bundle) {
        response.insert("encounter".into(), encounter);
    }
    if let Some(authored) = field(&record.admin, "assessment_date") {
        response.insert("authored".into(), json!(fhir_date(authored)));
    }

    let items: Vec<JsonValue> = record
        .assessment
        .iter()
        .filter_map(|(section, fields)| {
            let answers: Vec<JsonValue> = fields
                .iter()
                .filter_map(|(name, value)| {
                    non_blank(value).map(|value| {
                        json!({ "linkId": name, "answer": [{ "valueString": value }] })
                    })
                })
                .collect();
            (!answers.is_empty()).then(|| json!({ "linkId": section, "item": answers }))
        })
        .collect();
    if !items.is_empty() {
        response.insert("item".into(), JsonValue::Array(items));
    }

    JsonValue::Object(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{IdentityCache, IdentityResolver};
    use crate::record::{Fields, RecordMetadata};

    fn metadata(meta: RecordMetadata) -> NormalizedMetadata {
        let mut cache = IdentityCache::new();
        IdentityResolver::new(&mut cache).normalize(&meta).unwrap()
    }

    fn record() -> ParsedRecord {
        let mut record = ParsedRecord::default();
        record.admin.insert("assessment_date".into(), "20240105".into());
        record.assessment.insert(
            "A".into(),
            Fields::from([("iA9".into(), "2".into()), ("iA10".into(), " ".into())]),
        );
        record
            .assessment
            .insert("B".into(), Fields::from([("iB1".into(), "".into())]));
        record
    }

    #[test]
    fn answered_fields_become_items() {
        let qr = build(
            &record(),
            &metadata(RecordMetadata {
                assessment_key: "R1".into(),
                ..Default::default()
            }),
            "Questionnaire/q",
        );

        assert_eq!(qr["resourceType"], "QuestionnaireResponse");
        assert_eq!(qr["status"], "completed");
        assert_eq!(qr["questionnaire"], "Questionnaire/q");
        assert_eq!(qr["identifier"]["value"], "R1");
        assert_eq!(qr["authored"], "2024-01-05");
        let items = qr["item"].as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["linkId"], "A");
        assert_eq!(items[0]["item"].as_array().unwrap().len(), 1);
        assert_eq!(items[0]["item"][0]["answer"][0]["valueString"], "2");
    }

    #[test]
    fn unknown_resources_are_not_referenced() {
        let qr = build(&record(), &metadata(RecordMetadata::default()), "Q");
        assert!(qr.get("encounter").is_none());
        assert!(qr.get("subject").is_none());
        assert!(qr.get("id").is_none());
    }

    #[test]
    fn encounter_section_with_use_and_no_id_is_not_referenced() {
        let mut record = record();
        record.encounter = Some(Fields::from([(
            "admission_date".into(),
            "2024-01-02".into(),
        )]));
        let qr = build(
            &record,
            &metadata(RecordMetadata {
                patient_id: "P1".into(),
                assessment_type: "FIRST ASSESSMENT".into(),
                ..Default::default()
            }),
            "Q",
        );
        assert_eq!(qr["subject"]["reference"], "Patient/P1");
        assert!(qr.get("encounter").is_none());
    }

    #[test]
    fn created_resources_are_referenced_by_temporary_id() {
        let mut record = record();
        record.encounter = Some(Fields::new());
        let metadata = metadata(RecordMetadata {
            patient_operation: "CREATE".into(),
            encounter_operation: "CREATE".into(),
            ..Default::default()
        });
        let qr = build(&record, &metadata, "Q");
        assert_eq!(
            qr["subject"]["reference"],
            format!("urn:uuid:{}", metadata.patient.id)
        );
        assert_eq!(
            qr["encounter"]["reference"],
            format!("urn:uuid:{}", metadata.encounter.id)
        );
    }

    #[test]
    fn supplied_encounter_is_referenced_without_section() {
        let qr = build(
            &record(),
            &metadata(RecordMetadata {
                encounter_id: "E1".into(),
                ..Default::default()
            }),
            "Q",
        );
        assert_eq!(qr["encounter"]["reference"], "Encounter/E1");
    }
}
