use serde_json::{Map, Value as JsonValue, json};

use super::{
    ENCOUNTER_KEY_SYSTEM, FACILITY_SYSTEM, coding, includes_patient, known_reference, resource_id,
};
use crate::identity::NormalizedMetadata;
use crate::record::{Fields, ParsedRecord, fhir_date, field, non_blank};

const PAYMENT_SOURCE_SYSTEM: &str = "urn:submission:payment-source";
const ADMIT_SOURCE_SYSTEM: &str = "urn:submission:admit-source";
const DISCHARGE_DESTINATION_SYSTEM: &str = "urn:submission:discharge-destination";
const READMISSION_SYSTEM: &str = "urn:submission:readmission";
const ACT_CODE_SYSTEM: &str = "http://terminology.hl7.org/CodeSystem/v3-ActCode";

const ACCOUNT_ID: &str = "payment-source";
const ORIGIN_ID: &str = "admit-source";
const DESTINATION_ID: &str = "discharge-destination";

/// Discharge-to value for a patient who died; no destination location.
pub const DISCHARGE_EXPIRED: &str = "expired";

/// Payment source fields: (field name, coverage code, display)
pub const COVERAGE_FIELDS: [(&str, &str, &str); 11] = [
    ("coverage_medicare_ffs", "medicare-ffs", "Medicare (traditional fee-for-service)"),
    (
        "coverage_medicare_advantage",
        "medicare-advantage",
        "Medicare (managed care/Part C/Medicare Advantage)",
    ),
    ("coverage_medicaid_ffs", "medicaid-ffs", "Medicaid (traditional fee-for-service)"),
    ("coverage_medicaid_managed", "medicaid-managed", "Medicaid (managed care)"),
    ("coverage_workers_comp", "workers-comp", "Workers' compensation"),
    ("coverage_title_programs", "title-programs", "Title programs"),
    ("coverage_other_government", "other-government", "Other government"),
    ("coverage_private_insurance", "private-insurance", "Private insurance/Medigap"),
    ("coverage_private_managed", "private-managed", "Private managed care"),
    ("coverage_self_pay", "self-pay", "Self-pay"),
    ("coverage_other", "other", "Other"),
];

/// Build the Encounter payload
pub(super) fn build(
    fields: &Fields,
    record: &ParsedRecord,
    metadata: &NormalizedMetadata,
) -> JsonValue {
    let subject = known_reference(&metadata.patient, includes_patient(metadata));

    let mut contained = Vec::new();
    let account = payment_source(fields, subject.as_ref(), &mut contained);
    let hospitalization = hospitalization(fields, &mut contained);

    let mut encounter = Map::new();
    encounter.insert("resourceType".into(), json!("Encounter"));
    if let Some(id) = resource_id(&metadata.encounter) {
        encounter.insert("id".into(), json!(id));
    }
    if !contained.is_empty() {
        encounter.insert("contained".into(), JsonValue::Array(contained));
    }
    if let Some(key) = non_blank(&metadata.encounter.key) {
        encounter.insert(
            "identifier".into(),
            json!([{ "system": ENCOUNTER_KEY_SYSTEM, "value": key }]),
        );
    }

    let discharge_date = field(fields, "discharge_date");
    let status = if discharge_date.is_some() {
        "finished"
    } else {
        "in-progress"
    };
    encounter.insert("status".into(), json!(status));
    encounter.insert(
        "class".into(),
        json!({ "system": ACT_CODE_SYSTEM, "code": "IMP", "display": "inpatient encounter" }),
    );
    if let Some(subject) = subject {
        encounter.insert("subject".into(), subject);
    }

    let start_field = if metadata.is_return() {
        "return_date"
    } else {
        "admission_date"
    };
    let mut period = Map::new();
    if let Some(start) = field(fields, start_field) {
        period.insert("start".into(), json!(fhir_date(start)));
    }
    if let Some(end) = discharge_date {
        period.insert("end".into(), json!(fhir_date(end)));
    }
    if !period.is_empty() {
        encounter.insert("period".into(), JsonValue::Object(period));
    }

    if let Some(account) = account {
        encounter.insert("account".into(), json!([account]));
    }
    if let Some(hospitalization) = hospitalization {
        encounter.insert("hospitalization".into(), hospitalization);
    }
    if let Some(facility) = field(&record.admin, "facility_id") {
        encounter.insert(
            "serviceProvider".into(),
            json!({ "identifier": { "system": FACILITY_SYSTEM, "value": facility } }),
        );
    }

    JsonValue::Object(encounter)
}

/// Contained Account plus one Coverage per non-blank payment source field
fn payment_source(
    fields: &Fields,
    subject: Option<&JsonValue>,
    contained: &mut Vec<JsonValue>,
) -> Option<JsonValue> {
    let sources: Vec<(&str, &str)> = COVERAGE_FIELDS
        .iter()
        .filter(|(name, _, _)| field(fields, name).is_some())
        .map(|&(_, code, display)| (code, display))
        .collect();

    if sources.is_empty() {
        return None;
    }

    let mut account_coverage = Vec::with_capacity(sources.len());
    for (priority, (code, display)) in sources.iter().enumerate() {
        let coverage_id = format!("coverage-{}", code);
        let mut coverage = json!({
            "resourceType": "Coverage",
            "id": coverage_id,
            "status": "active",
            "type": {
                "coding": [{ "system": PAYMENT_SOURCE_SYSTEM, "code": code, "display": display }]
            }
        });
        if let Some(subject) = subject {
            coverage["beneficiary"] = subject.clone();
        }
        coverage["payor"] = json!([{ "display": display }]);
        contained.push(coverage);
        account_coverage.push(json!({
            "coverage": { "reference": format!("#{}", coverage_id) },
            "priority": priority + 1
        }));
    }

    let mut account = json!({
        "resourceType": "Account",
        "id": ACCOUNT_ID,
        "status": "active"
    });
    if let Some(subject) = subject {
        account["subject"] = json!([subject]);
    }
    account["coverage"] = JsonValue::Array(account_coverage);
    contained.push(account);

    Some(json!({ "reference": format!("#{}", ACCOUNT_ID) }))
}

/// Origin, destination, re-admission flag and discharge disposition.
/// Present only when an admit source, a discharge destination or a
/// re-admission flag is recorded.
fn hospitalization(fields: &Fields, contained: &mut Vec<JsonValue>) -> Option<JsonValue> {
    let admitted_from = field(fields, "admitted_from");
    let discharged_to = field(fields, "discharged_to");
    let readmission = field(fields, "readmission");

    if admitted_from.is_none() && discharged_to.is_none() && readmission.is_none() {
        return None;
    }

    let mut hospitalization = Map::new();

    if let Some(source) = admitted_from {
        contained.push(location(ORIGIN_ID, ADMIT_SOURCE_SYSTEM, source));
        hospitalization.insert(
            "origin".into(),
            json!({ "reference": format!("#{}", ORIGIN_ID) }),
        );
        hospitalization.insert("admitSource".into(), coding(ADMIT_SOURCE_SYSTEM, source));
    }
    if let Some(flag) = readmission {
        hospitalization.insert("reAdmission".into(), coding(READMISSION_SYSTEM, flag));
    }
    if let Some(destination) = discharged_to {
        if !destination.eq_ignore_ascii_case(DISCHARGE_EXPIRED) {
            contained.push(location(
                DESTINATION_ID,
                DISCHARGE_DESTINATION_SYSTEM,
                destination,
            ));
            hospitalization.insert(
                "destination".into(),
                json!({ "reference": format!("#{}", DESTINATION_ID) }),
            );
        }
        hospitalization.insert(
            "dischargeDisposition".into(),
            coding(DISCHARGE_DESTINATION_SYSTEM, destination),
        );
    }

    Some(JsonValue::Object(hospitalization))
}

fn location(id: &str, system: &str, code: &str) -> JsonValue {
    json!({
        "resourceType": "Location",
        "id": id,
        "status": "active",
        "type": [coding(system, code)]
    })
}
