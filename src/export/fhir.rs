//! Interoperability Bundle: FHIR R4 JSON for handing to clinical systems.
//!
//! Every entry becomes one resource with a `urn:uuid:` fullUrl derived from
//! its stable id, so re-exports produce the same references. Cross-links
//! (medication → condition) are only emitted when the target made it into
//! the same bundle; a dangling reasonReference would be rejected downstream.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::models::{
    AbnormalFlag, AllergySeverity, Category, ConditionStatus, HealthRecord, ImagingModality,
    MedicationStatus, VitalSign, VitalType,
};
use crate::progress::{CancelToken, ProgressTracker};

use super::{BundleGrouping, ExportError};

const CATEGORY_IDENTIFIER_SYSTEM: &str = "urn:vitaport:category";
const LOINC_SYSTEM: &str = "http://loinc.org";

pub fn serialize(
    record: &HealthRecord,
    grouping: BundleGrouping,
    tracker: &mut ProgressTracker<'_>,
    cancel: &CancelToken,
) -> Result<Vec<u8>, ExportError> {
    let mut groups: Vec<(Category, Vec<Value>)> = Vec::new();
    let mut processed = 0;

    for category in Category::ALL {
        if cancel.is_cancelled() {
            return Err(ExportError::Cancelled);
        }
        let resources = resources_for(record, category);
        if !resources.is_empty() {
            groups.push((category, resources));
        }
        processed += record.category_count(category);
        tracker.generating_step(processed);
    }

    let bundle = match grouping {
        BundleGrouping::Collection => {
            let entries: Vec<Value> = groups
                .into_iter()
                .flat_map(|(_, resources)| resources)
                .map(entry)
                .collect();
            json!({
                "resourceType": "Bundle",
                "type": "collection",
                "entry": entries,
            })
        }
        BundleGrouping::PerCategory => {
            let inner: Vec<Value> = groups
                .into_iter()
                .map(|(category, resources)| {
                    let entries: Vec<Value> = resources.into_iter().map(entry).collect();
                    json!({
                        "resource": {
                            "resourceType": "Bundle",
                            "identifier": {
                                "system": CATEGORY_IDENTIFIER_SYSTEM,
                                "value": category.as_str(),
                            },
                            "type": "collection",
                            "entry": entries,
                        }
                    })
                })
                .collect();
            json!({
                "resourceType": "Bundle",
                "type": "collection",
                "entry": inner,
            })
        }
    };

    Ok(serde_json::to_vec_pretty(&bundle)?)
}

fn entry(resource: Value) -> Value {
    let full_url = resource
        .get("id")
        .and_then(Value::as_str)
        .map(|id| format!("urn:uuid:{id}"));
    match full_url {
        Some(url) => json!({ "fullUrl": url, "resource": resource }),
        None => json!({ "resource": resource }),
    }
}

fn resources_for(record: &HealthRecord, category: Category) -> Vec<Value> {
    match category {
        Category::Profile => record.profile.iter().map(|p| patient(p)).collect(),
        Category::Labs => record.labs.iter().map(lab_observation).collect(),
        Category::Medications => record
            .medications
            .iter()
            .map(|m| medication_statement(m, record))
            .collect(),
        Category::Conditions => record.conditions.iter().map(condition).collect(),
        Category::Procedures => record.procedures.iter().map(procedure).collect(),
        Category::Allergies => record.allergies.iter().map(allergy).collect(),
        Category::Immunizations => record.immunizations.iter().map(immunization).collect(),
        Category::Vitals => record.vitals.iter().map(vital_observation).collect(),
        Category::Imaging => record.imaging.iter().map(imaging_study).collect(),
        Category::Timeline => record.timeline.iter().map(timeline_basic).collect(),
        Category::Notes => record.notes.iter().map(note_reference).collect(),
    }
}

fn patient(p: &crate::models::PatientProfile) -> Value {
    let mut resource = json!({
        "resourceType": "Patient",
        "name": [{ "text": p.full_name }],
    });
    if let Some(dob) = p.date_of_birth {
        resource["birthDate"] = json!(dob.to_string());
    }
    if let Some(sex) = &p.sex {
        resource["gender"] = json!(sex);
    }
    if let Some(language) = &p.primary_language {
        resource["communication"] = json!([{ "language": { "text": language } }]);
    }
    resource
}

fn lab_observation(e: &crate::models::LabResult) -> Value {
    let mut code = json!({ "text": e.test_name });
    if let Some(loinc) = &e.test_code {
        code["coding"] = json!([{ "system": LOINC_SYSTEM, "code": loinc }]);
    }
    let mut resource = json!({
        "resourceType": "Observation",
        "id": e.id.to_string(),
        "status": "final",
        "category": [{ "coding": [{ "code": "laboratory" }] }],
        "code": code,
        "effectiveDateTime": e.collection_date.to_string(),
    });
    match (e.value, e.value_text.as_deref()) {
        (Some(value), _) => {
            let mut quantity = json!({ "value": value });
            if let Some(unit) = &e.unit {
                quantity["unit"] = json!(unit);
            }
            resource["valueQuantity"] = quantity;
        }
        (None, Some(text)) => resource["valueString"] = json!(text),
        (None, None) => {}
    }
    if let Some(interpretation) = interpretation_code(e.abnormal_flag) {
        resource["interpretation"] = json!([{ "coding": [{ "code": interpretation }] }]);
    }
    if let (Some(low), Some(high)) = (e.reference_range_low, e.reference_range_high) {
        resource["referenceRange"] = json!([{
            "low": { "value": low },
            "high": { "value": high },
        }]);
    }
    if let Some(facility) = &e.lab_facility {
        resource["performer"] = json!([{ "display": facility }]);
    }
    resource
}

fn interpretation_code(flag: AbnormalFlag) -> Option<&'static str> {
    match flag {
        AbnormalFlag::Normal => None,
        AbnormalFlag::Low => Some("L"),
        AbnormalFlag::High => Some("H"),
        AbnormalFlag::CriticalLow => Some("LL"),
        AbnormalFlag::CriticalHigh => Some("HH"),
    }
}

fn medication_statement(e: &crate::models::Medication, record: &HealthRecord) -> Value {
    let status = match e.status {
        MedicationStatus::Active => "active",
        MedicationStatus::Stopped => "completed",
        MedicationStatus::Paused => "on-hold",
    };
    let mut name = json!({ "text": e.generic_name });
    if let Some(brand) = &e.brand_name {
        name["coding"] = json!([{ "display": brand }]);
    }
    let mut period = json!({ "start": e.start_date.to_string() });
    if let Some(end) = e.end_date {
        period["end"] = json!(end.to_string());
    }
    let mut resource = json!({
        "resourceType": "MedicationStatement",
        "id": e.id.to_string(),
        "status": status,
        "medicationCodeableConcept": name,
        "effectivePeriod": period,
        "dosage": [{ "text": format!("{}, {}, {}", e.dose, e.frequency, e.route) }],
    });
    if let Some(condition_id) = e.condition_id {
        if condition_present(record, condition_id) {
            resource["reasonReference"] =
                json!([{ "reference": format!("urn:uuid:{condition_id}") }]);
        }
    }
    resource
}

fn condition_present(record: &HealthRecord, id: Uuid) -> bool {
    record.conditions.iter().any(|c| c.id == id)
}

fn condition(e: &crate::models::Condition) -> Value {
    let clinical = match e.status {
        ConditionStatus::Active | ConditionStatus::Monitoring => "active",
        ConditionStatus::Resolved => "resolved",
    };
    let mut code = json!({ "text": e.name });
    if let Some(c) = &e.code {
        code["coding"] = json!([{ "code": c }]);
    }
    let mut resource = json!({
        "resourceType": "Condition",
        "id": e.id.to_string(),
        "clinicalStatus": { "coding": [{ "code": clinical }] },
        "code": code,
        "onsetDateTime": e.onset_date.to_string(),
    });
    if let Some(resolved) = e.resolved_date {
        resource["abatementDateTime"] = json!(resolved.to_string());
    }
    if let Some(notes) = &e.notes {
        resource["note"] = json!([{ "text": notes }]);
    }
    resource
}

fn procedure(e: &crate::models::Procedure) -> Value {
    let mut resource = json!({
        "resourceType": "Procedure",
        "id": e.id.to_string(),
        "status": "completed",
        "code": { "text": e.name },
        "performedDateTime": e.date.to_string(),
    });
    if let Some(facility) = &e.facility {
        resource["location"] = json!({ "display": facility });
    }
    if let Some(outcome) = &e.outcome {
        resource["outcome"] = json!({ "text": outcome });
    }
    resource
}

fn allergy(e: &crate::models::Allergy) -> Value {
    let criticality = match e.severity {
        AllergySeverity::Mild | AllergySeverity::Moderate => "low",
        AllergySeverity::Severe | AllergySeverity::LifeThreatening => "high",
    };
    let reaction_severity = match e.severity {
        AllergySeverity::Mild => "mild",
        AllergySeverity::Moderate => "moderate",
        AllergySeverity::Severe | AllergySeverity::LifeThreatening => "severe",
    };
    let mut reaction = json!({ "severity": reaction_severity });
    if let Some(manifestation) = &e.reaction {
        reaction["manifestation"] = json!([{ "text": manifestation }]);
    }
    json!({
        "resourceType": "AllergyIntolerance",
        "id": e.id.to_string(),
        "code": { "text": e.allergen },
        "criticality": criticality,
        "recordedDate": e.recorded_date.to_string(),
        "reaction": [reaction],
    })
}

fn immunization(e: &crate::models::Immunization) -> Value {
    let mut resource = json!({
        "resourceType": "Immunization",
        "id": e.id.to_string(),
        "status": "completed",
        "vaccineCode": { "text": e.vaccine },
        "occurrenceDateTime": e.date.to_string(),
    });
    if let Some(dose) = e.dose_number {
        resource["protocolApplied"] = json!([{ "doseNumberPositiveInt": dose }]);
    }
    if let Some(facility) = &e.facility {
        resource["location"] = json!({ "display": facility });
    }
    resource
}

/// LOINC codes for the vital-signs profile.
fn vital_loinc(vital_type: VitalType) -> &'static str {
    match vital_type {
        VitalType::Temperature => "8310-5",
        VitalType::BloodPressure => "85354-9",
        VitalType::Weight => "29463-7",
        VitalType::Height => "8302-2",
        VitalType::HeartRate => "8867-4",
        VitalType::BloodGlucose => "2339-0",
        VitalType::OxygenSaturation => "2708-6",
    }
}

fn vital_observation(e: &VitalSign) -> Value {
    let mut resource = json!({
        "resourceType": "Observation",
        "id": e.id.to_string(),
        "status": "final",
        "category": [{ "coding": [{ "code": "vital-signs" }] }],
        "code": {
            "coding": [{ "system": LOINC_SYSTEM, "code": vital_loinc(e.vital_type) }],
            "text": e.vital_type.as_str(),
        },
        "effectiveDateTime": e.measured_at.format("%Y-%m-%dT%H:%M:%S").to_string(),
    });
    // Blood pressure with a diastolic reading becomes a two-component
    // observation; everything else is a single quantity.
    match (e.vital_type, e.secondary_value) {
        (VitalType::BloodPressure, Some(diastolic)) => {
            resource["component"] = json!([
                {
                    "code": { "coding": [{ "system": LOINC_SYSTEM, "code": "8480-6" }] },
                    "valueQuantity": { "value": e.value, "unit": e.unit },
                },
                {
                    "code": { "coding": [{ "system": LOINC_SYSTEM, "code": "8462-4" }] },
                    "valueQuantity": { "value": diastolic, "unit": e.unit },
                },
            ]);
        }
        _ => {
            resource["valueQuantity"] = json!({ "value": e.value, "unit": e.unit });
        }
    }
    resource
}

fn imaging_modality_code(modality: ImagingModality) -> &'static str {
    match modality {
        ImagingModality::Xray => "DX",
        ImagingModality::Ct => "CT",
        ImagingModality::Mri => "MR",
        ImagingModality::Ultrasound => "US",
        ImagingModality::Pet => "PT",
        ImagingModality::Other => "OT",
    }
}

fn imaging_study(e: &crate::models::ImagingStudy) -> Value {
    let mut resource = json!({
        "resourceType": "ImagingStudy",
        "id": e.id.to_string(),
        "status": "available",
        "modality": [{ "code": imaging_modality_code(e.modality) }],
        "started": e.date.to_string(),
        "series": [{
            "uid": e.id.to_string(),
            "modality": { "code": imaging_modality_code(e.modality) },
            "bodySite": { "display": e.body_site },
        }],
    });
    if let Some(findings) = &e.findings {
        resource["description"] = json!(findings);
    }
    if let Some(facility) = &e.facility {
        resource["location"] = json!({ "display": facility });
    }
    resource
}

fn timeline_basic(e: &crate::models::TimelineEvent) -> Value {
    json!({
        "resourceType": "Basic",
        "id": e.id.to_string(),
        "code": { "text": e.event_type },
        "created": e.date.to_string(),
        "text": {
            "status": "generated",
            "div": format!(
                "<div xmlns=\"http://www.w3.org/1999/xhtml\">{}</div>",
                escape_xhtml(&e.description)
            ),
        },
    })
}

fn escape_xhtml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn note_reference(e: &crate::models::Note) -> Value {
    json!({
        "resourceType": "DocumentReference",
        "id": e.id.to_string(),
        "status": "current",
        "description": e.title,
        "date": e.created_at.format("%Y-%m-%dT%H:%M:%S").to_string(),
        "content": [{
            "attachment": {
                "contentType": "text/plain",
                "data": BASE64.encode(e.body.as_bytes()),
            }
        }],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::*;
    use crate::progress::NullSink;
    use chrono::NaiveDate;

    fn run(record: &HealthRecord, grouping: BundleGrouping) -> Value {
        let mut sink = NullSink;
        let mut tracker = ProgressTracker::new(&mut sink);
        let bytes = serialize(record, grouping, &mut tracker, &CancelToken::new()).unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn condition_entry(name: &str) -> Condition {
        Condition {
            id: Uuid::new_v4(),
            name: name.into(),
            code: None,
            status: ConditionStatus::Active,
            onset_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            resolved_date: None,
            notes: None,
        }
    }

    fn medication_for(condition_id: Option<Uuid>) -> Medication {
        Medication {
            id: Uuid::new_v4(),
            generic_name: "Lisinopril".into(),
            brand_name: None,
            dose: "10 mg".into(),
            frequency: "once daily".into(),
            route: "oral".into(),
            status: MedicationStatus::Active,
            start_date: NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
            end_date: None,
            is_otc: false,
            condition_id,
            instructions: None,
        }
    }

    #[test]
    fn collection_bundle_flattens_all_resources() {
        let record = HealthRecord {
            profile: Some(PatientProfile::named("Marie Dubois")),
            conditions: vec![condition_entry("Hypertension")],
            ..Default::default()
        };
        let bundle = run(&record, BundleGrouping::Collection);
        assert_eq!(bundle["resourceType"], "Bundle");
        assert_eq!(bundle["type"], "collection");
        let entries = bundle["entry"].as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["resource"]["resourceType"], "Patient");
        assert_eq!(entries[1]["resource"]["resourceType"], "Condition");
    }

    #[test]
    fn per_category_grouping_nests_inner_bundles() {
        let record = HealthRecord {
            conditions: vec![condition_entry("Hypertension")],
            medications: vec![medication_for(None)],
            ..Default::default()
        };
        let bundle = run(&record, BundleGrouping::PerCategory);
        let entries = bundle["entry"].as_array().unwrap();
        assert_eq!(entries.len(), 2);
        for inner in entries {
            assert_eq!(inner["resource"]["resourceType"], "Bundle");
            assert_eq!(
                inner["resource"]["identifier"]["system"],
                CATEGORY_IDENTIFIER_SYSTEM
            );
        }
        assert_eq!(entries[0]["resource"]["identifier"]["value"], "medications");
        assert_eq!(entries[1]["resource"]["identifier"]["value"], "conditions");
    }

    #[test]
    fn medication_links_condition_only_when_present() {
        let condition = condition_entry("Hypertension");
        let condition_id = condition.id;

        let linked = HealthRecord {
            conditions: vec![condition],
            medications: vec![medication_for(Some(condition_id))],
            ..Default::default()
        };
        let bundle = run(&linked, BundleGrouping::Collection);
        let statement = &bundle["entry"][0]["resource"];
        assert_eq!(statement["resourceType"], "MedicationStatement");
        assert_eq!(
            statement["reasonReference"][0]["reference"],
            format!("urn:uuid:{condition_id}")
        );

        // Same medication without the condition in scope: no dangling link.
        let unlinked = HealthRecord {
            medications: vec![medication_for(Some(condition_id))],
            ..Default::default()
        };
        let bundle = run(&unlinked, BundleGrouping::Collection);
        assert!(bundle["entry"][0]["resource"]["reasonReference"].is_null());
    }

    #[test]
    fn blood_pressure_becomes_two_components() {
        let record = HealthRecord {
            vitals: vec![VitalSign {
                id: Uuid::new_v4(),
                vital_type: VitalType::BloodPressure,
                value: 120.0,
                secondary_value: Some(80.0),
                unit: "mmHg".into(),
                measured_at: NaiveDate::from_ymd_opt(2026, 2, 1)
                    .unwrap()
                    .and_hms_opt(8, 0, 0)
                    .unwrap(),
            }],
            ..Default::default()
        };
        let bundle = run(&record, BundleGrouping::Collection);
        let observation = &bundle["entry"][0]["resource"];
        let components = observation["component"].as_array().unwrap();
        assert_eq!(components.len(), 2);
        assert_eq!(components[0]["valueQuantity"]["value"], 120.0);
        assert_eq!(components[1]["valueQuantity"]["value"], 80.0);
        assert!(observation["valueQuantity"].is_null());
    }

    #[test]
    fn lab_interpretation_follows_abnormal_flag() {
        let record = HealthRecord {
            labs: vec![LabResult {
                id: Uuid::new_v4(),
                test_name: "Potassium".into(),
                test_code: Some("2823-3".into()),
                value: Some(5.6),
                value_text: None,
                unit: Some("mEq/L".into()),
                reference_range_low: Some(3.5),
                reference_range_high: Some(5.0),
                abnormal_flag: AbnormalFlag::High,
                collection_date: NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(),
                lab_facility: None,
            }],
            ..Default::default()
        };
        let bundle = run(&record, BundleGrouping::Collection);
        let observation = &bundle["entry"][0]["resource"];
        assert_eq!(observation["interpretation"][0]["coding"][0]["code"], "H");
        assert_eq!(observation["code"]["coding"][0]["code"], "2823-3");
        assert_eq!(observation["valueQuantity"]["value"], 5.6);
    }

    #[test]
    fn note_body_is_base64_attachment() {
        let record = HealthRecord {
            notes: vec![Note {
                id: Uuid::new_v4(),
                title: "Visit".into(),
                body: "Follow-up in 3 months".into(),
                created_at: NaiveDate::from_ymd_opt(2026, 1, 10)
                    .unwrap()
                    .and_hms_opt(9, 30, 0)
                    .unwrap(),
            }],
            ..Default::default()
        };
        let bundle = run(&record, BundleGrouping::Collection);
        let attachment = &bundle["entry"][0]["resource"]["content"][0]["attachment"];
        let data = attachment["data"].as_str().unwrap();
        let decoded = BASE64.decode(data).unwrap();
        assert_eq!(decoded, b"Follow-up in 3 months");
    }

    #[test]
    fn full_urls_use_entry_ids() {
        let condition = condition_entry("Hypertension");
        let id = condition.id;
        let record = HealthRecord {
            conditions: vec![condition],
            ..Default::default()
        };
        let bundle = run(&record, BundleGrouping::Collection);
        assert_eq!(bundle["entry"][0]["fullUrl"], format!("urn:uuid:{id}"));
    }
}
