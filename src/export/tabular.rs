//! Tabular Extract: one flat CSV row set per category.
//!
//! Sections are delimited by `# category: <name>` comment lines under a
//! single format marker line, so the artifact stays one file while each
//! category keeps its own header row. Escaping is the `csv` crate's
//! deterministic quoting; re-parsing a cell yields the exact scalar value.
//! Structure round-trip is not a goal of this format.

use uuid::Uuid;

use crate::models::{Category, HealthRecord};
use crate::progress::{CancelToken, ProgressTracker};

use super::ExportError;

/// First line of every tabular extract; format detection keys on it.
pub const TABULAR_MAGIC: &str = "# vitaport tabular v1";

pub fn serialize(
    record: &HealthRecord,
    tracker: &mut ProgressTracker<'_>,
    cancel: &CancelToken,
) -> Result<Vec<u8>, ExportError> {
    let mut out = Vec::new();
    out.extend_from_slice(TABULAR_MAGIC.as_bytes());
    out.push(b'\n');

    let mut processed = 0;
    for category in Category::ALL {
        if cancel.is_cancelled() {
            return Err(ExportError::Cancelled);
        }
        let count = record.category_count(category);
        if count > 0 {
            write_section(&mut out, record, category)?;
        }
        processed += count;
        tracker.generating_step(processed);
    }

    Ok(out)
}

fn write_section(
    out: &mut Vec<u8>,
    record: &HealthRecord,
    category: Category,
) -> Result<(), ExportError> {
    out.push(b'\n');
    out.extend_from_slice(format!("# category: {}\n", category.as_str()).as_bytes());

    let mut writer = csv::WriterBuilder::new().from_writer(vec![]);
    match category {
        Category::Profile => {
            writer.write_record([
                "full_name",
                "date_of_birth",
                "sex",
                "blood_type",
                "height_cm",
                "weight_kg",
                "primary_language",
            ])?;
            if let Some(p) = &record.profile {
                writer.write_record([
                    cell(category, None, &p.full_name)?,
                    opt_date(p.date_of_birth),
                    opt_cell(category, None, p.sex.as_deref())?,
                    opt_cell(category, None, p.blood_type.as_deref())?,
                    opt_f64(p.height_cm),
                    opt_f64(p.weight_kg),
                    opt_cell(category, None, p.primary_language.as_deref())?,
                ])?;
            }
        }
        Category::Labs => {
            writer.write_record([
                "id",
                "test_name",
                "test_code",
                "value",
                "value_text",
                "unit",
                "reference_range_low",
                "reference_range_high",
                "abnormal_flag",
                "collection_date",
                "lab_facility",
            ])?;
            for e in &record.labs {
                writer.write_record([
                    e.id.to_string(),
                    cell(category, Some(e.id), &e.test_name)?,
                    opt_cell(category, Some(e.id), e.test_code.as_deref())?,
                    opt_f64(e.value),
                    opt_cell(category, Some(e.id), e.value_text.as_deref())?,
                    opt_cell(category, Some(e.id), e.unit.as_deref())?,
                    opt_f64(e.reference_range_low),
                    opt_f64(e.reference_range_high),
                    e.abnormal_flag.as_str().to_string(),
                    e.collection_date.to_string(),
                    opt_cell(category, Some(e.id), e.lab_facility.as_deref())?,
                ])?;
            }
        }
        Category::Medications => {
            writer.write_record([
                "id",
                "generic_name",
                "brand_name",
                "dose",
                "frequency",
                "route",
                "status",
                "start_date",
                "end_date",
                "is_otc",
                "condition_id",
                "instructions",
            ])?;
            for e in &record.medications {
                writer.write_record([
                    e.id.to_string(),
                    cell(category, Some(e.id), &e.generic_name)?,
                    opt_cell(category, Some(e.id), e.brand_name.as_deref())?,
                    cell(category, Some(e.id), &e.dose)?,
                    cell(category, Some(e.id), &e.frequency)?,
                    cell(category, Some(e.id), &e.route)?,
                    e.status.as_str().to_string(),
                    e.start_date.to_string(),
                    opt_date(e.end_date),
                    e.is_otc.to_string(),
                    e.condition_id.map(|id| id.to_string()).unwrap_or_default(),
                    opt_cell(category, Some(e.id), e.instructions.as_deref())?,
                ])?;
            }
        }
        Category::Conditions => {
            writer.write_record([
                "id", "name", "code", "status", "onset_date", "resolved_date", "notes",
            ])?;
            for e in &record.conditions {
                writer.write_record([
                    e.id.to_string(),
                    cell(category, Some(e.id), &e.name)?,
                    opt_cell(category, Some(e.id), e.code.as_deref())?,
                    e.status.as_str().to_string(),
                    e.onset_date.to_string(),
                    opt_date(e.resolved_date),
                    opt_cell(category, Some(e.id), e.notes.as_deref())?,
                ])?;
            }
        }
        Category::Procedures => {
            writer.write_record([
                "id",
                "name",
                "date",
                "facility",
                "outcome",
                "follow_up_required",
            ])?;
            for e in &record.procedures {
                writer.write_record([
                    e.id.to_string(),
                    cell(category, Some(e.id), &e.name)?,
                    e.date.to_string(),
                    opt_cell(category, Some(e.id), e.facility.as_deref())?,
                    opt_cell(category, Some(e.id), e.outcome.as_deref())?,
                    e.follow_up_required.to_string(),
                ])?;
            }
        }
        Category::Allergies => {
            writer.write_record(["id", "allergen", "reaction", "severity", "recorded_date"])?;
            for e in &record.allergies {
                writer.write_record([
                    e.id.to_string(),
                    cell(category, Some(e.id), &e.allergen)?,
                    opt_cell(category, Some(e.id), e.reaction.as_deref())?,
                    e.severity.as_str().to_string(),
                    e.recorded_date.to_string(),
                ])?;
            }
        }
        Category::Immunizations => {
            writer.write_record(["id", "vaccine", "dose_number", "date", "facility"])?;
            for e in &record.immunizations {
                writer.write_record([
                    e.id.to_string(),
                    cell(category, Some(e.id), &e.vaccine)?,
                    e.dose_number.map(|n| n.to_string()).unwrap_or_default(),
                    e.date.to_string(),
                    opt_cell(category, Some(e.id), e.facility.as_deref())?,
                ])?;
            }
        }
        Category::Vitals => {
            writer.write_record([
                "id",
                "vital_type",
                "value",
                "secondary_value",
                "unit",
                "measured_at",
            ])?;
            for e in &record.vitals {
                writer.write_record([
                    e.id.to_string(),
                    e.vital_type.as_str().to_string(),
                    e.value.to_string(),
                    opt_f64(e.secondary_value),
                    cell(category, Some(e.id), &e.unit)?,
                    e.measured_at.to_string(),
                ])?;
            }
        }
        Category::Imaging => {
            writer.write_record(["id", "modality", "body_site", "date", "facility", "findings"])?;
            for e in &record.imaging {
                writer.write_record([
                    e.id.to_string(),
                    e.modality.as_str().to_string(),
                    cell(category, Some(e.id), &e.body_site)?,
                    e.date.to_string(),
                    opt_cell(category, Some(e.id), e.facility.as_deref())?,
                    opt_cell(category, Some(e.id), e.findings.as_deref())?,
                ])?;
            }
        }
        Category::Timeline => {
            writer.write_record(["id", "event_type", "description", "date", "severity"])?;
            for e in &record.timeline {
                writer.write_record([
                    e.id.to_string(),
                    cell(category, Some(e.id), &e.event_type)?,
                    cell(category, Some(e.id), &e.description)?,
                    e.date.to_string(),
                    e.severity.map(|s| s.to_string()).unwrap_or_default(),
                ])?;
            }
        }
        Category::Notes => {
            writer.write_record(["id", "title", "body", "created_at"])?;
            for e in &record.notes {
                writer.write_record([
                    e.id.to_string(),
                    cell(category, Some(e.id), &e.title)?,
                    cell(category, Some(e.id), &e.body)?,
                    e.created_at.to_string(),
                ])?;
            }
        }
    }

    writer.flush()?;
    let section = writer
        .into_inner()
        .map_err(|e| ExportError::Io(e.into_error()))?;
    out.extend_from_slice(&section);
    Ok(())
}

/// A cell value must survive CSV escaping byte-for-byte; embedded NUL does
/// not, so it is unrepresentable in this format.
fn cell(category: Category, entry_id: Option<Uuid>, value: &str) -> Result<String, ExportError> {
    if value.contains('\0') {
        return Err(ExportError::Serialization {
            category,
            entry_id: entry_id.map(|id| id.to_string()).unwrap_or_else(|| "-".into()),
            reason: "value contains an embedded NUL byte".into(),
        });
    }
    Ok(value.to_string())
}

fn opt_cell(
    category: Category,
    entry_id: Option<Uuid>,
    value: Option<&str>,
) -> Result<String, ExportError> {
    match value {
        Some(v) => cell(category, entry_id, v),
        None => Ok(String::new()),
    }
}

fn opt_date(value: Option<chrono::NaiveDate>) -> String {
    value.map(|d| d.to_string()).unwrap_or_default()
}

fn opt_f64(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::*;
    use crate::progress::NullSink;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn run(record: &HealthRecord) -> Result<String, ExportError> {
        let mut sink = NullSink;
        let mut tracker = ProgressTracker::new(&mut sink);
        let bytes = serialize(record, &mut tracker, &CancelToken::new())?;
        Ok(String::from_utf8(bytes).unwrap())
    }

    fn note(body: &str) -> Note {
        Note {
            id: Uuid::new_v4(),
            title: "Visit".into(),
            body: body.into(),
            created_at: NaiveDate::from_ymd_opt(2026, 1, 10)
                .unwrap()
                .and_hms_opt(9, 30, 0)
                .unwrap(),
        }
    }

    #[test]
    fn starts_with_format_marker() {
        let text = run(&HealthRecord::default()).unwrap();
        assert!(text.starts_with(TABULAR_MAGIC));
    }

    #[test]
    fn one_section_per_populated_category() {
        let record = HealthRecord {
            profile: Some(PatientProfile::named("Marie Dubois")),
            notes: vec![note("Follow-up in 3 months")],
            ..Default::default()
        };
        let text = run(&record).unwrap();
        assert!(text.contains("# category: profile"));
        assert!(text.contains("# category: notes"));
        assert!(!text.contains("# category: labs"));
    }

    #[test]
    fn values_with_commas_and_quotes_reparse_exactly() {
        let tricky = "Ache, \"sharp\"\nworse at night";
        let record = HealthRecord {
            notes: vec![note(tricky)],
            ..Default::default()
        };
        let text = run(&record).unwrap();

        let section = text.split("# category: notes\n").nth(1).unwrap();
        let mut reader = csv::Reader::from_reader(section.as_bytes());
        let row = reader.records().next().unwrap().unwrap();
        assert_eq!(&row[2], tricky);
    }

    #[test]
    fn nul_byte_is_a_serialization_error() {
        let record = HealthRecord {
            notes: vec![note("bad\0body")],
            ..Default::default()
        };
        let err = run(&record).unwrap_err();
        match err {
            ExportError::Serialization { category, reason, .. } => {
                assert_eq!(category, Category::Notes);
                assert!(reason.contains("NUL"));
            }
            other => panic!("expected Serialization error, got {other}"),
        }
    }

    #[test]
    fn serialization_error_names_offending_entry() {
        let bad = note("x\0");
        let id = bad.id;
        let record = HealthRecord {
            notes: vec![bad],
            ..Default::default()
        };
        match run(&record).unwrap_err() {
            ExportError::Serialization { entry_id, .. } => {
                assert_eq!(entry_id, id.to_string());
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn output_is_deterministic() {
        let record = HealthRecord {
            profile: Some(PatientProfile::named("Marie Dubois")),
            notes: vec![note("stable")],
            ..Default::default()
        };
        assert_eq!(run(&record).unwrap(), run(&record).unwrap());
    }
}
