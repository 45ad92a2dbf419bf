//! Clinical Document: a human-readable sectioned report.
//!
//! Deterministic by construction: same record + options always produce
//! byte-identical output (no ambient timestamps), so the report can be
//! diffed between exports. Charts are emitted as trend descriptors, not
//! rendered images.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::labels::{get_category_name, Language};
use crate::models::{
    AbnormalFlag, Category, ConditionStatus, DateRange, HealthRecord, MedicationStatus,
};
use crate::progress::{CancelToken, ProgressTracker};

use super::{DocumentTemplate, ExportError};

#[derive(Debug, Clone)]
pub struct DocumentOptions {
    pub template: DocumentTemplate,
    pub include_charts: bool,
    pub language: Language,
    pub patient_name: Option<String>,
    pub date_range: Option<DateRange>,
}

pub fn serialize(
    record: &HealthRecord,
    options: &DocumentOptions,
    tracker: &mut ProgressTracker<'_>,
    cancel: &CancelToken,
) -> Result<Vec<u8>, ExportError> {
    let mut out = String::new();
    render_header(&mut out, record, options);

    let mut processed = 0;
    for category in Category::ALL {
        if cancel.is_cancelled() {
            return Err(ExportError::Cancelled);
        }
        let count = record.category_count(category);
        if count > 0 && category != Category::Profile {
            render_section(&mut out, record, category, options);
        }
        processed += count;
        tracker.generating_step(processed);
    }

    Ok(out.into_bytes())
}

fn title(language: Language) -> &'static str {
    match language {
        Language::English => "CLINICAL SUMMARY",
        Language::French => "RÉSUMÉ CLINIQUE",
    }
}

fn render_header(out: &mut String, record: &HealthRecord, options: &DocumentOptions) {
    let _ = writeln!(out, "{}", "=".repeat(64));
    let _ = writeln!(out, "{}", title(options.language));
    let _ = writeln!(out, "{}", "=".repeat(64));

    let name = options
        .patient_name
        .as_deref()
        .or(record.profile.as_ref().map(|p| p.full_name.as_str()));
    if let Some(name) = name {
        let label = match options.language {
            Language::English => "Patient",
            Language::French => "Patient(e)",
        };
        let _ = writeln!(out, "{label}: {name}");
    }
    if let Some(profile) = &record.profile {
        if let Some(dob) = profile.date_of_birth {
            let _ = writeln!(out, "Born: {dob}");
        }
        if let Some(blood) = &profile.blood_type {
            let _ = writeln!(out, "Blood type: {blood}");
        }
    }
    if let Some(range) = options.date_range {
        let label = match options.language {
            Language::English => "Period",
            Language::French => "Période",
        };
        let _ = writeln!(out, "{label}: {} — {}", range.start, range.end);
    }
    let _ = writeln!(out);
}

fn render_section(
    out: &mut String,
    record: &HealthRecord,
    category: Category,
    options: &DocumentOptions,
) {
    let name = get_category_name(category, options.language);
    let count = record.category_count(category);
    let _ = writeln!(out, "-- {name} ({count}) --");

    match category {
        Category::Labs => render_labs(out, record, options),
        Category::Medications => render_medications(out, record, options),
        Category::Conditions => render_conditions(out, record, options),
        Category::Procedures => {
            for e in &record.procedures {
                let _ = writeln!(out, "  {}  {}", e.date, e.name);
                if options.template == DocumentTemplate::Detailed {
                    if let Some(outcome) = &e.outcome {
                        let _ = writeln!(out, "      outcome: {outcome}");
                    }
                }
            }
        }
        Category::Allergies => {
            for e in &record.allergies {
                let _ = writeln!(out, "  {} [{}]", e.allergen, e.severity.as_str());
                if options.template == DocumentTemplate::Detailed {
                    if let Some(reaction) = &e.reaction {
                        let _ = writeln!(out, "      reaction: {reaction}");
                    }
                }
            }
        }
        Category::Immunizations => {
            for e in &record.immunizations {
                match e.dose_number {
                    Some(n) => {
                        let _ = writeln!(out, "  {}  {} (dose {n})", e.date, e.vaccine);
                    }
                    None => {
                        let _ = writeln!(out, "  {}  {}", e.date, e.vaccine);
                    }
                }
            }
        }
        Category::Vitals => render_vitals(out, record, options),
        Category::Imaging => {
            for e in &record.imaging {
                let _ = writeln!(
                    out,
                    "  {}  {} — {}",
                    e.date,
                    e.modality.as_str(),
                    e.body_site
                );
                if options.template == DocumentTemplate::Detailed {
                    if let Some(findings) = &e.findings {
                        let _ = writeln!(out, "      findings: {findings}");
                    }
                }
            }
        }
        Category::Timeline => {
            for e in &record.timeline {
                let _ = writeln!(out, "  {}  [{}] {}", e.date, e.event_type, e.description);
            }
        }
        Category::Notes => {
            for e in &record.notes {
                let _ = writeln!(out, "  {}  {}", e.created_at.date(), e.title);
                if options.template == DocumentTemplate::Detailed {
                    let _ = writeln!(out, "      {}", e.body);
                }
            }
        }
        Category::Profile => {}
    }

    let _ = writeln!(out);
}

fn render_labs(out: &mut String, record: &HealthRecord, options: &DocumentOptions) {
    let abnormal = record
        .labs
        .iter()
        .filter(|e| e.abnormal_flag != AbnormalFlag::Normal)
        .count();
    let _ = writeln!(out, "  abnormal: {abnormal} of {}", record.labs.len());

    for e in &record.labs {
        let value = match (e.value, e.value_text.as_deref()) {
            (Some(v), _) => v.to_string(),
            (None, Some(t)) => t.to_string(),
            (None, None) => "-".to_string(),
        };
        let unit = e.unit.as_deref().unwrap_or("");
        let flag = if e.abnormal_flag == AbnormalFlag::Normal {
            String::new()
        } else {
            format!("  [{}]", e.abnormal_flag.as_str())
        };
        let _ = writeln!(
            out,
            "  {}  {}: {value} {unit}{flag}",
            e.collection_date, e.test_name
        );
        if options.template == DocumentTemplate::Detailed {
            if let (Some(low), Some(high)) = (e.reference_range_low, e.reference_range_high) {
                let _ = writeln!(out, "      reference: {low}–{high} {unit}");
            }
        }
    }

    if options.include_charts {
        render_lab_charts(out, record);
    }
}

fn render_medications(out: &mut String, record: &HealthRecord, options: &DocumentOptions) {
    let active = record
        .medications
        .iter()
        .filter(|e| e.status == MedicationStatus::Active)
        .count();
    let _ = writeln!(out, "  active: {active} of {}", record.medications.len());

    for e in &record.medications {
        let _ = writeln!(
            out,
            "  {} {} — {} ({})",
            e.generic_name,
            e.dose,
            e.frequency,
            e.status.as_str()
        );
        if options.template == DocumentTemplate::Detailed {
            if let Some(instructions) = &e.instructions {
                let _ = writeln!(out, "      {instructions}");
            }
        }
    }
}

fn render_conditions(out: &mut String, record: &HealthRecord, options: &DocumentOptions) {
    let active = record
        .conditions
        .iter()
        .filter(|e| e.status == ConditionStatus::Active)
        .count();
    let _ = writeln!(out, "  active: {active} of {}", record.conditions.len());

    for e in &record.conditions {
        let _ = writeln!(
            out,
            "  {} ({}) since {}",
            e.name,
            e.status.as_str(),
            e.onset_date
        );
        if options.template == DocumentTemplate::Detailed {
            if let Some(notes) = &e.notes {
                let _ = writeln!(out, "      {notes}");
            }
        }
    }
}

fn render_vitals(out: &mut String, record: &HealthRecord, options: &DocumentOptions) {
    for e in &record.vitals {
        let value = match e.secondary_value {
            Some(secondary) => format!("{}/{}", e.value, secondary),
            None => e.value.to_string(),
        };
        let _ = writeln!(
            out,
            "  {}  {}: {value} {}",
            e.measured_at.date(),
            e.vital_type.as_str(),
            e.unit
        );
    }

    if options.include_charts {
        render_vital_charts(out, record);
    }
}

/// Trend descriptors: one `[chart]` line per series with at least two
/// points, sorted by name so output order is stable.
fn render_lab_charts(out: &mut String, record: &HealthRecord) {
    let mut series: BTreeMap<String, Vec<(chrono::NaiveDate, f64)>> = BTreeMap::new();
    for e in &record.labs {
        if let Some(value) = e.value {
            series
                .entry(e.test_name.clone())
                .or_default()
                .push((e.collection_date, value));
        }
    }
    render_chart_lines(out, series);
}

fn render_vital_charts(out: &mut String, record: &HealthRecord) {
    let mut series: BTreeMap<String, Vec<(chrono::NaiveDate, f64)>> = BTreeMap::new();
    for e in &record.vitals {
        series
            .entry(e.vital_type.as_str().to_string())
            .or_default()
            .push((e.measured_at.date(), e.value));
    }
    render_chart_lines(out, series);
}

fn render_chart_lines(out: &mut String, series: BTreeMap<String, Vec<(chrono::NaiveDate, f64)>>) {
    for (name, mut points) in series {
        if points.len() < 2 {
            continue;
        }
        points.sort_by_key(|(date, _)| *date);
        let rendered: Vec<String> = points
            .iter()
            .map(|(date, value)| format!("{date}:{value}"))
            .collect();
        let _ = writeln!(out, "  [chart] line | {name} | {}", rendered.join(" "));
    }
}
