//! Structural validation of a Structured Backup payload.
//!
//! Recoverable anomalies never abort: unknown fields become warnings,
//! entries with a missing, malformed, or duplicate id become per-entry
//! failures. Only a payload that is not a backup at all (or one written by
//! a newer engine) is a hard error.

use std::collections::HashSet;

use serde::de::DeserializeOwned;
use serde_json::Value;
use uuid::Uuid;

use crate::export::backup::BACKUP_FORMAT_VERSION;
use crate::models::{Category, HealthRecord, PatientProfile};

use super::ImportError;

/// One entry rejected during validation. Recorded, counted as `failed`,
/// never aborting.
#[derive(Debug, Clone)]
pub struct EntryFailure {
    pub category: Category,
    pub entry_id: String,
    pub reason: String,
}

impl EntryFailure {
    pub fn message(&self) -> String {
        format!(
            "{}: entry {}: {}",
            self.category.as_str(),
            self.entry_id,
            self.reason
        )
    }
}

/// Validation outcome: the usable record plus everything that went wrong
/// on the way.
#[derive(Debug)]
pub struct ValidatedBackup {
    pub record: HealthRecord,
    /// Categories whose key is present in the payload, valid or not.
    pub present: Vec<Category>,
    pub failures: Vec<EntryFailure>,
    pub warnings: Vec<String>,
}

impl ValidatedBackup {
    /// Entry count the accounting invariant is checked against:
    /// valid entries plus per-entry failures.
    pub fn input_entries(&self) -> usize {
        self.record.total_entries() + self.failures.len()
    }
}

const DOCUMENT_FIELDS: [&str; 5] = [
    "format_version",
    "engine_version",
    "exported_at",
    "counts",
    "record",
];

pub fn validate_backup(bytes: &[u8]) -> Result<ValidatedBackup, ImportError> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| ImportError::MalformedPayload(format!("not valid JSON: {e}")))?;
    let document = value
        .as_object()
        .ok_or_else(|| ImportError::MalformedPayload("payload is not a JSON object".into()))?;

    let format_version = document
        .get("format_version")
        .and_then(Value::as_u64)
        .ok_or_else(|| ImportError::MalformedPayload("missing format_version".into()))?
        as u32;
    if format_version > BACKUP_FORMAT_VERSION {
        return Err(ImportError::UnsupportedVersion {
            found: format_version,
            supported: BACKUP_FORMAT_VERSION,
        });
    }

    let mut warnings = Vec::new();
    for key in document.keys() {
        if !DOCUMENT_FIELDS.contains(&key.as_str()) {
            warnings.push(format!("unknown field `{key}` ignored"));
        }
    }

    let record_value = document
        .get("record")
        .and_then(Value::as_object)
        .ok_or_else(|| ImportError::MalformedPayload("missing record object".into()))?;

    for key in record_value.keys() {
        let known = key == "profile" || Category::ALL.iter().any(|c| c.as_str() == key);
        if !known {
            warnings.push(format!("unknown record field `{key}` ignored"));
        }
    }

    let mut present = Vec::new();
    for category in Category::ALL {
        if record_value.contains_key(category.as_str()) {
            present.push(category);
        }
    }

    let mut failures = Vec::new();
    let profile = match record_value.get("profile") {
        None | Some(Value::Null) => None,
        Some(value) => match serde_json::from_value::<PatientProfile>(value.clone()) {
            Ok(profile) => Some(profile),
            Err(e) => {
                failures.push(EntryFailure {
                    category: Category::Profile,
                    entry_id: "-".into(),
                    reason: e.to_string(),
                });
                None
            }
        },
    };

    let record = HealthRecord {
        profile,
        labs: entries(record_value.get("labs"), Category::Labs, &mut failures, &mut warnings),
        medications: entries(
            record_value.get("medications"),
            Category::Medications,
            &mut failures,
            &mut warnings,
        ),
        conditions: entries(
            record_value.get("conditions"),
            Category::Conditions,
            &mut failures,
            &mut warnings,
        ),
        procedures: entries(
            record_value.get("procedures"),
            Category::Procedures,
            &mut failures,
            &mut warnings,
        ),
        allergies: entries(
            record_value.get("allergies"),
            Category::Allergies,
            &mut failures,
            &mut warnings,
        ),
        immunizations: entries(
            record_value.get("immunizations"),
            Category::Immunizations,
            &mut failures,
            &mut warnings,
        ),
        vitals: entries(record_value.get("vitals"), Category::Vitals, &mut failures, &mut warnings),
        imaging: entries(
            record_value.get("imaging"),
            Category::Imaging,
            &mut failures,
            &mut warnings,
        ),
        timeline: entries(
            record_value.get("timeline"),
            Category::Timeline,
            &mut failures,
            &mut warnings,
        ),
        notes: entries(record_value.get("notes"), Category::Notes, &mut failures, &mut warnings),
    };

    Ok(ValidatedBackup {
        record,
        present,
        failures,
        warnings,
    })
}

/// Validate one category array. Every element either deserializes into a
/// typed entry or produces one `EntryFailure`; ids must be present, valid
/// UUIDs, and unique within the category.
fn entries<T: DeserializeOwned>(
    value: Option<&Value>,
    category: Category,
    failures: &mut Vec<EntryFailure>,
    warnings: &mut Vec<String>,
) -> Vec<T> {
    let items = match value {
        None | Some(Value::Null) => return Vec::new(),
        Some(Value::Array(items)) => items,
        Some(_) => {
            warnings.push(format!("field `{}` is not an array, ignored", category.as_str()));
            return Vec::new();
        }
    };

    let mut seen = HashSet::new();
    let mut valid = Vec::with_capacity(items.len());
    for item in items {
        let raw_id = item.get("id").and_then(Value::as_str);
        let Some(raw_id) = raw_id else {
            failures.push(EntryFailure {
                category,
                entry_id: "-".into(),
                reason: "missing required identifier".into(),
            });
            continue;
        };
        let Ok(id) = Uuid::parse_str(raw_id) else {
            failures.push(EntryFailure {
                category,
                entry_id: raw_id.into(),
                reason: "identifier is not a valid UUID".into(),
            });
            continue;
        };
        if !seen.insert(id) {
            failures.push(EntryFailure {
                category,
                entry_id: raw_id.into(),
                reason: "duplicate identifier within category".into(),
            });
            continue;
        }
        match serde_json::from_value::<T>(item.clone()) {
            Ok(entry) => valid.push(entry),
            Err(e) => failures.push(EntryFailure {
                category,
                entry_id: raw_id.into(),
                reason: e.to_string(),
            }),
        }
    }
    valid
}
