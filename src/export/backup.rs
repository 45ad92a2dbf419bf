//! Structured Backup: the lossless, fully round-trippable format.
//!
//! A JSON document with an explicit top-level `format_version` for forward
//! compatibility; whatever this serializer emits, import accepts without
//! loss.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::{Category, HealthRecord};
use crate::progress::{CancelToken, ProgressTracker};

use super::ExportError;

/// Bumped when the backup document shape changes incompatibly.
pub const BACKUP_FORMAT_VERSION: u32 = 1;

/// The complete backup artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupDocument {
    pub format_version: u32,
    pub engine_version: String,
    pub exported_at: String,
    /// Per-category entry counts, for previews that must not parse the
    /// whole record.
    pub counts: BTreeMap<String, usize>,
    pub record: HealthRecord,
}

impl BackupDocument {
    pub fn new(record: HealthRecord) -> Self {
        let counts = Category::ALL
            .iter()
            .map(|c| (c.as_str().to_string(), record.category_count(*c)))
            .collect();
        Self {
            format_version: BACKUP_FORMAT_VERSION,
            engine_version: crate::config::ENGINE_VERSION.into(),
            exported_at: chrono::Utc::now().to_rfc3339(),
            counts,
            record,
        }
    }
}

pub fn serialize(
    record: &HealthRecord,
    tracker: &mut ProgressTracker<'_>,
    cancel: &CancelToken,
) -> Result<Vec<u8>, ExportError> {
    let mut processed = 0;
    for category in Category::ALL {
        if cancel.is_cancelled() {
            return Err(ExportError::Cancelled);
        }
        processed += record.category_count(category);
        tracker.generating_step(processed);
    }

    let document = BackupDocument::new(record.clone());
    Ok(serde_json::to_vec_pretty(&document)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::*;
    use crate::progress::NullSink;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn record_with_lab() -> HealthRecord {
        HealthRecord {
            labs: vec![LabResult {
                id: Uuid::new_v4(),
                test_name: "Potassium".into(),
                test_code: Some("2823-3".into()),
                value: Some(4.1),
                value_text: None,
                unit: Some("mEq/L".into()),
                reference_range_low: Some(3.5),
                reference_range_high: Some(5.0),
                abnormal_flag: AbnormalFlag::Normal,
                collection_date: NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(),
                lab_facility: Some("City Lab".into()),
            }],
            ..Default::default()
        }
    }

    #[test]
    fn backup_round_trips_every_field() {
        let record = record_with_lab();
        let mut sink = NullSink;
        let mut tracker = ProgressTracker::new(&mut sink);
        let bytes = serialize(&record, &mut tracker, &CancelToken::new()).unwrap();

        let document: BackupDocument = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(document.format_version, BACKUP_FORMAT_VERSION);
        assert_eq!(document.record, record);
    }

    #[test]
    fn backup_carries_top_level_version_field() {
        let mut sink = NullSink;
        let mut tracker = ProgressTracker::new(&mut sink);
        let bytes = serialize(&HealthRecord::default(), &mut tracker, &CancelToken::new()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["format_version"], BACKUP_FORMAT_VERSION);
    }

    #[test]
    fn counts_cover_every_category() {
        let document = BackupDocument::new(record_with_lab());
        assert_eq!(document.counts.len(), 11);
        assert_eq!(document.counts["labs"], 1);
        assert_eq!(document.counts["medications"], 0);
    }

    #[test]
    fn cancellation_aborts_serialization() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut sink = NullSink;
        let mut tracker = ProgressTracker::new(&mut sink);
        let result = serialize(&record_with_lab(), &mut tracker, &cancel);
        assert!(matches!(result, Err(ExportError::Cancelled)));
    }
}
