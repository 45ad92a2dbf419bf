//! Format classification from raw bytes, header-only where possible.
//!
//! An encrypted envelope is classified as a Structured Backup without the
//! password: only backups are ever encrypted, and the magic bytes are
//! readable in the clear.

use serde::Serialize;
use serde_json::Value;

use crate::crypto::is_encrypted_backup;
use crate::export::tabular::TABULAR_MAGIC;
use crate::export::FormatTag;

/// Classification result. `Unknown` covers anything unrecognized,
/// including Clinical Document text (one-way, carries no marker).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectedFormat {
    StructuredBackup,
    TabularExtract,
    InteropBundle,
    Unknown,
}

impl DetectedFormat {
    pub fn tag(self) -> Option<FormatTag> {
        match self {
            DetectedFormat::StructuredBackup => Some(FormatTag::StructuredBackup),
            DetectedFormat::TabularExtract => Some(FormatTag::TabularExtract),
            DetectedFormat::InteropBundle => Some(FormatTag::InteropBundle),
            DetectedFormat::Unknown => None,
        }
    }
}

/// Classify an artifact by its markers and structure.
pub fn detect_export_format(bytes: &[u8]) -> DetectedFormat {
    if is_encrypted_backup(bytes) {
        return DetectedFormat::StructuredBackup;
    }

    if let Ok(text) = std::str::from_utf8(bytes) {
        let first_line = text.lines().next().unwrap_or("").trim_end();
        if first_line == TABULAR_MAGIC {
            return DetectedFormat::TabularExtract;
        }
    }

    if let Ok(value) = serde_json::from_slice::<Value>(bytes) {
        if value.get("resourceType").and_then(Value::as_str) == Some("Bundle") {
            return DetectedFormat::InteropBundle;
        }
        if value.get("format_version").is_some() && value.get("record").is_some() {
            return DetectedFormat::StructuredBackup;
        }
    }

    DetectedFormat::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::encrypt_with_iterations;
    use crate::export::backup;
    use crate::models::HealthRecord;
    use crate::progress::{CancelToken, NullSink, ProgressTracker};

    fn plain_backup() -> Vec<u8> {
        let mut sink = NullSink;
        let mut tracker = ProgressTracker::new(&mut sink);
        backup::serialize(&HealthRecord::default(), &mut tracker, &CancelToken::new()).unwrap()
    }

    #[test]
    fn recognizes_plain_backup() {
        assert_eq!(
            detect_export_format(&plain_backup()),
            DetectedFormat::StructuredBackup
        );
    }

    #[test]
    fn recognizes_encrypted_backup_without_password() {
        let envelope = encrypt_with_iterations(&plain_backup(), "pw", 10_000).unwrap();
        assert_eq!(
            detect_export_format(&envelope.to_bytes()),
            DetectedFormat::StructuredBackup
        );
    }

    #[test]
    fn recognizes_tabular_extract() {
        let bytes = format!("{TABULAR_MAGIC}\n\n# category: labs\n");
        assert_eq!(
            detect_export_format(bytes.as_bytes()),
            DetectedFormat::TabularExtract
        );
    }

    #[test]
    fn recognizes_fhir_bundle() {
        let bytes = br#"{"resourceType":"Bundle","type":"collection","entry":[]}"#;
        assert_eq!(detect_export_format(bytes), DetectedFormat::InteropBundle);
    }

    #[test]
    fn everything_else_is_unknown() {
        assert_eq!(detect_export_format(b""), DetectedFormat::Unknown);
        assert_eq!(detect_export_format(b"CLINICAL SUMMARY"), DetectedFormat::Unknown);
        assert_eq!(detect_export_format(b"{\"foo\": 1}"), DetectedFormat::Unknown);
        assert_eq!(detect_export_format(&[0xff, 0xfe, 0x00]), DetectedFormat::Unknown);
    }
}
